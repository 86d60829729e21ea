use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    #[serde(rename = "manager")]
    Manager,
    #[serde(rename = "technician-it")]
    TechnicianIt,
    #[default]
    #[serde(rename = "user-client")]
    UserClient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::TechnicianIt => "technician-it",
            Self::UserClient => "user-client",
        }
    }

    /// Managers and technicians.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Manager | Self::TechnicianIt)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "manager" => Ok(Self::Manager),
            "technician-it" | "technician" => Ok(Self::TechnicianIt),
            "user-client" | "user" | "client" => Ok(Self::UserClient),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of a request, resolved from the bearer token and the
/// `profiles` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Role,
    pub can_create_ticket: bool,
}

impl AuthenticatedUser {
    pub fn new(user_id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            email: email.into(),
            full_name: None,
            role,
            can_create_ticket: true,
        }
    }

    pub fn with_full_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    pub fn with_can_create_ticket(mut self, allowed: bool) -> Self {
        self.can_create_ticket = allowed;
        self
    }

    pub fn is_manager(&self) -> bool {
        self.role == Role::Manager
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.email)
    }
}
