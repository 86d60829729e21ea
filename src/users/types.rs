use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::shared::schema::profiles;
use crate::security::{AuthenticatedUser, Role};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = profiles)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub ext: Option<String>,
    pub can_create_ticket: bool,
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn role(&self) -> Role {
        self.role.parse().unwrap_or_else(|e| {
            warn!("Profile {} has {e}; treating as user-client", self.id);
            Role::UserClient
        })
    }

    pub fn to_authenticated_user(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: self.id,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role(),
            can_create_ticket: self.can_create_ticket,
        }
    }
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = profiles)]
pub struct ProfileChanges {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<String>,
    pub ext: Option<String>,
    pub can_create_ticket: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Compact profile used when embedding people in other responses.
#[derive(Debug, Clone, Serialize, Deserialize, Queryable)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub ext: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub disabled: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Identity-provider user id; generated when absent.
    pub id: Option<Uuid>,
    pub email: String,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub ext: Option<String>,
    pub can_create_ticket: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub ext: Option<String>,
    pub can_create_ticket: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DisableUserRequest {
    pub reason: Option<String>,
}

pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
                && !domain.ends_with('.') && !domain.contains('@')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: &str) -> Profile {
        let now = Utc::now();
        Profile {
            id: Uuid::new_v4(),
            email: "ops@example.com".to_string(),
            full_name: Some("Ops".to_string()),
            avatar_url: None,
            role: role.to_string(),
            ext: Some("204".to_string()),
            can_create_ticket: false,
            disabled: false,
            disabled_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_profile_to_authenticated_user() {
        let p = profile("technician-it");
        let user = p.to_authenticated_user();
        assert_eq!(user.user_id, p.id);
        assert_eq!(user.role, Role::TechnicianIt);
        assert!(!user.can_create_ticket);
        assert_eq!(user.display_name(), "Ops");
    }

    #[test]
    fn test_unknown_role_falls_back_to_user_client() {
        assert_eq!(profile("superuser").role(), Role::UserClient);
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email(" help.desk@corp.example.com "));
        assert!(!is_valid_email("nobody"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@localhost"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@b@c.de"));
    }
}
