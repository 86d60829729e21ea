use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "deskserver.toml";
pub const ENV_PREFIX: &str = "DESK_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthSettings,
    pub intake: IntakeConfig,
    pub notify: NotifyConfig,
    pub tasks: TasksConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://desk:@localhost:5432/deskserver".to_string(),
            max_connections: 10,
        }
    }
}

/// Settings for verifying bearer tokens issued by the identity provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub audience: Option<String>,
    pub leeway_seconds: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            audience: Some("authenticated".to_string()),
            leeway_seconds: 60,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub secret: Option<String>,
    /// Sender domain (lowercase) to business tag.
    pub domain_businesses: HashMap<String, String>,
    pub default_business: Option<String>,
    pub default_due_hours: Option<i64>,
    /// Largest accepted intake request body, attachments included.
    pub max_body_bytes: usize,
}

pub const DEFAULT_INTAKE_BODY_BYTES: usize = 25 * 1024 * 1024;

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            secret: None,
            domain_businesses: HashMap::new(),
            default_business: None,
            default_due_hours: None,
            max_body_bytes: DEFAULT_INTAKE_BODY_BYTES,
        }
    }
}

impl IntakeConfig {
    pub fn business_for_domain(&self, domain: &str) -> Option<String> {
        self.domain_businesses
            .get(&domain.to_lowercase())
            .cloned()
            .or_else(|| self.default_business.clone())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub secret: Option<String>,
    pub secret_header: String,
    pub webhook_secret: Option<String>,
    pub timeout_seconds: u64,
    /// Dispatch from the request handlers. Turn off when database webhooks
    /// deliver the same events.
    pub inline: bool,
    pub app_base_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            secret: None,
            secret_header: "X-Mail-Secret".to_string(),
            webhook_secret: None,
            timeout_seconds: 10,
            inline: true,
            app_base_url: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    pub default_cutoff: String,
    pub utc_offset_minutes: i32,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_cutoff: "10:00".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

impl TasksConfig {
    pub fn cutoff(&self) -> Option<NaiveTime> {
        parse_cutoff(&self.default_cutoff)
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Parses `HH:MM` (or `HH:MM:SS`) into a time of day.
pub fn parse_cutoff(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

impl AppConfig {
    /// Defaults, then the TOML file, then `DATABASE_URL`/`JWT_SECRET`, then
    /// `DESK_*` variables (`DESK_SERVER__PORT=9000`).
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let file = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut figment = Self::base_figment(&file);

        if let Ok(url) = std::env::var("DATABASE_URL") {
            figment = figment.merge(Serialized::default("database.url", url));
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            figment = figment.merge(Serialized::default("auth.jwt_secret", secret));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    pub fn base_figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(file))
    }

    pub fn from_file(file: &Path) -> Result<Self, figment::Error> {
        Self::base_figment(file).extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 10);
        assert!(!config.notify.enabled);
        assert!(config.notify.inline);
        assert_eq!(config.intake.max_body_bytes, DEFAULT_INTAKE_BODY_BYTES);
        assert_eq!(
            config.tasks.cutoff(),
            NaiveTime::from_hms_opt(10, 0, 0)
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[intake]
secret = "s3cret"
default_business = "acme"
max_body_bytes = 1048576

[intake.domain_businesses]
"contoso.com" = "contoso"

[tasks]
default_cutoff = "09:30"
utc_offset_minutes = -180
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.intake.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.intake.max_body_bytes, 1_048_576);
        assert_eq!(
            config.intake.business_for_domain("Contoso.com"),
            Some("contoso".to_string())
        );
        assert_eq!(
            config.intake.business_for_domain("other.org"),
            Some("acme".to_string())
        );
        assert_eq!(config.tasks.cutoff(), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(config.tasks.offset().local_minus_utc(), -180 * 60);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::from_file(Path::new("/nonexistent/deskserver.toml")).unwrap();
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_parse_cutoff() {
        assert_eq!(parse_cutoff("08:15"), NaiveTime::from_hms_opt(8, 15, 0));
        assert_eq!(parse_cutoff("08:15:30"), NaiveTime::from_hms_opt(8, 15, 30));
        assert_eq!(parse_cutoff("25:00"), None);
        assert_eq!(parse_cutoff("soon"), None);
    }
}
