use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
#[cfg(feature = "intake")]
use crate::intake::store::{IntakeStore, PgIntakeStore};
use crate::notify::sender::{mailer_from_config, MailSender};
use crate::security::JwtVerifier;

pub struct AppState {
    pub conn: DbPool,
    pub config: Arc<AppConfig>,
    pub jwt: Arc<JwtVerifier>,
    pub mailer: Arc<dyn MailSender>,
    #[cfg(feature = "intake")]
    pub intake: Arc<dyn IntakeStore>,
}

impl AppState {
    pub fn new(conn: DbPool, config: AppConfig) -> Self {
        let jwt = Arc::new(JwtVerifier::new(&config.auth));
        let mailer = mailer_from_config(&config.notify);
        Self {
            #[cfg(feature = "intake")]
            intake: Arc::new(PgIntakeStore::new(conn.clone())),
            conn,
            config: Arc::new(config),
            jwt,
            mailer,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn MailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    #[cfg(feature = "intake")]
    pub fn with_intake_store(mut self, store: Arc<dyn IntakeStore>) -> Self {
        self.intake = store;
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("jwt_configured", &self.jwt.is_configured())
            .finish_non_exhaustive()
    }
}
