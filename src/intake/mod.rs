//! Email-to-ticket ingestion.
//!
//! Inbound mail arrives as JSON, a multipart form or a raw MIME body, is
//! reduced to an [`InboundEmail`] and stored as a ticket keyed on its
//! message-id. Delivering the same message twice yields one ticket.

pub mod handlers;
pub mod parse;
pub mod store;

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use chrono::{DateTime, Duration, Utc};
use log::info;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::IntakeConfig;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::tickets::types::{Priority, Ticket, TicketSource, TicketStatus};

pub use parse::InboundEmail;
pub use store::{IntakeStore, PgIntakeStore};

pub const DEFAULT_SUBJECT: &str = "(no subject)";
pub const MAX_TITLE_LENGTH: usize = 250;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Sender address is missing")]
    MissingSender,
    #[error("Invalid sender address: {0}")]
    InvalidSender(String),
    #[error("Unreadable payload: {0}")]
    Payload(String),
    #[error("Invalid MIME message: {0}")]
    Mime(#[from] mailparse::MailParseError),
    #[error("Storage error: {0}")]
    Store(String),
}

impl From<diesel::result::Error> for IntakeError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for IntakeError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        Self::Store(e.to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestOutcome {
    pub ticket_id: Uuid,
    pub created: bool,
    pub message_id: String,
}

/// Inbound mail often carries attachments, so these routes replace axum's
/// default body limit with `max_body_bytes`.
pub fn configure_intake_routes(max_body_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::INTAKE_EMAIL, post(handlers::handle_intake_email))
        .route(ApiUrls::INTAKE_EMAIL_RAW, post(handlers::handle_intake_raw))
        .layer(DefaultBodyLimit::max(max_body_bytes))
}

fn truncate_title(subject: &str) -> String {
    match subject.char_indices().nth(MAX_TITLE_LENGTH) {
        Some((idx, _)) => subject[..idx].to_string(),
        None => subject.to_string(),
    }
}

/// The ticket row for an inbound email.
pub fn build_ticket(
    email: &InboundEmail,
    message_id: String,
    created_by: Option<Uuid>,
    config: &IntakeConfig,
    now: DateTime<Utc>,
) -> Ticket {
    let title = email
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(truncate_title)
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());

    let business = parse::sender_domain(&email.from_address)
        .and_then(|domain| config.business_for_domain(domain));

    Ticket {
        id: Uuid::new_v4(),
        title,
        description: email.text.clone(),
        status: TicketStatus::Open.as_str().to_string(),
        priority: Priority::Normal.as_str().to_string(),
        created_by,
        assigned_to: None,
        due_date: config
            .default_due_hours
            .filter(|h| *h > 0)
            .map(|h| now + Duration::hours(h)),
        created_at: now,
        updated_at: now,
        completed_at: None,
        business,
        source: TicketSource::Email.as_str().to_string(),
        requester_email: Some(email.from_address.clone()),
        requester_name: email.from_name.clone(),
        message_id: Some(message_id),
    }
}

/// Stores `email` as a ticket unless its message-id was already ingested.
pub async fn ingest(
    store: &dyn IntakeStore,
    config: &IntakeConfig,
    email: InboundEmail,
) -> Result<IngestOutcome, IntakeError> {
    let message_id = email.effective_message_id();

    if let Some(existing) = store.find_by_message_id(&message_id).await? {
        info!("Duplicate email {message_id}; ticket {existing} already exists");
        return Ok(IngestOutcome {
            ticket_id: existing,
            created: false,
            message_id,
        });
    }

    let created_by = store.find_profile_id(&email.from_address).await?;
    let ticket = build_ticket(&email, message_id.clone(), created_by, config, Utc::now());
    let (ticket_id, created) = store.insert_if_absent(ticket).await?;

    if created {
        info!(
            "Created ticket {ticket_id} from email by {} ({message_id})",
            email.from_address
        );
    } else {
        info!("Concurrent delivery of {message_id}; kept ticket {ticket_id}");
    }

    Ok(IngestOutcome {
        ticket_id,
        created,
        message_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shared::test_utils::MemoryIntakeStore;
    use std::collections::HashMap;

    fn email(message_id: Option<&str>) -> InboundEmail {
        InboundEmail {
            subject: Some("Monitor flickers".to_string()),
            from_address: "dana@globex.com".to_string(),
            from_name: Some("Dana".to_string()),
            text: Some("Since this morning".to_string()),
            message_id: message_id.map(str::to_string),
            date: Some("Wed, 12 Jun 2024 08:15:00 +0000".to_string()),
        }
    }

    fn config() -> IntakeConfig {
        IntakeConfig {
            domain_businesses: HashMap::from([("globex.com".to_string(), "globex".to_string())]),
            default_business: Some("internal".to_string()),
            default_due_hours: Some(48),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_ticket_defaults_and_mapping() {
        let now = Utc::now();
        let mut mail = email(Some("m1"));
        mail.subject = Some("   ".to_string());
        let ticket = build_ticket(&mail, "m1".to_string(), None, &config(), now);

        assert_eq!(ticket.title, DEFAULT_SUBJECT);
        assert_eq!(ticket.status, "open");
        assert_eq!(ticket.priority, "normal");
        assert_eq!(ticket.source, "email");
        assert_eq!(ticket.business.as_deref(), Some("globex"));
        assert_eq!(ticket.requester_email.as_deref(), Some("dana@globex.com"));
        assert_eq!(ticket.due_date, Some(now + Duration::hours(48)));
        assert_eq!(ticket.message_id.as_deref(), Some("m1"));
        assert!(ticket.created_by.is_none());
    }

    #[test]
    fn test_unknown_domain_uses_default_business() {
        let mut mail = email(None);
        mail.from_address = "x@elsewhere.org".to_string();
        let ticket = build_ticket(&mail, "id".to_string(), None, &config(), Utc::now());
        assert_eq!(ticket.business.as_deref(), Some("internal"));

        let bare = IntakeConfig::default();
        let ticket = build_ticket(&mail, "id".to_string(), None, &bare, Utc::now());
        assert!(ticket.business.is_none());
        assert!(ticket.due_date.is_none());
    }

    #[test]
    fn test_long_subject_truncated() {
        let mut mail = email(None);
        mail.subject = Some("é".repeat(MAX_TITLE_LENGTH + 10));
        let ticket = build_ticket(&mail, "id".to_string(), None, &config(), Utc::now());
        assert_eq!(ticket.title.chars().count(), MAX_TITLE_LENGTH);
    }

    #[tokio::test]
    async fn test_same_message_id_creates_one_ticket() {
        let store = MemoryIntakeStore::new();

        let first = ingest(&store, &config(), email(Some("abc@globex.com")))
            .await
            .unwrap();
        let second = ingest(&store, &config(), email(Some("abc@globex.com")))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.ticket_id, second.ticket_id);
        assert_eq!(store.stored().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_message_id_is_derived_and_deduplicated() {
        let store = MemoryIntakeStore::new();

        let first = ingest(&store, &config(), email(None)).await.unwrap();
        let second = ingest(&store, &config(), email(None)).await.unwrap();

        assert!(first.message_id.starts_with("derived-"));
        assert_eq!(first.message_id, second.message_id);
        assert!(!second.created);
        assert_eq!(store.stored().await.len(), 1);
    }

    #[tokio::test]
    async fn test_known_sender_becomes_creator() {
        let profile_id = Uuid::new_v4();
        let store = MemoryIntakeStore::new().with_profile("Dana@Globex.com", profile_id);

        ingest(&store, &config(), email(Some("m2"))).await.unwrap();

        let stored = store.stored().await;
        assert_eq!(stored[0].created_by, Some(profile_id));
    }
}
