use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

use crate::core::shared::schema::{profiles, tickets};
use crate::core::shared::utils::DbPool;
use crate::intake::IntakeError;
use crate::tickets::types::Ticket;

/// Persistence used by email ingestion.
#[async_trait]
pub trait IntakeStore: Send + Sync {
    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Uuid>, IntakeError>;

    async fn find_profile_id(&self, email: &str) -> Result<Option<Uuid>, IntakeError>;

    /// Inserts `ticket` unless one with the same message-id exists. Returns
    /// the id of the stored ticket and whether this call created it.
    async fn insert_if_absent(&self, ticket: Ticket) -> Result<(Uuid, bool), IntakeError>;
}

#[derive(Clone)]
pub struct PgIntakeStore {
    pool: DbPool,
}

impl PgIntakeStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, f: F) -> Result<T, IntakeError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> QueryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn).map_err(IntakeError::from)
        })
        .await
        .map_err(|e| IntakeError::Store(e.to_string()))?
    }
}

fn ticket_id_for_message(conn: &mut PgConnection, message_id: &str) -> QueryResult<Option<Uuid>> {
    tickets::table
        .filter(tickets::message_id.eq(message_id))
        .select(tickets::id)
        .first(conn)
        .optional()
}

#[async_trait]
impl IntakeStore for PgIntakeStore {
    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Uuid>, IntakeError> {
        let message_id = message_id.to_string();
        self.run(move |conn| ticket_id_for_message(conn, &message_id))
            .await
    }

    async fn find_profile_id(&self, email: &str) -> Result<Option<Uuid>, IntakeError> {
        let email = email.to_lowercase();
        self.run(move |conn| {
            profiles::table
                .filter(profiles::email.eq(email))
                .filter(profiles::disabled.eq(false))
                .select(profiles::id)
                .first(conn)
                .optional()
        })
        .await
    }

    async fn insert_if_absent(&self, ticket: Ticket) -> Result<(Uuid, bool), IntakeError> {
        let Some(message_id) = ticket.message_id.clone() else {
            return Err(IntakeError::Store(
                "email tickets need a message-id".to_string(),
            ));
        };

        self.run(move |conn| {
            let inserted = diesel::insert_into(tickets::table)
                .values(&ticket)
                .on_conflict(tickets::message_id)
                .do_nothing()
                .execute(conn)?;
            if inserted == 1 {
                return Ok((ticket.id, true));
            }
            // Lost the race to a concurrent delivery; report the winner.
            let existing = ticket_id_for_message(conn, &message_id)?
                .ok_or(diesel::result::Error::NotFound)?;
            Ok((existing, false))
        })
        .await
    }
}
