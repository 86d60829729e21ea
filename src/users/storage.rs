use diesel::prelude::*;
use std::collections::HashMap;
use uuid::Uuid;

use super::types::{Profile, ProfileSummary};
use crate::core::shared::schema::profiles;
use crate::core::shared::utils::normalize_email;
use crate::security::Role;

pub fn find_profile(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Profile>> {
    profiles::table.find(id).first::<Profile>(conn).optional()
}

pub fn find_profile_by_email(conn: &mut PgConnection, email: &str) -> QueryResult<Option<Profile>> {
    profiles::table
        .filter(profiles::email.eq(normalize_email(email)))
        .first::<Profile>(conn)
        .optional()
}

pub fn load_summaries(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<Vec<ProfileSummary>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    profiles::table
        .filter(profiles::id.eq_any(ids))
        .select((
            profiles::id,
            profiles::email,
            profiles::full_name,
            profiles::role,
        ))
        .load::<ProfileSummary>(conn)
}

/// Roles of the given profiles; ids without a profile are absent.
pub fn roles_for(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<HashMap<Uuid, Role>> {
    Ok(load_summaries(conn, ids)?
        .into_iter()
        .filter_map(|p| p.role.parse().ok().map(|role| (p.id, role)))
        .collect())
}

/// Emails of enabled profiles among `ids`.
pub fn emails_for(conn: &mut PgConnection, ids: &[Uuid]) -> QueryResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    profiles::table
        .filter(profiles::id.eq_any(ids))
        .filter(profiles::disabled.eq(false))
        .select(profiles::email)
        .load::<String>(conn)
}
