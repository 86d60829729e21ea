use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{error::AuthError, types::AuthenticatedUser};
use crate::core::shared::state::AppState;
use crate::security::jwt::extract_bearer_token;
use crate::users::storage::find_profile;

/// Resolves the bearer token to a profile. The resolved user is cached in the
/// request extensions so a handler taking it twice only hits the database once.
impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingToken)?;
        let token = extract_bearer_token(auth_header).ok_or(AuthError::MissingToken)?;

        let claims = state.jwt.verify(token)?;
        let user_id = claims.user_id()?;

        let pool = state.conn.clone();
        let profile = tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| AuthError::InternalError(e.to_string()))?;
            find_profile(&mut conn, user_id).map_err(|e| AuthError::InternalError(e.to_string()))
        })
        .await
        .map_err(|e| AuthError::InternalError(e.to_string()))??
        .ok_or_else(|| {
            debug!("No profile for token subject {user_id}");
            AuthError::ProfileNotFound
        })?;

        if profile.disabled {
            warn!(
                "Rejected disabled account {} ({})",
                profile.id,
                profile.disabled_reason.as_deref().unwrap_or("no reason given")
            );
            return Err(AuthError::AccountDisabled);
        }

        let user = profile.to_authenticated_user();
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}
