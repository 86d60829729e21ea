use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("expired token")]
    ExpiredToken,
    #[error("invalid shared secret")]
    InvalidSecret,
    #[error("shared secret not configured")]
    SecretNotConfigured,
    #[error("profile not found")]
    ProfileNotFound,
    #[error("account disabled")]
    AccountDisabled,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::ExpiredToken => StatusCode::UNAUTHORIZED,
            Self::InvalidSecret => StatusCode::UNAUTHORIZED,
            Self::SecretNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            Self::ProfileNotFound => StatusCode::FORBIDDEN,
            Self::AccountDisabled => StatusCode::FORBIDDEN,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::ExpiredToken => "expired_token",
            Self::InvalidSecret => "invalid_secret",
            Self::SecretNotConfigured => "secret_not_configured",
            Self::ProfileNotFound => "profile_not_found",
            Self::AccountDisabled => "account_disabled",
            Self::InternalError(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::MissingToken => "Authentication token is required".to_string(),
            Self::InvalidToken => "Invalid authentication token".to_string(),
            Self::ExpiredToken => "Authentication token has expired".to_string(),
            Self::InvalidSecret => "Invalid or missing shared secret".to_string(),
            Self::SecretNotConfigured => "This endpoint is not configured".to_string(),
            Self::ProfileNotFound => "No profile exists for this account".to_string(),
            Self::AccountDisabled => "Your account has been disabled".to_string(),
            Self::InternalError(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.error_code(),
            "message": self.message()
        }));
        (status, body).into_response()
    }
}
