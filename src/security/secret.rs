use axum::http::HeaderMap;

use crate::security::AuthError;

pub const INTAKE_SECRET_HEADER: &str = "X-Intake-Secret";
pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Checks a shared secret taken from a header or query parameter.
pub fn verify_shared_secret(
    expected: Option<&str>,
    provided: Option<&str>,
) -> Result<(), AuthError> {
    let expected = expected
        .filter(|s| !s.is_empty())
        .ok_or(AuthError::SecretNotConfigured)?;
    let provided = provided.ok_or(AuthError::InvalidSecret)?;

    if constant_time_compare(expected, provided) {
        Ok(())
    } else {
        Err(AuthError::InvalidSecret)
    }
}

/// Header value first, then the `secret` query parameter.
pub fn secret_from_request<'a>(
    headers: &'a HeaderMap,
    header_name: &str,
    query_secret: Option<&'a str>,
) -> Option<&'a str> {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or(query_secret)
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
