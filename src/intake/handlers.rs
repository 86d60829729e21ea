use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, HeaderMap},
    Json,
};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::shared::error::{ApiError, ApiResult};
use crate::core::shared::state::AppState;
use crate::intake::{ingest, InboundEmail, IntakeError};
use crate::security::{secret_from_request, verify_shared_secret, INTAKE_SECRET_HEADER};

#[derive(Debug, Default, Deserialize)]
pub struct IntakeQuery {
    pub secret: Option<String>,
}

fn authorize(state: &AppState, headers: &HeaderMap, query: &IntakeQuery) -> ApiResult<()> {
    let provided = secret_from_request(headers, INTAKE_SECRET_HEADER, query.secret.as_deref());
    verify_shared_secret(state.config.intake.secret.as_deref(), provided).map_err(|e| {
        warn!("Rejected intake request: {e}");
        ApiError::from(e)
    })
}

/// Processing failures never produce an error status; the sending mail
/// system would otherwise retry or bounce.
async fn respond(state: &AppState, parsed: Result<InboundEmail, IntakeError>) -> Json<Value> {
    let result = match parsed {
        Ok(email) => ingest(state.intake.as_ref(), &state.config.intake, email).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => Json(json!({
            "ok": true,
            "ticket_id": outcome.ticket_id,
            "created": outcome.created,
            "message_id": outcome.message_id,
        })),
        Err(e) => {
            warn!("Email intake failed: {e}");
            Json(json!({ "ok": false, "error": e.to_string() }))
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<InboundEmail, IntakeError> {
    let mut fields: HashMap<String, String> = HashMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IntakeError::Payload(e.to_string()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| IntakeError::Payload(e.to_string()))?;

        if name == "email" {
            return InboundEmail::from_mime(&data);
        }
        fields.insert(name, String::from_utf8_lossy(&data).into_owned());
    }

    InboundEmail::from_fields(&fields)
}

/// JSON or multipart form. A multipart field named `email` is treated as a
/// complete raw MIME message.
pub async fn handle_intake_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IntakeQuery>,
    request: Request,
) -> ApiResult<Json<Value>> {
    authorize(&state, request.headers(), &query)?;

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parsed = if content_type.starts_with("multipart/form-data") {
        match Multipart::from_request(request, &state).await {
            Ok(multipart) => read_multipart(multipart).await,
            Err(e) => Err(IntakeError::Payload(e.body_text())),
        }
    } else {
        match Bytes::from_request(request, &state).await {
            Ok(body) => serde_json::from_slice::<Value>(&body)
                .map_err(|e| IntakeError::Payload(e.to_string()))
                .and_then(|value| InboundEmail::from_json(&value)),
            Err(e) => Err(IntakeError::Payload(e.body_text())),
        }
    };

    Ok(respond(&state, parsed).await)
}

/// Raw RFC 822 message as the request body.
pub async fn handle_intake_raw(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IntakeQuery>,
    request: Request,
) -> ApiResult<Json<Value>> {
    authorize(&state, request.headers(), &query)?;

    let parsed = match Bytes::from_request(request, &state).await {
        Ok(body) => InboundEmail::from_mime(&body),
        Err(e) => Err(IntakeError::Payload(e.body_text())),
    };
    Ok(respond(&state, parsed).await)
}
