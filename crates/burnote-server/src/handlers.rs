use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::{error::SecretError, AppState};

/// Upper bound on the plaintext accepted by `POST /api/secrets`.
pub const MAX_TEXT_BYTES: usize = 1_048_576;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub text: Option<String>,
    /// Number or numeric string; anything else falls back to the default.
    pub view_limit: Option<Value>,
    /// Minutes until expiry. Number or numeric string.
    #[serde(alias = "expirationMinutes")]
    pub expiration: Option<Value>,
}

/// Check a create request before it reaches the service.
pub fn validate_create(body: &CreateRequest) -> Result<&str, SecretError> {
    let text = body.text.as_deref().unwrap_or_default();
    if text.is_empty() {
        return Err(SecretError::validation(
            "please provide some text to encrypt",
        ));
    }
    if text.len() > MAX_TEXT_BYTES {
        return Err(SecretError::validation("text exceeds 1 MiB limit"));
    }
    Ok(text)
}

pub async fn create_secret(
    State(state): State<AppState>,
    payload: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    // Malformed bodies get the same envelope as any other create failure.
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return secret_error(SecretError::validation(format!(
                "invalid request body: {}",
                rejection.body_text()
            )))
        }
    };

    let text = match validate_create(&body) {
        Ok(text) => text,
        Err(e) => return secret_error(e),
    };

    let view_limit = body.view_limit.as_ref().and_then(coerce_int);
    let expiration = body.expiration.as_ref().and_then(coerce_int);

    match state.service.create(text, view_limit, expiration) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "data": { "id": id } })),
        )
            .into_response(),
        Err(e) => secret_error(e),
    }
}

// ── Reveal ────────────────────────────────────────────────────────────────────

pub async fn reveal_secret(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.reveal(&id) {
        Ok(text) => {
            info!(id = %id, "secret revealed");
            Json(json!({ "success": true, "data": text })).into_response()
        }
        Err(e) => secret_error(e),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Leniently read an integer from JSON: numbers are truncated, strings are
/// parsed by their leading run of digits (`"3 views"` is 3).
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => parse_leading_int(s),
        _ => None,
    }
}

fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end]
        .parse::<i64>()
        .ok()
        .map(|n| n * sign)
        .or(Some(i64::MAX * sign))
}

fn secret_error(e: SecretError) -> Response {
    let status = match &e {
        SecretError::Validation(_) | SecretError::Decryption => StatusCode::BAD_REQUEST,
        SecretError::NotFound => StatusCode::NOT_FOUND,
        SecretError::Internal(err) => {
            tracing::error!(error = %err, "internal error");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "message": "internal server error"})),
            )
                .into_response();
        }
    };
    (
        status,
        Json(json!({"success": false, "message": e.to_string()})),
    )
        .into_response()
}
