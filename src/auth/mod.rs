use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::tracing::ErrorKind;

const BEARER_PREFIX: &str = "Bearer ";

/// The shared secret protected routes expect as a bearer token
#[derive(Clone)]
pub struct ApiSecret(Arc<str>);

impl ApiSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::from(secret.into()))
    }

    /// Constant-time comparison against a presented token
    pub fn matches(&self, token: &str) -> bool {
        bool::from(self.0.as_bytes().ct_eq(token.as_bytes()))
    }
}

impl fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiSecret(<redacted>)")
    }
}

/// Authentication errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (error_code, error_message) = match &self {
            Self::MissingToken => ("AUTH_MISSING_TOKEN", "No authentication token provided"),
            Self::InvalidToken => ("AUTH_INVALID_TOKEN", "Invalid authentication token"),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Check the `Authorization` header against the configured secret.
///
/// The prefix must be exactly `"Bearer "`; the remainder is compared verbatim.
pub fn authorize(headers: &HeaderMap, secret: &ApiSecret) -> Result<(), AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?;

    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .ok_or(AuthError::InvalidToken)?;

    if token.is_empty() || !secret.matches(token) {
        return Err(AuthError::InvalidToken);
    }

    Ok(())
}

/// Rejects the request with 401 before any handler runs unless it carries the secret
pub async fn require_bearer(
    State(secret): State<ApiSecret>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if let Err(err) = authorize(request.headers(), &secret) {
        warn!(
            error_type = %ErrorKind::Auth,
            path = %request.uri().path(),
            reason = %err,
            "Rejected unauthenticated request"
        );
        return Err(err);
    }

    Ok(next.run(request).await)
}
