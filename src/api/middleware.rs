//! Optional bearer-token authentication for the HTTP API.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// API authentication settings.
///
/// When no key is configured (local development, tests) every request passes
/// through unchanged.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyConfig {
    /// Expected bearer token (from FLAGPOST_API_KEY).
    pub api_key: Option<String>,
}

impl ApiKeyConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("FLAGPOST_API_KEY").ok(),
        }
    }

    pub fn disabled() -> Self {
        Self { api_key: None }
    }

    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
        }
    }
}

/// Rejects requests without a matching `Authorization: Bearer <key>` header
/// when a key is configured.
pub async fn require_api_key(
    State(config): State<ApiKeyConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected_key = match &config.api_key {
        Some(key) => key,
        None => return Ok(next.run(request).await),
    };

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(header) if header.strip_prefix("Bearer ") == Some(expected_key.as_str()) => {
            Ok(next.run(request).await)
        }
        Some(_) => {
            tracing::warn!("Invalid API key provided");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("Missing Authorization header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
