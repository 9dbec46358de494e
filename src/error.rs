//! Gateway error taxonomy and its HTTP rendering.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use crate::security::types::RateLimitDecision;

/// Who is expected to act on a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Caller-fixable (401, 429, bad input, unknown route).
    Client,
    /// Downstream unreachable or timed out; retry with backoff.
    Transport,
    /// Operator misconfiguration.
    Configuration,
    /// Unexpected fault; details stay server-side.
    Internal,
    /// Downstream answered with an error status that is passed through.
    Upstream,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("{0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {}", .decision.reason)]
    RateLimited {
        decision: RateLimitDecision,
        retry_after: u64,
    },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("{detail}")]
    Downstream { status: StatusCode, detail: String },

    /// The payload is logged, never sent to the caller.
    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl GatewayError {
    pub fn rate_limited(decision: RateLimitDecision) -> Self {
        let retry_after = decision.retry_after(Utc::now());
        GatewayError::RateLimited {
            decision,
            retry_after,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::UnknownService(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Downstream { status, .. } => *status,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            GatewayError::Unauthorized(_)
            | GatewayError::RateLimited { .. }
            | GatewayError::BadRequest(_)
            | GatewayError::NotFound(_) => ErrorClass::Client,
            GatewayError::Unavailable(_) => ErrorClass::Transport,
            GatewayError::UnknownService(_) => ErrorClass::Configuration,
            GatewayError::Internal(_) => ErrorClass::Internal,
            GatewayError::Downstream { .. } => ErrorClass::Upstream,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::RateLimited { .. } => "rate_limit_exceeded",
            GatewayError::BadRequest(_) => "bad_request",
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Unavailable(_) => "service_unavailable",
            GatewayError::UnknownService(_) => "configuration_error",
            GatewayError::Downstream { .. } => "downstream_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Text recorded in the audit log. Internal details are kept here, not in the response.
    pub fn audit_message(&self) -> String {
        match self {
            GatewayError::Internal(detail) => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Render the error, embedding the request id when one is known.
    pub fn render(&self, request_id: Option<&str>) -> Response {
        let retry_after = match self {
            GatewayError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            request_id,
            retry_after,
        };

        let mut response = (self.status(), Json(body)).into_response();
        let headers = response.headers_mut();
        match self {
            GatewayError::Unauthorized(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            GatewayError::RateLimited {
                decision,
                retry_after,
            } => {
                headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
                headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
                headers.insert(
                    "x-ratelimit-reset",
                    HeaderValue::from(decision.reset_time.timestamp()),
                );
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after));
            }
            _ => {}
        }
        response
    }
}

/// Handlers return `GatewayError`; the admission pipeline finds it in the response
/// extensions and re-renders it with the request id.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = self.render(None);
        response.extensions_mut().insert(self);
        response
    }
}
