use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for one render job.
///
/// Every variant maps to a distinct HTTP status so callers can tell
/// "bad URL" from "auth failure" from "timeout" apart. None of these are
/// retried inside the service; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("browser engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    #[error("upstream returned status {code}")]
    UpstreamStatus { code: u16 },

    #[error("selector {selector:?} did not appear within {timeout:?}")]
    SelectorNotFound { selector: String, timeout: Duration },

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn validation(message: impl Into<String>) -> Self {
        RenderError::Validation(message.into())
    }

    pub fn navigation(reason: impl Into<String>) -> Self {
        RenderError::NavigationFailed {
            reason: reason.into(),
        }
    }

    pub fn capture(message: impl Into<String>) -> Self {
        RenderError::CaptureFailed(message.into())
    }

    /// HTTP status the error surfaces as at the route boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RenderError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RenderError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RenderError::NavigationFailed { .. } | RenderError::UpstreamStatus { .. } => {
                StatusCode::BAD_GATEWAY
            }
            RenderError::SelectorNotFound { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RenderError::CaptureFailed(_) | RenderError::Config(_) | RenderError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable tag for the per-request log record.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::Validation(_) => "validation",
            RenderError::EngineUnavailable(_) => "engine_unavailable",
            RenderError::NavigationFailed { .. } => "navigation_failed",
            RenderError::UpstreamStatus { .. } => "upstream_status",
            RenderError::SelectorNotFound { .. } => "selector_not_found",
            RenderError::CaptureFailed(_) => "capture_failed",
            RenderError::Config(_) => "config",
            RenderError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Field-level validation error, serialized in the 400/422 response body.
/// Shape matches what callers of the original service already parse.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub location: &'static str,
    pub param: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub msg: String,
}

impl FieldError {
    pub fn query(param: &'static str, value: Option<String>, msg: impl Into<String>) -> Self {
        Self {
            location: "query",
            param,
            value,
            msg: msg.into(),
        }
    }

    pub fn body(param: &'static str, value: Option<String>, msg: impl Into<String>) -> Self {
        Self {
            location: "body",
            param,
            value,
            msg: msg.into(),
        }
    }
}
