use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("unauthorized: {message}")]
    Unauthorized {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound { code: &'static str, message: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { code: &'static str, message: String },
    #[error("internal error")]
    Internal { code: &'static str, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: &'static str) -> Self {
        Self::Unauthorized { code, message }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn service_unavailable(code: &'static str, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            Self::Unauthorized { code, message } => {
                (StatusCode::UNAUTHORIZED, code, message.to_string())
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            Self::ServiceUnavailable { code, message } => {
                (StatusCode::SERVICE_UNAVAILABLE, code, message)
            }
            Self::Internal { code, message } => {
                tracing::error!(error = %message, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "internal server error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}

/// Failures surfaced by a [`crate::transport::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{transport} transport is closed")]
    Closed { transport: &'static str },
    #[error("{transport} transport reached end of stream")]
    EndOfStream { transport: &'static str },
    #[error("{transport} transport read timed out after {waited:?}")]
    Timeout {
        transport: &'static str,
        waited: Duration,
    },
    #[error("{transport} transport operation cancelled")]
    Cancelled { transport: &'static str },
    #[error("message queue full (capacity {capacity}), rejected message from client {client_id}")]
    QueueFull { client_id: String, capacity: usize },
    #[error("no connected clients")]
    NoClients,
    #[error("client_id parameter required")]
    MissingClientId,
    #[error("client limit of {max} reached, rejected client {client_id}")]
    TooManyClients { client_id: String, max: usize },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{transport} transport i/o error: {source}")]
    Io {
        transport: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unsupported transport type: {0}")]
    UnsupportedTransport(String),
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        let message = err.to_string();
        match err {
            TransportError::MissingClientId => AppError::bad_request("missing_client_id", message),
            TransportError::QueueFull { .. } => AppError::service_unavailable("queue_full", message),
            TransportError::TooManyClients { .. } => {
                AppError::service_unavailable("too_many_clients", message)
            }
            TransportError::Closed { .. } | TransportError::Cancelled { .. } => {
                AppError::service_unavailable("transport_closed", message)
            }
            _ => AppError::internal(message),
        }
    }
}

/// Failures surfaced by URI matching, providers, and the resource manager.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid resource URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("no pattern matches URI: {uri}")]
    NoPatternMatch { uri: String },
    #[error("no provider found for URI: {uri}")]
    NoProvider { uri: String },
    #[error("resource not found: {uri}")]
    NotFound { uri: String },
    #[error("resource backend failed for URI {uri}: {message}")]
    Backend { uri: String, message: String },
    #[error("provider {provider} failed for URI {uri}: {source}")]
    Provider {
        uri: String,
        provider: String,
        #[source]
        source: Box<ResourceError>,
    },
    #[error("invalid URI pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ResourceError {
    /// Innermost error, looking through provider wrapping.
    pub fn root(&self) -> &ResourceError {
        match self {
            Self::Provider { source, .. } => source.root(),
            other => other,
        }
    }

    /// True when retrying the same URI cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.root(),
            Self::InvalidUri { .. }
                | Self::NoPatternMatch { .. }
                | Self::NoProvider { .. }
                | Self::NotFound { .. }
        )
    }

    /// URI the failure refers to, when there is one.
    pub fn uri(&self) -> Option<&str> {
        match self {
            Self::InvalidUri { uri, .. }
            | Self::NoPatternMatch { uri }
            | Self::NoProvider { uri }
            | Self::NotFound { uri }
            | Self::Backend { uri, .. }
            | Self::Provider { uri, .. } => Some(uri),
            Self::InvalidPattern { .. } => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUri { .. } => "invalid_uri",
            Self::NoPatternMatch { .. } | Self::NoProvider { .. } => "no_provider",
            Self::NotFound { .. } => "resource_not_found",
            Self::Backend { .. } => "backend_error",
            Self::Provider { source, .. } => source.code(),
            Self::InvalidPattern { .. } => "invalid_pattern",
        }
    }
}
