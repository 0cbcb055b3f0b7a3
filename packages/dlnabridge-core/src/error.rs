//! Errors surfaced on the bridge's plain HTTP endpoints.
//!
//! Streams, description documents and the operator API answer failures with a
//! JSON body `{ error, message, status }`. The SOAP control endpoints never
//! use this type; they reply with [`SoapFault`](crate::soap::SoapFault)
//! envelopes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::media_source::UpstreamError;
use crate::ssdp::DiscoveryError;

/// Stable snake_case identifier carried in JSON error bodies and logs.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

impl ErrorCode for UpstreamError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "upstream_unauthorized",
            Self::NotFound(_) => "upstream_not_found",
            Self::Timeout => "upstream_timeout",
            Self::Http(_) => "upstream_unreachable",
            Self::HttpStatus(_, _) => "upstream_error_status",
            Self::Parse(_) => "upstream_parse_error",
            Self::NotConfigured => "upstream_not_configured",
        }
    }
}

impl ErrorCode for DiscoveryError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "ssdp_bind_failed",
            Self::MulticastJoin(_) => "ssdp_multicast_join_failed",
            Self::InvalidAddress(_) => "ssdp_invalid_address",
        }
    }
}

#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum BridgeError {
    /// The media server behind the bridge failed the request.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// No delivery the requesting client's profile accepts.
    #[error("Item not playable for this client: {0}")]
    NotPlayable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Supervisor idle, restarting or stopping.
    #[error("Service unavailable: {0}")]
    NotRunning(String),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::UpstreamTimeout(_) => "upstream_timeout",
            Self::ItemNotFound(_) => "item_not_found",
            Self::NotPlayable(_) => "not_playable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotRunning(_) => "not_running",
        }
    }
}

impl BridgeError {
    /// Upstream failures are gateway errors: the bridge is healthy, the
    /// media server behind it is not.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotPlayable(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotRunning(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<UpstreamError> for BridgeError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound(id) => Self::ItemNotFound(id),
            UpstreamError::Timeout => {
                Self::UpstreamTimeout("media server did not respond in time".into())
            }
            other => {
                log::debug!("[Upstream] {} ({})", other, other.code());
                Self::UpstreamUnavailable(other.to_string())
            }
        }
    }
}
