//! Data types for captured HTTP request and response information.
//!
//! Everything in here has already been masked: a [`RequestHandler`](crate::RequestHandler)
//! never sees the raw values of sensitive headers, query parameters or body fields.

use axum::http::{HeaderMap, Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::{body_wrapper::CapturedBody, overrides::EffectiveSettings};

/// A body as it should appear in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggedBody {
    /// Masked body text; invalid UTF-8 is replaced lossily.
    Text(String),
    /// The body exceeded the size limit; holds its size in bytes.
    TooBig(u64),
}

impl LoggedBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    pub(crate) fn from_captured(captured: CapturedBody, mask: impl FnOnce(&str) -> String) -> Self {
        match captured {
            CapturedBody::Bytes(bytes) => Self::Text(mask(&String::from_utf8_lossy(&bytes))),
            CapturedBody::TooBig(len) => Self::TooBig(len),
        }
    }
}

impl std::fmt::Display for LoggedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::TooBig(len) => f.write_str(&CapturedBody::too_big_notice(*len)),
        }
    }
}

/// Data captured from an outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct RequestData {
    /// Identifier shared by this request and its response
    pub correlation_id: String,
    /// When the request entered the middleware
    pub timestamp: SystemTime,
    /// HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request URI with masked query parameters
    pub uri: String,
    /// Headers as they went over the wire, with sensitive values masked
    pub headers: HeaderMap,
    /// Masked request body, if body logging is enabled and capture succeeded
    pub body: Option<LoggedBody>,
    /// Line toggles and masking in effect for this request/response cycle
    pub settings: Arc<EffectiveSettings>,
}

/// Data captured from the response to an outgoing request.
#[derive(Debug, Clone)]
pub struct ResponseData {
    /// Correlation ID matching the original request
    pub correlation_id: String,
    /// When the response headers arrived
    pub timestamp: SystemTime,
    /// HTTP status code (200, 404, 500, etc.)
    pub status: StatusCode,
    /// Response headers, with sensitive values masked
    pub headers: HeaderMap,
    /// Masked response body, if body logging is enabled and capture succeeded
    pub body: Option<LoggedBody>,
    /// Time from dispatch until the response headers arrived
    pub duration: Duration,
}

/// Tasks sent to the background processing task.
#[derive(Debug)]
pub(crate) enum BackgroundTask {
    /// A request has been captured and is ready for processing
    Request { data: RequestData },
    /// A response has been captured; carries the request data for context.
    Response {
        request_data: RequestData,
        response_data: ResponseData,
    },
}
