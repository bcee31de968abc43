//! Per-request overrides of what gets logged and masked.
//!
//! Overrides are a plain value carried in the request's [`Extensions`](axum::http::Extensions),
//! so they never touch the wire:
//!
//! ```rust
//! use axum::{body::Body, http::Request};
//! use inlet::overrides::LogOverrides;
//!
//! let mut request = Request::post("http://api.test/login")
//!     .body(Body::from("password=hunter2"))
//!     .unwrap();
//! request.extensions_mut().insert(LogOverrides {
//!     correlation_id: Some("login-42".into()),
//!     ..Default::default()
//! });
//! ```
//!
//! Callers that can only set headers may use the technical headers listed in
//! [`TECHNICAL_HEADERS`] instead. The service parses them and removes them before the request is
//! dispatched; any other header, including unknown `x-log-*` ones, goes out unchanged. When both
//! are present, values from the extension win.

use axum::http::{header::Entry, HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::{
    config::{ClientLoggerConfig, DirectionConfig},
    masking::MaskingRule,
    registry::MaskRegistry,
};

pub const LOG_REQUEST_ID: &str = "x-log-request-id";
pub const LOG_REQUEST_URI: &str = "x-log-request-uri";
pub const LOG_REQUEST_HEADERS: &str = "x-log-request-headers";
pub const LOG_REQUEST_BODY: &str = "x-log-request-body";
pub const LOG_RESPONSE_ID: &str = "x-log-response-id";
pub const LOG_RESPONSE_URI: &str = "x-log-response-uri";
pub const LOG_RESPONSE_TOOK_TIME: &str = "x-log-response-took-time";
pub const LOG_RESPONSE_HEADERS: &str = "x-log-response-headers";
pub const LOG_RESPONSE_BODY: &str = "x-log-response-body";
pub const MASK_HEADERS: &str = "x-log-mask-headers";
pub const MASK_QUERY_PARAMS: &str = "x-log-mask-query-params";
pub const MASK_REQUEST_BODY_KEYS: &str = "x-log-mask-request-body-keys";
pub const MASK_RESPONSE_BODY_KEYS: &str = "x-log-mask-response-body-keys";
pub const CORRELATION_ID: &str = "x-log-correlation-id";

/// Every header that carries logging configuration rather than application data.
pub const TECHNICAL_HEADERS: [&str; 14] = [
    LOG_REQUEST_ID,
    LOG_REQUEST_URI,
    LOG_REQUEST_HEADERS,
    LOG_REQUEST_BODY,
    LOG_RESPONSE_ID,
    LOG_RESPONSE_URI,
    LOG_RESPONSE_TOOK_TIME,
    LOG_RESPONSE_HEADERS,
    LOG_RESPONSE_BODY,
    MASK_HEADERS,
    MASK_QUERY_PARAMS,
    MASK_REQUEST_BODY_KEYS,
    MASK_RESPONSE_BODY_KEYS,
    CORRELATION_ID,
];

/// Line toggles for one direction; `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectionOverrides {
    pub log_id: Option<bool>,
    pub log_uri: Option<bool>,
    pub log_took_time: Option<bool>,
    pub log_headers: Option<bool>,
    pub log_body: Option<bool>,
}

impl DirectionOverrides {
    fn apply(&self, config: &DirectionConfig) -> DirectionConfig {
        DirectionConfig {
            log_id: self.log_id.unwrap_or(config.log_id),
            log_uri: self.log_uri.unwrap_or(config.log_uri),
            log_took_time: self.log_took_time.unwrap_or(config.log_took_time),
            log_headers: self.log_headers.unwrap_or(config.log_headers),
            log_body: self.log_body.unwrap_or(config.log_body),
        }
    }

    fn merge(self, fallback: Self) -> Self {
        Self {
            log_id: self.log_id.or(fallback.log_id),
            log_uri: self.log_uri.or(fallback.log_uri),
            log_took_time: self.log_took_time.or(fallback.log_took_time),
            log_headers: self.log_headers.or(fallback.log_headers),
            log_body: self.log_body.or(fallback.log_body),
        }
    }
}

/// Overrides for a single request/response cycle.
///
/// Mask lists and registries *replace* the configured ones; they are not merged with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOverrides {
    pub request: DirectionOverrides,
    pub response: DirectionOverrides,
    pub mask_headers: Option<Vec<String>>,
    pub mask_query_params: Option<Vec<String>>,
    pub mask_request_body_keys: Option<MaskRegistry>,
    pub mask_response_body_keys: Option<MaskRegistry>,
    pub correlation_id: Option<String>,
}

impl LogOverrides {
    /// Build overrides from captured technical headers.
    ///
    /// Unparseable values are ignored with a warning. Repeated mask list and descriptor headers
    /// are combined; for the other headers the last value wins. With `strict` set, a mask
    /// descriptor holding any malformed entry is ignored as a whole; otherwise only the bad
    /// entries are.
    pub fn from_headers(headers: &[(HeaderName, HeaderValue)], strict: bool) -> Self {
        let mut overrides = Self::default();
        let mut request_body_keys = Vec::new();
        let mut response_body_keys = Vec::new();
        for (name, value) in headers {
            let Ok(text) = value.to_str() else {
                warn!(header = %name, "Ignoring non-text technical header");
                continue;
            };
            let text = text.trim();
            match name.as_str() {
                LOG_REQUEST_ID => overrides.request.log_id = parse_flag(name, text),
                LOG_REQUEST_URI => overrides.request.log_uri = parse_flag(name, text),
                LOG_REQUEST_HEADERS => overrides.request.log_headers = parse_flag(name, text),
                LOG_REQUEST_BODY => overrides.request.log_body = parse_flag(name, text),
                LOG_RESPONSE_ID => overrides.response.log_id = parse_flag(name, text),
                LOG_RESPONSE_URI => overrides.response.log_uri = parse_flag(name, text),
                LOG_RESPONSE_TOOK_TIME => {
                    overrides.response.log_took_time = parse_flag(name, text)
                }
                LOG_RESPONSE_HEADERS => overrides.response.log_headers = parse_flag(name, text),
                LOG_RESPONSE_BODY => overrides.response.log_body = parse_flag(name, text),
                MASK_HEADERS => overrides
                    .mask_headers
                    .get_or_insert_with(Vec::new)
                    .extend(parse_list(text)),
                MASK_QUERY_PARAMS => overrides
                    .mask_query_params
                    .get_or_insert_with(Vec::new)
                    .extend(parse_list(text)),
                MASK_REQUEST_BODY_KEYS => request_body_keys.push(text),
                MASK_RESPONSE_BODY_KEYS => response_body_keys.push(text),
                CORRELATION_ID => {
                    overrides.correlation_id = (!text.is_empty()).then(|| text.to_owned())
                }
                _ => warn!(header = %name, "Ignoring unknown technical header"),
            }
        }
        overrides.mask_request_body_keys =
            parse_descriptor(MASK_REQUEST_BODY_KEYS, &request_body_keys, strict);
        overrides.mask_response_body_keys =
            parse_descriptor(MASK_RESPONSE_BODY_KEYS, &response_body_keys, strict);
        overrides
    }

    /// Combine with `fallback`, keeping values set on `self`.
    pub fn merge(self, fallback: Self) -> Self {
        Self {
            request: self.request.merge(fallback.request),
            response: self.response.merge(fallback.response),
            mask_headers: self.mask_headers.or(fallback.mask_headers),
            mask_query_params: self.mask_query_params.or(fallback.mask_query_params),
            mask_request_body_keys: self
                .mask_request_body_keys
                .or(fallback.mask_request_body_keys),
            mask_response_body_keys: self
                .mask_response_body_keys
                .or(fallback.mask_response_body_keys),
            correlation_id: self.correlation_id.or(fallback.correlation_id),
        }
    }

    /// Encode as technical headers, e.g. to forward overrides through a proxy hop.
    pub fn to_headers(&self) -> Vec<(HeaderName, HeaderValue)> {
        let flags = [
            (LOG_REQUEST_ID, self.request.log_id),
            (LOG_REQUEST_URI, self.request.log_uri),
            (LOG_REQUEST_HEADERS, self.request.log_headers),
            (LOG_REQUEST_BODY, self.request.log_body),
            (LOG_RESPONSE_ID, self.response.log_id),
            (LOG_RESPONSE_URI, self.response.log_uri),
            (LOG_RESPONSE_TOOK_TIME, self.response.log_took_time),
            (LOG_RESPONSE_HEADERS, self.response.log_headers),
            (LOG_RESPONSE_BODY, self.response.log_body),
        ];
        let texts = [
            (MASK_HEADERS, self.mask_headers.as_ref().map(|l| l.join(","))),
            (
                MASK_QUERY_PARAMS,
                self.mask_query_params.as_ref().map(|l| l.join(",")),
            ),
            (
                MASK_REQUEST_BODY_KEYS,
                self.mask_request_body_keys.as_ref().map(MaskRegistry::serialize),
            ),
            (
                MASK_RESPONSE_BODY_KEYS,
                self.mask_response_body_keys
                    .as_ref()
                    .map(MaskRegistry::serialize),
            ),
            (CORRELATION_ID, self.correlation_id.clone()),
        ];

        flags
            .into_iter()
            .filter_map(|(name, flag)| flag.map(|flag| (name, flag.to_string())))
            .chain(
                texts
                    .into_iter()
                    .filter_map(|(name, text)| text.map(|text| (name, text))),
            )
            .filter_map(|(name, text)| {
                let value = HeaderValue::from_str(&text).ok()?;
                Some((HeaderName::from_static(name), value))
            })
            .collect()
    }
}

fn parse_flag(name: &HeaderName, text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        warn!(header = %name, value = %text, "Ignoring non-boolean technical header");
        None
    }
}

fn parse_list(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
}

// Several values of one descriptor header read as a single descriptor.
fn parse_descriptor(name: &str, values: &[&str], strict: bool) -> Option<MaskRegistry> {
    if values.is_empty() {
        return None;
    }
    let descriptor = values.join(";");
    if !strict {
        return Some(MaskRegistry::parse(&descriptor));
    }
    match MaskRegistry::parse_strict(&descriptor) {
        Ok(registry) => Some(registry),
        Err(e) => {
            warn!(header = %name, error = %e, "Rejecting mask descriptor override");
            None
        }
    }
}

/// Remove every [technical header](TECHNICAL_HEADERS) from `headers`, returning what was
/// removed.
pub fn strip_technical_headers(headers: &mut HeaderMap) -> Vec<(HeaderName, HeaderValue)> {
    let mut stripped = Vec::new();
    for name in TECHNICAL_HEADERS {
        if let Entry::Occupied(entry) = headers.entry(HeaderName::from_static(name)) {
            let (name, values) = entry.remove_entry_mult();
            stripped.extend(values.map(|value| (name.clone(), value)));
        }
    }
    stripped
}

/// The settings that apply to one request/response cycle.
#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub request: DirectionConfig,
    pub response: DirectionConfig,
    pub masked_headers: Vec<String>,
    /// Form rule over the sensitive query parameter names.
    pub query_rule: MaskingRule,
    pub request_body_keys: MaskRegistry,
    pub response_body_keys: MaskRegistry,
    pub max_body_size: u64,
}

impl EffectiveSettings {
    /// Settings for a call without overrides. Every masking rule is compiled here.
    pub fn from_config(config: &ClientLoggerConfig) -> Self {
        let masking = &config.masking;
        Self {
            request: config.request.clone(),
            response: config.response.clone(),
            masked_headers: masking.headers.clone(),
            query_rule: MaskingRule::form(masking.query_params.iter().cloned()),
            request_body_keys: masking.request_body_keys.clone(),
            response_body_keys: masking.response_body_keys.clone(),
            max_body_size: config.max_body_size,
        }
    }

    /// Apply one call's overrides on top of these settings.
    ///
    /// Only an overridden query parameter list is compiled; override registries arrive
    /// compiled and everything else is reused.
    pub fn with_overrides(&self, overrides: &LogOverrides) -> Self {
        Self {
            request: overrides.request.apply(&self.request),
            response: overrides.response.apply(&self.response),
            masked_headers: overrides
                .mask_headers
                .clone()
                .unwrap_or_else(|| self.masked_headers.clone()),
            query_rule: overrides.mask_query_params.as_ref().map_or_else(
                || self.query_rule.clone(),
                |params| MaskingRule::form(params.iter().cloned()),
            ),
            request_body_keys: overrides
                .mask_request_body_keys
                .clone()
                .unwrap_or_else(|| self.request_body_keys.clone()),
            response_body_keys: overrides
                .mask_response_body_keys
                .clone()
                .unwrap_or_else(|| self.response_body_keys.clone()),
            max_body_size: self.max_body_size,
        }
    }
}
