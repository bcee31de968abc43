//! Rendering of request and response log blocks.
//!
//! A block looks like this (with `column_width = 8`):
//!
//! ```text
//! -------------------- >>> HTTP REQUEST >>> --------------------
//! ID      : 17
//! URI     : POST http://api.test/login?api_key=<MASKED>
//! HEADERS : content-type:application/json;authorization:<MASKED>
//! BODY    : {"user":"bob","password":"<MASKED>"}
//! --------------------------------------------------------------
//! ```
//!
//! Lines that are switched off, or have nothing to show, are left out entirely.

use axum::http::HeaderMap;
use std::fmt::{self, Write};

use crate::types::{LoggedBody, RequestData, ResponseData};

const BANNER_WIDTH: usize = 62;
const REQUEST_TITLE: &str = " >>> HTTP REQUEST >>> ";
const RESPONSE_TITLE: &str = " <<< HTTP RESPONSE <<< ";

/// Render the block for an outgoing request.
pub fn render_request(data: &RequestData, column_width: usize) -> Result<String, fmt::Error> {
    let toggles = &data.settings.request;
    let mut block = Block::new(REQUEST_TITLE, column_width)?;
    block.line("ID", toggles.log_id.then_some(data.correlation_id.as_str()))?;
    block.line(
        "URI",
        toggles
            .log_uri
            .then(|| format!("{} {}", data.method, data.uri))
            .as_deref(),
    )?;
    block.line(
        "HEADERS",
        toggles
            .log_headers
            .then(|| flatten_headers(&data.headers))
            .as_deref(),
    )?;
    block.body(toggles.log_body, data.body.as_ref())?;
    block.finish()
}

/// Render the block for a response; the request supplies method, URI and settings.
pub fn render_response(
    request: &RequestData,
    response: &ResponseData,
    column_width: usize,
) -> Result<String, fmt::Error> {
    let toggles = &request.settings.response;
    let mut block = Block::new(RESPONSE_TITLE, column_width)?;
    block.line(
        "ID",
        toggles.log_id.then_some(response.correlation_id.as_str()),
    )?;
    block.line(
        "URI",
        toggles
            .log_uri
            .then(|| {
                format!(
                    "{} {} {}",
                    response.status.as_u16(),
                    request.method,
                    request.uri
                )
            })
            .as_deref(),
    )?;
    block.line(
        "TOOK",
        toggles
            .log_took_time
            .then(|| format!("{} ms", response.duration.as_millis()))
            .as_deref(),
    )?;
    block.line(
        "HEADERS",
        toggles
            .log_headers
            .then(|| flatten_headers(&response.headers))
            .as_deref(),
    )?;
    block.body(toggles.log_body, response.body.as_ref())?;
    block.finish()
}

/// Flatten headers as `key:value1,value2;key2:value3`, keys in first-seen order.
pub fn flatten_headers(headers: &HeaderMap) -> String {
    headers
        .keys()
        .map(|name| {
            let values = headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            format!("{name}:{values}")
        })
        .collect::<Vec<_>>()
        .join(";")
}

struct Block {
    out: String,
    column_width: usize,
}

impl Block {
    fn new(title: &str, column_width: usize) -> Result<Self, fmt::Error> {
        let mut out = String::new();
        writeln!(out, "{title:-^width$}", width = BANNER_WIDTH)?;
        Ok(Self { out, column_width })
    }

    fn line(&mut self, label: &str, value: Option<&str>) -> fmt::Result {
        match value {
            Some(value) if !value.is_empty() => writeln!(
                self.out,
                "{label:<width$}: {value}",
                width = self.column_width
            ),
            _ => Ok(()),
        }
    }

    fn body(&mut self, enabled: bool, body: Option<&LoggedBody>) -> fmt::Result {
        match body {
            Some(body) if enabled && !body.is_empty() => {
                self.line("BODY", Some(&body.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn finish(mut self) -> Result<String, fmt::Error> {
        write!(self.out, "{:-<width$}", "", width = BANNER_WIDTH)?;
        Ok(self.out)
    }
}
