//! Body streaming and capture utilities.
//!
//! Bodies keep streaming to their destination untouched while a copy of at most
//! `max_size` bytes is collected for logging. Anything larger is only counted.

use axum::{body::Body, http::HeaderMap};
use bytes::{Bytes, BytesMut};
use futures::Future;
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::error;

use crate::error::BodyCaptureError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What the capture of one body produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedBody {
    /// The full body, no larger than the configured limit.
    Bytes(Bytes),
    /// The body exceeded the limit; holds its size in bytes.
    TooBig(u64),
}

impl CapturedBody {
    /// Notice logged in place of an oversized body.
    pub fn too_big_notice(len: u64) -> String {
        format!("<TOO BIG {len} bytes>")
    }
}

pub type CaptureFuture =
    Pin<Box<dyn Future<Output = Result<CapturedBody, BodyCaptureError>> + Send>>;

enum Captured {
    Chunk(Bytes),
    Skipped(usize),
    Failed(BodyCaptureError),
}

/// Declared size of a body: its exact size hint, or failing that its `Content-Length`.
///
/// The hint goes first because bodiless messages (HEAD responses, 204, 304) may still carry
/// the `Content-Length` of the representation they describe.
pub fn declared_length<B: HttpBody>(headers: &HeaderMap, body: &B) -> Option<u64> {
    body.size_hint().exact().or_else(|| {
        headers
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    })
}

/// Wraps `body` so that it can be captured while it streams.
///
/// Returns the body to hand on and a future resolving to the captured content once the
/// stream has been fully read or dropped. When `declared` already exceeds `max_size` the body
/// is passed through without being observed at all.
///
/// # Examples
///
/// ```rust
/// use inlet::body_wrapper::{create_body_capture_stream, CapturedBody};
/// use axum::body::Body;
/// use http_body_util::BodyExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (body, capture) = create_body_capture_stream(Body::from("Hello, World!"), None, 1024);
///
/// let delivered = body.collect().await?.to_bytes();
/// assert_eq!(delivered, "Hello, World!");
/// assert_eq!(capture.await?, CapturedBody::Bytes("Hello, World!".into()));
/// # Ok(())
/// # }
/// ```
pub fn create_body_capture_stream<B>(
    body: B,
    declared: Option<u64>,
    max_size: u64,
) -> (Body, CaptureFuture)
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError> + std::fmt::Display,
{
    if let Some(len) = declared.filter(|len| *len > max_size) {
        let ready: CaptureFuture = Box::pin(async move { Ok(CapturedBody::TooBig(len)) });
        return (Body::new(body), ready);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let error_tx = tx.clone();
    let limit = usize::try_from(max_size).unwrap_or(usize::MAX);
    let mut seen = 0usize;

    // Relay data frames to the channel until the limit is crossed, then only their sizes.
    // Mapping frames keeps the inner size hint, so the wire framing does not change.
    let capture_body = body
        .map_err(move |e| {
            error!(error = %e, "Stream error during body capture");
            let _ = error_tx.send(Captured::Failed(BodyCaptureError::StreamError(
                e.to_string(),
            )));
            e
        })
        .map_frame(move |frame| {
            if let Some(chunk) = frame.data_ref() {
                seen = seen.saturating_add(chunk.len());
                let message = if seen <= limit {
                    Captured::Chunk(chunk.clone())
                } else {
                    Captured::Skipped(chunk.len())
                };
                let _ = tx.send(message);
            }
            frame
        });

    let new_body = Body::new(capture_body);

    // Resolves once the wrapped body is dropped, or on the first stream error.
    let capture_future: CaptureFuture = Box::pin(async move {
        let mut buffer = BytesMut::new();
        let mut total = 0u64;
        let mut too_big = false;
        while let Some(message) = rx.recv().await {
            match message {
                Captured::Chunk(chunk) => {
                    total += chunk.len() as u64;
                    buffer.extend_from_slice(&chunk);
                }
                Captured::Skipped(len) => {
                    total += len as u64;
                    too_big = true;
                }
                Captured::Failed(e) => return Err(e),
            }
        }
        if too_big {
            Ok(CapturedBody::TooBig(total))
        } else {
            Ok(CapturedBody::Bytes(buffer.freeze()))
        }
    });

    (new_body, capture_future)
}
