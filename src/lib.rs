//! # Inlet
//!
//! A Tower middleware for HTTP *clients* that logs every outgoing request and the response
//! it gets back, with body size limits and masking of sensitive headers, query parameters and
//! body fields.
//!
//! ## Features
//!
//! - **Transport-agnostic**: wraps any `Service<Request<Body>>`, e.g. a hyper-util client
//! - **Masking**: JSON and form-urlencoded bodies, headers and query strings
//! - **Bounded capture**: bodies above a size limit are logged as `<TOO BIG n bytes>` and
//!   still delivered untouched
//! - **Per-request overrides**: via a [`LogOverrides`] extension or the
//!   [technical headers](overrides::TECHNICAL_HEADERS), which are stripped before the request
//!   is sent
//! - **Background processing**: captured data is handed to a [`RequestHandler`] off the
//!   request path
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{body::Body, http::Request};
//! use inlet::{ClientLoggerConfig, ClientLoggerLayer, LoggingHandler};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! // Any transport works; this one answers every request itself.
//! let transport = service_fn(|_request: Request<Body>| async {
//!     Ok::<_, std::convert::Infallible>(
//!         axum::http::Response::new(Body::from(r#"{"token":"t-123"}"#)),
//!     )
//! });
//!
//! let config = ClientLoggerConfig::default();
//! let handler = LoggingHandler::from_config(&config);
//! let client = ClientLoggerLayer::new(config, handler).layer(transport);
//!
//! let request = Request::post("http://api.test/login")
//!     .header("content-type", "application/json")
//!     .body(Body::from(r#"{"user":"bob","password":"hunter2"}"#))?;
//! let response = client.oneshot(request).await?;
//! assert!(response.status().is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Handlers
//!
//! Implement the [`RequestHandler`] trait to send captured (already masked) data elsewhere:
//!
//! ```rust
//! use inlet::{RequestHandler, RequestData, ResponseData};
//!
//! #[derive(Debug)]
//! struct CustomHandler;
//!
//! impl RequestHandler for CustomHandler {
//!     async fn handle_request(&self, data: RequestData) {
//!         println!("Request: {} {}", data.method, data.uri);
//!     }
//!
//!     async fn handle_response(&self, _request_data: RequestData, response_data: ResponseData) {
//!         println!("Response: {} ({}ms)", response_data.status, response_data.duration.as_millis());
//!     }
//! }
//! ```

use axum::{
    body::Body,
    http::{HeaderMap, Request, Response},
};
use bytes::Bytes;
use http_body::Body as HttpBody;
use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
    time::{Instant, SystemTime},
};
use tokio::sync::mpsc;
use tower::{Layer, Service};
use tracing::{debug, error, instrument};

pub mod body_wrapper;
pub mod config;
pub mod error;
pub mod format;
pub mod logging_handler;
pub mod masking;
pub mod overrides;
pub mod registry;
pub mod types;

use body_wrapper::{create_body_capture_stream, declared_length, CaptureFuture};
pub use config::{ClientLoggerConfig, LogLevel};
pub use logging_handler::LoggingHandler;
pub use masking::{BodyType, MaskingRule, PLACEHOLDER};
use masking::{mask_body, mask_headers, mask_query};
use overrides::{strip_technical_headers, EffectiveSettings};
pub use overrides::LogOverrides;
pub use registry::MaskRegistry;
use types::BackgroundTask;
pub use types::{LoggedBody, RequestData, ResponseData};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Global atomic counter for correlation IDs and process start timestamp
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(1);
static PROCESS_START_TIME: std::sync::OnceLock<u64> = std::sync::OnceLock::new();

/// Generate a unique correlation ID combining process start time and counter
fn generate_correlation_id() -> u64 {
    let start_time = *PROCESS_START_TIME.get_or_init(|| {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    });

    let counter = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed);

    // High 32 bits: process start timestamp, Low 32 bits: counter
    (start_time << 32) | (counter & 0xFFFFFFFF)
}

fn body_type(headers: &HeaderMap) -> Option<BodyType> {
    headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(BodyType::from_content_type)
}

/// Trait for handling captured request and response data.
///
/// Both methods run on a background task, never on the request path. Requests are delivered
/// before their responses.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle a captured outgoing request.
    ///
    /// # Arguments
    ///
    /// * `data` - The masked request data including method, URI, headers, and optionally body
    fn handle_request(&self, data: RequestData) -> impl std::future::Future<Output = ()> + Send;
    /// Handle a captured response.
    ///
    /// # Arguments
    ///
    /// * `request_data` - The corresponding request data, including the settings in effect
    /// * `response_data` - The masked response data including status, headers, body, and timing
    fn handle_response(
        &self,
        request_data: RequestData,
        response_data: ResponseData,
    ) -> impl std::future::Future<Output = ()> + Send;
}

/// Tower layer for the client logging middleware.
///
/// Wrap the client transport with it; the layer spawns a background task that feeds captured
/// data to the provided [`RequestHandler`], so it must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct ClientLoggerLayer {
    config: Arc<ClientLoggerConfig>,
    defaults: Arc<EffectiveSettings>,
    tx: mpsc::UnboundedSender<BackgroundTask>,
}

impl ClientLoggerLayer {
    /// Create a new client logger layer with the given configuration and handler.
    ///
    /// # Arguments
    ///
    /// * `config` - What to capture and how to mask it
    /// * `handler` - Implementation of [`RequestHandler`] to process the captured data
    pub fn new<H: RequestHandler>(config: ClientLoggerConfig, handler: H) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackgroundTask>();
        let handler = Arc::new(handler);

        // Spawn the background task
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                match task {
                    BackgroundTask::Request { data } => {
                        handler.handle_request(data).await;
                    }
                    BackgroundTask::Response {
                        request_data,
                        response_data,
                    } => {
                        handler.handle_response(request_data, response_data).await;
                    }
                }
            }
        });

        Self {
            defaults: Arc::new(EffectiveSettings::from_config(&config)),
            config: Arc::new(config),
            tx,
        }
    }

    /// The configuration this layer was built with.
    pub fn config(&self) -> &ClientLoggerConfig {
        &self.config
    }
}

impl<S> Layer<S> for ClientLoggerLayer {
    type Service = ClientLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ClientLoggerService {
            inner,
            config: self.config.clone(),
            defaults: self.defaults.clone(),
            tx: self.tx.clone(),
        }
    }
}

/// Tower service implementation for the client logging middleware.
///
/// Created by [`ClientLoggerLayer`]. Strips technical headers, masks and captures the request,
/// dispatches it to the wrapped transport, then captures the response as it streams back.
#[derive(Clone)]
pub struct ClientLoggerService<S> {
    inner: S,
    config: Arc<ClientLoggerConfig>,
    // Masking rules compiled once from `config`
    defaults: Arc<EffectiveSettings>,
    tx: mpsc::UnboundedSender<BackgroundTask>,
}

impl<S, ResBody> Service<Request<Body>> for ClientLoggerService<S>
where
    S: Service<Request<Body>, Response = Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError> + std::fmt::Display,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[instrument(skip_all)]
    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        // Technical headers never reach the transport, whether logging is on or not
        let technical_headers = strip_technical_headers(request.headers_mut());

        if !self.config.enabled {
            let future = self.inner.call(request);
            return Box::pin(async move { Ok(future.await?.map(Body::new)) });
        }

        let start_time = SystemTime::now();
        let started = Instant::now();

        let overrides = request
            .extensions()
            .get::<LogOverrides>()
            .cloned()
            .unwrap_or_default()
            .merge(LogOverrides::from_headers(
                &technical_headers,
                self.config.strict_descriptors,
            ));
        let correlation_id = overrides
            .correlation_id
            .clone()
            .unwrap_or_else(|| generate_correlation_id().to_string());
        let settings = Arc::new(self.defaults.with_overrides(&overrides));

        debug!(correlation_id = %correlation_id, "Starting request processing");

        let method = request.method().clone();
        let uri = mask_query(request.uri(), &settings.query_rule);
        let headers = mask_headers(request.headers(), &settings.masked_headers);
        let request_body_type = body_type(request.headers());

        debug!(method = %method, uri = %uri, "Extracted request metadata");

        let request_capture = if settings.request.log_body {
            let declared = declared_length(request.headers(), request.body());
            let body = std::mem::replace(request.body_mut(), Body::empty());
            let (body, capture) =
                create_body_capture_stream(body, declared, settings.max_body_size);
            *request.body_mut() = body;
            Some(capture)
        } else {
            None
        };

        let request_data_future = {
            let tx = self.tx.clone();
            let settings = settings.clone();
            let correlation_id = correlation_id.clone();
            tokio::spawn(async move {
                let body = resolve_body(
                    request_capture,
                    &settings.request_body_keys,
                    request_body_type.as_ref(),
                    &correlation_id,
                )
                .await;

                let request_data = RequestData {
                    correlation_id,
                    timestamp: start_time,
                    method,
                    uri,
                    headers,
                    body,
                    settings,
                };

                if tx
                    .send(BackgroundTask::Request {
                        data: request_data.clone(),
                    })
                    .is_err()
                {
                    error!(correlation_id = %request_data.correlation_id, "Failed to send request data to background task");
                }

                request_data
            })
        };

        let future = self.inner.call(request);
        let tx = self.tx.clone();

        Box::pin(async move {
            debug!("Awaiting transport response");
            let response = match future.await {
                Ok(response) => response,
                Err(e) => {
                    debug!(correlation_id = %correlation_id, "Transport returned an error");
                    return Err(e);
                }
            };
            let duration = started.elapsed();
            let end_time = SystemTime::now();

            let (parts, body) = response.into_parts();
            let status = parts.status;
            let response_headers = mask_headers(&parts.headers, &settings.masked_headers);
            let response_body_type = body_type(&parts.headers);

            let (body, response_capture) = if settings.response.log_body {
                let declared = declared_length(&parts.headers, &body);
                let (body, capture) =
                    create_body_capture_stream(body, declared, settings.max_body_size);
                (body, Some(capture))
            } else {
                (Body::new(body), None)
            };

            // Outlives the request/response cycle; resolves once the caller is done with the body
            tokio::spawn(async move {
                let request_data = match request_data_future.await {
                    Ok(data) => data,
                    Err(e) => {
                        error!(correlation_id = %correlation_id, error = %e, "Logging fault while capturing request");
                        return;
                    }
                };

                let body = resolve_body(
                    response_capture,
                    &settings.response_body_keys,
                    response_body_type.as_ref(),
                    &correlation_id,
                )
                .await;

                let response_data = ResponseData {
                    correlation_id: correlation_id.clone(),
                    timestamp: end_time,
                    status,
                    headers: response_headers,
                    body,
                    duration,
                };

                if tx
                    .send(BackgroundTask::Response {
                        request_data,
                        response_data,
                    })
                    .is_err()
                {
                    error!(correlation_id = %correlation_id, "Failed to send response data to background task");
                }
            });

            Ok(Response::from_parts(parts, body))
        })
    }
}

/// Await a body capture and mask it for its body type.
///
/// Capture failures only cost the body line of the log.
async fn resolve_body(
    capture: Option<CaptureFuture>,
    registry: &MaskRegistry,
    body_type: Option<&BodyType>,
    correlation_id: &str,
) -> Option<LoggedBody> {
    match capture?.await {
        Ok(captured) => Some(LoggedBody::from_captured(captured, |text| {
            mask_body(registry, body_type, text)
        })),
        Err(e) => {
            error!(correlation_id = %correlation_id, error = %e, "Logging fault while capturing body");
            None
        }
    }
}
