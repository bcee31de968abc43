use axum::{
    body::Body,
    http::{header, Request},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use inlet::{
    overrides, ClientLoggerConfig, ClientLoggerLayer, ClientLoggerService, LoggingHandler,
};
use std::time::Duration;
use tokio::time::sleep;
use tower::{Layer, ServiceExt};
use tracing::info;

// Stand-in for the remote API the client talks to
async fn login_handler(body: Bytes) -> impl IntoResponse {
    sleep(Duration::from_millis(50)).await; // Simulate some work
    info!(received = %String::from_utf8_lossy(&body), "Remote peer got login");
    Json(serde_json::json!({ "user": "bob", "token": "t-9f8e7d" }))
}

async fn report_handler() -> impl IntoResponse {
    "x".repeat(4096)
}

async fn send(
    client: &ClientLoggerService<Router>,
    request: Request<Body>,
) -> anyhow::Result<()> {
    let response = client.clone().oneshot(request).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    info!(%status, bytes = body.len(), "Caller received response");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,inlet=debug".into()),
        )
        .init();

    let config = ClientLoggerConfig::from_toml_str(
        r#"
        max_body_size = 1024
        column_width = 8

        [masking]
        query_params = ["api_key"]
        request_body_keys = "json:password;form:password"
        "#,
    )?;

    let remote = Router::new()
        .route("/login", post(login_handler))
        .route("/report", get(report_handler));

    let handler = LoggingHandler::from_config(&config);
    let client = ClientLoggerLayer::new(config, handler).layer(remote);

    send(
        &client,
        Request::post("http://api.example/login?api_key=k-123")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::from(r#"{"user":"bob","password":"hunter2"}"#))?,
    )
    .await?;

    // Oversized body, and a per-request override that hides response headers
    send(
        &client,
        Request::get("http://api.example/report")
            .header(overrides::LOG_RESPONSE_HEADERS, "false")
            .header(overrides::CORRELATION_ID, "report-1")
            .body(Body::empty())?,
    )
    .await?;

    // Give the background handler a moment to flush
    sleep(Duration::from_millis(100)).await;
    Ok(())
}
