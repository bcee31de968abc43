//! Default [`RequestHandler`] writing rendered blocks through `tracing`.

use tracing::error;

use crate::{
    config::{ClientLoggerConfig, LogLevel},
    format::{render_request, render_response},
    RequestData, RequestHandler, ResponseData,
};

/// Renders each captured request and response as a multi-line block (see [`crate::format`])
/// and emits it as one `tracing` event at the configured level.
///
/// # Examples
///
/// ```rust,no_run
/// use inlet::{ClientLoggerConfig, ClientLoggerLayer, LoggingHandler};
///
/// # #[tokio::main]
/// # async fn main() {
/// let config = ClientLoggerConfig::default();
/// let handler = LoggingHandler::from_config(&config);
/// let layer = ClientLoggerLayer::new(config, handler);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LoggingHandler {
    level: LogLevel,
    column_width: usize,
}

impl LoggingHandler {
    pub fn new(level: LogLevel, column_width: usize) -> Self {
        Self {
            level,
            column_width,
        }
    }

    pub fn from_config(config: &ClientLoggerConfig) -> Self {
        Self::new(config.level, config.column_width)
    }

    fn emit(&self, correlation_id: &str, block: &str) {
        match self.level {
            LogLevel::Trace => tracing::trace!(target: "inlet", %correlation_id, "\n{block}"),
            LogLevel::Debug => tracing::debug!(target: "inlet", %correlation_id, "\n{block}"),
            LogLevel::Info => tracing::info!(target: "inlet", %correlation_id, "\n{block}"),
            LogLevel::Warn => tracing::warn!(target: "inlet", %correlation_id, "\n{block}"),
            LogLevel::Error => tracing::error!(target: "inlet", %correlation_id, "\n{block}"),
        }
    }
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::from_config(&ClientLoggerConfig::default())
    }
}

impl RequestHandler for LoggingHandler {
    async fn handle_request(&self, data: RequestData) {
        match render_request(&data, self.column_width) {
            Ok(block) => self.emit(&data.correlation_id, &block),
            Err(e) => {
                error!(correlation_id = %data.correlation_id, error = %e, "Logging fault while rendering request")
            }
        }
    }

    async fn handle_response(&self, request_data: RequestData, response_data: ResponseData) {
        match render_response(&request_data, &response_data, self.column_width) {
            Ok(block) => self.emit(&response_data.correlation_id, &block),
            Err(e) => {
                error!(correlation_id = %response_data.correlation_id, error = %e, "Logging fault while rendering response")
            }
        }
    }
}
