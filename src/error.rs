//! Error types.
//!
//! None of these ever reach the caller of a logged HTTP request: the service traces them and
//! carries on with the call.

/// Error type for body capture operations
#[derive(Debug, thiserror::Error)]
pub enum BodyCaptureError {
    #[error("Body stream error: {0}")]
    StreamError(String),
}

/// A mask descriptor rejected by [`MaskRegistry::parse_strict`](crate::registry::MaskRegistry::parse_strict).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("mask descriptor entry `{entry}` is not of the form `type:field1,field2`")]
    MalformedEntry { entry: String },
    #[error("mask descriptor entry `{entry}` has an empty body type")]
    EmptyBodyType { entry: String },
}

/// Failure to load a [`ClientLoggerConfig`](crate::config::ClientLoggerConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid logger configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("column width must be at least 1")]
    ZeroColumnWidth,
}
