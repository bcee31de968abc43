//! Declarative configuration for the client logger.
//!
//! Every field has a default, so a config file only needs to name what it changes:
//!
//! ```rust
//! use inlet::config::{ClientLoggerConfig, LogLevel};
//!
//! let config = ClientLoggerConfig::from_toml_str(
//!     r#"
//!     level = "debug"
//!     max_body_size = 1024
//!
//!     [response]
//!     log_headers = false
//!
//!     [masking]
//!     query_params = ["api_key"]
//!     request_body_keys = "json:password,pin;form:password"
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.level, LogLevel::Debug);
//! assert!(!config.response.log_headers);
//! assert!(config.request.log_headers);
//! ```

use serde::Deserialize;

use crate::{error::ConfigError, registry::MaskRegistry};

/// Severity at which rendered log blocks are emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Which lines of a request or response block are written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DirectionConfig {
    pub log_id: bool,
    pub log_uri: bool,
    /// Only meaningful for responses.
    pub log_took_time: bool,
    pub log_headers: bool,
    pub log_body: bool,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        Self {
            log_id: true,
            log_uri: true,
            log_took_time: true,
            log_headers: true,
            log_body: true,
        }
    }
}

/// What gets masked by default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MaskingConfig {
    /// Header names, compared case-insensitively.
    pub headers: Vec<String>,
    /// Query parameter names, compared exactly.
    pub query_params: Vec<String>,
    pub request_body_keys: MaskRegistry,
    pub response_body_keys: MaskRegistry,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        let body_keys = MaskRegistry::parse(DEFAULT_BODY_KEYS);
        Self {
            headers: DEFAULT_MASKED_HEADERS
                .iter()
                .map(|h| (*h).to_owned())
                .collect(),
            query_params: Vec::new(),
            request_body_keys: body_keys.clone(),
            response_body_keys: body_keys,
        }
    }
}

const DEFAULT_MASKED_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

const DEFAULT_BODY_KEYS: &str = "json:password,token,secret;form:password,token,secret";

/// Configuration for the client logging middleware.
///
/// Controls what is captured, how it is masked, and how the log block looks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientLoggerConfig {
    /// When false the layer is a pure pass-through.
    pub enabled: bool,
    pub level: LogLevel,
    /// Bodies larger than this many bytes are logged as `<TOO BIG n bytes>`.
    pub max_body_size: u64,
    /// Width that line labels are padded to.
    pub column_width: usize,
    pub request: DirectionConfig,
    pub response: DirectionConfig,
    pub masking: MaskingConfig,
    /// Reject malformed per-request mask descriptors instead of dropping bad entries.
    pub strict_descriptors: bool,
}

impl Default for ClientLoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            max_body_size: 64 * 1024,
            column_width: 8,
            request: DirectionConfig::default(),
            response: DirectionConfig::default(),
            masking: MaskingConfig::default(),
            strict_descriptors: false,
        }
    }
}

impl ClientLoggerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.column_width == 0 {
            return Err(ConfigError::ZeroColumnWidth);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::BodyType;

    #[test]
    fn test_empty_toml_is_default() {
        let config = ClientLoggerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ClientLoggerConfig::default());
        assert!(config.enabled);
        assert_eq!(config.level, LogLevel::Info);
    }

    #[test]
    fn test_default_masking() {
        let masking = MaskingConfig::default();
        assert!(masking.headers.contains(&"authorization".to_string()));
        assert!(masking
            .request_body_keys
            .fields(&BodyType::json())
            .unwrap()
            .contains("password"));
        assert_eq!(masking.request_body_keys, masking.response_body_keys);
    }

    #[test]
    fn test_body_keys_as_table() {
        let config = ClientLoggerConfig::from_toml_str(
            r#"
            [masking.response_body_keys]
            json = ["access_token"]
            "#,
        )
        .unwrap();
        let fields = config
            .masking
            .response_body_keys
            .fields(&BodyType::json())
            .unwrap();
        assert!(fields.contains("access_token"));
        assert!(config.masking.response_body_keys.fields(&BodyType::form()).is_none());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ClientLoggerConfig::from_toml_str("level = \"loud\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ClientLoggerConfig::from_toml_str("column_width = 0"),
            Err(ConfigError::ZeroColumnWidth)
        ));
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    }
}
