//! Tracing setup for hosts embedding the bridge
//!
//! The `logging` section of [`BridgeConfig`](crate::BridgeConfig) is checked
//! together with the rest of the configuration, so a bad level or filter
//! directive is reported before the coordinator starts. Installing the
//! subscriber is left to the host:
//!
//! ```rust,no_run
//! use sipbridge_core::BridgeConfig;
//!
//! let config = BridgeConfig::from_json_str(r#"{"logging":{"level":"debug","format":"json"}}"#)?;
//! config.init_logging()?;
//! # Ok::<(), sipbridge_core::BridgeError>(())
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use crate::error::{BridgeError, BridgeResult};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    /// One JSON object per line on stdout
    Json,
}

/// Logging section of the bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level, `trace` through `error`
    pub level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives such as `sipbridge_core::audio=trace`
    pub directives: Vec<String>,
    /// Include file and line of each event
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            directives: Vec::new(),
            source_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Base level followed by the extra directives, all parsed
    pub fn filter_directives(&self) -> BridgeResult<Vec<Directive>> {
        let level = parse_log_level(&self.level)?;
        let mut directives = vec![Directive::from(LevelFilter::from_level(level))];
        for raw in &self.directives {
            let directive = raw.parse::<Directive>().map_err(|e| {
                BridgeError::invalid_configuration("logging.directives", format!("{:?}: {}", raw, e))
            })?;
            directives.push(directive);
        }
        Ok(directives)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        self.filter_directives().map(|_| ())
    }
}

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` is read first and the configured directives are added on top.
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> BridgeResult<()> {
    let filter = config
        .filter_directives()?
        .into_iter()
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| BridgeError::internal(format!("failed to install logger: {}", e)))?;

    tracing::info!(version = crate::VERSION, level = %config.level, format = ?config.format, "Bridge logging initialised");
    Ok(())
}

/// Parse a log level such as `debug` or `WARN`
pub fn parse_log_level(level: &str) -> BridgeResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| BridgeError::invalid_configuration("logging.level", format!("invalid log level: {:?}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(matches!(
            parse_log_level("loud"),
            Err(BridgeError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_directives_are_validated() {
        let config = LoggingConfig::default()
            .with_level("debug")
            .with_directive("sipbridge_core::audio=trace");
        assert_eq!(config.filter_directives().unwrap().len(), 2);

        let bad = LoggingConfig::default().with_directive("sipbridge_core=loudest");
        assert!(matches!(
            bad.validate(),
            Err(BridgeError::InvalidConfiguration { ref field, .. }) if field == "logging.directives"
        ));
    }

    #[test]
    fn test_json_section() {
        let config: LoggingConfig = serde_json::from_str(r#"{"level":"trace","format":"json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "trace");
        assert!(config.directives.is_empty());
        assert!(!config.source_location);
    }
}
