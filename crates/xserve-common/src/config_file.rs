//! Configuration file structures for xserve.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`LogConfig`]: Log filter and output format

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ServerOptions;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [server]
/// port = 8080
/// hostname = "127.0.0.1"
/// reuse_port = false
/// peer_address = true
///
/// [server.socket]
/// backlog = 2048
/// keep_alive = true
///
/// [server.axum]
/// request_timeout_secs = 30
///
/// [log]
/// filter = "info,xserve=debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Server options (normalized fields and host overrides).
    #[serde(default)]
    pub server: ServerOptions,

    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "defaults::log_filter")]
    pub filter: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: defaults::log_filter(),
            format: LogFormat::default(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub fn log_filter() -> String {
        "info,xserve=debug".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortSpec;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert!(config.server.port.is_none());
        assert!(!config.server.peer_address);
        assert_eq!(config.log.filter, "info,xserve=debug");
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [server]
            port = "8080"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.port, Some(PortSpec::Text("8080".into())));
        assert_eq!(config.server.resolve_port().unwrap(), 8080);
        // Defaults applied
        assert!(!config.server.reuse_port);
        assert_eq!(config.log.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            port = 9000
            hostname = "127.0.0.1"
            reuse_port = true
            peer_address = true

            [server.socket]
            backlog = 2048
            exclusive = true
            keep_alive = false

            [server.axum]
            request_timeout_secs = 15
            max_body_bytes = 65536
            trace = false

            [server.edge]
            port = 7000

            [log]
            filter = "debug"
            format = "json"
        "#;

        let config = ConfigFile::from_toml(toml).unwrap();

        assert_eq!(config.server.port, Some(PortSpec::Number(9000)));
        assert_eq!(config.server.hostname.as_deref(), Some("127.0.0.1"));
        assert!(config.server.reuse_port);
        assert!(config.server.peer_address);
        assert_eq!(config.server.socket.backlog, Some(2048));
        assert_eq!(config.server.socket.exclusive, Some(true));
        assert_eq!(config.server.socket.keep_alive, Some(false));
        assert_eq!(config.server.axum.request_timeout_secs, Some(15));
        assert_eq!(config.server.axum.max_body_bytes, Some(65536));
        assert_eq!(config.server.axum.trace, Some(false));
        assert_eq!(config.server.edge.port, Some(7000));
        assert_eq!(config.log.filter, "debug");
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_invalid_toml() {
        let invalid = "this is not valid toml [";
        let result = ConfigFile::from_toml(invalid);
        assert!(matches!(result, Err(ConfigFileError::Parse { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigFile::from_file("/nonexistent/xserve.toml");
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}
