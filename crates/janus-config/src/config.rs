//! Configuration structures.

use std::time::Duration;

use janus_core::{Kwargs, DEFAULT_TRACE_HEADERS};
use janus_server::ServerSettings;
use janus_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Largest accepted worker pool.
pub const MAX_WORKERS: usize = 1024;

/// Root configuration.
///
/// Unknown fields are rejected, so typos fail loudly instead of being
/// ignored.
///
/// # Example
///
/// ```
/// use janus_config::JanusConfig;
///
/// let config: JanusConfig = toml::from_str(r#"
///     [server]
///     port = 9000
///     worker_count = 0
///
///     [init_kwargs]
///     dsn = "postgres://localhost/app"
/// "#).unwrap();
///
/// assert_eq!(config.server.port, 9000);
/// assert_eq!(config.server.host, "0.0.0.0");
/// assert_eq!(config.server_settings().worker_count, 0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct JanusConfig {
    /// Listener and dispatch settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Kwargs passed to service factories that need arguments.
    pub init_kwargs: Kwargs,
}

impl JanusConfig {
    /// Preset with pretty, debug-level logs.
    #[must_use]
    pub fn development() -> Self {
        Self {
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                ..LoggingConfig::default()
            },
            ..Self::default()
        }
    }

    /// Preset with JSON, info-level logs.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Checks the values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logging.validate()
    }

    /// Converts to the lifecycle manager's settings.
    #[must_use]
    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            host: self.server.host.clone(),
            port: self.server.port,
            worker_count: self.server.worker_count,
            init_kwargs: self.init_kwargs.clone(),
            shutdown_timeout: Duration::from_secs(self.server.shutdown_timeout_secs),
            trace_headers: self.server.trace_headers.clone(),
        }
    }

    /// Converts to the logging setup.
    #[must_use]
    pub fn log_config(&self) -> LogConfig {
        let preset = match self.logging.format {
            LogFormat::Json => LogConfig::production(),
            LogFormat::Pretty => LogConfig::development(),
        };
        LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            format: self.logging.format,
            ..preset
        }
    }
}

/// Listener and dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port; `0` picks an ephemeral port.
    pub port: u16,
    /// Worker pool size; `0` runs blocking targets inline.
    pub worker_count: usize,
    /// Seconds to wait for open connections on shutdown.
    pub shutdown_timeout_secs: u64,
    /// Inbound headers copied into each request's trace context.
    pub trace_headers: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            worker_count: 4,
            shutdown_timeout_secs: 30,
            trace_headers: DEFAULT_TRACE_HEADERS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }
        if self.worker_count > MAX_WORKERS {
            return Err(ConfigError::invalid_value(
                "server.worker_count",
                format!("must be at most {MAX_WORKERS}"),
            ));
        }
        if self.trace_headers.iter().any(|h| h.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "server.trace_headers",
                "header names must not be empty",
            ));
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Whether logging is enabled.
    pub enabled: bool,
    /// Filter directive, e.g. `"info"` or `"janus_server=debug,info"`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        janus_telemetry::logging::create_env_filter(&self.level)
            .map(|_| ())
            .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_validate() {
        let config = JanusConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.worker_count, 4);
        assert_eq!(config.server_settings(), ServerSettings::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<JanusConfig, _> = toml::from_str("[server]\nworkers = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_port_and_workers_accepted() {
        let mut config = JanusConfig::default();
        config.server.port = 0;
        config.server.worker_count = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = JanusConfig::default();
        config.server.worker_count = MAX_WORKERS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        let mut config = JanusConfig::default();
        config.server.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = JanusConfig::default();
        config.server.trace_headers.push(String::new());
        assert!(config.validate().is_err());

        let mut config = JanusConfig::default();
        config.logging.level = "janus=[".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_conversions() {
        let mut config = JanusConfig::development();
        config.init_kwargs.insert("dsn".into(), json!("sqlite::memory:"));
        config.server.shutdown_timeout_secs = 5;

        let settings = config.server_settings();
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(settings.init_kwargs["dsn"], json!("sqlite::memory:"));

        let log = config.log_config();
        assert_eq!(log.format, LogFormat::Pretty);
        assert_eq!(log.level, "debug");
        assert!(log.span_events);
    }
}
