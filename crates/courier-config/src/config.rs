//! Top-level configuration type.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, LoggingSection, ServerSection};

/// Complete Courier configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and the
/// environment.
///
/// # Example
///
/// ```
/// use courier_config::CourierConfig;
///
/// let config = CourierConfig::default();
/// assert_eq!(config.server.port, 443);
/// assert_eq!(config.logging.level, "info");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Listener and session settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl CourierConfig {
    /// Local development preset: plaintext on 8080, pretty debug logs.
    ///
    /// ```
    /// use courier_config::CourierConfig;
    ///
    /// let config = CourierConfig::development();
    /// assert!(!config.server.secure);
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 8080;
        config.server.secure = false;
        config.logging.level = "debug".to_string();
        config.logging.format = courier_telemetry::LogFormat::Pretty;
        config.logging.include_location = true;
        config
    }

    /// Production preset: the defaults, JSON logs.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.host.trim().is_empty() {
            return Err(ConfigError::invalid("server.host", "must not be empty"));
        }
        if server.idle_timeout_secs == Some(0) {
            return Err(ConfigError::invalid(
                "server.idle_timeout_secs",
                "must be positive; omit it to disable the idle timeout",
            ));
        }
        if server.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid("server.shutdown_timeout_secs", "must be positive"));
        }
        if server.max_concurrent_streams == Some(0) {
            return Err(ConfigError::invalid("server.max_concurrent_streams", "must be positive"));
        }
        if let Some(tls) = &server.tls {
            if tls.cert.as_os_str().is_empty() {
                return Err(ConfigError::invalid("server.tls.cert", "must be set"));
            }
            if tls.key.as_os_str().is_empty() {
                return Err(ConfigError::invalid("server.tls.key", "must be set"));
            }
        }

        if self.logging.enabled {
            courier_telemetry::create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid("logging.level", e.to_string()))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TlsSection;

    #[test]
    fn test_default_is_valid() {
        assert!(CourierConfig::default().validate().is_ok());
        assert!(CourierConfig::development().validate().is_ok());
        assert_eq!(CourierConfig::production(), CourierConfig::default());
    }

    #[test]
    fn test_zero_idle_timeout_rejected() {
        let mut config = CourierConfig::default();
        config.server.idle_timeout_secs = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.idle_timeout_secs"));

        config.server.idle_timeout_secs = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_half_configured_tls_rejected() {
        let mut config = CourierConfig::default();
        config.server.tls = Some(TlsSection {
            cert: "cert.pem".into(),
            ..Default::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.tls.key"));
    }

    #[test]
    fn test_bad_log_filter_rejected() {
        let mut config = CourierConfig::default();
        config.logging.level = "courier=loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));

        config.logging.enabled = false;
        assert!(config.validate().is_ok());
    }
}
