//! Configuration schema types.
//!
//! This module defines the structure of every configuration section. All
//! sections reject unknown fields.

use std::path::PathBuf;

use courier_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// Server section.
///
/// # Example
///
/// ```
/// use courier_config::ServerSection;
///
/// let section = ServerSection {
///     host: "127.0.0.1".to_string(),
///     port: 8443,
///     ..Default::default()
/// };
/// assert!(section.secure);
/// assert_eq!(section.idle_timeout_secs, Some(60));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind. `0` picks an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Serve over TLS. Requires [`tls`](Self::tls) at listen time.
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// Certificate and key files.
    #[serde(default)]
    pub tls: Option<TlsSection>,

    /// Session idle timeout in seconds. `None` disables it.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: Option<u64>,

    /// How long `close` waits for sessions to finish.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// HTTP/2 `SETTINGS_MAX_CONCURRENT_STREAMS` advertised to peers.
    #[serde(default)]
    pub max_concurrent_streams: Option<u32>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: default_secure(),
            tls: None,
            idle_timeout_secs: default_idle_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_concurrent_streams: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_secure() -> bool {
    true
}

#[allow(clippy::unnecessary_wraps)]
fn default_idle_timeout() -> Option<u64> {
    Some(60)
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// PEM files for the TLS listener.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TlsSection {
    /// Certificate chain file.
    #[serde(default)]
    pub cert: PathBuf,

    /// Private key file.
    #[serde(default)]
    pub key: PathBuf,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directives (trace, debug, info, warn, error, or per-target).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Emit span open/close events.
    #[serde(default)]
    pub span_events: bool,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            span_events: false,
            include_location: false,
        }
    }
}

impl LoggingSection {
    /// Converts the section into a [`LogConfig`] for `init_logging`.
    #[must_use]
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            enabled: self.enabled,
            level: self.level.clone(),
            format: self.format,
            span_events: self.span_events,
            file_line_info: self.include_location,
            ..LogConfig::production()
        }
    }
}

impl From<&LoggingSection> for LogConfig {
    fn from(section: &LoggingSection) -> Self {
        section.to_log_config()
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let section = ServerSection::default();
        assert_eq!(section.host, "0.0.0.0");
        assert_eq!(section.port, 443);
        assert!(section.secure);
        assert!(section.tls.is_none());
        assert_eq!(section.idle_timeout_secs, Some(60));
        assert_eq!(section.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let section: ServerSection = toml::from_str("port = 8443").unwrap();
        assert_eq!(section.port, 8443);
        assert_eq!(section.host, "0.0.0.0");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result: Result<ServerSection, _> = toml::from_str("portt = 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_tls_section() {
        let section: ServerSection = toml::from_str(
            r#"
            [tls]
            cert = "/etc/courier/cert.pem"
            key = "/etc/courier/key.pem"
            "#,
        )
        .unwrap();
        let tls = section.tls.unwrap();
        assert_eq!(tls.cert, PathBuf::from("/etc/courier/cert.pem"));
        assert_eq!(tls.key, PathBuf::from("/etc/courier/key.pem"));
    }

    #[test]
    fn test_logging_section_to_log_config() {
        let section = LoggingSection {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            ..Default::default()
        };
        let config = LogConfig::from(&section);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.file_line_info);
        assert!(config.enabled);
    }
}
