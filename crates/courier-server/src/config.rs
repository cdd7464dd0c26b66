//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use courier_server::{ServerConfig, TlsSource};
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .host("127.0.0.1")
//!     .port(8443)
//!     .tls(TlsSource::from_paths("cert.pem", "key.pem"))
//!     .idle_timeout(Some(Duration::from_secs(120)))
//!     .build();
//!
//! assert_eq!(config.port(), 8443);
//! assert!(config.secure());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use courier_config::ServerSection;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port.
pub const DEFAULT_PORT: u16 = 443;

/// Default session idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// PEM material, inline or on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PemSource {
    /// Raw PEM bytes.
    Bytes(Vec<u8>),
    /// A file read when the server starts listening.
    Path(PathBuf),
}

impl PemSource {
    /// Returns the PEM bytes, reading the file if needed.
    pub async fn load(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes.clone()),
            Self::Path(path) => tokio::fs::read(path).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Bytes(_) => "<inline pem>".to_string(),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// Certificate chain and private key for the TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSource {
    cert: PemSource,
    key: PemSource,
}

impl TlsSource {
    /// Uses files, read when the server starts listening.
    pub fn from_paths(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: PemSource::Path(cert.into()),
            key: PemSource::Path(key.into()),
        }
    }

    /// Uses in-memory PEM data.
    pub fn from_pem(cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            cert: PemSource::Bytes(cert.into()),
            key: PemSource::Bytes(key.into()),
        }
    }

    /// Mixes sources, e.g. a certificate file with a key from a secret store.
    pub const fn new(cert: PemSource, key: PemSource) -> Self {
        Self { cert, key }
    }

    /// Certificate chain source.
    #[must_use]
    pub fn cert(&self) -> &PemSource {
        &self.cert
    }

    /// Private key source.
    #[must_use]
    pub fn key(&self) -> &PemSource {
        &self.key
    }

    pub(crate) fn describe(&self) -> (String, String) {
        (self.cert.describe(), self.key.describe())
    }
}

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    host: String,
    port: u16,
    secure: bool,
    tls: Option<TlsSource>,
    idle_timeout: Option<Duration>,
    shutdown_timeout: Duration,
    max_concurrent_streams: Option<u32>,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Builds a configuration from a loaded `[server]` section.
    ///
    /// ```rust
    /// use courier_config::ServerSection;
    /// use courier_server::ServerConfig;
    ///
    /// let section = ServerSection {
    ///     port: 8080,
    ///     secure: false,
    ///     idle_timeout_secs: None,
    ///     ..Default::default()
    /// };
    /// let config = ServerConfig::from_section(&section);
    /// assert_eq!(config.port(), 8080);
    /// assert_eq!(config.idle_timeout(), None);
    /// ```
    #[must_use]
    pub fn from_section(section: &ServerSection) -> Self {
        let mut builder = Self::builder()
            .host(section.host.clone())
            .port(section.port)
            .secure(section.secure)
            .idle_timeout(section.idle_timeout_secs.map(Duration::from_secs))
            .shutdown_timeout(Duration::from_secs(section.shutdown_timeout_secs));
        if let Some(tls) = &section.tls {
            builder = builder.tls(TlsSource::from_paths(tls.cert.clone(), tls.key.clone()));
        }
        if let Some(max) = section.max_concurrent_streams {
            builder = builder.max_concurrent_streams(max);
        }
        builder.build()
    }

    /// Bind host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Bind port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the listener uses TLS.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// TLS material, if configured.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsSource> {
        self.tls.as_ref()
    }

    /// Session idle timeout. `None` means sessions never idle out.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// How long `close` waits for sessions to drain.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Advertised `SETTINGS_MAX_CONCURRENT_STREAMS`.
    #[must_use]
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ServerConfig> for ServerConfigBuilder {
    fn from(config: ServerConfig) -> Self {
        Self { config }
    }
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
                secure: true,
                tls: None,
                idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
                shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                max_concurrent_streams: None,
            },
        }
    }

    /// Sets the bind host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the port. `0` picks an ephemeral port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Serve plaintext HTTP/2 (h2c) when false.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    /// Sets the TLS material and enables TLS.
    #[must_use]
    pub fn tls(mut self, tls: TlsSource) -> Self {
        self.config.tls = Some(tls);
        self.config.secure = true;
        self
    }

    /// Sets the session idle timeout; `None` disables it.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets how long `close` waits for sessions to drain.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Limits concurrent streams per session.
    #[must_use]
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.config.max_concurrent_streams = Some(max);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::TlsSection;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host(), "0.0.0.0");
        assert_eq!(config.port(), 443);
        assert!(config.secure());
        assert!(config.tls().is_none());
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_concurrent_streams(), None);
    }

    #[test]
    fn test_tls_implies_secure() {
        let config = ServerConfig::builder()
            .secure(false)
            .tls(TlsSource::from_pem("cert", "key"))
            .build();
        assert!(config.secure());
    }

    #[test]
    fn test_from_section() {
        let section = ServerSection {
            host: "127.0.0.1".to_string(),
            port: 9443,
            tls: Some(TlsSection {
                cert: "c.pem".into(),
                key: "k.pem".into(),
            }),
            max_concurrent_streams: Some(64),
            shutdown_timeout_secs: 5,
            ..Default::default()
        };
        let config = ServerConfig::from_section(&section);

        assert_eq!(config.host(), "127.0.0.1");
        assert_eq!(config.port(), 9443);
        assert_eq!(config.tls(), Some(&TlsSource::from_paths("c.pem", "k.pem")));
        assert_eq!(config.max_concurrent_streams(), Some(64));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_pem_source_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"-----BEGIN CERTIFICATE-----").unwrap();

        let from_path = PemSource::Path(file.path().to_path_buf());
        assert_eq!(from_path.load().await.unwrap(), b"-----BEGIN CERTIFICATE-----");

        let inline = PemSource::Bytes(b"inline".to_vec());
        assert_eq!(inline.load().await.unwrap(), b"inline");

        let missing = PemSource::Path("/nonexistent/cert.pem".into());
        assert!(missing.load().await.is_err());
    }
}
