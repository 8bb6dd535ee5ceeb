//! Per-connection transport configuration.
//!
//! A [`ConnectionConfig`] describes everything a transport needs to build one
//! channel: target host, security mode, compression and keepalive policy,
//! and size/time limits. A config is immutable once a channel has been built
//! from it; reconfiguring a connection means building a new channel.

use std::fmt;
use std::time::Duration;

use http::Uri;

/// Compression policy for a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionPolicy {
    /// Codec name as negotiated on the wire, e.g. `"gzip"`.
    pub algorithm: String,
    /// Upper bound in bytes for a decompressed message, if limited.
    pub decompression_limit: Option<usize>,
}

/// Keepalive policy for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepalivePolicy {
    /// Interval between keepalive pings.
    pub interval: Duration,
    /// How long to wait for a ping ack before the connection is considered dead.
    pub timeout: Duration,
}

/// Configuration for one connection.
///
/// Unset optional fields take transport-defined defaults: TLS enabled
/// (`insecure` = false), compression disabled, keepalive disabled.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use grpc_bridge_core::ConnectionConfig;
///
/// let config = ConnectionConfig::new("https://api.example.com")
///     .compression("gzip")
///     .keepalive(Duration::from_secs(30), Duration::from_secs(10))
///     .request_timeout(Duration::from_secs(5));
///
/// let target = config.target().unwrap();
/// assert_eq!(target.host(), "api.example.com");
/// assert_eq!(target.port(), 443);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: Option<u16>,
    insecure: bool,
    compression: Option<CompressionPolicy>,
    keepalive: Option<KeepalivePolicy>,
    response_size_limit: Option<usize>,
    request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a config for the given host.
    ///
    /// The host may be a bare authority (`"example.com"`, `"example.com:8443"`)
    /// or carry an explicit `http`/`https` scheme. Validation happens in
    /// [`ConnectionConfig::target`], not here, so that a bad host fails the
    /// connection rather than the construction site.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            insecure: false,
            compression: None,
            keepalive: None,
            response_size_limit: None,
            request_timeout: None,
        }
    }

    /// Override the port. Takes precedence over any port in the host string.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Disable transport security (plaintext).
    pub fn insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Enable compression with the given algorithm and no decompression limit.
    pub fn compression(mut self, algorithm: impl Into<String>) -> Self {
        self.compression = Some(CompressionPolicy {
            algorithm: algorithm.into(),
            decompression_limit: None,
        });
        self
    }

    /// Enable compression with the given algorithm and a decompression limit.
    pub fn compression_with_limit(
        mut self,
        algorithm: impl Into<String>,
        decompression_limit: usize,
    ) -> Self {
        self.compression = Some(CompressionPolicy {
            algorithm: algorithm.into(),
            decompression_limit: Some(decompression_limit),
        });
        self
    }

    /// Enable keepalive pings.
    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive = Some(KeepalivePolicy { interval, timeout });
        self
    }

    /// Limit the size in bytes of a single response message.
    pub fn response_size_limit(mut self, limit: usize) -> Self {
        self.response_size_limit = Some(limit);
        self
    }

    /// Default timeout applied to every call on this connection.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// The raw host string this config was built with.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether transport security is disabled.
    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// The compression policy, if compression is enabled.
    pub fn compression_policy(&self) -> Option<&CompressionPolicy> {
        self.compression.as_ref()
    }

    /// The keepalive policy, if keepalive is enabled.
    pub fn keepalive_policy(&self) -> Option<KeepalivePolicy> {
        self.keepalive
    }

    /// The response message size limit, if any.
    pub fn response_size_limit_bytes(&self) -> Option<usize> {
        self.response_size_limit
    }

    /// The per-call default timeout, if any.
    pub fn request_timeout_duration(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Resolve the host string into a validated [`Target`].
    ///
    /// Port precedence: explicit [`ConnectionConfig::port`], then a port in
    /// the host string, then the scheme default (80 for `http` or insecure
    /// connections, 443 otherwise).
    pub fn target(&self) -> Result<Target, InvalidHostError> {
        let raw = self.host.trim();
        if raw.is_empty() {
            return Err(InvalidHostError::new(raw, "host is empty"));
        }

        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            // Bare authorities parse as path-only URIs, so give them a scheme.
            format!("grpc://{raw}")
        };

        let uri: Uri = candidate
            .parse()
            .map_err(|err: http::uri::InvalidUri| InvalidHostError::new(raw, err.to_string()))?;

        let host = uri
            .host()
            .ok_or_else(|| InvalidHostError::new(raw, "no host in authority"))?
            .to_string();

        if !matches!(uri.path(), "" | "/") {
            return Err(InvalidHostError::new(raw, "host must not contain a path"));
        }

        let scheme_default = match uri.scheme_str() {
            Some("http") => 80,
            Some("https") => 443,
            Some("grpc") => {
                if self.insecure {
                    80
                } else {
                    443
                }
            }
            Some(other) => {
                return Err(InvalidHostError::new(raw, format!("unsupported scheme {other:?}")));
            }
            None => return Err(InvalidHostError::new(raw, "missing scheme")),
        };

        let port = self.port.or(uri.port_u16()).unwrap_or(scheme_default);

        Ok(Target { host, port })
    }
}

/// A validated host/port pair produced by [`ConnectionConfig::target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    /// The host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The resolved port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The host string could not be parsed into a usable target.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid host {host:?}: {reason}")]
pub struct InvalidHostError {
    host: String,
    reason: String,
}

impl InvalidHostError {
    fn new(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_defaults_to_tls_port() {
        let target = ConnectionConfig::new("example.com").target().unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 443);
    }

    #[test]
    fn test_bare_host_insecure_defaults_to_80() {
        let target = ConnectionConfig::new("example.com")
            .insecure(true)
            .target()
            .unwrap();
        assert_eq!(target.port(), 80);
    }

    #[test]
    fn test_host_with_port() {
        let target = ConnectionConfig::new("example.com:50051").target().unwrap();
        assert_eq!(target.host(), "example.com");
        assert_eq!(target.port(), 50051);
    }

    #[test]
    fn test_explicit_port_wins() {
        let target = ConnectionConfig::new("example.com:50051")
            .port(9000)
            .target()
            .unwrap();
        assert_eq!(target.port(), 9000);
    }

    #[test]
    fn test_scheme_defaults() {
        let http = ConnectionConfig::new("http://example.com").target().unwrap();
        assert_eq!(http.port(), 80);

        let https = ConnectionConfig::new("https://example.com").target().unwrap();
        assert_eq!(https.port(), 443);
    }

    #[test]
    fn test_empty_host_rejected() {
        assert!(ConnectionConfig::new("").target().is_err());
        assert!(ConnectionConfig::new("   ").target().is_err());
    }

    #[test]
    fn test_host_with_path_rejected() {
        assert!(ConnectionConfig::new("https://example.com/api").target().is_err());
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        assert!(ConnectionConfig::new("ftp://example.com").target().is_err());
    }

    #[test]
    fn test_garbage_host_rejected() {
        assert!(ConnectionConfig::new("not a host").target().is_err());
    }

    #[test]
    fn test_target_display() {
        let target = ConnectionConfig::new("example.com:8443").target().unwrap();
        assert_eq!(target.to_string(), "example.com:8443");
    }

    #[test]
    fn test_policy_accessors() {
        let config = ConnectionConfig::new("example.com")
            .compression_with_limit("gzip", 4 * 1024 * 1024)
            .keepalive(Duration::from_secs(30), Duration::from_secs(10))
            .response_size_limit(1024)
            .request_timeout(Duration::from_secs(5));

        let compression = config.compression_policy().unwrap();
        assert_eq!(compression.algorithm, "gzip");
        assert_eq!(compression.decompression_limit, Some(4 * 1024 * 1024));

        let keepalive = config.keepalive_policy().unwrap();
        assert_eq!(keepalive.interval, Duration::from_secs(30));
        assert_eq!(keepalive.timeout, Duration::from_secs(10));

        assert_eq!(config.response_size_limit_bytes(), Some(1024));
        assert_eq!(config.request_timeout_duration(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::new("example.com");
        assert!(!config.is_insecure());
        assert!(config.compression_policy().is_none());
        assert!(config.keepalive_policy().is_none());
        assert!(config.response_size_limit_bytes().is_none());
        assert!(config.request_timeout_duration().is_none());
    }
}
