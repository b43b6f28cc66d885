use std::time::Duration;

/// User-Agent sent when the caller does not set one
pub const DEFAULT_USER_AGENT: &str = concat!("http-pipeline/", env!("CARGO_PKG_VERSION"));

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// OS native root certificate store
    Native,
}

/// Whether the client enforces TLS or also accepts plain HTTP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// HTTPS only
    #[default]
    TlsOnly,
    /// Accept `http://` URLs as well. Meant for local mock servers.
    AllowInsecureHttp,
}

/// Settings consumed by [`HttpClientBuilder`](crate::HttpClientBuilder)
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout, applied at the base of the pipeline (default: 30s)
    pub request_timeout: Duration,

    /// Maximum response body size in bytes, measured after gzip decoding
    /// (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value used when a request does not carry one
    pub user_agent: String,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum number of requests queued in front of the pipeline (default: 1024)
    ///
    /// Requests beyond this fail fast with `HttpError::Overloaded`.
    pub buffer_capacity: usize,

    /// Idle connection lifetime in the pool (default: 90s); `None` keeps
    /// hyper-util's default
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per host (default: 32); `0` disables reuse
    pub pool_max_idle_per_host: usize,

    /// Gzip request bodies and decode gzip responses (default: false)
    pub compression: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            compression: false,
        }
    }
}

impl HttpClientConfig {
    /// Small footprint: short timeout, 1 MB bodies, small pool
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Self::default()
        }
    }

    /// Configuration for local mock servers: plain HTTP allowed
    ///
    /// **WARNING**: never use in production, traffic is not encrypted.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert_eq!(config.buffer_capacity, 1024);
        assert!(!config.compression, "compression is opt-in");
        assert!(config.user_agent.starts_with("http-pipeline/"));
    }

    #[test]
    fn test_presets() {
        let minimal = HttpClientConfig::minimal();
        assert_eq!(minimal.request_timeout, Duration::from_secs(10));
        assert_eq!(minimal.max_body_size, 1024 * 1024);
        assert_eq!(minimal.transport, TransportSecurity::TlsOnly);

        let testing = HttpClientConfig::for_testing();
        assert_eq!(testing.transport, TransportSecurity::AllowInsecureHttp);
        assert_eq!(testing.pool_max_idle_per_host, 4);
        assert!(!testing.compression);
    }
}
