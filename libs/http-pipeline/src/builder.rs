use crate::client::{BufferedService, HttpClient};
use crate::config::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{CancelLayer, CompressionLayer, LoggingLayer};
use crate::observer::{Observer, TracingObserver};
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::header::HeaderValue;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceBuilder, ServiceExt};

/// A type-erased transport: the base of the pipeline, or the pipeline itself
///
/// Anything implementing `tower::Service` over these request and response
/// types can be boxed with `ServiceExt::boxed_clone` and handed to
/// [`HttpClientBuilder::with_transport`].
pub type Transport = BoxCloneService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Builder for [`HttpClient`]
///
/// The finished pipeline, outer to inner:
///
/// ```text
/// Buffer -> Logging -> Cancel -> Timeout -> [Compression] -> base transport
/// ```
///
/// The base is a pooled hyper client over rustls unless replaced with
/// [`with_transport`](Self::with_transport).
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    observer: Arc<dyn Observer>,
    transport: Option<Transport>,
}

impl HttpClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            observer: Arc::new(TracingObserver),
            transport: None,
        }
    }

    /// Per-request timeout, enforced just above the base transport
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// User-Agent sent when a request does not set its own
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Cap on response bodies, measured after gzip decoding
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Accept `http://` URLs. Local mock servers only.
    ///
    /// Available in debug builds, or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "http_pipeline::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Gzip outgoing bodies and decode gzip-encoded responses
    #[must_use]
    pub fn with_compression(mut self) -> Self {
        self.config.compression = true;
        self
    }

    /// Report requests and responses to `observer` instead of `tracing`
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the hyper base transport
    ///
    /// The pipeline layers (logging, cancellation, compression, timeout) are
    /// still stacked on top. TLS and pool settings are ignored.
    #[must_use]
    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Request queue size; `0` is clamped to `1`
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Idle connection lifetime; `None` keeps hyper-util's default
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Idle connections kept per host; `0` disables reuse
    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Assemble the pipeline
    ///
    /// # Errors
    ///
    /// `HttpError::Tls` when the root store cannot be loaded,
    /// `HttpError::InvalidHeaderValue` for an unusable user agent.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let user_agent = HeaderValue::from_str(&self.config.user_agent)?;
        let timeout = self.config.request_timeout;

        let base = match self.transport {
            Some(custom) => custom,
            None => hyper_transport(&self.config)?,
        };

        // The timeout must also bound gzip body collection
        let base = if self.config.compression {
            CompressionLayer::new(self.config.max_body_size)
                .layer(base)
                .boxed_clone()
        } else {
            base
        };

        let service: Transport = ServiceBuilder::new()
            .layer(LoggingLayer::new(self.observer))
            .layer(CancelLayer)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout))
            .layer(TimeoutLayer::new(timeout))
            .service(base)
            .boxed_clone();

        let buffered: BufferedService = Buffer::new(service, self.config.buffer_capacity.max(1));

        tracing::debug!(
            timeout = ?timeout,
            compression = self.config.compression,
            buffer_capacity = self.config.buffer_capacity,
            "http client pipeline built"
        );

        Ok(HttpClient {
            service: buffered,
            max_body_size: self.config.max_body_size,
            transport_security: self.config.transport,
            user_agent,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pooled hyper client speaking HTTP/1.1 and HTTP/2 (ALPN) over rustls
fn hyper_transport(config: &HttpClientConfig) -> Result<Transport, HttpError> {
    let https = tls::https_connector(config.tls_roots, config.transport)?;

    let mut builder = Client::builder(TokioExecutor::new());
    // pool_idle_timeout has no effect without a pool timer
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle) = config.pool_idle_timeout {
        builder.pool_idle_timeout(idle);
    }

    let client = builder.build::<_, Full<Bytes>>(https);

    Ok(client
        .map_response(box_incoming)
        .map_err(HttpError::from)
        .boxed_clone())
}

fn box_incoming(response: Response<hyper::body::Incoming>) -> Response<ResponseBody> {
    response.map(|body| -> ResponseBody { body.map_err(Into::into).boxed() })
}

/// Recover the `HttpError` boxed by tower middleware, or classify it
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}
