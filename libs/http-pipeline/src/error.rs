use crate::codec::CodecError;
use std::time::Duration;
use thiserror::Error;

/// Classification of URL validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Errors produced by the transport pipeline.
///
/// Decorators in the chain never wrap errors coming from the services they
/// delegate to; an error raised at the base of the chain reaches the caller
/// unchanged. Callers that need to know whether the server was reached can
/// branch on [`HttpError::is_status`] (server answered with a failure) versus
/// [`HttpError::is_connectivity`] (exchange never completed).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request timed out
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Gzip encoding or decoding of a message body failed
    #[error("Body codec error: {0}")]
    Codec(#[from] CodecError),

    /// The caller cancelled the request while it was in flight
    #[error("Request cancelled")]
    Cancelled,

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Request queue is full (fail-fast)
    #[error("Service overloaded: request buffer full")]
    Overloaded,

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// Invalid URL (failed to parse)
    ///
    /// Match on `kind`; `reason` is a diagnostic for logs only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// The server answered, but with a non-success status.
    #[must_use]
    pub fn is_status(&self) -> bool {
        matches!(self, Self::HttpStatus { .. })
    }

    /// The exchange never completed: connection, TLS or timeout failure.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Tls(_) | Self::Timeout(_))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_codec_error_is_source() {
        let codec = CodecError::Malformed(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "invalid gzip header",
        ));
        let err = HttpError::from(codec);

        let source = err.source().unwrap();
        assert!(source.downcast_ref::<CodecError>().is_some());
        assert!(err.to_string().contains("invalid gzip header"));
    }

    #[test]
    fn test_status_and_connectivity_classification() {
        let status = HttpError::HttpStatus {
            status: http::StatusCode::UNAUTHORIZED,
            body_preview: String::new(),
            content_type: None,
        };
        assert!(status.is_status());
        assert!(!status.is_connectivity());

        let refused = HttpError::Transport(Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )));
        assert!(refused.is_connectivity());
        assert!(!refused.is_status());

        assert!(HttpError::Timeout(Duration::from_secs(1)).is_connectivity());
        assert!(!HttpError::Cancelled.is_connectivity());
        assert!(!HttpError::Cancelled.is_status());
    }

    #[test]
    fn test_transport_error_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = HttpError::Transport(Box::new(inner));

        let mut depth = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            depth += 1;
            current = e.source();
        }
        assert_eq!(depth, 2);
    }
}
