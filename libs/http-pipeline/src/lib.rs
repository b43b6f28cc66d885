#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP client pipeline with pluggable request/response logging and
//! transparent gzip.
//!
//! The client is a tower service stack. Two decorators carry the
//! cross-cutting behavior:
//! - [`LoggingLayer`] - notifies an [`Observer`] of every outgoing request
//!   (target + method) and its outcome (status, or none on failure)
//! - [`CompressionLayer`] - gzip-compresses outgoing bodies and decodes
//!   responses tagged `Content-Encoding: gzip` (opt-in)
//!
//! Each decorator owns the service it wraps, so any chain built from these
//! layers is itself a plain `tower::Service` that can be wrapped again.
//!
//! # Example
//!
//! ```ignore
//! use http_pipeline::{HttpClient, TracingObserver};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(120))
//!     .observer(Arc::new(TracingObserver))
//!     .with_compression()
//!     .build()?;
//!
//! let body = client
//!     .post("https://api.example.com/verify")
//!     .json(&payload)?
//!     .send()
//!     .await?
//!     .text()
//!     .await?;
//! ```

mod builder;
mod client;
pub mod codec;
mod config;
mod error;
mod layers;
mod observer;
mod request;
mod response;
#[cfg(test)]
mod test_support;
mod tls;

pub use builder::{HttpClientBuilder, Transport};
pub use client::HttpClient;
pub use codec::CodecError;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{
    CancelLayer, CancelService, CompressionLayer, CompressionService, LoggingLayer, LoggingService,
};
pub use observer::{Observer, TracingObserver};
pub use request::RequestBuilder;
pub use response::{HttpResponse, LimitedBody, ResponseBody};
