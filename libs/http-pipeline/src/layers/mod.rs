//! Tower layers that make up the client pipeline
//!
//! Stack order used by [`HttpClientBuilder`](crate::HttpClientBuilder),
//! outer to inner:
//!
//! - [`LoggingLayer`] - notifies the observer before and after delegation
//! - [`CancelLayer`] - honors a per-request `CancellationToken`
//! - [`CompressionLayer`] - gzip request bodies, decode gzip responses (opt-in)
//!
//! Every layer holds the next service by value, so the layers compose with
//! any `tower::Service` base, not only the built-in hyper client.

mod cancel;
mod compression;
mod logging;

pub use cancel::{CancelLayer, CancelService};
pub use compression::{CompressionLayer, CompressionService};
pub use logging::{LoggingLayer, LoggingService};
