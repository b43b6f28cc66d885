use http::{Method, StatusCode, Uri};
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Sink notified by [`LoggingLayer`](crate::LoggingLayer) around each call.
///
/// Both hooks are fire-and-forget. A panicking observer is contained by the
/// logging layer and never aborts the request.
pub trait Observer: Send + Sync {
    /// Called before the request is handed to the inner transport.
    fn on_request(&self, target: &Uri, method: &Method);

    /// Called after the inner transport returns; `None` when it produced no
    /// response (transport failure, timeout, cancellation).
    fn on_response(&self, status: Option<StatusCode>);
}

/// Default observer: emits one `tracing` event per hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_request(&self, target: &Uri, method: &Method) {
        tracing::info!(
            target: "http_pipeline::transport",
            url = %target,
            method = %method,
            "outgoing request"
        );
    }

    fn on_response(&self, status: Option<StatusCode>) {
        match status {
            Some(status) => tracing::info!(
                target: "http_pipeline::transport",
                status_code = status.as_u16(),
                "response received"
            ),
            None => tracing::info!(
                target: "http_pipeline::transport",
                "no response received"
            ),
        }
    }
}

/// Run an observer hook, swallowing (and logging) a panic.
pub fn notify(hook: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!(hook, "observer panicked; continuing request");
    }
}
