use crate::observer::{Observer, TracingObserver, notify};
use http::{Request, Response};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that reports each request and its outcome to an [`Observer`]
///
/// `on_request` fires inside `call`, before the inner service is invoked;
/// `on_response` fires once the inner future resolves, with `None` when it
/// resolved to an error. Request and response pass through unmodified.
#[derive(Clone)]
pub struct LoggingLayer {
    observer: Arc<dyn Observer>,
}

impl LoggingLayer {
    /// Create a layer reporting to `observer`
    #[must_use]
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }
}

impl fmt::Debug for LoggingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingLayer").finish_non_exhaustive()
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new(Arc::new(TracingObserver))
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = LoggingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LoggingService {
            inner,
            observer: Arc::clone(&self.observer),
        }
    }
}

/// Service that notifies an observer around each call
#[derive(Clone)]
pub struct LoggingService<S> {
    inner: S,
    observer: Arc<dyn Observer>,
}

impl<S: fmt::Debug> fmt::Debug for LoggingService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingService")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for LoggingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: 'static,
    ResBody: 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let observer = Arc::clone(&self.observer);
        notify("on_request", || observer.on_request(req.uri(), req.method()));

        let fut = self.inner.call(req);

        Box::pin(async move {
            let result = fut.await;
            let status = result.as_ref().ok().map(Response::status);
            notify("on_response", || observer.on_response(status));
            result
        })
    }
}
