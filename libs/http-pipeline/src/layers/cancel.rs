use crate::error::HttpError;
use http::Request;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

/// Tower layer that aborts a call when its request carries a cancelled token
///
/// The token is read from the request extensions; attach one with
/// [`RequestBuilder::with_cancellation`](crate::RequestBuilder::with_cancellation).
/// Requests without a token pass straight through.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelLayer;

impl<S> Layer<S> for CancelLayer {
    type Service = CancelService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CancelService { inner }
    }
}

/// Service racing the inner call against the request's [`CancellationToken`]
#[derive(Debug, Clone)]
pub struct CancelService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for CancelService<S>
where
    S: Service<Request<B>, Error = HttpError>,
    S::Future: Send + 'static,
    S::Response: 'static,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let Some(token) = req.extensions().get::<CancellationToken>().cloned() else {
            return Box::pin(self.inner.call(req));
        };

        if token.is_cancelled() {
            tracing::debug!(url = %req.uri(), "request cancelled before dispatch");
            return Box::pin(async { Err(HttpError::Cancelled) });
        }

        let url = req.uri().clone();
        let fut = self.inner.call(req);

        Box::pin(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    // Dropping `fut` here releases the connection and any buffered body
                    tracing::debug!(%url, "request cancelled in flight");
                    Err(HttpError::Cancelled)
                }
                result = fut => result,
            }
        })
    }
}
