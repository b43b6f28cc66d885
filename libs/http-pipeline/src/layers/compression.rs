use crate::codec;
use crate::error::HttpError;
use crate::response::{ResponseBody, full_body};
use bytes::Bytes;
use http::header::{CONTENT_ENCODING, CONTENT_LENGTH};
use http::{HeaderMap, HeaderValue, Request, Response};
use http_body::Body as _;
use http_body_util::{BodyExt, Full};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

const GZIP: &str = "gzip";

/// Tower layer that gzips request bodies and decodes gzip responses
///
/// Outgoing: a non-empty body is compressed, tagged `Content-Encoding: gzip`
/// and its stale `Content-Length` dropped. `Content-Type` is left as is.
/// A request that already carries a `Content-Encoding` header is sent as-is,
/// so a pre-encoded body is never compressed twice.
///
/// Incoming: when the first `Content-Encoding` token is `gzip` (any case), the
/// body is decoded in full, `Content-Encoding` is removed and
/// `Content-Length` set to the decoded size. Any other encoding passes
/// through untouched.
///
/// Gzip work runs on tokio's blocking pool. Body collection is not bounded
/// here; place a timeout outside this layer.
#[derive(Clone, Debug)]
pub struct CompressionLayer {
    max_decoded_size: usize,
}

impl CompressionLayer {
    /// Create a layer that rejects responses decoding to more than
    /// `max_decoded_size` bytes.
    #[must_use]
    pub fn new(max_decoded_size: usize) -> Self {
        Self { max_decoded_size }
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService {
            inner,
            max_decoded_size: self.max_decoded_size,
        }
    }
}

/// Service that applies gzip to bodies in both directions
#[derive(Clone, Debug)]
pub struct CompressionService<S> {
    inner: S,
    max_decoded_size: usize,
}

impl<S> Service<Request<Full<Bytes>>> for CompressionService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Swap so we call the instance that was poll_ready'd, leaving a fresh
        // clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limit = self.max_decoded_size;

        Box::pin(async move {
            let req = compress_request(req).await?;
            let response = inner.call(req).await?;
            decompress_response(response, limit).await
        })
    }
}

async fn compress_request(req: Request<Full<Bytes>>) -> Result<Request<Full<Bytes>>, HttpError> {
    // Already-encoded bodies are left alone
    if req.body().is_end_stream() || req.headers().contains_key(CONTENT_ENCODING) {
        return Ok(req);
    }

    let (mut parts, body) = req.into_parts();
    let raw = body
        .collect()
        .await
        .unwrap_or_else(|never| match never {})
        .to_bytes();

    let compressed = off_worker(move || codec::compress_bytes(&raw)).await?;
    tracing::trace!(compressed = compressed.len(), "gzip request body");

    parts
        .headers
        .insert(CONTENT_ENCODING, HeaderValue::from_static(GZIP));
    parts.headers.remove(CONTENT_LENGTH);

    Ok(Request::from_parts(parts, Full::new(compressed)))
}

async fn decompress_response(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Response<ResponseBody>, HttpError> {
    if !is_gzip_encoded(response.headers()) {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    let compressed = body
        .collect()
        .await
        .map_err(HttpError::Transport)?
        .to_bytes();

    // HEAD and 204 replies may carry the header without a payload
    let compressed_len = compressed.len();
    let decoded = if compressed.is_empty() {
        Bytes::new()
    } else {
        off_worker(move || codec::decompress_bytes(&compressed, limit)).await?
    };
    tracing::trace!(
        compressed = compressed_len,
        decoded = decoded.len(),
        "gunzip response body"
    );

    parts.headers.remove(CONTENT_ENCODING);
    parts
        .headers
        .insert(CONTENT_LENGTH, HeaderValue::from(decoded.len()));

    Ok(Response::from_parts(parts, full_body(decoded)))
}

/// Run a codec call on the blocking pool so the async worker keeps polling.
async fn off_worker<F>(f: F) -> Result<Bytes, HttpError>
where
    F: FnOnce() -> Result<Bytes, codec::CodecError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => Ok(result?),
        Err(join) => Err(HttpError::Codec(codec::CodecError::Io(std::io::Error::other(join)))),
    }
}

/// Only the first listed coding is consulted.
fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .is_some_and(|first| first.trim().eq_ignore_ascii_case(GZIP))
}
