//! Mock transports shared by the unit tests.

use crate::error::HttpError;
use crate::response::{ResponseBody, full_body};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::Service;

/// What the mock saw for one call.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

type Handler = Arc<dyn Fn(&SeenRequest) -> Result<Response<ResponseBody>, HttpError> + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Respond(Handler),
    /// Never completes; `live` counts futures that have not been dropped yet.
    Hang { live: Arc<AtomicUsize> },
}

/// Base transport that records requests and answers from a closure.
#[derive(Clone)]
pub struct MockTransport {
    behavior: Behavior,
    pub seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&SeenRequest) -> Result<Response<ResponseBody>, HttpError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            behavior: Behavior::Respond(Arc::new(handler)),
            seen: Arc::default(),
        }
    }

    /// Always answers with the given status, headers and body.
    pub fn responding(status: u16, headers: &[(&str, &str)], body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let headers: Vec<(String, String)> = headers
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Self::new(move |_| {
            let mut builder = Response::builder().status(status);
            for (name, value) in &headers {
                builder = builder.header(name, value);
            }
            Ok(builder.body(full_body(body.clone())).unwrap())
        })
    }

    /// Never answers. Returns the transport and a counter of in-flight calls.
    pub fn hanging() -> (Self, Arc<AtomicUsize>) {
        let live = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            behavior: Behavior::Hang { live: live.clone() },
            seen: Arc::default(),
        };
        (transport, live)
    }

    pub fn last_request(&self) -> SeenRequest {
        self.seen.lock().unwrap().last().cloned().unwrap()
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Service<Request<Full<Bytes>>> for MockTransport {
    type Response = Response<ResponseBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let behavior = self.behavior.clone();
        let seen = self.seen.clone();
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await.unwrap().to_bytes();
            let request = SeenRequest {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            };
            seen.lock().unwrap().push(request.clone());

            match behavior {
                Behavior::Respond(handler) => handler(&request),
                Behavior::Hang { live } => {
                    let _guard = LiveGuard::new(live);
                    std::future::pending().await
                }
            }
        })
    }
}

pub async fn read_body(response: Response<ResponseBody>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub fn json_request(uri: &str, body: &'static str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}
