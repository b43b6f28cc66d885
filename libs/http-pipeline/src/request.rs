use crate::client::{BufferedService, HttpClient, map_buffer_error, try_acquire_buffer_slot};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::HttpResponse;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::Full;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower::Service;

#[derive(Clone, Debug)]
enum BodyKind {
    Empty,
    Bytes(Bytes),
    Json(Bytes),
    Form(Bytes),
}

impl BodyKind {
    fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::Json(_) => Some("application/json"),
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Empty | Self::Bytes(_) => None,
        }
    }

    fn into_bytes(self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Bytes(b) | Self::Json(b) | Self::Form(b) => b,
        }
    }
}

/// One outgoing request, assembled fluently and sent with [`send`](Self::send)
///
/// Header errors are deferred: the first invalid header is reported by
/// `send` (or by `json`/`form`, which return `Result`).
///
/// ```ignore
/// let token = CancellationToken::new();
/// let resp = client
///     .post("https://api.example.com/users")
///     .header("x-request-id", "123")
///     .json(&NewUser { name: "Alice" })?
///     .with_cancellation(token.clone())
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    transport_security: TransportSecurity,
    user_agent: HeaderValue,
    method: Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: BodyKind,
    cancellation: Option<CancellationToken>,
    error: Option<HttpError>,
}

impl RequestBuilder {
    pub(crate) fn new(client: &HttpClient, method: Method, url: &str) -> Self {
        Self {
            service: client.service.clone(),
            max_body_size: client.max_body_size,
            transport_security: client.transport_security,
            user_agent: client.user_agent.clone(),
            method,
            url: url.to_owned(),
            headers: Vec::new(),
            body: BodyKind::Empty,
            cancellation: None,
            error: None,
        }
    }

    fn push_header<N, V>(&mut self, name: N, value: V)
    where
        HeaderName: TryFrom<N, Error = http::header::InvalidHeaderName>,
        HeaderValue: TryFrom<V, Error = http::header::InvalidHeaderValue>,
    {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
    }

    /// Add a header. Repeating a name appends another value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none() {
            self.push_header(name, value);
        }
        self
    }

    /// Add several headers; stops at the first invalid one.
    pub fn headers(mut self, headers: Vec<(String, String)>) -> Self {
        for (name, value) in headers {
            if self.error.is_some() {
                break;
            }
            self.push_header(name, value);
        }
        self
    }

    /// Serialize `body` as the JSON payload.
    ///
    /// Sets `Content-Type: application/json` unless a content type header
    /// was already given.
    ///
    /// # Errors
    ///
    /// A deferred header error, or `HttpError::Json` if serialization fails.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.body = BodyKind::Json(Bytes::from(serde_json::to_vec(body)?));
        Ok(self)
    }

    /// URL-encode `fields` as the payload.
    ///
    /// # Errors
    ///
    /// A deferred header error, or `HttpError::FormEncode`.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.body = BodyKind::Form(Bytes::from(serde_urlencoded::to_string(fields)?));
        Ok(self)
    }

    pub fn body_bytes(mut self, body: Bytes) -> Self {
        self.body = BodyKind::Bytes(body);
        self
    }

    pub fn body_string(mut self, body: String) -> Self {
        self.body = BodyKind::Bytes(Bytes::from(body));
        self
    }

    /// Abort the request with `HttpError::Cancelled` once `token` fires.
    ///
    /// Cancelling drops the in-flight exchange, releasing its connection and
    /// buffered bodies. A token cancelled before `send` fails without
    /// contacting the server.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn validate_url(&self) -> Result<Uri, HttpError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::ParseError,
                reason: e.to_string(),
            })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") => match self.transport_security {
                TransportSecurity::AllowInsecureHttp => Ok(uri),
                TransportSecurity::TlsOnly => Err(HttpError::InvalidScheme {
                    scheme: "http".to_owned(),
                    reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
                }),
            },
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    fn build_request(&mut self) -> Result<Request<Full<Bytes>>, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let uri = self.validate_url()?;

        let mut builder = Request::builder().method(self.method.clone()).uri(uri);

        let headers = std::mem::take(&mut self.headers);
        let has = |wanted: &HeaderName| headers.iter().any(|(name, _)| name == wanted);

        if !has(&CONTENT_TYPE)
            && let Some(content_type) = self.body.default_content_type()
        {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if !has(&USER_AGENT) {
            builder = builder.header(USER_AGENT, self.user_agent.clone());
        }
        for (name, value) in headers {
            builder = builder.header(name, value);
        }

        let body = std::mem::replace(&mut self.body, BodyKind::Empty).into_bytes();
        let mut request = builder.body(Full::new(body))?;
        if let Some(token) = self.cancellation.take() {
            request.extensions_mut().insert(token);
        }
        Ok(request)
    }

    /// Send the request through the pipeline.
    ///
    /// Any status the server answers with, 4xx and 5xx included, comes back
    /// as `Ok`; see [`HttpResponse::error_for_status`].
    ///
    /// # Errors
    ///
    /// - deferred header errors, invalid URL or disallowed scheme
    /// - `Transport`, `Tls` or `Timeout` when the exchange does not complete
    /// - `Codec` when gzip encoding or decoding fails
    /// - `Cancelled` when the cancellation token fires
    /// - `Overloaded` when the request queue is full
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        let request = self.build_request()?;

        try_acquire_buffer_slot(&mut self.service).await?;
        let inner = self.service.call(request).await.map_err(map_buffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}
