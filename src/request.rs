use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    message::{Headers, Message, Method},
    options::{lenient_non_negative, non_negative, DEFAULT_TIMEOUT_SECS},
    response::TransportParts,
    ClientOptions, CouchDbError, Response, Result,
};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("couchdb-http/", env!("CARGO_PKG_VERSION"));

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`Request`].
///
/// Clones of a request share its identity, so a [`crate::RequestPool`]
/// treats them as the same member.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builds the transport shared by requests of one client.
pub(crate) fn http_client(max_redirects: usize) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .http1_only()
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .build()
        .map_err(CouchDbError::Transport)
}

/// A single deferred HTTP call.
///
/// Nothing touches the network until [`Request::send`] is awaited. A request
/// can be sent any number of times.
#[derive(Clone)]
pub struct Request {
    id: RequestId,
    http: reqwest::Client,
    method: Method,
    uri: String,
    query: Vec<(String, String)>,
    timeout_secs: u64,
    raise_http_errors: bool,
    message: Message,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("query", &self.query)
            .field("timeout_secs", &self.timeout_secs)
            .field("raise_http_errors", &self.raise_http_errors)
            .field("headers", self.message.headers())
            .field("body_len", &self.message.body().len())
            .finish()
    }
}

impl Request {
    /// Creates a request with its own default transport.
    ///
    /// Prefer [`crate::CouchDb::create_request`], which shares the client's
    /// transport, timeout and error policy. Fails with
    /// [`CouchDbError::Transport`] when the transport cannot be built.
    pub fn new(method: Method, uri: impl Into<String>) -> Result<Self> {
        let http = http_client(ClientOptions::default().max_redirects)?;
        Ok(Self::with_client(http, method, uri))
    }

    pub(crate) fn with_client(http: reqwest::Client, method: Method, uri: impl Into<String>) -> Self {
        let mut message = Message::new();
        // An empty value suppresses the header, which keeps the transport
        // from waiting on `100 Continue`.
        message.add_header("Expect", "");

        Self {
            id: RequestId::next(),
            http,
            method,
            uri: uri.into(),
            query: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            raise_http_errors: true,
            message,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = method;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: impl Into<String>) -> &mut Self {
        self.uri = uri.into();
        self
    }

    /// URI including the encoded query string, as handed to the transport.
    pub fn full_uri(&self) -> String {
        if self.query.is_empty() {
            return self.uri.clone();
        }
        format!("{}?{}", self.uri, encode_query(&self.query))
    }

    pub fn query_data(&self) -> &[(String, String)] {
        &self.query
    }

    /// Sets one query parameter, replacing an existing value for `key`.
    pub fn add_query_data(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.query.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.query.push((key, value)),
        }
        self
    }

    /// Replaces all query parameters.
    pub fn set_query_data<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query.clear();
        for (key, value) in pairs {
            self.add_query_data(key, value);
        }
        self
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Sets the timeout in seconds; negative values become `0` (no timeout).
    pub fn set_timeout(&mut self, secs: i64) -> &mut Self {
        self.timeout_secs = non_negative(secs);
        self
    }

    pub(crate) fn set_timeout_secs(&mut self, secs: u64) -> &mut Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the timeout from text; anything but a non-negative integer becomes `0`.
    pub fn set_timeout_str(&mut self, secs: &str) -> &mut Self {
        self.timeout_secs = lenient_non_negative(secs);
        self
    }

    pub fn raise_http_errors(&self) -> bool {
        self.raise_http_errors
    }

    /// Whether 4xx/5xx responses become [`CouchDbError::Couch`].
    pub fn set_raise_http_errors(&mut self, raise: bool) -> &mut Self {
        self.raise_http_errors = raise;
        self
    }

    pub fn headers(&self) -> &Headers {
        self.message.headers()
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.message.add_header(name, value);
        self
    }

    pub fn body(&self) -> &[u8] {
        self.message.body()
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) -> &mut Self {
        self.message.set_body(body);
        self
    }

    /// Serializes `value` as a JSON body.
    pub fn set_json_body<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<&mut Self> {
        self.message.set_json_body(value)?;
        Ok(self)
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Sends the request and waits for the complete response.
    ///
    /// Transport failures surface as [`CouchDbError::Transport`]. A non-2xx
    /// status only becomes an error through the request's error policy.
    pub async fn send(&self) -> Result<Response> {
        let builder = self.to_transport()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(method = %self.method, uri = %self.uri, "sending couchdb request");

        let parts = execute(builder).await.map_err(CouchDbError::Transport)?;
        parts.into_response(self.raise_http_errors)
    }

    /// Sends the request and decodes the response body as JSON.
    pub async fn send_and_decode<T: DeserializeOwned>(&self) -> Result<T> {
        self.send().await?.json_body()
    }

    /// Configures the transport call shared by [`Request::send`] and the pool.
    pub(crate) fn to_transport(&self) -> Result<reqwest::RequestBuilder> {
        if self.uri.is_empty() {
            return Err(CouchDbError::InvalidArgument(
                "request URI must not be empty".to_owned(),
            ));
        }

        let mut builder = self.http.request(self.method.to_reqwest()?, self.full_uri());
        for (name, value) in self.message.headers().iter() {
            if !value.is_empty() {
                builder = builder.header(name, value);
            }
        }
        if !self.message.body().is_empty() {
            builder = builder.body(self.message.body().to_vec());
        }
        if self.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(self.timeout_secs));
        }
        Ok(builder)
    }
}

/// Performs one transport round trip and reads the full body.
pub(crate) async fn execute(
    builder: reqwest::RequestBuilder,
) -> std::result::Result<TransportParts, reqwest::Error> {
    let response = builder.send().await?;
    TransportParts::read(response).await
}

fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
