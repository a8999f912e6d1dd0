use std::fmt;

use serde::Serialize;

use crate::{
    message::{Method, JSON_CONTENT_TYPE},
    options::{lenient_non_negative, non_negative},
    path::{require, segment},
    request::http_client,
    ClientOptions, CouchDbError, Database, PoolOptions, Request, RequestPool, Result,
};

/// A CouchDB server and the factory for every request sent to it.
///
/// Endpoint methods only build [`Request`]s; call [`Request::send`] or put
/// them in a [`RequestPool`] to execute them. All requests share one
/// transport and its connection pool.
#[derive(Clone)]
pub struct CouchDb {
    http: reqwest::Client,
    uri: String,
    options: ClientOptions,
}

impl fmt::Debug for CouchDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CouchDb")
            .field("uri", &self.uri)
            .field("options", &self.options)
            .finish()
    }
}

impl CouchDb {
    /// Creates a client for the server at `uri`, e.g. `http://localhost:5984`.
    ///
    /// The URI must be absolute. It is stored verbatim and request paths are
    /// appended to it without normalization.
    pub fn new(uri: impl Into<String>) -> Result<Self> {
        let uri = validate_uri(uri.into())?;
        let options = ClientOptions::default();
        Ok(Self {
            http: http_client(options.max_redirects)?,
            uri,
            options,
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `COUCHDB_URI` — server URI (required)
    /// - `COUCHDB_TIMEOUT` — request timeout in seconds (optional)
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var("COUCHDB_URI").map_err(|_| {
            CouchDbError::InvalidArgument("missing COUCHDB_URI environment variable".to_owned())
        })?;
        if uri.trim().is_empty() {
            return Err(CouchDbError::InvalidArgument(
                "COUCHDB_URI is set but empty".to_owned(),
            ));
        }

        let mut couch = Self::new(uri.trim())?;
        if let Ok(timeout) = std::env::var("COUCHDB_TIMEOUT") {
            couch.options.timeout_secs = lenient_non_negative(&timeout);
        }
        Ok(couch)
    }

    /// Applies client options such as timeout and error policy.
    pub fn with_options(mut self, opts: ClientOptions) -> Result<Self> {
        if opts.max_redirects != self.options.max_redirects {
            self.http = http_client(opts.max_redirects)?;
        }
        self.options = opts;
        Ok(self)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Replaces the base URI; it must be an absolute URL.
    pub fn set_uri(&mut self, uri: impl Into<String>) -> Result<&mut Self> {
        self.uri = validate_uri(uri.into())?;
        Ok(self)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.options.timeout_secs
    }

    /// Timeout for requests created afterwards; negative values become `0`.
    pub fn set_timeout(&mut self, secs: i64) -> &mut Self {
        self.options.timeout_secs = non_negative(secs);
        self
    }

    /// Whether requests created afterwards turn 4xx/5xx into errors.
    pub fn set_raise_http_errors(&mut self, raise: bool) -> &mut Self {
        self.options.raise_http_errors = raise;
        self
    }

    /// Builds a request for `path` relative to the base URI.
    ///
    /// `path` is appended verbatim, so it needs its own leading slash.
    pub fn create_request(&self, path: &str, method: Method) -> Request {
        let mut request = Request::with_client(
            self.http.clone(),
            method,
            format!("{}{}", self.uri, path),
        );
        request
            .set_timeout_secs(self.options.timeout_secs)
            .set_raise_http_errors(self.options.raise_http_errors);
        request
    }

    /// Creates an empty pool that waits as long as this client's timeout.
    pub fn create_request_pool(&self) -> RequestPool {
        RequestPool::with_options(PoolOptions {
            timeout_ms: self.options.timeout_secs.saturating_mul(1_000),
        })
    }

    /// Endpoint builder scoped to one database; the name must not be empty.
    pub fn database(&self, name: impl Into<String>) -> Result<Database<'_>> {
        Database::new(self, name)
    }

    /// `GET /`
    pub fn root(&self) -> Request {
        self.create_request("/", Method::Get)
    }

    /// `GET /_all_dbs`
    pub fn all_dbs(&self) -> Request {
        self.create_request("/_all_dbs", Method::Get)
    }

    /// `GET /_active_tasks`
    pub fn active_tasks(&self) -> Request {
        self.create_request("/_active_tasks", Method::Get)
    }

    /// `GET /_log`
    pub fn log(&self) -> Request {
        self.create_request("/_log", Method::Get)
    }

    /// `POST /_replicate` with the replication document as body.
    pub fn replicate<T: Serialize + ?Sized>(&self, body: &T) -> Result<Request> {
        let mut request = self.create_request("/_replicate", Method::Post);
        request.set_json_body(body)?;
        Ok(request)
    }

    /// `POST /_restart`
    pub fn restart(&self) -> Request {
        let mut request = self.create_request("/_restart", Method::Post);
        request.add_header("Content-Type", JSON_CONTENT_TYPE);
        request
    }

    /// `GET /_stats`, or `GET /_stats/{group}/{key}` for a single statistic.
    ///
    /// `name` must hold either nothing or exactly a group and a key.
    pub fn stats(&self, name: &[&str]) -> Result<Request> {
        let path = match name {
            [] => "/_stats".to_owned(),
            [group, key] => format!("/_stats/{}/{}", segment(group), segment(key)),
            _ => {
                return Err(CouchDbError::InvalidArgument(format!(
                    "stats name must contain exactly 2 values for specific statistic retrieval, got {}",
                    name.len()
                )))
            }
        };
        Ok(self.create_request(&path, Method::Get))
    }

    /// `GET /_uuids`
    pub fn uuids(&self) -> Request {
        self.create_request("/_uuids", Method::Get)
    }

    /// `PUT /{db}`
    pub fn create_db(&self, name: &str) -> Result<Request> {
        require(name, "database name")?;
        Ok(self.create_request(&format!("/{}", segment(name)), Method::Put))
    }

    /// `DELETE /{db}`
    pub fn delete_db(&self, name: &str) -> Result<Request> {
        require(name, "database name")?;
        Ok(self.create_request(&format!("/{}", segment(name)), Method::Delete))
    }
}

fn validate_uri(uri: String) -> Result<String> {
    reqwest::Url::parse(&uri)
        .map_err(|err| CouchDbError::InvalidArgument(format!("invalid CouchDB URI '{uri}': {err}")))?;
    Ok(uri)
}
