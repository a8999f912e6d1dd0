use std::time::Duration;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum CouchDbError {
    /// A caller-supplied argument violates a precondition. Raised before
    /// any network activity.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// A member of a request pool failed at the transport level.
    #[error("pool transport error at request {request_index}: {source}")]
    PoolTransport {
        /// Position of the failing request in submission order.
        request_index: usize,
        /// Underlying transport failure.
        source: reqwest::Error,
    },
    /// The pool waited for its full timeout without any request completing.
    #[error("request pool timed out after {timeout:?} without progress")]
    PoolTimeout { timeout: Duration },
    /// A raw HTTP message could not be split into status line, headers and body.
    #[error("parse error: {0}")]
    Parse(String),
    /// CouchDB answered with a 4xx/5xx status and its JSON error envelope.
    #[error("couchdb error {status}: {error} ({reason})")]
    Couch {
        status: u16,
        /// Short machine-readable code, e.g. `not_found`.
        error: String,
        /// Human-readable reason, e.g. `missing`.
        reason: String,
        /// Raw response body.
        body: String,
    },
    /// An error response body was not a decodable CouchDB error envelope.
    #[error("decode error: {0}")]
    Decode(String),
    /// JSON encoding or decoding of a message body failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CouchDbError {
    /// CouchDB error code, when this is a [`CouchDbError::Couch`].
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Couch { error, .. } => Some(error),
            _ => None,
        }
    }

    /// CouchDB error reason, when this is a [`CouchDbError::Couch`].
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Couch { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// HTTP status carried by a [`CouchDbError::Couch`].
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Couch { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds the error for a 4xx/5xx response from its body.
    ///
    /// Fails with [`CouchDbError::Decode`] when the body is not a JSON
    /// object carrying both `error` and `reason` strings.
    pub(crate) fn from_error_body(status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body).into_owned();
        match serde_json::from_slice::<crate::wire::ErrorEnvelope>(body) {
            Ok(envelope) => Self::Couch {
                status,
                error: envelope.error,
                reason: envelope.reason,
                body: text,
            },
            Err(err) => Self::Decode(format!(
                "invalid couchdb error envelope for status {status}: {err}; body: {text}"
            )),
        }
    }
}
