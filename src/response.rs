use serde::de::DeserializeOwned;

use crate::{
    message::{Headers, Message},
    options::non_negative,
    CouchDbError, Result,
};

const HEADER_BODY_BOUNDARY: &[u8] = b"\r\n\r\n";

/// Parsed HTTP response.
///
/// Built either from a raw `headers\r\n\r\nbody` byte stream with
/// [`Response::parse`] or from the transport. Both paths apply the same
/// error policy: with `raise_http_errors` set, a 4xx/5xx status yields
/// [`CouchDbError::Couch`] instead of a `Response`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    message: Message,
    response_code: u16,
    response_status: String,
}

impl Response {
    /// Parses a raw HTTP response that still carries its header block.
    pub fn parse(raw: &[u8], raise_http_errors: bool) -> Result<Self> {
        let boundary = raw
            .windows(HEADER_BODY_BOUNDARY.len())
            .position(|window| window == HEADER_BODY_BOUNDARY)
            .ok_or_else(|| {
                CouchDbError::Parse("missing blank line between headers and body".to_owned())
            })?;

        let head = String::from_utf8_lossy(&raw[..boundary]);
        let body = raw[boundary + HEADER_BODY_BOUNDARY.len()..].to_vec();

        let mut lines = head.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let mut fields = status_line.splitn(3, ' ');
        let http_version = fields
            .next()
            .filter(|version| !version.is_empty())
            .ok_or_else(|| CouchDbError::Parse(format!("empty status line: '{status_line}'")))?;
        let raw_code = fields.next().ok_or_else(|| {
            CouchDbError::Parse(format!("missing status code in '{status_line}'"))
        })?;
        let reason = fields.next().unwrap_or_default();

        let code = raw_code.parse::<u16>().map_err(|err| {
            CouchDbError::Parse(format!("invalid status code '{raw_code}': {err}"))
        })?;
        if !(100..=599).contains(&code) {
            return Err(CouchDbError::Parse(format!(
                "status code {code} outside 100..=599"
            )));
        }

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim(), value.trim_start()))
            .collect();

        Self::from_parts(
            http_version,
            code,
            reason,
            headers,
            body,
            raise_http_errors,
        )
    }

    /// Builds a response from already-separated parts.
    pub fn from_parts(
        http_version: impl Into<String>,
        status: u16,
        reason: impl Into<String>,
        headers: Headers,
        body: Vec<u8>,
        raise_http_errors: bool,
    ) -> Result<Self> {
        if raise_http_errors && (400..=599).contains(&status) {
            return Err(CouchDbError::from_error_body(status, &body));
        }

        let mut message = Message::new();
        message
            .set_http_version(http_version)
            .set_headers(headers)
            .set_body(body);

        Ok(Self {
            message,
            response_code: status,
            response_status: reason.into(),
        })
    }

    /// Stores a status code, coercing negative or out-of-range input to `0`.
    pub fn set_response_code(&mut self, code: i64) {
        self.response_code = u16::try_from(non_negative(code)).unwrap_or(0);
    }

    pub fn http_version(&self) -> &str {
        self.message.http_version()
    }

    pub fn response_code(&self) -> u16 {
        self.response_code
    }

    pub fn response_status(&self) -> &str {
        &self.response_status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.response_code)
    }

    pub fn headers(&self) -> &Headers {
        self.message.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.message.header(name)
    }

    pub fn body(&self) -> &[u8] {
        self.message.body()
    }

    pub fn body_text(&self) -> String {
        self.message.body_text()
    }

    pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
        self.message.json_body()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

/// Response pieces read off the transport, before the error policy is applied.
#[derive(Debug)]
pub(crate) struct TransportParts {
    http_version: String,
    status: u16,
    reason: String,
    headers: Headers,
    body: Vec<u8>,
}

impl TransportParts {
    pub(crate) async fn read(
        response: reqwest::Response,
    ) -> std::result::Result<Self, reqwest::Error> {
        let http_version = format!("{:?}", response.version());
        let status = response.status();
        // hyper only records the phrase when it differs from the canonical one.
        let reason = match response.extensions().get::<hyper::ext::ReasonPhrase>() {
            Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
            None => status.canonical_reason().unwrap_or_default().to_owned(),
        };
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Self {
            http_version,
            status: status.as_u16(),
            reason,
            headers,
            body,
        })
    }

    pub(crate) fn into_response(self, raise_http_errors: bool) -> Result<Response> {
        Response::from_parts(
            self.http_version,
            self.status,
            self.reason,
            self.headers,
            self.body,
            raise_http_errors,
        )
    }
}
