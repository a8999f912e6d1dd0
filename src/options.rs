/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default request pool wait in milliseconds.
pub const DEFAULT_POOL_TIMEOUT_MS: u64 = 10_000;

/// Configures requests created by a [`crate::CouchDb`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Overall per-request timeout in seconds. `0` disables the timeout.
    pub timeout_secs: u64,
    /// Turn 4xx/5xx responses into [`crate::CouchDbError::Couch`].
    pub raise_http_errors: bool,
    /// Maximum number of redirects followed by the transport.
    pub max_redirects: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            raise_http_errors: true,
            max_redirects: 3,
        }
    }
}

/// Configures a [`crate::RequestPool`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolOptions {
    /// Longest wait for the next completion in milliseconds. `0` waits forever.
    pub timeout_ms: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_POOL_TIMEOUT_MS,
        }
    }
}

/// Clamps a signed value to a non-negative one; negatives become `0`.
pub(crate) fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Parses a decimal integer leniently; anything invalid or negative is `0`.
pub(crate) fn lenient_non_negative(input: &str) -> u64 {
    input.trim().parse::<i64>().map(non_negative).unwrap_or(0)
}
