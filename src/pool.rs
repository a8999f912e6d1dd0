//! Concurrent execution of many requests.
//!
//! All members of a [`RequestPool`] are driven from the calling task through
//! a single [`FuturesUnordered`]; nothing is spawned. The pool waits for the
//! next completion at most `timeout` at a time and fails the whole batch on
//! the first error, discarding responses collected so far.

use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::{
    options::{non_negative, PoolOptions},
    request::{execute, RequestId},
    CouchDbError, Request, Response, Result,
};

/// A set of requests executed concurrently.
#[derive(Debug)]
pub struct RequestPool {
    requests: Vec<Request>,
    response_ids: Vec<RequestId>,
    responses: Vec<Response>,
    timeout: Duration,
}

impl Default for RequestPool {
    fn default() -> Self {
        Self::with_options(PoolOptions::default())
    }
}

impl RequestPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(opts: PoolOptions) -> Self {
        Self {
            requests: Vec::new(),
            response_ids: Vec::new(),
            responses: Vec::new(),
            timeout: Duration::from_millis(opts.timeout_ms),
        }
    }

    /// Longest wait for the next completion. Zero waits forever.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Sets the timeout in milliseconds; negative values become `0`.
    pub fn set_timeout_ms(&mut self, millis: i64) -> &mut Self {
        self.timeout = Duration::from_millis(non_negative(millis));
        self
    }

    /// Adds a request. Attaching a request that is already a member (or a
    /// clone of one) has no effect.
    pub fn attach(&mut self, request: Request) -> RequestId {
        let id = request.id();
        if !self.contains(id) {
            self.requests.push(request);
        }
        id
    }

    pub fn detach(&mut self, id: RequestId) -> Option<Request> {
        let index = self.requests.iter().position(|request| request.id() == id)?;
        Some(self.requests.remove(index))
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.iter().any(|request| request.id() == id)
    }

    /// Removes every request. Responses from the last send are kept.
    pub fn clear(&mut self) -> &mut Self {
        self.requests.clear();
        self
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    /// Responses of the last successful [`RequestPool::send`], in
    /// submission order.
    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    /// Responses of the last successful send paired with their request.
    pub fn results(&self) -> impl Iterator<Item = (RequestId, &Response)> {
        self.response_ids.iter().copied().zip(self.responses.iter())
    }

    pub fn response_for(&self, id: RequestId) -> Option<&Response> {
        self.results()
            .find(|(response_id, _)| *response_id == id)
            .map(|(_, response)| response)
    }

    /// Executes every member concurrently and waits for all of them.
    ///
    /// Returns one response per request in submission order. Any failure
    /// aborts the batch: remaining transfers are dropped and no responses
    /// are kept.
    pub async fn send(&mut self) -> Result<&[Response]> {
        self.response_ids.clear();
        self.responses.clear();

        let mut in_flight = FuturesUnordered::new();
        for (index, request) in self.requests.iter().enumerate() {
            let builder = request.to_transport()?;
            in_flight.push(async move { (index, execute(builder).await) });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(requests = in_flight.len(), "sending request pool");

        let mut slots: Vec<Option<Response>> = self.requests.iter().map(|_| None).collect();
        loop {
            let next = if self.timeout.is_zero() {
                in_flight.next().await
            } else {
                tokio::time::timeout(self.timeout, in_flight.next())
                    .await
                    .map_err(|_| CouchDbError::PoolTimeout {
                        timeout: self.timeout,
                    })?
            };
            let Some((index, outcome)) = next else {
                break;
            };

            let parts = outcome.map_err(|source| CouchDbError::PoolTransport {
                request_index: index,
                source,
            })?;
            let response = parts.into_response(self.requests[index].raise_http_errors())?;

            #[cfg(feature = "tracing")]
            tracing::debug!(
                request_index = index,
                status = response.response_code(),
                remaining = in_flight.len(),
                "pool request completed"
            );

            slots[index] = Some(response);
        }

        self.response_ids = self.requests.iter().map(Request::id).collect();
        self.responses = slots.into_iter().flatten().collect();
        Ok(&self.responses)
    }
}
