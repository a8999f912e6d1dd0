use serde::{Deserialize, Serialize};

/// Body CouchDB sends along with 4xx/5xx statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub reason: String,
}

/// `{"keys": [...]}` body of the multi-key view and `_all_docs` queries.
#[derive(Debug, Serialize)]
pub struct KeysBody<'a, K> {
    pub keys: &'a [K],
}

/// `_bulk_docs` payload.
#[derive(Debug, Serialize)]
pub struct BulkDocsBody<'a, D> {
    pub all_or_nothing: bool,
    pub docs: &'a [D],
}
