use std::borrow::Cow;

use crate::{CouchDbError, Result};

/// Percent-encodes one URL path segment, including any `/` it contains.
pub(crate) fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// Rejects an empty required argument, naming what was missing.
pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CouchDbError::InvalidArgument(format!(
            "supplied {what} must not be empty"
        )));
    }
    Ok(())
}
