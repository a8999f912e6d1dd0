//! couchdb-lucene full-text search.
//!
//! Indexes are served under `/_fti/{key}/{db}/_design/{ddoc}/{index}`,
//! where `key` names the couchdb-lucene section configured on the server
//! (`local` by default).

use crate::{
    message::Method,
    path::{require, segment},
    Database, Request, Result,
};

/// Default couchdb-lucene configuration key.
pub const DEFAULT_KEY: &str = "local";

/// Endpoint builder for couchdb-lucene indexes of one database.
#[derive(Clone, Debug)]
pub struct Lucene<'a> {
    database: &'a Database<'a>,
    key: String,
}

impl<'a> Lucene<'a> {
    pub fn new(database: &'a Database<'a>) -> Self {
        Self::with_key(database, DEFAULT_KEY)
    }

    pub fn with_key(database: &'a Database<'a>, key: impl Into<String>) -> Self {
        Self {
            database,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// `GET /_fti/{key}/{db}/_design/{ddoc}/{view}`
    pub fn design_view(&self, design_document: &str, view: &str) -> Result<Request> {
        require(design_document, "view design document")?;
        require(view, "view function")?;

        let path = format!(
            "/_fti/{}/{}/_design/{}/{}",
            segment(&self.key),
            segment(self.database.name()),
            segment(design_document),
            segment(view)
        );
        Ok(self.database.couch().create_request(&path, Method::Get))
    }

    /// Runs the Lucene `query` against an index. The query is sent as-is;
    /// use [`escape`] for user-supplied terms.
    pub fn query(&self, query: &str, design_document: &str, view: &str) -> Result<Request> {
        require(query, "query")?;
        let mut request = self.design_view(design_document, view)?;
        request.set_query_data([("q", query)]);
        Ok(request)
    }
}

/// Backslash-escapes the characters Lucene's query parser treats specially:
/// `\ + - ( ) ^ [ ] { } * ? | ~ " : ! & ;` and ASCII whitespace.
///
/// Escaping twice escapes the inserted backslashes again.
pub fn escape(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if is_special(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn is_special(ch: char) -> bool {
    matches!(
        ch,
        '\\' | '+'
            | '-'
            | '('
            | ')'
            | '^'
            | '['
            | ']'
            | '{'
            | '}'
            | '*'
            | '?'
            | '|'
            | '~'
            | '"'
            | ':'
            | '!'
            | '&'
            | ';'
            | ' '
            | '\t'
            | '\n'
            | '\r'
            | '\x0B'
            | '\x0C'
    )
}
