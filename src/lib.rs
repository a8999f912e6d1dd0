//! `couchdb-http` is an async client for the CouchDB REST API.
//!
//! Endpoint builders assemble [`Request`]s without touching the network:
//! - [`CouchDb`] for server-level endpoints (`/_all_dbs`, `/_stats`, ...)
//! - [`Database`] for documents, attachments, views and the changes feed
//! - [`Lucene`] for couchdb-lucene full-text queries
//!
//! A request runs with [`Request::send`]. Many requests run concurrently
//! through a [`RequestPool`], which multiplexes them on the calling task.
//!
//! ```no_run
//! use couchdb_http::CouchDb;
//!
//! # async fn run() -> couchdb_http::Result<()> {
//! let couch = CouchDb::new("http://localhost:5984")?;
//! let dbs: Vec<String> = couch.all_dbs().send_and_decode().await?;
//! println!("{dbs:?}");
//! # Ok(())
//! # }
//! ```

mod couchdb;
mod database;
mod error;
pub mod lucene;
mod message;
mod options;
mod path;
mod pool;
mod request;
mod response;
mod wire;

pub use couchdb::CouchDb;
pub use database::Database;
pub use error::CouchDbError;
pub use lucene::Lucene;
pub use message::{Headers, Message, Method, JSON_CONTENT_TYPE};
pub use options::{ClientOptions, PoolOptions};
pub use pool::RequestPool;
pub use request::{Request, RequestId, USER_AGENT};
pub use response::Response;

pub type Result<T> = std::result::Result<T, CouchDbError>;
