use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    message::{Method, JSON_CONTENT_TYPE},
    path::{require, segment},
    wire::{BulkDocsBody, KeysBody},
    CouchDb, Request, Result,
};

/// Endpoint builder for one database on a [`CouchDb`] server.
#[derive(Clone, Debug)]
pub struct Database<'a> {
    couch: &'a CouchDb,
    name: String,
}

impl<'a> Database<'a> {
    /// Scopes endpoints to the database `name`, which must not be empty.
    pub fn new(couch: &'a CouchDb, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        require(&name, "database name")?;
        Ok(Self { couch, name })
    }

    pub fn couch(&self) -> &'a CouchDb {
        self.couch
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a request for `/{db}{suffix}`; `suffix` is appended verbatim.
    fn request(&self, suffix: &str, method: Method) -> Request {
        self.couch
            .create_request(&format!("/{}{}", segment(&self.name), suffix), method)
    }

    /// `GET /{db}`
    pub fn info(&self) -> Request {
        self.request("", Method::Get)
    }

    /// `GET /{db}/_all_docs`
    pub fn all_docs(&self) -> Request {
        self.request("/_all_docs", Method::Get)
    }

    /// `POST /{db}/_all_docs` restricted to `keys`.
    pub fn all_docs_multi_key<K: Serialize>(&self, keys: &[K]) -> Result<Request> {
        let mut request = self.request("/_all_docs", Method::Post);
        request.set_json_body(&KeysBody { keys })?;
        Ok(request)
    }

    /// `POST /{db}/_bulk_docs`
    pub fn bulk_docs<D: Serialize>(&self, docs: &[D], all_or_nothing: bool) -> Result<Request> {
        let mut request = self.request("/_bulk_docs", Method::Post);
        request.set_json_body(&BulkDocsBody {
            all_or_nothing,
            docs,
        })?;
        Ok(request)
    }

    /// `GET /{db}/_changes`
    pub fn changes(&self) -> Request {
        self.request("/_changes", Method::Get)
    }

    /// `POST /{db}/_compact`
    pub fn compact(&self) -> Request {
        self.request("/_compact", Method::Post)
    }

    /// `POST /{db}/_compact/{ddoc}`
    pub fn compact_views(&self, design_document: &str) -> Result<Request> {
        require(design_document, "design document")?;
        Ok(self.request(
            &format!("/_compact/{}", segment(design_document)),
            Method::Post,
        ))
    }

    /// `COPY /{db}/{id}` to the document named by `destination`.
    pub fn copy_document(&self, id: &str, destination: &str) -> Result<Request> {
        require(id, "document ID")?;
        require(destination, "destination document ID")?;
        let mut request = self.request(&format!("/{}", segment(id)), Method::Copy);
        request.add_header("Destination", destination);
        Ok(request)
    }

    /// `DELETE /{db}/{id}?rev={rev}`
    pub fn delete_document(&self, id: &str, rev: &str) -> Result<Request> {
        require(id, "document ID")?;
        require(rev, "revision")?;
        let mut request = self.request(&format!("/{}", segment(id)), Method::Delete);
        request.set_query_data([("rev", rev)]);
        Ok(request)
    }

    /// `GET /{db}/_design/{list_ddoc}/_list/{list}/{view}`
    ///
    /// With a non-empty `view_design_document` the view is addressed as
    /// `{view_ddoc}/{view}`, for lists that format another design
    /// document's view.
    pub fn design_list(
        &self,
        list: &str,
        list_design_document: &str,
        view: &str,
        view_design_document: &str,
    ) -> Result<Request> {
        require(list, "list function")?;
        require(list_design_document, "list design document")?;
        require(view, "list view")?;

        let view_fragment = if view_design_document.is_empty() {
            segment(view).into_owned()
        } else {
            format!("{}/{}", segment(view_design_document), segment(view))
        };

        Ok(self.request(
            &format!(
                "/_design/{}/_list/{}/{}",
                segment(list_design_document),
                segment(list),
                view_fragment
            ),
            Method::Get,
        ))
    }

    /// Same path as [`Database::design_list`], POSTing `keys`.
    pub fn design_list_multi_key<K: Serialize>(
        &self,
        keys: &[K],
        list: &str,
        list_design_document: &str,
        view: &str,
        view_design_document: &str,
    ) -> Result<Request> {
        let mut request = self.design_list(list, list_design_document, view, view_design_document)?;
        request.set_method(Method::Post);
        request.set_json_body(&KeysBody { keys })?;
        Ok(request)
    }

    /// `GET /{db}/_design/{ddoc}/_show/{show}/{doc_id}`
    pub fn design_show(
        &self,
        show: &str,
        show_design_document: &str,
        doc_id: &str,
    ) -> Result<Request> {
        require(show, "show function")?;
        require(show_design_document, "show design document")?;
        require(doc_id, "document ID")?;

        Ok(self.request(
            &format!(
                "/_design/{}/_show/{}/{}",
                segment(show_design_document),
                segment(show),
                segment(doc_id)
            ),
            Method::Get,
        ))
    }

    /// `GET /{db}/_design/{ddoc}/_view/{view}`
    pub fn design_view(&self, design_document: &str, view: &str) -> Result<Request> {
        require(design_document, "view design document")?;
        require(view, "view function")?;

        Ok(self.request(
            &format!(
                "/_design/{}/_view/{}",
                segment(design_document),
                segment(view)
            ),
            Method::Get,
        ))
    }

    /// `POST /{db}/_design/{ddoc}/_view/{view}` restricted to `keys`.
    pub fn design_view_multi_key<K: Serialize>(
        &self,
        keys: &[K],
        design_document: &str,
        view: &str,
    ) -> Result<Request> {
        let mut request = self.design_view(design_document, view)?;
        request.set_method(Method::Post);
        request.set_json_body(&KeysBody { keys })?;
        Ok(request)
    }

    /// `POST /{db}/_ensure_full_commit`
    pub fn ensure_full_commit(&self) -> Request {
        self.request("/_ensure_full_commit", Method::Post)
    }

    /// `GET /{db}/{doc_id}/{attachment_id}`
    pub fn fetch_attachment(&self, doc_id: &str, attachment_id: &str) -> Result<Request> {
        require(doc_id, "document ID")?;
        require(attachment_id, "attachment ID")?;
        Ok(self.request(
            &format!("/{}/{}", segment(doc_id), segment(attachment_id)),
            Method::Get,
        ))
    }

    /// `GET /{db}/{id}`
    pub fn fetch_document(&self, id: &str) -> Result<Request> {
        require(id, "document ID")?;
        Ok(self.request(&format!("/{}", segment(id)), Method::Get))
    }

    /// `POST /{db}/` with an already-encoded JSON document.
    pub fn post_raw_document(&self, doc: impl Into<Vec<u8>>) -> Request {
        let mut request = self.request("/", Method::Post);
        request
            .add_header("Content-Type", JSON_CONTENT_TYPE)
            .set_body(doc);
        request
    }

    /// `PUT /{db}/{id}` with an already-encoded JSON document.
    pub fn put_raw_document(&self, doc: impl Into<Vec<u8>>, id: &str) -> Result<Request> {
        require(id, "document ID")?;
        let mut request = self.request(&format!("/{}", segment(id)), Method::Put);
        request
            .add_header("Content-Type", JSON_CONTENT_TYPE)
            .set_body(doc);
        Ok(request)
    }

    /// `PUT /{db}/{doc_id}/{attachment_id}?rev={rev}` with the raw attachment.
    pub fn save_attachment(
        &self,
        body: impl Into<Vec<u8>>,
        doc_id: &str,
        attachment_id: &str,
        rev: &str,
    ) -> Result<Request> {
        require(doc_id, "document ID")?;
        require(attachment_id, "attachment ID")?;
        require(rev, "revision")?;

        let mut request = self.request(
            &format!("/{}/{}", segment(doc_id), segment(attachment_id)),
            Method::Put,
        );
        request.set_query_data([("rev", rev)]).set_body(body);
        Ok(request)
    }

    /// Saves `doc`, choosing the endpoint from its `_id`.
    ///
    /// A document that serializes with a non-empty string `_id` is PUT to
    /// `/{db}/{id}`; anything else is POSTed to `/{db}/` so the server
    /// assigns an id. Maps and structs behave identically.
    pub fn save_document<D: Serialize + ?Sized>(&self, doc: &D) -> Result<Request> {
        let doc = serde_json::to_value(doc)?;
        let mut request = match document_id(&doc) {
            Some(id) => self.request(&format!("/{}", segment(id)), Method::Put),
            None => self.request("/", Method::Post),
        };
        request.set_json_body(&doc)?;
        Ok(request)
    }

    /// `POST /{db}/_temp_view` with the map/reduce definition as body.
    pub fn temp_view<T: Serialize + ?Sized>(&self, view_function: &T) -> Result<Request> {
        let mut request = self.request("/_temp_view", Method::Post);
        request.set_json_body(view_function)?;
        Ok(request)
    }

    /// `POST /{db}/_view_cleanup`
    pub fn view_cleanup(&self) -> Request {
        self.request("/_view_cleanup", Method::Post)
    }
}

fn document_id(doc: &JsonValue) -> Option<&str> {
    doc.get("_id")?.as_str().filter(|id| !id.is_empty())
}
