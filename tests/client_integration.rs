use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use axum::{
    extract::State,
    http::{HeaderMap, Method as HttpMethod, StatusCode, Uri},
    response::{IntoResponse, Response as AxumResponse},
    Json, Router,
};
use couchdb_http::{
    CouchDb, CouchDbError, Lucene, Method, PoolOptions, Request, RequestPool, JSON_CONTENT_TYPE,
    USER_AGENT,
};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Clone)]
struct MockState {
    hits: Arc<AtomicUsize>,
}

/// What the mock server saw, echoed back as JSON.
#[derive(Debug, Deserialize)]
struct Echo {
    method: String,
    path: String,
    query: Option<String>,
    body: String,
    content_type: Option<String>,
    expect: Option<String>,
    user_agent: Option<String>,
    destination: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Routes by path:
/// - `/slow/{ms}/...` sleeps before answering
/// - `.../missing` answers 404 with a CouchDB error envelope
/// - `/broken` answers 500 with a non-JSON body
/// - anything else echoes the request
async fn couch_handler(
    State(state): State<MockState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> AxumResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let path = uri.path().to_owned();

    if let Some(rest) = path.strip_prefix("/slow/") {
        let millis = rest
            .split('/')
            .next()
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    if path.ends_with("/missing") {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "not_found", "reason": "missing"})),
        )
            .into_response();
    }

    if path == "/broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response();
    }

    Json(json!({
        "method": method.as_str(),
        "path": path,
        "query": uri.query(),
        "body": body,
        "content_type": header(&headers, "content-type"),
        "expect": header(&headers, "expect"),
        "user_agent": header(&headers, "user-agent"),
        "destination": header(&headers, "destination"),
    }))
    .into_response()
}

struct TestServer {
    base_url: String,
    hits: Arc<AtomicUsize>,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    fn couch(&self) -> CouchDb {
        CouchDb::new(self.base_url.clone()).expect("mock server uri must be valid")
    }
}

async fn spawn_server() -> TestServer {
    let state = MockState {
        hits: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .fallback(couch_handler)
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind test listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("mock server must run");
    });

    TestServer {
        base_url: format!("http://{address}"),
        hits: state.hits,
        task,
    }
}

/// Answers every connection with `status_line` and a CouchDB error body.
///
/// axum only emits canonical reason phrases, so this speaks HTTP/1.1 directly.
async fn spawn_raw_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("must bind raw listener");
    let address = listener.local_addr().expect("must have local addr");
    let task = tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|window| window == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let body = r#"{"error":"not_found","reason":"missing"}"#;
                let reply = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (format!("http://{address}"), task)
}

/// A URI nothing listens on.
fn dead_uri() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("must bind");
    let address = listener.local_addr().expect("must have local addr");
    drop(listener);
    format!("http://{address}")
}

#[tokio::test]
async fn send_returns_parsed_response() {
    let server = spawn_server().await;
    let couch = server.couch();

    let response = couch.root().send().await.expect("root must succeed");

    assert_eq!(response.http_version(), "HTTP/1.1");
    assert_eq!(response.response_code(), 200);
    assert_eq!(response.response_status(), "OK");
    assert!(response.header("Content-Type").is_some());

    let echo: Echo = response.json_body().expect("echo must decode");
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.path, "/");
    assert_eq!(echo.expect, None);
    assert_eq!(echo.user_agent.as_deref(), Some(USER_AGENT));
    assert_eq!(server.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn save_document_puts_encoded_id_with_json_body() {
    let server = spawn_server().await;
    let couch = server.couch();
    let db = couch.database("my db").expect("valid database name");

    let echo: Echo = db
        .save_document(&json!({"_id": "post/1", "title": "hello"}))
        .expect("must build")
        .send_and_decode()
        .await
        .expect("save must succeed");

    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.path, "/my%20db/post%2F1");
    assert_eq!(echo.content_type.as_deref(), Some(JSON_CONTENT_TYPE));
    let body: serde_json::Value = serde_json::from_str(&echo.body).expect("body must be json");
    assert_eq!(body, json!({"_id": "post/1", "title": "hello"}));
}

#[tokio::test]
async fn query_data_and_custom_methods_reach_the_server() {
    let server = spawn_server().await;
    let couch = server.couch();
    let db = couch.database("db").expect("valid database name");

    let echo: Echo = db
        .delete_document("doc", "3-abc")
        .expect("must build")
        .send_and_decode()
        .await
        .expect("delete must succeed");
    assert_eq!(echo.method, "DELETE");
    assert_eq!(echo.path, "/db/doc");
    assert_eq!(echo.query.as_deref(), Some("rev=3-abc"));

    let echo: Echo = db
        .copy_document("doc", "doc-copy")
        .expect("must build")
        .send_and_decode()
        .await
        .expect("copy must succeed");
    assert_eq!(echo.method, "COPY");
    assert_eq!(echo.destination.as_deref(), Some("doc-copy"));

    let db = couch.database("docs").expect("valid database name");
    let echo: Echo = Lucene::new(&db)
        .query("title:rust", "search", "by_title")
        .expect("must build")
        .send_and_decode()
        .await
        .expect("lucene query must succeed");
    assert_eq!(echo.path, "/_fti/local/docs/_design/search/by_title");
    assert_eq!(echo.query.as_deref(), Some("q=title%3Arust"));
}

#[tokio::test]
async fn empty_body_is_not_sent() {
    let server = spawn_server().await;
    let couch = server.couch();

    let echo: Echo = couch
        .database("db")
        .expect("valid database name")
        .compact()
        .send_and_decode()
        .await
        .expect("compact must succeed");
    assert_eq!(echo.method, "POST");
    assert!(echo.body.is_empty());
}

#[tokio::test]
async fn error_status_raises_couch_error() {
    let server = spawn_server().await;
    let couch = server.couch();

    let err = couch
        .database("db")
        .expect("valid database name")
        .fetch_document("missing")
        .expect("must build")
        .send()
        .await
        .expect_err("404 must raise");

    assert_eq!(err.error(), Some("not_found"));
    assert_eq!(err.reason(), Some("missing"));
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn error_status_returns_response_when_raising_is_off() {
    let server = spawn_server().await;
    let mut couch = server.couch();
    couch.set_raise_http_errors(false);

    let response = couch
        .database("db")
        .expect("valid database name")
        .fetch_document("missing")
        .expect("must build")
        .send()
        .await
        .expect("404 must be returned as response");

    assert_eq!(response.response_code(), 404);
    let body: serde_json::Value = response.json_body().expect("envelope is json");
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn server_reason_phrase_is_kept() {
    let (base_url, task) = spawn_raw_server("HTTP/1.1 404 Object Not Found").await;
    let mut couch = CouchDb::new(base_url).expect("raw server uri must be valid");
    couch.set_raise_http_errors(false);

    let response = couch
        .database("db")
        .expect("valid database name")
        .fetch_document("doc")
        .expect("must build")
        .send()
        .await
        .expect("404 must be returned as response");
    assert_eq!(response.response_code(), 404);
    assert_eq!(response.response_status(), "Object Not Found");

    let mut pool = couch.create_request_pool();
    pool.attach(couch.root());
    let responses = pool.send().await.expect("pool must return the 404");
    assert_eq!(responses[0].response_status(), "Object Not Found");

    task.abort();
}

#[tokio::test]
async fn canonical_reason_phrase_is_reported() {
    let (base_url, task) = spawn_raw_server("HTTP/1.1 404 Not Found").await;
    let mut couch = CouchDb::new(base_url).expect("raw server uri must be valid");
    couch.set_raise_http_errors(false);

    let response = couch.root().send().await.expect("404 must be returned as response");
    assert_eq!(response.response_status(), "Not Found");

    task.abort();
}

#[tokio::test]
async fn non_json_error_body_is_a_decode_error() {
    let server = spawn_server().await;
    let couch = server.couch();

    let err = couch
        .create_request("/broken", Method::Get)
        .send()
        .await
        .expect_err("500 must raise");
    assert!(matches!(err, CouchDbError::Decode(_)));
}

#[tokio::test]
async fn connection_refused_is_a_transport_error() {
    let request =
        Request::new(Method::Get, format!("{}/", dead_uri())).expect("default transport");

    let err = request.send().await.expect_err("must fail to connect");
    assert!(matches!(err, CouchDbError::Transport(_)));
}

#[tokio::test]
async fn request_timeout_surfaces_transport_error() {
    let server = spawn_server().await;
    let couch = server.couch();

    let mut request = couch.create_request("/slow/1500/doc", Method::Get);
    request.set_timeout(1);

    match request.send().await.expect_err("request must time out") {
        CouchDbError::Transport(inner) => assert!(inner.is_timeout()),
        other => panic!("expected transport timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn pool_returns_responses_in_submission_order() {
    let server = spawn_server().await;
    let couch = server.couch();
    let mut pool = couch.create_request_pool();

    let slow = pool.attach(couch.create_request("/slow/200/first", Method::Get));
    let fast = pool.attach(couch.create_request("/second", Method::Get));
    let mut post = couch.create_request("/third", Method::Post);
    post.set_json_body(&json!({"n": 3})).expect("must encode");
    pool.attach(post);

    let responses = pool.send().await.expect("pool must succeed");
    assert_eq!(responses.len(), 3);

    let paths: Vec<String> = responses
        .iter()
        .map(|response| response.json_body::<Echo>().expect("echo").path)
        .collect();
    assert_eq!(paths, ["/slow/200/first", "/second", "/third"]);

    let slow_echo: Echo = pool
        .response_for(slow)
        .expect("slow response")
        .json_body()
        .expect("echo");
    assert_eq!(slow_echo.path, "/slow/200/first");
    assert!(pool.response_for(fast).is_some());
    assert_eq!(pool.results().count(), 3);
    assert_eq!(server.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn pool_runs_requests_concurrently() {
    let server = spawn_server().await;
    let couch = server.couch();
    let mut pool = couch.create_request_pool();
    for index in 0..4 {
        pool.attach(couch.create_request(&format!("/slow/300/{index}"), Method::Get));
    }

    let started = Instant::now();
    let responses = pool.send().await.expect("pool must succeed");
    assert_eq!(responses.len(), 4);
    assert!(
        started.elapsed() < Duration::from_millis(1_000),
        "pool took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn pool_send_reexecutes_members() {
    let server = spawn_server().await;
    let couch = server.couch();
    let mut pool = couch.create_request_pool();
    pool.attach(couch.uuids());
    pool.attach(couch.all_dbs());

    pool.send().await.expect("first send");
    pool.send().await.expect("second send");

    assert_eq!(pool.responses().len(), 2);
    assert_eq!(server.hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn pool_transport_failure_aborts_whole_batch() {
    let server = spawn_server().await;
    let couch = server.couch();
    let mut pool = couch.create_request_pool();

    pool.attach(couch.root());
    let dead = pool.attach(
        Request::new(Method::Get, format!("{}/", dead_uri())).expect("default transport"),
    );

    let err = pool.send().await.expect_err("batch must fail");
    assert!(matches!(
        err,
        CouchDbError::PoolTransport {
            request_index: 1,
            ..
        }
    ));
    assert!(pool.responses().is_empty());

    pool.detach(dead);
    let responses = pool.send().await.expect("remaining request must succeed");
    assert_eq!(responses.len(), 1);
}

#[tokio::test]
async fn pool_couch_error_aborts_whole_batch() {
    let server = spawn_server().await;
    let couch = server.couch();
    let db = couch.database("db").expect("valid database name");
    let mut pool = couch.create_request_pool();

    pool.attach(db.all_docs());
    pool.attach(db.fetch_document("missing").expect("must build"));

    let err = pool.send().await.expect_err("batch must fail");
    assert_eq!(err.error(), Some("not_found"));
    assert!(pool.responses().is_empty());
}

#[tokio::test]
async fn pool_times_out_without_progress() {
    let server = spawn_server().await;
    let couch = server.couch();
    let mut pool = RequestPool::with_options(PoolOptions { timeout_ms: 50 });
    pool.attach(couch.create_request("/slow/1000/doc", Method::Get));

    let err = pool.send().await.expect_err("pool must time out");
    match err {
        CouchDbError::PoolTimeout { timeout } => assert_eq!(timeout, Duration::from_millis(50)),
        other => panic!("expected pool timeout, got {other:?}"),
    }
    assert!(pool.responses().is_empty());
}
