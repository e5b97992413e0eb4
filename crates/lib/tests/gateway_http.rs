//! Integration tests for the HTTP/SSE transport. Router-level cases use `oneshot` with an
//! explicit registry; stream replacement runs against a real listener on a free port.

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use browser_shell::egress::StaticResolver;
use browser_shell::exec::{CommandRunner, ExecStatus, ExecutionResult};
use browser_shell::gateway::{self, Dispatcher, GatewayState, MAX_BODY_BYTES};
use browser_shell::session::SessionId;
use browser_shell::GatewayError;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

#[derive(Default)]
struct CountingRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl CommandRunner for CountingRunner {
    async fn run(&self, _argv: &[String], _timeout: Duration) -> Result<ExecutionResult, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionResult {
            exit_code: 0,
            stdout_raw: r#"{"success":true,"data":{"closed":true}}"#.to_string(),
            stderr_raw: String::new(),
            status: ExecStatus::Completed,
        })
    }
}

fn state(runner: Arc<CountingRunner>) -> GatewayState {
    let policy = std::env::temp_dir().join(format!("browser-shell-http-test-{}.json", uuid::Uuid::new_v4()));
    GatewayState::new(Dispatcher::new(runner, Arc::new(StaticResolver::new()), policy))
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn close_call(id: u64) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": "browser-shell", "arguments": {"session_id": "s1", "argv": ["close"]}}
    })
    .to_string()
}

#[tokio::test]
async fn health_reports_running() {
    let app = gateway::build_router(state(Arc::default()));
    let resp = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["runtime"], "running");
    assert_eq!(v["sessions"], 0);
}

#[tokio::test]
async fn post_without_stream_is_conflict_and_spawns_nothing() {
    let runner = Arc::new(CountingRunner::default());
    let app = gateway::build_router(state(runner.clone()));
    let resp = app
        .oneshot(post("/mcp/messages?sessionId=s1", close_call(1)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "no active SSE client for sessionId");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn post_session_and_body_errors_are_bad_request() {
    let st = state(Arc::default());
    let _stream = st.registry.connect(&SessionId::parse("s1").unwrap()).await;
    let app = gateway::build_router(st);

    let resp = app.clone().oneshot(post("/mcp/messages", close_call(1))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post("/mcp/messages?sessionId=bad%20id", close_call(1)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post("/mcp/messages?sessionId=s1", "{not json"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(post("/mcp/messages?sessionId=s1", "[1,2]"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let st = state(Arc::default());
    let _stream = st.registry.connect(&SessionId::parse("s1").unwrap()).await;
    let app = gateway::build_router(st);
    let big = format!("{{\"pad\":\"{}\"}}", "x".repeat(MAX_BODY_BYTES));
    let resp = app.oneshot(post("/mcp/messages?sessionId=s1", big)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn accepted_post_delivers_response_on_stream() {
    let runner = Arc::new(CountingRunner::default());
    let st = state(runner.clone());
    let mut stream = st.registry.connect(&SessionId::parse("s1").unwrap()).await;
    let app = gateway::build_router(st);

    let req = Request::builder()
        .method("POST")
        .uri("/mcp/messages")
        .header("mcp-session-id", "s1")
        .body(Body::from(close_call(9)))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(resp).await, json!({"ok": true}));

    let msg = tokio::time::timeout(Duration::from_secs(5), stream.rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg["id"], 9);
    let text = msg["result"]["content"][0]["text"].as_str().unwrap();
    let shaped: Value = serde_json::from_str(text).unwrap();
    assert_eq!(shaped["exit_code"], 0);
    assert_eq!(shaped["stdout"], "{\"closed\":true}\n");
    assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_path_and_preflight() {
    let app = gateway::build_router(state(Arc::default()));
    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await, json!({"error": "not found"}));

    let resp = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/mcp/messages")
                .header("origin", "http://example.test")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("access-control-allow-origin"));
}

/// Reads SSE bytes until `needle` shows up; `None` if the stream ended first.
async fn read_until<S>(stream: &mut S, buf: &mut String, needle: &str) -> Option<()>
where
    S: futures_util::Stream<Item = reqwest::Result<axum::body::Bytes>> + Unpin,
{
    while !buf.contains(needle) {
        let chunk = stream.next().await?.ok()?;
        buf.push_str(&String::from_utf8_lossy(&chunk));
    }
    Some(())
}

#[tokio::test]
async fn reconnect_replaces_stream_and_only_newest_receives() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let st = state(Arc::default());
    let registry = st.registry.clone();
    tokio::spawn(gateway::serve(listener, st, std::future::pending()));

    let base = format!("http://{}", addr);
    let client = reqwest::Client::new();
    let wait = Duration::from_secs(5);

    let first = client.get(format!("{}/sse?sessionId=s1", base)).send().await.unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);
    let mut first = Box::pin(first.bytes_stream());
    let mut first_buf = String::new();
    tokio::time::timeout(wait, read_until(&mut first, &mut first_buf, "event: ready"))
        .await
        .unwrap()
        .unwrap();
    assert!(first_buf.contains("\"sessionId\":\"s1\""));

    let second = client.get(format!("{}/sse?sessionId=s1", base)).send().await.unwrap();
    let mut second = Box::pin(second.bytes_stream());
    let mut second_buf = String::new();
    tokio::time::timeout(wait, read_until(&mut second, &mut second_buf, "event: ready"))
        .await
        .unwrap()
        .unwrap();

    // The replaced stream ends without delivering anything else.
    let ended = tokio::time::timeout(wait, read_until(&mut first, &mut first_buf, "event: message"))
        .await
        .unwrap();
    assert!(ended.is_none());
    assert_eq!(registry.len().await, 1);

    let resp = client
        .post(format!("{}/mcp/messages?sessionId=s1", base))
        .json(&json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

    tokio::time::timeout(wait, read_until(&mut second, &mut second_buf, "\"name\":\"browser-shell\""))
        .await
        .unwrap()
        .unwrap();
    assert!(second_buf.contains("event: message"));
}
