//! HTTP transport: `POST /mcp/messages` submits a request, `GET /sse` delivers responses.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::CorsLayer;

use crate::config::{self, Config};
use crate::gateway::dispatch::Dispatcher;
use crate::gateway::registry::{SessionRegistry, StreamHandle};
use crate::session::SessionId;

/// Largest accepted POST body.
pub const MAX_BODY_BYTES: usize = 1_000_000;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Checked in order; the first present header wins over any query parameter.
const SESSION_HEADERS: &[&str] = &["mcp-session-id", "x-mcp-session-id", "x-session-id"];
const SESSION_QUERY_KEYS: &[&str] = &["sessionId", "session_id", "session"];

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Dispatcher,
    pub registry: SessionRegistry,
}

impl GatewayState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            registry: SessionRegistry::new(),
        }
    }
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

/// Router with every route, CORS, and the body limit. Usable without a listener.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/sse", get(sse_handler))
        .route("/mcp/messages", post(post_message))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Refuse non-loopback binds unless `gateway.allowRemote` is set, then serve until SIGINT/SIGTERM.
pub async fn run_http(config: &Config, policy_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim();
    if !config::is_loopback_bind(bind) {
        if !config.gateway.allow_remote {
            anyhow::bail!(
                "refusing to bind to {} (not loopback); set gateway.allowRemote to expose this gateway",
                bind
            );
        }
        log::warn!("binding to non-loopback address {}; the gateway has no authentication", bind);
    }

    let state = GatewayState::new(Dispatcher::from_config(config, policy_path));
    let bind_addr = if bind.contains(':') && !bind.starts_with('[') {
        format!("[{}]:{}", bind, config.gateway.port)
    } else {
        format!("{}:{}", bind, config.gateway.port)
    };
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    serve(listener, state, shutdown_signal()).await?;
    log::info!("gateway stopped");
    Ok(())
}

/// Serve on an already bound listener until `shutdown` completes; open event streams are closed then.
pub async fn serve<F>(listener: TcpListener, state: GatewayState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            let n = registry.close_all().await;
            log::info!("shutting down, closed {} event stream(s)", n);
        })
        .await
        .context("gateway server exited")
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("installing Ctrl+C handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("installing SIGTERM handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received");
}

/// Session id from the first known header, else the first known query parameter.
fn session_from_request(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<SessionId, ApiError> {
    let from_header = SESSION_HEADERS
        .iter()
        .find_map(|h| headers.get(*h).and_then(|v| v.to_str().ok()))
        .filter(|s| !s.is_empty());
    let raw = from_header
        .or_else(|| {
            SESSION_QUERY_KEYS
                .iter()
                .find_map(|k| query.get(*k).map(String::as_str))
                .filter(|s| !s.is_empty())
        })
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "missing sessionId"))?;
    SessionId::parse(raw).map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "runtime": "running",
        "sessions": state.registry.len().await,
    }))
}

async fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /sse opens the session's event stream, replacing any previous one.
async fn sse_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = session_from_request(&headers, &query)?;
    let StreamHandle { rx, guard } = state.registry.connect(&session).await;

    let ready = Event::default()
        .event("ready")
        .data(json!({ "sessionId": session.as_str() }).to_string());
    let messages = ReceiverStream::new(rx).map(move |msg| {
        // The guard lives as long as the stream; dropping it unregisters the session.
        let _guard = &guard;
        Ok(Event::default().event("message").data(msg.to_string()))
    });
    let events = stream::once(async move { Ok::<_, Infallible>(ready) }).chain(messages);

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .event(Event::default().event("ping").data("{}")),
    ))
}

/// POST /mcp/messages accepts one JSON-RPC request; the response goes out on the session's stream.
async fn post_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let session = match session_from_request(&headers, &query) {
        Ok(s) => s,
        Err(e) => return e.into_response(),
    };
    let msg: Value = match serde_json::from_slice(&body) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => {
            return api_error(StatusCode::BAD_REQUEST, "body must be a JSON-RPC request object")
                .into_response()
        }
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid JSON body").into_response(),
    };
    if !state.registry.is_connected(&session).await {
        return api_error(StatusCode::CONFLICT, "no active SSE client for sessionId").into_response();
    }

    let GatewayState {
        dispatcher,
        registry,
    } = state;
    tokio::spawn(async move {
        let Some(resp) = dispatcher.handle(&msg).await else {
            return;
        };
        if !registry.send(&session, resp).await {
            log::warn!("session {}: no event stream at delivery time, response dropped", session);
        }
    });

    (StatusCode::ACCEPTED, Json(json!({ "ok": true }))).into_response()
}
