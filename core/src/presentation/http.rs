// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Streamable HTTP transport: JSON-RPC 2.0 over POST and SSE over GET
//! on the same `/sbp` endpoint, plus `/health` and the REST aliases.
//!
//! The transport borrows read access to the engine through its public
//! operations and never mutates engine state directly; subscriber
//! records live here, keyed by session.

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Context as _;
use axum::body::Bytes;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::blackboard::Blackboard;
use crate::domain::error::BlackboardError;
use crate::domain::ops::{
    DeregisterScentParams, EmitParams, EvaporateParams, InspectParams, RegisterScentParams,
    SniffParams,
};
use crate::infrastructure::clock::SystemClock;
use crate::presentation::middleware::{ApiKeyValidator, RateLimiter};
use crate::presentation::rpc::{
    parse_envelope, JsonRpcError, JsonRpcResponse, METHOD_NOT_FOUND, PARSE_ERROR, RATE_LIMITED,
    SCENT_NOT_FOUND, UNAUTHORIZED,
};
use crate::presentation::session::{
    Session, SessionManager, AGENT_HEADER, PROTOCOL_HEADER, PROTOCOL_VERSION, SESSION_HEADER,
};
use crate::presentation::sse::{SseFrame, SseTriggerFanout, SubscriberRegistry};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Enables the auth hook when non-empty.
    pub api_keys: Vec<String>,
    /// Enables the rate-limit hook: requests per minute per agent.
    pub rate_limit_per_minute: Option<u32>,
    /// Per-session SSE replay ring size.
    pub sse_ring_capacity: usize,
    pub keepalive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            api_keys: vec![],
            rate_limit_per_minute: None,
            sse_ring_capacity: 256,
            keepalive_secs: 30,
        }
    }
}

pub struct AppState {
    blackboard: Arc<Blackboard>,
    sessions: SessionManager,
    registry: Arc<SubscriberRegistry>,
    fanout: Arc<SseTriggerFanout>,
    auth: Option<ApiKeyValidator>,
    rate: Option<RateLimiter>,
    keepalive_secs: u64,
}

/// Build the router. POST and GET share the `/sbp` path; the REST
/// aliases map onto the same dispatch.
pub fn app(blackboard: Arc<Blackboard>, config: &ServerConfig) -> Router {
    let registry = Arc::new(SubscriberRegistry::new(config.sse_ring_capacity));
    let state = Arc::new(AppState {
        blackboard,
        sessions: SessionManager::new(Arc::new(SystemClock)),
        fanout: Arc::new(SseTriggerFanout::new(registry.clone())),
        registry,
        auth: (!config.api_keys.is_empty()).then(|| ApiKeyValidator::new(config.api_keys.clone())),
        rate: config.rate_limit_per_minute.map(RateLimiter::per_minute),
        keepalive_secs: config.keepalive_secs,
    });

    Router::new()
        .route("/sbp", post(post_rpc).get(get_sse))
        .route("/health", get(health))
        .route("/emit", post(rest_emit))
        .route("/sniff", post(rest_sniff))
        .route("/register_scent", post(rest_register_scent))
        .route("/deregister_scent", post(rest_deregister_scent))
        .route("/evaporate", post(rest_evaporate))
        .route("/inspect", post(rest_inspect))
        .layer(middleware::from_fn_with_state(state.clone(), guard))
        .with_state(state)
}

/// Bind and run until the token cancels.
pub async fn serve(
    blackboard: Arc<Blackboard>,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let router = app(blackboard, &config);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    info!(%addr, "blackboard listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .context("HTTP server failed")
}

// ============================================================================
// Middleware: auth and rate limiting, before dispatch
// ============================================================================

async fn guard(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    if request.method() == Method::GET && request.uri().path() == "/health" {
        return next.run(request).await;
    }

    if let Some(auth) = &state.auth {
        let supplied = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !auth.validate(supplied) {
            return error_response(
                StatusCode::UNAUTHORIZED,
                JsonRpcError::new(UNAUTHORIZED, "unauthorized"),
            );
        }
    }

    if let Some(limiter) = &state.rate {
        let key = header_str(request.headers(), AGENT_HEADER)
            .map(String::from)
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip().to_string())
            })
            .unwrap_or_else(|| "anonymous".into());

        if let Err(retry_after_ms) = limiter.check_at(&key, state.blackboard.now_ms()) {
            let mut response = error_response(
                StatusCode::TOO_MANY_REQUESTS,
                JsonRpcError::with_data(
                    RATE_LIMITED,
                    "rate limited",
                    json!({ "retry_after_ms": retry_after_ms }),
                ),
            );
            let retry_secs = (retry_after_ms as f64 / 1000.0).ceil() as u64;
            if let Ok(value) = HeaderValue::from_str(&retry_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }
    }

    next.run(request).await
}

fn error_response(status: StatusCode, error: JsonRpcError) -> Response {
    (status, Json(JsonRpcResponse::error(None, error))).into_response()
}

// ============================================================================
// POST /sbp
// ============================================================================

async fn post_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session = resolve_session(&state, &headers);

    if let Some(version) = header_str(&headers, PROTOCOL_HEADER) {
        if version != PROTOCOL_VERSION {
            warn!(version, "client speaks a different protocol version");
        }
    }

    let body_value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            let response = JsonRpcResponse::error(
                None,
                JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
            );
            return rpc_response(StatusCode::BAD_REQUEST, &session, response);
        }
    };

    let envelope = match parse_envelope(&body_value) {
        Ok(envelope) => envelope,
        Err(error) => {
            return rpc_response(StatusCode::OK, &session, JsonRpcResponse::error(None, error));
        }
    };

    let response = match dispatch_method(&state, &session, &envelope.method, envelope.params).await
    {
        Ok(result) => JsonRpcResponse::result(envelope.id, result),
        Err(error) => JsonRpcResponse::error(Some(envelope.id), error),
    };
    rpc_response(StatusCode::OK, &session, response)
}

#[derive(Debug, Deserialize)]
struct SubscribeParams {
    scent_id: String,
}

async fn dispatch_method(
    state: &AppState,
    session: &Session,
    method: &str,
    params: Value,
) -> Result<Value, JsonRpcError> {
    match method {
        "sbp/emit" => {
            let params: EmitParams = parse_params(params)?;
            to_result(state.blackboard.emit(params))
        }
        "sbp/sniff" => {
            let params: SniffParams = parse_params(params)?;
            to_result(state.blackboard.sniff(params))
        }
        "sbp/register_scent" => {
            let params: RegisterScentParams = parse_params(params)?;
            to_result(state.blackboard.register_scent(params))
        }
        "sbp/deregister_scent" => {
            let params: DeregisterScentParams = parse_params(params)?;
            to_result(state.blackboard.deregister_scent(&params.scent_id))
        }
        "sbp/evaporate" => {
            let params: EvaporateParams = parse_params(params)?;
            to_result(state.blackboard.evaporate(params))
        }
        "sbp/inspect" => {
            let params: InspectParams = parse_params(params)?;
            to_result(state.blackboard.inspect(params))
        }
        "sbp/subscribe" => {
            let params: SubscribeParams = parse_params(params)?;
            if !state.blackboard.has_scent(&params.scent_id) {
                return Err(JsonRpcError::new(
                    SCENT_NOT_FOUND,
                    format!("unknown scent: {}", params.scent_id),
                ));
            }
            state.registry.bind(&session.session_id, &params.scent_id);
            state
                .blackboard
                .on_trigger(&params.scent_id, state.fanout.clone())
                .map_err(engine_error)?;
            Ok(json!({ "scent_id": params.scent_id, "status": "subscribed" }))
        }
        "sbp/unsubscribe" => {
            let params: SubscribeParams = parse_params(params)?;
            let remaining = state.registry.unbind(&session.session_id, &params.scent_id);
            if remaining == 0 {
                state
                    .blackboard
                    .off_trigger(&params.scent_id)
                    .map_err(engine_error)?;
            }
            Ok(json!({ "scent_id": params.scent_id, "status": "unsubscribed" }))
        }
        other => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_result<T: serde::Serialize>(result: Result<T, BlackboardError>) -> Result<Value, JsonRpcError> {
    let value = result.map_err(engine_error)?;
    serde_json::to_value(value)
        .map_err(|e| JsonRpcError::new(crate::presentation::rpc::INTERNAL_ERROR, e.to_string()))
}

fn engine_error(error: BlackboardError) -> JsonRpcError {
    JsonRpcError::new(error.code(), error.to_string())
}

// ============================================================================
// GET /sbp (SSE)
// ============================================================================

async fn get_sse(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let accept = header_str(&headers, "accept").unwrap_or("");
    if !accept.contains("text/event-stream") {
        return StatusCode::NOT_ACCEPTABLE.into_response();
    }

    let session = resolve_session(&state, &headers);
    let last_event_id = header_str(&headers, "last-event-id").and_then(|v| v.parse::<u64>().ok());

    let (client_id, rx) =
        state
            .registry
            .connect(&session.session_id, HashSet::new(), last_event_id);

    let stream = ClientStream {
        rx: ReceiverStream::new(rx),
        registry: state.registry.clone(),
        client_id,
    };

    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(state.keepalive_secs))
            .text("keepalive"),
    );

    let mut response = sse.into_response();
    attach_session(&mut response, &session);
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

/// SSE stream that unregisters its subscriber record when the client
/// goes away.
struct ClientStream {
    rx: ReceiverStream<SseFrame>,
    registry: Arc<SubscriberRegistry>,
    client_id: uuid::Uuid,
}

impl Stream for ClientStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_next(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(Event::default()
                .event("message")
                .id(frame.event_id.to_string())
                .data(frame.data)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        self.registry.disconnect(&self.client_id);
    }
}

// ============================================================================
// GET /health
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let mut body = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "transport": "streamable-http-sse",
        "sessions": state.sessions.count(),
        "subscribers": state.registry.subscriber_count(),
    });
    if let Ok(stats) = state.blackboard.stats() {
        body["total_pheromones"] = json!(stats.total_pheromones);
        body["active_pheromones"] = json!(stats.active_pheromones);
        body["scent_count"] = json!(stats.scent_count);
        body["uptime_ms"] = json!(stats.uptime_ms);
    }
    Json(body).into_response()
}

// ============================================================================
// REST aliases
// ============================================================================

async fn rest_emit(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    rest_call(state.0, headers, body, "sbp/emit").await
}

async fn rest_sniff(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    rest_call(state.0, headers, body, "sbp/sniff").await
}

async fn rest_register_scent(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    rest_call(state.0, headers, body, "sbp/register_scent").await
}

async fn rest_deregister_scent(
    state: State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    rest_call(state.0, headers, body, "sbp/deregister_scent").await
}

async fn rest_evaporate(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    rest_call(state.0, headers, body, "sbp/evaporate").await
}

async fn rest_inspect(state: State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    rest_call(state.0, headers, body, "sbp/inspect").await
}

async fn rest_call(
    state: Arc<AppState>,
    headers: HeaderMap,
    body: Bytes,
    method: &str,
) -> Response {
    let session = resolve_session(&state, &headers);

    let params: Value = if body.is_empty() {
        json!({})
    } else {
        match serde_json::from_slice(&body) {
            Ok(value) => value,
            Err(e) => {
                let response = JsonRpcResponse::error(
                    None,
                    JsonRpcError::new(PARSE_ERROR, format!("parse error: {e}")),
                );
                return rpc_response(StatusCode::BAD_REQUEST, &session, response);
            }
        }
    };

    let mut response = match dispatch_method(&state, &session, method, params).await {
        Ok(result) => Json(result).into_response(),
        Err(error) => Json(json!({ "error": error })).into_response(),
    };
    attach_session(&mut response, &session);
    response
}

// ============================================================================
// Helpers
// ============================================================================

fn resolve_session(state: &AppState, headers: &HeaderMap) -> Session {
    state.sessions.resolve(
        header_str(headers, SESSION_HEADER),
        header_str(headers, AGENT_HEADER),
    )
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn rpc_response(status: StatusCode, session: &Session, body: JsonRpcResponse) -> Response {
    let mut response = (status, Json(body)).into_response();
    attach_session(&mut response, session);
    response
}

fn attach_session(response: &mut Response, session: &Session) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(SESSION_HEADER.as_bytes()),
        HeaderValue::from_str(&session.session_id),
    ) {
        response.headers_mut().insert(name, value);
    }
}
