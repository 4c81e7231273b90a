//! HTTP surface of the tool executor
//!
//! - `POST /tools/call/:name`: one tool call, answered with a `{data, error?}` envelope
//! - `GET /tools`: bound tool definitions
//! - `GET /watch`: file-store change feed as server-sent events
//! - `GET /resources/:type/watch`: resolved resource changes as event-stream frames
//! - `GET /health`

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::{future, StreamExt};
use rsc_binder::{BinderSet, ToolBinder};
use rsc_core::{CallContext, Error, Result, CORRELATION_HEADER};
use rsc_resources::{WatchBridge, WatchConfig, WatchRequest};
use rsc_rpc::{
    CallEnvelope, LookupKind, ProxyEnvelope, ResolvedConnection, RpcStub, StubConfig,
    TransportOptions, CALL_CONNECTION_TOOL,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Header naming the calling principal
pub const CALLER_HEADER: &str = "x-caller";

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(list_tools_handler))
        .route("/tools/call/:name", post(call_tool_handler))
        .route("/watch", get(watch_handler))
        .route("/resources/:resource_type/watch", get(resource_watch_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Per-request context from inbound headers
fn call_context(state: &AppState, headers: &HeaderMap) -> CallContext {
    let mut ctx = CallContext::new().with_environment(Arc::clone(&state.environment));
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), value);
        }
    }
    if let Some(id) = ctx.header(CORRELATION_HEADER).map(String::from) {
        ctx = ctx.with_correlation_id(id);
    }
    if let Some(token) = ctx
        .header(header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
    {
        ctx = ctx.with_token(token);
    }
    if let Some(caller) = ctx.header(CALLER_HEADER).map(String::from) {
        ctx = ctx.with_caller(caller);
    }
    ctx
}

fn with_correlation(mut response: Response, ctx: &CallContext) -> Response {
    if let Ok(value) = HeaderValue::from_str(&ctx.correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

fn envelope_response(ctx: &CallContext, result: Result<Value>) -> Response {
    let response = match result {
        Ok(data) => (StatusCode::OK, Json(CallEnvelope::success(data))).into_response(),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(CallEnvelope::failure(&err))).into_response()
        }
    };
    with_correlation(response, ctx)
}

fn unauthorized(ctx: &CallContext) -> Response {
    let err = Error::user_input("Missing or invalid auth token");
    with_correlation(
        (StatusCode::UNAUTHORIZED, Json(CallEnvelope::failure(&err))).into_response(),
        ctx,
    )
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tools": state.tools.len(),
        "resourceTypes": state.config.resource_types,
    }))
}

/// GET /tools
async fn list_tools_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let ctx = call_context(&state, &headers);
    if !state.accepts(ctx.token.as_deref()) {
        return unauthorized(&ctx);
    }
    let mut tools = state.tools.definitions();
    tools.sort_by(|a, b| a.name.cmp(&b.name));
    envelope_response(&ctx, Ok(json!({ "tools": tools })))
}

/// POST /tools/call/:name
async fn call_tool_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let ctx = call_context(&state, &headers);
    if !state.accepts(ctx.token.as_deref()) {
        warn!(tool = %name, correlation_id = %ctx.correlation_id, "Rejected unauthenticated call");
        return unauthorized(&ctx);
    }

    let result = call_tool(&state, &ctx, &name, &body).await;
    match &result {
        Ok(_) => debug!(tool = %name, correlation_id = %ctx.correlation_id, "Tool call succeeded"),
        Err(e) => warn!(
            tool = %name,
            correlation_id = %ctx.correlation_id,
            kind = e.kind(),
            "Tool call failed: {}",
            e
        ),
    }
    envelope_response(&ctx, result)
}

async fn call_tool(state: &AppState, ctx: &CallContext, name: &str, body: &[u8]) -> Result<Value> {
    let input: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(body)
            .map_err(|e| Error::user_input(format!("Request body is not JSON: {}", e)))?
    };

    if name == CALL_CONNECTION_TOOL {
        let envelope: ProxyEnvelope = serde_json::from_value(input)
            .map_err(|e| Error::user_input(format!("Invalid connection call: {}", e)))?;
        let result = proxy_call(state, ctx, envelope).await?;
        return Ok(json!({ "structuredContent": result }));
    }

    state.tools.call(ctx.clone(), name, input).await
}

/// Route a call through the executor named by its connection
async fn proxy_call(state: &AppState, ctx: &CallContext, envelope: ProxyEnvelope) -> Result<Value> {
    let ProxyEnvelope { connection, params } = envelope;
    debug!(tool = %params.name, via = connection.kind(), "Routing connection call");

    match state.resolver.resolve(&connection) {
        ResolvedConnection::Http { url, headers, token } => {
            let mut transport = TransportOptions::new(url);
            transport.headers = headers;
            transport.token = token;
            let binders = BinderSet::new(vec![ToolBinder::new(params.name.as_str())])?;
            let stub = RpcStub::new(binders, StubConfig::direct(transport))?;
            // The caller's credentials stay here; only the connection's own token travels
            let outbound = CallContext::new().with_correlation_id(ctx.correlation_id.clone());
            stub.invoke(&outbound, &params.name, params.arguments).await
        }
        ResolvedConnection::Websocket { url } => Err(Error::user_input(format!(
            "Websocket connections are not supported ({})",
            url
        ))),
        ResolvedConnection::Lookup {
            kind: LookupKind::LocalName,
            id,
            ..
        } => {
            if !state.is_local(&id) {
                return Err(Error::not_found(format!("Local connection {}", id)));
            }
            state.tools.call(ctx.clone(), &params.name, params.arguments).await
        }
        ResolvedConnection::Lookup {
            kind: LookupKind::Tenant,
            id,
            ..
        } => Err(Error::user_input(format!(
            "Tenant {} cannot be reached: no tenant base URL configured",
            id
        ))),
    }
}

/// Query string of both watch endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchQuery {
    #[serde(default)]
    pub path_filter: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub from_ctime: Option<i64>,
    /// Event-stream clients cannot always set headers
    #[serde(default, rename = "auth-token")]
    pub auth_token: Option<String>,
}

impl WatchQuery {
    fn token<'a>(&'a self, ctx: &'a CallContext) -> Option<&'a str> {
        self.auth_token.as_deref().or(ctx.token.as_deref())
    }
}

/// GET /watch
async fn watch_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = call_context(&state, &headers);
    if !state.accepts(query.token(&ctx)) {
        return unauthorized(&ctx);
    }

    let request = WatchRequest {
        path_filter: query.path_filter.clone(),
        branch: query.branch.clone(),
        from_ctime: query.from_ctime,
    };
    let feed = match state.store.watch(request).await {
        Ok(feed) => feed,
        Err(e) => return envelope_response(&ctx, Err(e)),
    };
    info!(path_filter = %query.path_filter, correlation_id = %ctx.correlation_id, "Watch opened");

    let correlation_id = ctx.correlation_id.clone();
    let events = feed.scan((), move |_, item| {
        let next = match item {
            Ok(change) => Some(Event::default().json_data(&change)),
            Err(e) => {
                warn!(correlation_id = %correlation_id, "Watch feed ended: {}", e);
                None
            }
        };
        future::ready(next)
    });

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)));
    with_correlation(sse.into_response(), &ctx)
}

/// GET /resources/:resource_type/watch
async fn resource_watch_handler(
    State(state): State<Arc<AppState>>,
    Path(resource_type): Path<String>,
    Query(query): Query<WatchQuery>,
    headers: HeaderMap,
) -> Response {
    let ctx = call_context(&state, &headers);
    if !state.accepts(query.token(&ctx)) {
        return unauthorized(&ctx);
    }

    let service = match state.resource(&resource_type) {
        Ok(service) => service,
        Err(e) => return envelope_response(&ctx, Err(e)),
    };
    let config = WatchConfig {
        branch: query.branch,
        from_ctime: query.from_ctime,
        capacity: state.config.watch_capacity,
    };
    let bridge = match WatchBridge::for_service(service, config, ctx.detached()).await {
        Ok(bridge) => bridge,
        Err(e) => return envelope_response(&ctx, Err(e)),
    };
    info!(resource_type = %resource_type, correlation_id = %ctx.correlation_id, "Resource watch opened");

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(bridge.into_frames()));
    match response {
        Ok(response) => with_correlation(response, &ctx),
        Err(e) => envelope_response(&ctx, Err(Error::internal(e.to_string()))),
    }
}
