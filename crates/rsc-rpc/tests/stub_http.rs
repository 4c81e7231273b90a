//! Stub client against a live axum executor

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rsc_binder::{BinderSet, ToolBinder};
use rsc_core::{CallContext, Error, CORRELATION_HEADER};
use rsc_rpc::{Connection, RpcStub, StubConfig, TransportOptions, CALL_CONNECTION_TOOL};
use serde_json::{json, Value};
use std::time::Duration;

async fn call_handler(
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let correlation = headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match name.as_str() {
        "ECHO" => (
            StatusCode::OK,
            Json(json!({"data": {"args": body, "correlation": correlation, "auth": auth}})),
        ),
        "MISSING" => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "data": {"isError": true, "structuredContent": {"message": "no such thing"}},
                "error": {"message": "no such thing"}
            })),
        ),
        "ABSENT" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"kind": "not_found", "message": "File /x.txt"}})),
        ),
        "RETIRED" => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"kind": "unknown_tool", "message": "RETIRED"}})),
        ),
        "SOFT_FAIL" => (
            StatusCode::OK,
            Json(json!({"data": {"isError": true, "content": [{"type": "text", "text": "soft failure"}]}})),
        ),
        "NO_DATA" => (StatusCode::OK, Json(json!({"result": 1}))),
        "SLOW" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (StatusCode::OK, Json(json!({"data": null})))
        }
        CALL_CONNECTION_TOOL => (
            StatusCode::OK,
            Json(json!({"data": {"structuredContent": {
                "connection": body["connection"],
                "name": body["params"]["name"],
                "arguments": body["params"]["arguments"],
            }}})),
        ),
        _ => (StatusCode::NOT_FOUND, Json(json!({"error": "unknown tool"}))),
    }
}

async fn list_handler() -> Json<Value> {
    Json(json!({"data": {"tools": [
        {"name": "ECHO", "inputSchema": {"type": "object"}},
        {"name": "MISSING", "inputSchema": {"type": "object"}}
    ]}}))
}

async fn spawn_executor() -> String {
    let app = Router::new()
        .route("/tools/call/:name", post(call_handler))
        .route("/tools", get(list_handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn binders() -> BinderSet {
    BinderSet::new(
        ["ECHO", "MISSING", "ABSENT", "RETIRED", "SOFT_FAIL", "NO_DATA", "SLOW"]
            .into_iter()
            .map(ToolBinder::new)
            .collect(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_direct_call_sends_args_and_correlation() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base).token("secret"))).unwrap();
    let ctx = CallContext::new().with_correlation_id("corr-42");

    let data = stub.invoke(&ctx, "ECHO", json!({"a": 1})).await.unwrap();
    assert_eq!(data["args"], json!({"a": 1}));
    assert_eq!(data["correlation"], "corr-42");
    assert_eq!(data["auth"], "Bearer secret");
}

#[tokio::test]
async fn test_fresh_correlation_id_when_not_supplied() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    let ctx = CallContext::new();
    let data = stub.invoke(&ctx, "ECHO", json!({})).await.unwrap();
    assert_eq!(data["correlation"], ctx.correlation_id.as_str());
    assert!(!ctx.correlation_id.is_empty());
}

#[tokio::test]
async fn test_non_2xx_raises_transport_with_message() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    let ctx = CallContext::new().with_correlation_id("c-404");

    match stub.invoke(&ctx, "MISSING", json!({})).await.unwrap_err() {
        Error::Transport { status, message, correlation_id } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such thing");
            assert_eq!(correlation_id, "c-404");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_remote_error_kind_is_preserved() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    let ctx = CallContext::new();

    match stub.invoke(&ctx, "ABSENT", json!({})).await.unwrap_err() {
        Error::NotFound(message) => assert_eq!(message, "File /x.txt"),
        other => panic!("unexpected {:?}", other),
    }
    match stub.invoke(&ctx, "RETIRED", json!({})).await.unwrap_err() {
        Error::UnknownTool(name) => assert_eq!(name, "RETIRED"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_is_error_on_2xx_is_failure() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    match stub.invoke(&CallContext::new(), "SOFT_FAIL", json!({})).await.unwrap_err() {
        Error::Transport { status, message, .. } => {
            assert_eq!(status, 200);
            assert_eq!(message, "soft failure");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_data_is_protocol_error() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    let err = stub.invoke(&CallContext::new(), "NO_DATA", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[tokio::test]
async fn test_connection_proxy_wraps_and_unwraps() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(
        binders(),
        StubConfig::via(TransportOptions::new(&base), Connection::local("billing")),
    )
    .unwrap();

    let data = stub.invoke(&CallContext::new(), "ECHO", json!({"x": true})).await.unwrap();
    assert_eq!(data["name"], "ECHO");
    assert_eq!(data["arguments"], json!({"x": true}));
    assert_eq!(data["connection"], json!({"type": "local-name", "id": "billing"}));
}

#[tokio::test]
async fn test_spawned_call_can_be_cancelled() {
    let base = spawn_executor().await;
    let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    let pending = stub.spawn_invoke(&CallContext::new(), "SLOW", json!({}));
    tokio::time::sleep(Duration::from_millis(50)).await;
    pending.cancel();
    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
}

#[tokio::test]
async fn test_verify_contract_against_remote_list() {
    let base = spawn_executor().await;
    let ctx = CallContext::new();

    let satisfied = RpcStub::new(
        BinderSet::new(vec![ToolBinder::new("ECHO"), ToolBinder::new("OTHER").optional()]).unwrap(),
        StubConfig::direct(TransportOptions::new(&base)),
    )
    .unwrap();
    assert!(satisfied.verify_contract(&ctx).await.unwrap());

    let unsatisfied = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new(&base))).unwrap();
    assert!(!unsatisfied.verify_contract(&ctx).await.unwrap());
}
