//! RPC Stub Client
//!
//! Turns named-operation calls into HTTP requests against a uniform
//! tool-call endpoint: one call, one `POST {base}/tools/call/{name}`.
//! With a `Connection` configured, calls are wrapped into a
//! `CALL_CONNECTION_TOOL` envelope and unwrapped from `structuredContent`.
//! No retries and no batching.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use rsc_binder::{BinderSet, BindingClient, ToolDefinition};
use rsc_core::{CallContext, Error, Result, CORRELATION_HEADER};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::ConnectionSource;
use crate::envelope::{CallEnvelope, CALL_CONNECTION_TOOL};

/// Direct transport options
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// Base URL of the tool executor, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Extra headers sent on every call
    pub headers: HashMap<String, String>,
    /// Bearer token; falls back to the call context's token
    pub token: Option<String>,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl TransportOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: HashMap::new(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Stub configuration: where to send calls, and optionally through which connection
#[derive(Debug, Clone)]
pub struct StubConfig {
    pub transport: TransportOptions,
    pub connection: Option<ConnectionSource>,
}

impl StubConfig {
    pub fn direct(transport: TransportOptions) -> Self {
        Self {
            transport,
            connection: None,
        }
    }

    pub fn via(transport: TransportOptions, connection: impl Into<ConnectionSource>) -> Self {
        Self {
            transport,
            connection: Some(connection.into()),
        }
    }
}

/// Client for one binder set against one executor
#[derive(Clone)]
pub struct RpcStub {
    binders: BinderSet,
    config: StubConfig,
    http_client: reqwest::Client,
}

impl RpcStub {
    pub fn new(binders: BinderSet, config: StubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.transport.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| Error::construction(format!("Invalid header name: {}", name)))?,
                HeaderValue::from_str(value)
                    .map_err(|_| Error::construction(format!("Invalid header value for {}", name)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.transport.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::construction(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            binders,
            config,
            http_client,
        })
    }

    pub fn binders(&self) -> &BinderSet {
        &self.binders
    }

    pub fn base_url(&self) -> &str {
        &self.config.transport.base_url
    }

    /// Invoke a bound operation by name
    pub async fn invoke(&self, ctx: &CallContext, name: &str, arguments: Value) -> Result<Value> {
        if !self.binders.contains(name) {
            return Err(Error::UnknownTool(name.to_string()));
        }

        match &self.config.connection {
            None => {
                let data = self.post(ctx, name, &arguments).await?;
                Ok(data)
            }
            Some(source) => {
                let connection = source.connection().await?;
                debug!(tool = %name, via = connection.kind(), "Proxying call through connection");
                let body = json!({
                    "connection": connection,
                    "params": {"name": name, "arguments": arguments},
                });
                let data = self.post(ctx, CALL_CONNECTION_TOOL, &body).await?;
                data.get("structuredContent").cloned().ok_or_else(|| {
                    Error::protocol(format!(
                        "Proxied call to '{}' returned no structuredContent",
                        name
                    ))
                })
            }
        }
    }

    /// Invoke with typed arguments and result
    pub async fn invoke_typed<I, O>(&self, ctx: &CallContext, name: &str, arguments: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let data = self.invoke(ctx, name, serde_json::to_value(arguments)?).await?;
        serde_json::from_value(data).map_err(|e| {
            Error::protocol(format!("Unexpected result shape from '{}': {}", name, e))
        })
    }

    /// Start a call in the background; the returned handle can abort it
    pub fn spawn_invoke(&self, ctx: &CallContext, name: &str, arguments: Value) -> PendingCall {
        let stub = self.clone();
        let ctx = ctx.clone();
        let name = name.to_string();
        let correlation_id = ctx.correlation_id.clone();
        let handle = tokio::spawn(async move { stub.invoke(&ctx, &name, arguments).await });
        PendingCall {
            handle,
            correlation_id,
        }
    }

    /// Tool definitions advertised by the executor (`GET {base}/tools`)
    pub async fn list_tools(&self, ctx: &CallContext) -> Result<Vec<ToolDefinition>> {
        let url = format!("{}/tools", self.config.transport.base_url);
        let request = self.authorize(self.http_client.get(&url), ctx);
        let data = self.send(request, ctx).await?;
        let tools = data.get("tools").cloned().unwrap_or_else(|| json!([]));
        serde_json::from_value(tools)
            .map_err(|e| Error::protocol(format!("Malformed tool list: {}", e)))
    }

    /// True iff the executor implements every required binder of this stub
    pub async fn verify_contract(&self, ctx: &CallContext) -> Result<bool> {
        let remote = self.list_tools(ctx).await?;
        let client = BindingClient::new(self.binders.clone());
        let missing = client.missing(remote.iter().map(|t| t.name.as_str()));
        if !missing.is_empty() {
            warn!(missing = ?missing, base = %self.base_url(), "Executor does not satisfy contract");
        }
        Ok(missing.is_empty())
    }

    async fn post(&self, ctx: &CallContext, name: &str, body: &Value) -> Result<Value> {
        let url = format!("{}/tools/call/{}", self.config.transport.base_url, name);
        debug!(tool = %name, correlation_id = %ctx.correlation_id, "Calling remote tool");
        let request = self.authorize(self.http_client.post(&url).json(body), ctx);
        self.send(request, ctx).await
    }

    fn authorize(&self, request: reqwest::RequestBuilder, ctx: &CallContext) -> reqwest::RequestBuilder {
        let request = request.header(CORRELATION_HEADER, ctx.correlation_id.as_str());
        match self.config.transport.token.as_ref().or(ctx.token.as_ref()) {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, ctx: &CallContext) -> Result<Value> {
        let correlation_id = ctx.correlation_id.clone();
        let transport_error = |status: u16, message: String| Error::Transport {
            status,
            message,
            correlation_id: correlation_id.clone(),
        };

        let response = request.send().await.map_err(|e| {
            transport_error(e.status().map(|s| s.as_u16()).unwrap_or(0), e.to_string())
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(status.as_u16(), e.to_string()))?;
        let envelope = serde_json::from_str::<CallEnvelope>(&text);

        if !status.is_success() {
            let envelope = envelope.ok();
            let message = envelope
                .as_ref()
                .and_then(CallEnvelope::message)
                .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| status.to_string());
            return Err(match envelope.as_ref().and_then(CallEnvelope::error_kind) {
                Some("not_found") => Error::NotFound(message),
                Some("unknown_tool") => Error::UnknownTool(message),
                _ => transport_error(status.as_u16(), message),
            });
        }

        let envelope = envelope
            .map_err(|e| Error::protocol(format!("Response is not a call envelope: {}", e)))?;
        if envelope.is_error() {
            let message = envelope
                .message()
                .unwrap_or_else(|| "Remote tool reported an error".to_string());
            return Err(transport_error(status.as_u16(), message));
        }

        envelope
            .data
            .ok_or_else(|| Error::protocol("Response envelope has no data field"))
    }
}

/// A call running in the background
pub struct PendingCall {
    handle: JoinHandle<Result<Value>>,
    correlation_id: String,
}

impl PendingCall {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Abort the in-flight request (transport-level abort)
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the result; yields `Cancelled` if the call was aborted
    pub async fn wait(self) -> Result<Value> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(Error::Cancelled(format!(
                "Call {} was cancelled",
                self.correlation_id
            ))),
            Err(e) => Err(Error::internal(format!("Call task failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsc_binder::ToolBinder;

    fn binders() -> BinderSet {
        BinderSet::new(vec![ToolBinder::new("PING")]).unwrap()
    }

    #[test]
    fn test_base_url_normalized() {
        let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new("http://h:1/"))).unwrap();
        assert_eq!(stub.base_url(), "http://h:1");
    }

    #[test]
    fn test_bad_header_fails_construction() {
        let options = TransportOptions::new("http://h").header("bad header", "v");
        let err = RpcStub::new(binders(), StubConfig::direct(options)).err().unwrap();
        assert!(matches!(err, Error::Construction(_)));
    }

    #[tokio::test]
    async fn test_unbound_name_fails_before_io() {
        let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new("http://127.0.0.1:1"))).unwrap();
        let err = stub.invoke(&CallContext::new(), "NOPE", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_network_failure_is_transport() {
        let stub = RpcStub::new(binders(), StubConfig::direct(TransportOptions::new("http://127.0.0.1:1"))).unwrap();
        let ctx = CallContext::new().with_correlation_id("corr-1");
        let err = stub.invoke(&ctx, "PING", json!({})).await.unwrap_err();
        match err {
            Error::Transport { correlation_id, .. } => assert_eq!(correlation_id, "corr-1"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
