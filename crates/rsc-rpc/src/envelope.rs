//! Wire envelope for tool calls
//!
//! Responses are `{data, error?}`. A failed call is any non-2xx status, a
//! populated `error`, or `data.isError`. Messages are extracted from
//! `data.structuredContent` first, then the first `content[].text` block.

use rsc_core::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::connection::Connection;

/// Fixed meta-tool that proxies a call through a `Connection`
pub const CALL_CONNECTION_TOOL: &str = "CALL_CONNECTION_TOOL";

/// Response envelope of every tool call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl CallEnvelope {
    pub fn success(data: Value) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// Failure envelope carrying the message in every place a client looks
    pub fn failure(err: &Error) -> Self {
        let message = err.to_string();
        let detail = json!({"kind": err.kind(), "message": message});
        Self {
            data: Some(json!({
                "isError": true,
                "structuredContent": detail,
                "content": [{"type": "text", "text": message}],
            })),
            error: Some(detail),
        }
    }

    /// True when the envelope reports a failure
    pub fn is_error(&self) -> bool {
        let error_populated = self.error.as_ref().is_some_and(|e| !e.is_null());
        let data_flagged = self
            .data
            .as_ref()
            .and_then(|d| d.get("isError"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        error_populated || data_flagged
    }

    /// Machine-readable kind of a failure written by `failure`
    pub fn error_kind(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.get("kind"))
            .and_then(Value::as_str)
    }

    /// Best-effort human-readable failure message
    pub fn message(&self) -> Option<String> {
        if let Some(data) = &self.data {
            if let Some(structured) = data.get("structuredContent") {
                if let Some(msg) = message_from(structured) {
                    return Some(msg);
                }
            }
            let first_text = data
                .get("content")
                .and_then(Value::as_array)
                .and_then(|blocks| blocks.iter().find_map(|b| b.get("text")?.as_str()));
            if let Some(text) = first_text {
                return Some(text.to_string());
            }
        }
        self.error.as_ref().and_then(message_from)
    }
}

fn message_from(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

/// Body of a connection-proxied call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEnvelope {
    pub connection: Connection,
    pub params: ProxyParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}
