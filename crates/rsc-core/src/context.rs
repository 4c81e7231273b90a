//! Call Context - explicit per-call state
//!
//! Every externally-triggered entry point (HTTP handler, actor message,
//! CLI command) builds a `CallContext` and passes it down explicitly.
//! It carries:
//! - Correlation id, propagated on outbound calls
//! - Caller identity and auth token
//! - Inbound request headers
//! - The execution environment (string-keyed settings)

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Header used to carry the correlation id on every tool call
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Per-call context, scoped to one request or invocation
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Correlation id for tracing a call across hops
    pub correlation_id: String,
    /// Identity of the caller (used for audit fields)
    pub caller: Option<String>,
    /// Bearer token presented by the caller
    pub token: Option<String>,
    /// Inbound request headers, lower-cased names
    headers: HashMap<String, String>,
    /// Execution environment shared by all calls of one host
    environment: Arc<HashMap<String, String>>,
    /// When the call entered this process
    pub started_at: DateTime<Utc>,
}

impl CallContext {
    /// Create a context with a fresh correlation id
    pub fn new() -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            caller: None,
            token: None,
            headers: HashMap::new(),
            environment: Arc::new(HashMap::new()),
            started_at: Utc::now(),
        }
    }

    /// Use a caller-supplied correlation id (empty ids are ignored)
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.trim().is_empty() {
            self.correlation_id = id;
        }
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_environment(mut self, environment: Arc<HashMap<String, String>>) -> Self {
        self.environment = environment;
        self
    }

    /// Look up an inbound header (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Look up an environment setting
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }

    /// Caller identity, or `"anonymous"`
    pub fn caller_or_anonymous(&self) -> &str {
        self.caller.as_deref().unwrap_or("anonymous")
    }

    /// Context for work spawned on behalf of this call.
    ///
    /// Keeps identity, environment and correlation id; drops inbound headers.
    pub fn detached(&self) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            caller: self.caller.clone(),
            token: self.token.clone(),
            headers: HashMap::new(),
            environment: Arc::clone(&self.environment),
            started_at: Utc::now(),
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
