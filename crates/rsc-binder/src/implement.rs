//! Implementation Binder
//!
//! Merges a `BinderSet` with caller-supplied handlers:
//! - optional binder without a handler: skipped
//! - required binder without a handler: construction fails
//! - otherwise: binder + handler become an executable tool

use rsc_core::{CallContext, Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::binder::{BinderSet, ToolBinder};
use crate::tool::{BoundTool, BoxedTool, Handler};

/// Handlers keyed by binder name
#[derive(Clone, Default)]
pub struct Implementations {
    handlers: HashMap<String, Handler>,
}

impl Implementations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, handler: Handler) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

/// Bind handlers to a schema set
pub fn implement(binders: &BinderSet, implementations: Implementations) -> Result<ToolSet> {
    let mut handlers = implementations.handlers;
    let mut tools: BTreeMap<String, BoxedTool> = BTreeMap::new();

    for binder in binders.iter() {
        match handlers.remove(&binder.name) {
            Some(handler) => {
                tools.insert(
                    binder.name.clone(),
                    Arc::new(BoundTool::new(binder.clone(), handler)),
                );
            }
            None if binder.optional => {
                debug!(tool = %binder.name, "Optional binder left unimplemented");
            }
            None => {
                return Err(Error::construction(format!(
                    "Missing implementation for required tool '{}'",
                    binder.name
                )));
            }
        }
    }

    for extra in handlers.keys() {
        warn!(tool = %extra, "Implementation supplied for unknown binder, ignoring");
    }

    Ok(ToolSet { tools })
}

/// Executable tools keyed by name
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: BTreeMap<String, BoxedTool>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an already-built tool; names must stay unique
    pub fn insert(&mut self, tool: BoxedTool) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::construction(format!("Duplicate tool name: {}", name)));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Union of two tool sets
    pub fn merge(mut self, other: ToolSet) -> Result<Self> {
        for tool in other.tools.into_values() {
            self.insert(tool)?;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Binders of every implemented tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolBinder> {
        self.tools.values().map(|t| t.binder().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name
    pub async fn call(&self, ctx: CallContext, name: &str, input: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;
        debug!(tool = %name, correlation_id = %ctx.correlation_id, "Executing tool");
        tool.execute(ctx, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::handler;
    use serde_json::json;

    fn schema() -> BinderSet {
        BinderSet::new(vec![
            ToolBinder::new("GET"),
            ToolBinder::new("PUT").optional(),
        ])
        .unwrap()
    }

    #[test]
    fn test_missing_required_fails() {
        let err = implement(&schema(), Implementations::new()).err().unwrap();
        assert!(matches!(err, Error::Construction(ref m) if m.contains("GET")));
    }

    #[tokio::test]
    async fn test_optional_skipped() {
        let tools = implement(
            &schema(),
            Implementations::new().with("GET", handler(|_, _| async { Ok(json!(1)) })),
        )
        .unwrap();
        assert!(tools.contains("GET"));
        assert!(!tools.contains("PUT"));

        let out = tools.call(CallContext::new(), "GET", json!({})).await.unwrap();
        assert_eq!(out, json!(1));

        let err = tools.call(CallContext::new(), "PUT", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(_)));
    }

    #[test]
    fn test_merge_rejects_duplicates() {
        let make = || {
            implement(
                &schema(),
                Implementations::new().with("GET", handler(|_, _| async { Ok(json!(null)) })),
            )
            .unwrap()
        };
        assert!(make().merge(make()).is_err());
    }
}
