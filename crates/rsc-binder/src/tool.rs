//! Executable tools
//!
//! A `Tool` is a binder schema joined with a handler. Handlers receive the
//! explicit `CallContext` of the invocation plus the JSON arguments.

use async_trait::async_trait;
use futures::future::BoxFuture;
use rsc_core::{CallContext, Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::binder::ToolBinder;

/// Core trait for all executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// The binder this tool implements
    fn binder(&self) -> &ToolBinder;

    /// Execute the tool with given input
    async fn execute(&self, ctx: CallContext, input: Value) -> Result<Value>;

    fn name(&self) -> &str {
        &self.binder().name
    }
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;

/// Type-erased async handler
pub type Handler = Arc<dyn Fn(CallContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wrap an async closure over raw JSON as a `Handler`
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx: CallContext, input: Value| -> BoxFuture<'static, Result<Value>> {
        Box::pin(f(ctx, input))
    })
}

/// Wrap a typed async closure as a `Handler`.
///
/// Arguments that fail to deserialize into `I` are rejected as `UserInput`
/// before the closure runs.
pub fn typed_handler<I, O, F, Fut>(f: F) -> Handler
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(CallContext, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |ctx: CallContext, input: Value| -> BoxFuture<'static, Result<Value>> {
        let f = Arc::clone(&f);
        Box::pin(async move {
            let typed: I = serde_json::from_value(input)
                .map_err(|e| Error::user_input(format!("Invalid arguments: {}", e)))?;
            let output = f(ctx, typed).await?;
            Ok(serde_json::to_value(output)?)
        })
    })
}

/// A binder joined with its handler
#[derive(Clone)]
pub struct BoundTool {
    binder: ToolBinder,
    handler: Handler,
}

impl BoundTool {
    pub fn new(binder: ToolBinder, handler: Handler) -> Self {
        Self { binder, handler }
    }
}

#[async_trait]
impl Tool for BoundTool {
    fn binder(&self) -> &ToolBinder {
        &self.binder
    }

    async fn execute(&self, ctx: CallContext, input: Value) -> Result<Value> {
        (self.handler)(ctx, input).await
    }
}
