//! rsc-server: the remote tool executor
//!
//! Serves file-store primitives, resource CRUD tools and workflow tools
//! behind one uniform tool-call endpoint, plus change watches.

pub mod config;
pub mod routes;
pub mod state;
pub mod workflows;

pub use config::{Cli, ServerConfig};
pub use routes::{create_router, CALLER_HEADER};
pub use state::AppState;
pub use workflows::{ToolSequence, ToolStep, WorkflowDefinition};

use std::sync::Arc;
use tokio::net::TcpListener;

/// Serve `state` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
