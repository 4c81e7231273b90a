//! rsc-binder: declarative tool bindings
//!
//! - `binder`: `ToolBinder` schemas and uniqueness-checked `BinderSet`s
//! - `tool`: the executable `Tool` trait and handler adapters
//! - `implement`: merges a binder set with caller handlers into a `ToolSet`
//! - `client`: structural contract checks against candidate tool lists

pub mod binder;
pub mod client;
pub mod implement;
pub mod tool;

pub use binder::{BinderSet, ToolBinder, ToolDefinition};
pub use client::BindingClient;
pub use implement::{implement, Implementations, ToolSet};
pub use tool::{handler, typed_handler, BoxedTool, Handler, Tool};
