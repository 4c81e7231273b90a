//! Core types and utilities for the rsc tool runtime
//!
//! # Modules
//!
//! - `config`: Environment loading and typed config lookups
//! - `context`: Explicit per-call context threaded through every call boundary
//! - `error`: Error taxonomy and Result alias

pub mod config;
pub mod context;
pub mod error;

// Re-exports
pub use context::{CallContext, CORRELATION_HEADER};
pub use error::{Error, Result};
