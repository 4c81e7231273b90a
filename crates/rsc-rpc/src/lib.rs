//! rsc-rpc: calling bound tools over HTTP
//!
//! - `connection`: reachability descriptors and their resolution
//! - `envelope`: the `{data, error?}` wire envelope shared with executors
//! - `stub`: the `RpcStub` client, one POST per call

pub mod connection;
pub mod envelope;
pub mod stub;

pub use connection::{Connection, ConnectionResolver, ConnectionSource, LookupKind, ResolvedConnection};
pub use envelope::{CallEnvelope, ProxyEnvelope, ProxyParams, CALL_CONNECTION_TOOL};
pub use stub::{PendingCall, RpcStub, StubConfig, TransportOptions};
