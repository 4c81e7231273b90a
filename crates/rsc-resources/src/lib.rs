//! rsc-resources: resource CRUD over a versioned file store
//!
//! - `uri`, `path`, `slug`: resource addressing and id derivation
//! - `store`: the `FileStore` primitives with optimistic concurrency
//! - `memory_store`, `remote_store`: local and tool-backed stores
//! - `adapter`: resource ids to files and back
//! - `service`, `search`: CRUD and SEARCH semantics
//! - `bindings`: the five `{TYPE}_*` tools per resource type
//! - `store_tools`: the file store served as tools
//! - `watch`, `sse`: change feeds as pull streams and event-stream frames
//! - `client`: typed remote client

pub mod adapter;
pub mod bindings;
pub mod client;
pub mod memory_store;
pub mod path;
pub mod record;
pub mod remote_store;
pub mod search;
pub mod service;
pub mod slug;
pub mod sse;
pub mod store;
pub mod store_tools;
pub mod uri;
pub mod watch;

pub use adapter::{ResourceStoreAdapter, VersionedRecord};
pub use bindings::{create_resource_bindings, resource_implementations, resource_tools, tool_prefix, ResourceOp};
pub use client::ResourceClient;
pub use memory_store::MemoryFileStore;
pub use path::ResourcePaths;
pub use record::{ResourceRecord, StoredRecord};
pub use remote_store::RemoteFileStore;
pub use search::{SearchInput, SearchItem, SearchOutput, SortField, SortOrder};
pub use service::{DeleteOutput, ResourceService, Validator};
pub use store::{
    ChangeFeed, FileChange, FileEntry, FileStore, ListRequest, PutOutcome, PutRequest, ReadFormat,
    StoredFile, WatchRequest, DEFAULT_BRANCH, EXPECT_ABSENT,
};
pub use store_tools::{file_store_bindings, file_store_tools};
pub use uri::ResourceUri;
pub use watch::{ChangeEvent, ResourceReader, WatchBridge, WatchConfig, WatchScope, DEFAULT_WATCH_CAPACITY};
