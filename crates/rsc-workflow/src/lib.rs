//! rsc-workflow: identity-addressed workflow actors
//!
//! - `actor`: per-identity actors and the `WorkflowActors` hosting runtime
//! - `engine`: the `Workflow`/`WorkflowEngine` traits and a registry engine
//! - `storage`: durable run and step storage (sqlx / SQLite)
//! - `tools`: `WORKFLOW_START`, `WORKFLOW_CANCEL`, `WORKFLOW_RESUME`, `WORKFLOW_STATUS`
//! - `client`: typed remote client

pub mod actor;
pub mod client;
pub mod engine;
pub mod run;
pub mod storage;
pub mod tools;

pub use actor::{
    resolve_run_id, CancelOutput, CancelRequest, ResumeOutput, ResumeRequest, StartOutput,
    StartRequest, WorkflowActorConfig, WorkflowActorHandle, WorkflowActors,
};
pub use client::WorkflowClient;
pub use engine::{RunContext, RunOutcome, Workflow, WorkflowEngine, WorkflowRegistry};
pub use run::{RunStatus, StatusUpdate, WorkflowRun};
pub use storage::{RunStore, SqliteRunStore};
pub use tools::{workflow_bindings, workflow_tools, WORKFLOW_CANCEL, WORKFLOW_RESUME, WORKFLOW_START, WORKFLOW_STATUS};
