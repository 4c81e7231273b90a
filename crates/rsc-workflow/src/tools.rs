//! Workflow actor operations as bound tools

use rsc_binder::{implement, typed_handler, BinderSet, Implementations, ToolBinder, ToolSet};
use rsc_core::{CallContext, Result};
use serde_json::json;
use std::sync::Arc;

use crate::actor::{CancelRequest, ResumeRequest, StartRequest, StatusRequest, WorkflowActors};

pub const WORKFLOW_START: &str = "WORKFLOW_START";
pub const WORKFLOW_CANCEL: &str = "WORKFLOW_CANCEL";
pub const WORKFLOW_RESUME: &str = "WORKFLOW_RESUME";
pub const WORKFLOW_STATUS: &str = "WORKFLOW_STATUS";

pub fn workflow_bindings() -> Result<BinderSet> {
    BinderSet::new(vec![
        ToolBinder::new(WORKFLOW_START)
            .description("Start a workflow run in the background")
            .input(json!({
                "type": "object",
                "properties": {
                    "workflowId": {"type": "string"},
                    "args": {},
                    "runId": {"type": "string"}
                },
                "required": ["workflowId"]
            }))
            .output(json!({
                "type": "object",
                "properties": {"runId": {"type": "string"}},
                "required": ["runId"]
            })),
        ToolBinder::new(WORKFLOW_CANCEL)
            .description("Request cancellation of a run")
            .input(json!({
                "type": "object",
                "properties": {
                    "workflowId": {"type": "string"},
                    "runId": {"type": "string"}
                },
                "required": ["workflowId"]
            }))
            .output(json!({
                "type": "object",
                "properties": {"cancelled": {"type": "boolean"}}
            })),
        ToolBinder::new(WORKFLOW_RESUME)
            .description("Re-enter a suspended run at a step")
            .input(json!({
                "type": "object",
                "properties": {
                    "workflowId": {"type": "string"},
                    "runId": {"type": "string"},
                    "stepId": {"type": "string"},
                    "resumeData": {}
                },
                "required": ["workflowId", "stepId"]
            }))
            .output(json!({
                "type": "object",
                "properties": {"resumed": {"type": "boolean"}}
            })),
        ToolBinder::new(WORKFLOW_STATUS)
            .description("Read a persisted run")
            .input(json!({
                "type": "object",
                "properties": {"runId": {"type": "string"}},
                "required": ["runId"]
            }))
            .optional(),
    ])
}

pub fn workflow_tools(actors: Arc<WorkflowActors>) -> Result<ToolSet> {
    let a = Arc::clone(&actors);
    let start = typed_handler(move |ctx: CallContext, req: StartRequest| {
        let a = Arc::clone(&a);
        async move { a.start(&ctx, req).await }
    });

    let a = Arc::clone(&actors);
    let cancel = typed_handler(move |_ctx: CallContext, req: CancelRequest| {
        let a = Arc::clone(&a);
        async move { a.cancel(req).await }
    });

    let a = Arc::clone(&actors);
    let resume = typed_handler(move |ctx: CallContext, req: ResumeRequest| {
        let a = Arc::clone(&a);
        async move { a.resume(&ctx, req).await }
    });

    let a = Arc::clone(&actors);
    let status = typed_handler(move |_ctx: CallContext, req: StatusRequest| {
        let a = Arc::clone(&a);
        async move { a.status(&req.run_id).await }
    });

    implement(
        &workflow_bindings()?,
        Implementations::new()
            .with(WORKFLOW_START, start)
            .with(WORKFLOW_CANCEL, cancel)
            .with(WORKFLOW_RESUME, resume)
            .with(WORKFLOW_STATUS, status),
    )
}
