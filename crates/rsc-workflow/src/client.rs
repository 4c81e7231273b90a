//! Typed client for the workflow tools

use rsc_core::{CallContext, Result};
use rsc_rpc::{RpcStub, StubConfig};
use serde_json::{json, Value};

use crate::actor::{CancelOutput, ResumeOutput, StartOutput};
use crate::run::WorkflowRun;
use crate::tools::{workflow_bindings, WORKFLOW_CANCEL, WORKFLOW_RESUME, WORKFLOW_START, WORKFLOW_STATUS};

#[derive(Clone)]
pub struct WorkflowClient {
    stub: RpcStub,
}

impl WorkflowClient {
    pub fn new(config: StubConfig) -> Result<Self> {
        Ok(Self {
            stub: RpcStub::new(workflow_bindings()?, config)?,
        })
    }

    pub fn stub(&self) -> &RpcStub {
        &self.stub
    }

    pub async fn start(
        &self,
        ctx: &CallContext,
        workflow_id: &str,
        args: Value,
        run_id: Option<&str>,
    ) -> Result<StartOutput> {
        self.stub
            .invoke_typed(
                ctx,
                WORKFLOW_START,
                &json!({"workflowId": workflow_id, "args": args, "runId": run_id}),
            )
            .await
    }

    pub async fn cancel(&self, ctx: &CallContext, workflow_id: &str, run_id: Option<&str>) -> Result<CancelOutput> {
        self.stub
            .invoke_typed(
                ctx,
                WORKFLOW_CANCEL,
                &json!({"workflowId": workflow_id, "runId": run_id}),
            )
            .await
    }

    pub async fn resume(
        &self,
        ctx: &CallContext,
        workflow_id: &str,
        run_id: &str,
        step_id: &str,
        resume_data: Value,
    ) -> Result<ResumeOutput> {
        self.stub
            .invoke_typed(
                ctx,
                WORKFLOW_RESUME,
                &json!({
                    "workflowId": workflow_id,
                    "runId": run_id,
                    "stepId": step_id,
                    "resumeData": resume_data
                }),
            )
            .await
    }

    pub async fn status(&self, ctx: &CallContext, run_id: &str) -> Result<WorkflowRun> {
        self.stub
            .invoke_typed(ctx, WORKFLOW_STATUS, &json!({"runId": run_id}))
            .await
    }
}
