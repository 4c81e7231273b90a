//! Workflow engine
//!
//! A `Workflow` is plain async code over a `RunContext`. Each `step` is
//! checkpointed, so re-executing a run (after a resume or a restart)
//! replays finished steps from storage instead of running them again.
//! Suspension is a step without an output yet: the workflow returns
//! `RunOutcome::Suspended` and the resume payload later becomes that
//! step's output.

use async_trait::async_trait;
use rsc_core::{CallContext, Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::storage::RunStore;

/// How one execution of a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Value),
    /// Waiting for `resume` at the named step
    Suspended { step_id: String },
}

/// Per-execution state handed to a workflow
pub struct RunContext {
    run_id: String,
    workflow_id: String,
    steps: HashMap<String, Value>,
    store: Arc<dyn RunStore>,
    cancel: watch::Receiver<bool>,
    call: CallContext,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        workflow_id: impl Into<String>,
        steps: HashMap<String, Value>,
        store: Arc<dyn RunStore>,
        cancel: watch::Receiver<bool>,
        call: CallContext,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            workflow_id: workflow_id.into(),
            steps,
            store,
            cancel,
            call,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Context of the call that started or resumed this execution
    pub fn call(&self) -> &CallContext {
        &self.call
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled(format!("Run {} was cancelled", self.run_id)));
        }
        Ok(())
    }

    /// Output recorded for a step, if any
    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.steps.get(step_id)
    }

    /// Run `f` once per run; later executions get the checkpointed output
    pub async fn step<F, Fut>(&mut self, step_id: &str, f: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        if let Some(output) = self.steps.get(step_id) {
            debug!(run_id = %self.run_id, step = %step_id, "Replaying checkpointed step");
            return Ok(output.clone());
        }
        self.check_cancelled()?;

        let output = f().await?;
        self.store.save_step(&self.run_id, step_id, &output).await?;
        self.steps.insert(step_id.to_string(), output.clone());
        Ok(output)
    }

    /// Resume payload for `step_id`, or the outcome that suspends there
    pub fn wait_for(&self, step_id: &str) -> std::result::Result<Value, RunOutcome> {
        match self.steps.get(step_id) {
            Some(data) => Ok(data.clone()),
            None => Err(RunOutcome::Suspended {
                step_id: step_id.to_string(),
            }),
        }
    }
}

/// User workflow code
#[async_trait]
pub trait Workflow: Send + Sync {
    async fn run(&self, ctx: &mut RunContext, args: Value) -> Result<RunOutcome>;
}

/// Executes workflows by id
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn contains(&self, workflow_id: &str) -> bool;

    async fn execute(&self, workflow_id: &str, ctx: &mut RunContext, args: Value) -> Result<RunOutcome>;
}

/// Engine backed by registered `Workflow` implementations
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<HashMap<String, Arc<dyn Workflow>>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, workflow_id: impl Into<String>, workflow: Arc<dyn Workflow>) {
        let workflow_id = workflow_id.into();
        info!(workflow_id = %workflow_id, "Registering workflow");
        self.workflows.write().await.insert(workflow_id, workflow);
    }

    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workflows.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl WorkflowEngine for WorkflowRegistry {
    async fn contains(&self, workflow_id: &str) -> bool {
        self.workflows.read().await.contains_key(workflow_id)
    }

    async fn execute(&self, workflow_id: &str, ctx: &mut RunContext, args: Value) -> Result<RunOutcome> {
        let workflow = self
            .workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Workflow {}", workflow_id)))?;
        workflow.run(ctx, args).await
    }
}
