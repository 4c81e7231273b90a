//! Workflows declared in the server config
//!
//! Each declared workflow is a sequence of tool calls against this
//! executor's own tool set. Every call is a checkpointed step, so a
//! recovered run skips the calls that already finished.

use async_trait::async_trait;
use rsc_binder::ToolSet;
use rsc_core::{Error, Result};
use rsc_workflow::{RunContext, RunOutcome, Workflow, WorkflowRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Weak};

/// One tool call of a declared workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStep {
    pub tool: String,
    /// Fixed arguments; when absent the run's own args are passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub steps: Vec<ToolStep>,
}

/// Runs its steps in order and completes with the last step's output
pub struct ToolSequence {
    steps: Vec<ToolStep>,
    tools: Weak<ToolSet>,
}

impl ToolSequence {
    pub fn new(steps: Vec<ToolStep>, tools: &Arc<ToolSet>) -> Self {
        Self {
            steps,
            tools: Arc::downgrade(tools),
        }
    }
}

#[async_trait]
impl Workflow for ToolSequence {
    async fn run(&self, ctx: &mut RunContext, args: Value) -> Result<RunOutcome> {
        let tools = self
            .tools
            .upgrade()
            .ok_or_else(|| Error::internal("Tool set was shut down"))?;

        let mut last = Value::Null;
        for (index, step) in self.steps.iter().enumerate() {
            let tools = Arc::clone(&tools);
            let call = ctx.call().clone();
            let tool = step.tool.clone();
            let arguments = step.arguments.clone().unwrap_or_else(|| args.clone());
            let step_id = format!("{}:{}", index, step.tool);
            last = ctx
                .step(&step_id, || async move { tools.call(call, &tool, arguments).await })
                .await?;
        }
        Ok(RunOutcome::Completed(last))
    }
}

/// Register every declared workflow; unknown tools fail startup
pub async fn register_declared(
    registry: &WorkflowRegistry,
    definitions: &[WorkflowDefinition],
    tools: &Arc<ToolSet>,
) -> Result<()> {
    for definition in definitions {
        if definition.steps.is_empty() {
            return Err(Error::construction(format!(
                "Workflow {} declares no steps",
                definition.id
            )));
        }
        if let Some(step) = definition.steps.iter().find(|s| !tools.contains(&s.tool)) {
            return Err(Error::construction(format!(
                "Workflow {} calls unknown tool {}",
                definition.id, step.tool
            )));
        }
        let workflow = ToolSequence::new(definition.steps.clone(), tools);
        registry.register(definition.id.as_str(), Arc::new(workflow)).await;
    }
    Ok(())
}
