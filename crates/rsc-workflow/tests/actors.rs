//! Workflow actors driven in-process

use async_trait::async_trait;
use rsc_core::{CallContext, Error, Result};
use rsc_workflow::{
    workflow_tools, CancelRequest, ResumeRequest, RunContext, RunOutcome, RunStatus, RunStore,
    SqliteRunStore, StartRequest, StatusUpdate, Workflow, WorkflowActorConfig, WorkflowActors,
    WorkflowRegistry, WorkflowRun,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Completes immediately with its args
struct Echo;

#[async_trait]
impl Workflow for Echo {
    async fn run(&self, ctx: &mut RunContext, args: Value) -> Result<RunOutcome> {
        let out = ctx.step("echo", || async move { Ok(args) }).await?;
        Ok(RunOutcome::Completed(out))
    }
}

/// Suspends at `approve`, then completes with the approval
struct Approval;

#[async_trait]
impl Workflow for Approval {
    async fn run(&self, ctx: &mut RunContext, _args: Value) -> Result<RunOutcome> {
        ctx.step("prepare", || async { Ok(json!("prepared")) }).await?;
        match ctx.wait_for("approve") {
            Ok(data) => Ok(RunOutcome::Completed(json!({"approved": data}))),
            Err(suspended) => Ok(suspended),
        }
    }
}

/// Never finishes on its own
struct Forever;

#[async_trait]
impl Workflow for Forever {
    async fn run(&self, ctx: &mut RunContext, _args: Value) -> Result<RunOutcome> {
        ctx.step("sleep", || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        })
        .await?;
        Ok(RunOutcome::Completed(Value::Null))
    }
}

/// Always fails
struct Broken;

#[async_trait]
impl Workflow for Broken {
    async fn run(&self, _ctx: &mut RunContext, _args: Value) -> Result<RunOutcome> {
        Err(Error::internal("boom"))
    }
}

async fn runtime(store: Arc<dyn RunStore>) -> Arc<WorkflowActors> {
    let registry = WorkflowRegistry::new();
    registry.register("w1", Arc::new(Echo)).await;
    registry.register("approval", Arc::new(Approval)).await;
    registry.register("forever", Arc::new(Forever)).await;
    registry.register("broken", Arc::new(Broken)).await;
    Arc::new(WorkflowActors::new(
        Arc::new(registry),
        store,
        WorkflowActorConfig::default(),
    ))
}

async fn wait_for_status(actors: &WorkflowActors, run_id: &str, status: RunStatus) -> WorkflowRun {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(run) = actors.status(run_id).await {
                if run.status == status {
                    return run;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("run reached status")
}

fn start(workflow_id: &str, args: Value, run_id: Option<&str>) -> StartRequest {
    StartRequest {
        workflow_id: workflow_id.to_string(),
        args,
        run_id: run_id.map(str::to_string),
    }
}

#[tokio::test]
async fn test_start_then_cancel_after_completion() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let ctx = CallContext::new();

    let out = actors.start(&ctx, start("w1", json!({"a": 1}), None)).await.unwrap();
    assert!(!out.run_id.is_empty());

    let run = wait_for_status(&actors, &out.run_id, RunStatus::Completed).await;
    assert_eq!(run.output, Some(json!({"a": 1})));

    let cancelled = actors
        .cancel(CancelRequest {
            workflow_id: "w1".into(),
            run_id: Some(out.run_id.clone()),
        })
        .await
        .unwrap();
    assert!(cancelled.cancelled);
    assert_eq!(actors.status(&out.run_id).await.unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn test_caller_supplied_run_id_and_duplicates() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let ctx = CallContext::new();

    let out = actors.start(&ctx, start("w1", json!({}), Some("run-7"))).await.unwrap();
    assert_eq!(out.run_id, "run-7");
    let err = actors.start(&ctx, start("w1", json!({}), Some("run-7"))).await.unwrap_err();
    assert!(err.is_user_input());

    let err = actors.start(&ctx, start("missing", json!({}), None)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cancel_in_flight_run() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let out = actors
        .start(&CallContext::new(), start("forever", Value::Null, None))
        .await
        .unwrap();
    wait_for_status(&actors, &out.run_id, RunStatus::Running).await;

    let cancelled = actors
        .cancel(CancelRequest {
            workflow_id: "forever".into(),
            run_id: Some(out.run_id.clone()),
        })
        .await
        .unwrap();
    assert!(cancelled.cancelled);
    wait_for_status(&actors, &out.run_id, RunStatus::Cancelled).await;
}

#[tokio::test]
async fn test_cancel_unknown_run_is_not_an_error() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let out = actors
        .cancel(CancelRequest {
            workflow_id: "w1".into(),
            run_id: Some("never-started".into()),
        })
        .await
        .unwrap();
    assert!(out.cancelled);
}

async fn wait_until_idle(actors: &WorkflowActors) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !actors.is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("actors retired");
}

#[tokio::test]
async fn test_actors_retire_after_their_runs_finish() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let ctx = CallContext::new();

    let mut run_ids = Vec::new();
    for n in 0..20 {
        let out = actors.start(&ctx, start("w1", json!({"n": n}), None)).await.unwrap();
        run_ids.push(out.run_id);
    }
    for run_id in &run_ids {
        wait_for_status(&actors, run_id, RunStatus::Completed).await;
    }
    wait_until_idle(&actors).await;

    // A retired identity answers again through a fresh actor
    let err = actors.start(&ctx, start("w1", json!({}), Some(run_ids[0].as_str()))).await.unwrap_err();
    assert!(err.is_user_input());
    wait_until_idle(&actors).await;
}

#[tokio::test]
async fn test_unknown_runs_spawn_no_actor() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let ctx = CallContext::new();

    for n in 0..5 {
        let out = actors
            .cancel(CancelRequest {
                workflow_id: "w1".into(),
                run_id: Some(format!("ghost-{}", n)),
            })
            .await
            .unwrap();
        assert!(out.cancelled);
    }
    let err = actors
        .resume(
            &ctx,
            ResumeRequest {
                workflow_id: "approval".into(),
                run_id: Some("ghost".into()),
                step_id: "approve".into(),
                resume_data: Value::Null,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(actors.len().await, 0);
}

#[tokio::test]
async fn test_interrupted_runs_are_recovered() {
    let store = Arc::new(SqliteRunStore::in_memory().await.unwrap());

    // Left behind by a process that died mid-run
    store
        .insert_run(&WorkflowRun::pending("w1", "half-done", json!({"a": 1})))
        .await
        .unwrap();
    store
        .set_status("half-done", RunStatus::Running, StatusUpdate::default())
        .await
        .unwrap();
    store.save_step("half-done", "echo", &json!("checkpointed")).await.unwrap();
    store
        .insert_run(&WorkflowRun::pending("w1", "never-began", json!({"b": 2})))
        .await
        .unwrap();
    store
        .insert_run(&WorkflowRun::pending("retired-workflow", "orphan", Value::Null))
        .await
        .unwrap();
    store
        .set_status("orphan", RunStatus::Running, StatusUpdate::default())
        .await
        .unwrap();

    let actors = runtime(store).await;
    assert_eq!(actors.recover(&CallContext::new()).await.unwrap(), 2);

    let run = wait_for_status(&actors, "half-done", RunStatus::Completed).await;
    assert_eq!(run.output, Some(json!("checkpointed")));
    let run = wait_for_status(&actors, "never-began", RunStatus::Completed).await;
    assert_eq!(run.output, Some(json!({"b": 2})));
    let run = wait_for_status(&actors, "orphan", RunStatus::Failed).await;
    assert!(run.error.unwrap().contains("no longer registered"));

    wait_until_idle(&actors).await;
    assert_eq!(actors.recover(&CallContext::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_suspend_and_resume() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let ctx = CallContext::new();
    let out = actors.start(&ctx, start("approval", Value::Null, None)).await.unwrap();

    let run = wait_for_status(&actors, &out.run_id, RunStatus::Suspended).await;
    assert_eq!(run.suspended_step.as_deref(), Some("approve"));

    let resumed = actors
        .resume(
            &ctx,
            ResumeRequest {
                workflow_id: "approval".into(),
                run_id: Some(out.run_id.clone()),
                step_id: "approve".into(),
                resume_data: json!("alice"),
            },
        )
        .await
        .unwrap();
    assert!(resumed.resumed);

    let run = wait_for_status(&actors, &out.run_id, RunStatus::Completed).await;
    assert_eq!(run.output, Some(json!({"approved": "alice"})));

    // Completed runs cannot be resumed again.
    let err = actors
        .resume(
            &ctx,
            ResumeRequest {
                workflow_id: "approval".into(),
                run_id: Some(out.run_id),
                step_id: "approve".into(),
                resume_data: Value::Null,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_user_input());
}

#[tokio::test]
async fn test_failures_are_persisted() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let out = actors
        .start(&CallContext::new(), start("broken", Value::Null, None))
        .await
        .unwrap();
    let run = wait_for_status(&actors, &out.run_id, RunStatus::Failed).await;
    assert!(run.error.unwrap().contains("boom"));
}

#[tokio::test]
async fn test_suspended_run_survives_runtime_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("runs.db").display());
    let ctx = CallContext::new();

    let run_id = {
        let actors = runtime(Arc::new(SqliteRunStore::new(&url).await.unwrap())).await;
        let out = actors.start(&ctx, start("approval", Value::Null, None)).await.unwrap();
        wait_for_status(&actors, &out.run_id, RunStatus::Suspended).await;
        out.run_id
    };

    let actors = runtime(Arc::new(SqliteRunStore::new(&url).await.unwrap())).await;
    actors
        .resume(
            &ctx,
            ResumeRequest {
                workflow_id: "approval".into(),
                run_id: Some(run_id.clone()),
                step_id: "approve".into(),
                resume_data: json!(true),
            },
        )
        .await
        .unwrap();
    let run = wait_for_status(&actors, &run_id, RunStatus::Completed).await;
    assert_eq!(run.output, Some(json!({"approved": true})));
}

#[tokio::test]
async fn test_tools_surface() {
    let actors = runtime(Arc::new(SqliteRunStore::in_memory().await.unwrap())).await;
    let tools = workflow_tools(actors.clone()).unwrap();
    let ctx = CallContext::new();

    let started = tools
        .call(ctx.clone(), "WORKFLOW_START", json!({"workflowId": "w1", "args": {"a": 1}}))
        .await
        .unwrap();
    let run_id = started["runId"].as_str().unwrap().to_string();

    let cancelled = tools
        .call(ctx.clone(), "WORKFLOW_CANCEL", json!({"workflowId": "w1", "runId": run_id}))
        .await
        .unwrap();
    assert_eq!(cancelled, json!({"cancelled": true}));

    let err = tools
        .call(ctx, "WORKFLOW_RESUME", json!({"workflowId": "w1", "stepId": "x"}))
        .await
        .unwrap_err();
    assert!(err.is_user_input());
}
