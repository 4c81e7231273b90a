//! Workflow Actor
//!
//! One actor per identity. An actor is a task draining an `mpsc` mailbox,
//! so commands addressed to the same identity run one at a time. Run
//! executions are spawned in the background and retained in the actor as
//! supervised tasks: registered, awaited by nobody, failures logged, and
//! aborted when the actor goes away.
//!
//! An actor with no executions left retires: it leaves the directory and
//! closes its mailbox. The next command for that identity spawns a fresh one.

use rsc_core::{CallContext, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::{RunContext, RunOutcome, WorkflowEngine};
use crate::run::{RunStatus, StatusUpdate, WorkflowRun};
use crate::storage::RunStore;

#[derive(Debug, Clone)]
pub struct WorkflowActorConfig {
    /// Mailbox depth per actor
    pub mailbox_capacity: usize,
}

impl Default for WorkflowActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub workflow_id: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutput {
    pub run_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOutput {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub step_id: String,
    #[serde(default)]
    pub resume_data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeOutput {
    pub resumed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub run_id: String,
}

/// Run id precedence: the actor's own identity, then the caller's, then a fresh one
pub fn resolve_run_id(identity: Option<&str>, requested: Option<&str>) -> String {
    identity
        .or(requested)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

enum ActorMessage {
    Start {
        request: StartRequest,
        ctx: CallContext,
        respond_to: oneshot::Sender<Result<StartOutput>>,
    },
    Cancel {
        request: CancelRequest,
        respond_to: oneshot::Sender<Result<CancelOutput>>,
    },
    Resume {
        request: ResumeRequest,
        ctx: CallContext,
        respond_to: oneshot::Sender<Result<ResumeOutput>>,
    },
    Status {
        run_id: String,
        respond_to: oneshot::Sender<Result<WorkflowRun>>,
    },
    Recover {
        run: WorkflowRun,
        ctx: CallContext,
        respond_to: oneshot::Sender<Result<()>>,
    },
}

type Directory = Mutex<HashMap<String, WorkflowActorHandle>>;

/// Handle to one actor's mailbox
#[derive(Clone)]
pub struct WorkflowActorHandle {
    identity: String,
    sender: mpsc::Sender<ActorMessage>,
}

impl WorkflowActorHandle {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// `None` when the actor retired before answering; the message was not processed
    async fn try_call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ActorMessage,
    ) -> Option<Result<T>> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(build(tx)).await.ok()?;
        rx.await.ok()
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ActorMessage,
    ) -> Result<T> {
        self.try_call(build)
            .await
            .unwrap_or_else(|| Err(Error::internal(format!("Actor {} has retired", self.identity))))
    }
}

enum Next {
    Message(ActorMessage),
    Finished(String, u64),
    Closed,
}

struct RunTask {
    workflow_id: String,
    generation: u64,
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

/// The actor itself; owned by its mailbox task
struct WorkflowActor {
    identity: String,
    engine: Arc<dyn WorkflowEngine>,
    store: Arc<dyn RunStore>,
    receiver: mpsc::Receiver<ActorMessage>,
    tasks: HashMap<String, RunTask>,
    generation: u64,
    finished_tx: mpsc::UnboundedSender<(String, u64)>,
    finished_rx: mpsc::UnboundedReceiver<(String, u64)>,
    directory: Weak<Directory>,
}

impl WorkflowActor {
    fn new(
        identity: impl Into<String>,
        engine: Arc<dyn WorkflowEngine>,
        store: Arc<dyn RunStore>,
        config: &WorkflowActorConfig,
        directory: &Arc<Directory>,
    ) -> (Self, WorkflowActorHandle) {
        let identity = identity.into();
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity.max(1));
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let actor = Self {
            identity: identity.clone(),
            engine,
            store,
            receiver,
            tasks: HashMap::new(),
            generation: 0,
            finished_tx,
            finished_rx,
            directory: Arc::downgrade(directory),
        };
        (actor, WorkflowActorHandle { identity, sender })
    }

    /// Process messages until the actor retires or every handle is dropped
    async fn run(mut self) {
        info!(identity = %self.identity, "Workflow actor started");
        let mut pending: Option<ActorMessage> = None;
        loop {
            let next = match pending.take() {
                Some(message) => Next::Message(message),
                None => tokio::select! {
                    message = self.receiver.recv() => message.map_or(Next::Closed, Next::Message),
                    Some((run_id, generation)) = self.finished_rx.recv() => {
                        Next::Finished(run_id, generation)
                    }
                },
            };
            match next {
                Next::Message(message) => self.handle(message).await,
                Next::Finished(run_id, generation) => self.finished(&run_id, generation),
                Next::Closed => break,
            }

            if self.tasks.is_empty() {
                match self.retire().await {
                    Ok(()) => break,
                    Err(raced) => pending = raced,
                }
            }
        }
        debug!(identity = %self.identity, "Workflow actor stopped");
    }

    async fn handle(&mut self, message: ActorMessage) {
        match message {
            ActorMessage::Start {
                request,
                ctx,
                respond_to,
            } => {
                let _ = respond_to.send(self.start(request, ctx).await);
            }
            ActorMessage::Cancel {
                request,
                respond_to,
            } => {
                let _ = respond_to.send(self.cancel(request).await);
            }
            ActorMessage::Resume {
                request,
                ctx,
                respond_to,
            } => {
                let _ = respond_to.send(self.resume(request, ctx).await);
            }
            ActorMessage::Status { run_id, respond_to } => {
                let _ = respond_to.send(self.status(&run_id).await);
            }
            ActorMessage::Recover {
                run,
                ctx,
                respond_to,
            } => {
                let _ = respond_to.send(self.recover(run, ctx));
            }
        }
    }

    fn finished(&mut self, run_id: &str, generation: u64) {
        if self
            .tasks
            .get(run_id)
            .is_some_and(|task| task.generation == generation)
        {
            self.tasks.remove(run_id);
        }
    }

    /// Leave the directory and close the mailbox. A message that raced in
    /// first is handed back (`Err(Some)`) and the actor stays listed.
    async fn retire(&mut self) -> std::result::Result<(), Option<ActorMessage>> {
        let Some(directory) = self.directory.upgrade() else {
            // Runtime dropped; the mailbox closes with it
            return Err(None);
        };
        let mut actors = directory.lock().await;
        if let Ok(message) = self.receiver.try_recv() {
            return Err(Some(message));
        }
        actors.remove(&self.identity);
        self.receiver.close();
        drop(actors);

        // Dropped replies make their senders retry against a fresh actor
        while self.receiver.try_recv().is_ok() {}
        debug!(identity = %self.identity, "Workflow actor retired");
        Ok(())
    }

    async fn start(&mut self, request: StartRequest, ctx: CallContext) -> Result<StartOutput> {
        if !self.engine.contains(&request.workflow_id).await {
            return Err(Error::not_found(format!("Workflow {}", request.workflow_id)));
        }
        let run_id = resolve_run_id(Some(&self.identity), request.run_id.as_deref());

        let run = WorkflowRun::pending(&request.workflow_id, &run_id, request.args.clone());
        self.store.insert_run(&run).await?;

        info!(
            run_id = %run_id,
            workflow_id = %request.workflow_id,
            correlation_id = %ctx.correlation_id,
            "Starting workflow run"
        );
        self.spawn_execution(run_id.clone(), request.workflow_id, request.args, ctx);
        Ok(StartOutput { run_id })
    }

    async fn cancel(&mut self, request: CancelRequest) -> Result<CancelOutput> {
        let run_id = resolve_run_id(Some(&self.identity), request.run_id.as_deref());

        if let Some(task) = self.tasks.get(&run_id) {
            if task.workflow_id == request.workflow_id {
                // The execution persists `cancelled` once it observes the signal.
                let _ = task.cancel.send(true);
                info!(run_id = %run_id, "Cancellation requested");
            }
            return Ok(CancelOutput { cancelled: true });
        }

        match self.store.get_run(&run_id).await? {
            Some(run) if !run.status.is_terminal() && run.workflow_id == request.workflow_id => {
                self.store
                    .set_status(&run_id, RunStatus::Cancelled, StatusUpdate::default())
                    .await?;
                info!(run_id = %run_id, "Cancelled idle run");
            }
            _ => debug!(run_id = %run_id, "Nothing to cancel"),
        }
        Ok(CancelOutput { cancelled: true })
    }

    async fn resume(&mut self, request: ResumeRequest, ctx: CallContext) -> Result<ResumeOutput> {
        let run_id = resolve_run_id(Some(&self.identity), request.run_id.as_deref());
        if self.tasks.contains_key(&run_id) {
            return Err(Error::user_input(format!("Run {} is still executing", run_id)));
        }

        let run = self
            .store
            .get_run(&run_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Run {}", run_id)))?;
        if run.workflow_id != request.workflow_id {
            return Err(Error::user_input(format!(
                "Run {} belongs to workflow {}",
                run_id, run.workflow_id
            )));
        }
        if run.status != RunStatus::Suspended {
            return Err(Error::user_input(format!(
                "Run {} is {}, not suspended",
                run_id, run.status
            )));
        }
        if run.suspended_step.as_deref() != Some(request.step_id.as_str()) {
            warn!(
                run_id = %run_id,
                expected = ?run.suspended_step,
                step = %request.step_id,
                "Resuming at a step other than the suspended one"
            );
        }

        self.store
            .save_step(&run_id, &request.step_id, &request.resume_data)
            .await?;
        info!(run_id = %run_id, step = %request.step_id, "Resuming workflow run");
        self.spawn_execution(run_id, run.workflow_id, run.args, ctx);
        Ok(ResumeOutput { resumed: true })
    }

    async fn status(&self, run_id: &str) -> Result<WorkflowRun> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Run {}", run_id)))
    }

    /// Re-execute a run interrupted by a restart; finished steps replay from storage
    fn recover(&mut self, run: WorkflowRun, ctx: CallContext) -> Result<()> {
        if self.tasks.contains_key(&run.run_id) {
            return Ok(());
        }
        info!(run_id = %run.run_id, workflow_id = %run.workflow_id, "Recovering interrupted run");
        self.spawn_execution(run.run_id, run.workflow_id, run.args, ctx);
        Ok(())
    }

    fn spawn_execution(&mut self, run_id: String, workflow_id: String, args: Value, ctx: CallContext) {
        let (cancel, cancel_rx) = watch::channel(false);
        self.generation += 1;
        let generation = self.generation;
        let finished = self.finished_tx.clone();
        let engine = Arc::clone(&self.engine);
        let store = Arc::clone(&self.store);
        let task_run_id = run_id.clone();
        let task_workflow_id = workflow_id.clone();
        let handle = tokio::spawn(async move {
            execute(engine, store, task_run_id.clone(), task_workflow_id, args, cancel_rx, ctx).await;
            let _ = finished.send((task_run_id, generation));
        });
        self.tasks.insert(
            run_id,
            RunTask {
                workflow_id,
                generation,
                handle,
                cancel,
            },
        );
    }
}

impl Drop for WorkflowActor {
    fn drop(&mut self) {
        for (run_id, task) in self.tasks.drain() {
            if !task.handle.is_finished() {
                debug!(run_id = %run_id, "Aborting run with its actor");
                task.handle.abort();
            }
        }
    }
}

async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    while !*cancel.borrow() {
        if cancel.changed().await.is_err() {
            // Sender gone without cancelling: never resolve.
            std::future::pending::<()>().await;
        }
    }
}

/// One background execution of a run, from `running` to its next resting status
async fn execute(
    engine: Arc<dyn WorkflowEngine>,
    store: Arc<dyn RunStore>,
    run_id: String,
    workflow_id: String,
    args: Value,
    cancel: watch::Receiver<bool>,
    ctx: CallContext,
) {
    let result: Result<RunOutcome> = async {
        store
            .set_status(&run_id, RunStatus::Running, StatusUpdate::default())
            .await?;
        let steps = store.load_steps(&run_id).await?;
        let mut run_ctx = RunContext::new(
            &run_id,
            &workflow_id,
            steps,
            Arc::clone(&store),
            cancel.clone(),
            ctx,
        );
        tokio::select! {
            outcome = engine.execute(&workflow_id, &mut run_ctx, args) => outcome,
            _ = wait_cancelled(cancel.clone()) => {
                Err(Error::Cancelled(format!("Run {} was cancelled", run_id)))
            }
        }
    }
    .await;

    let (status, update) = match result {
        Ok(RunOutcome::Completed(output)) => {
            info!(run_id = %run_id, "Workflow run completed");
            (RunStatus::Completed, StatusUpdate::output(output))
        }
        Ok(RunOutcome::Suspended { step_id }) => {
            info!(run_id = %run_id, step = %step_id, "Workflow run suspended");
            (RunStatus::Suspended, StatusUpdate::suspended_at(step_id))
        }
        Err(Error::Cancelled(_)) => {
            info!(run_id = %run_id, "Workflow run cancelled");
            (RunStatus::Cancelled, StatusUpdate::default())
        }
        Err(e) => {
            error!(run_id = %run_id, workflow_id = %workflow_id, error = %e, "Workflow run failed");
            (RunStatus::Failed, StatusUpdate::error(e.to_string()))
        }
    };

    if let Err(e) = store.set_status(&run_id, status, update).await {
        error!(run_id = %run_id, error = %e, "Failed to persist run status");
    }
}

/// Hosting runtime: one actor per identity, spawned on first use and
/// retired once its runs have finished
pub struct WorkflowActors {
    engine: Arc<dyn WorkflowEngine>,
    store: Arc<dyn RunStore>,
    config: WorkflowActorConfig,
    actors: Arc<Directory>,
}

impl WorkflowActors {
    pub fn new(
        engine: Arc<dyn WorkflowEngine>,
        store: Arc<dyn RunStore>,
        config: WorkflowActorConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
            actors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The actor for `identity`, spawning it if needed
    pub async fn actor(&self, identity: &str) -> WorkflowActorHandle {
        let mut actors = self.actors.lock().await;
        if let Some(handle) = actors.get(identity).filter(|h| !h.is_closed()) {
            return handle.clone();
        }
        let (actor, handle) = WorkflowActor::new(
            identity,
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            &self.config,
            &self.actors,
        );
        tokio::spawn(actor.run());
        actors.insert(identity.to_string(), handle.clone());
        handle
    }

    /// Number of live actors
    pub async fn len(&self) -> usize {
        self.actors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn is_live(&self, identity: &str) -> bool {
        self.actors
            .lock()
            .await
            .get(identity)
            .is_some_and(|h| !h.is_closed())
    }

    /// Deliver to the actor for `identity`, once more to a fresh actor if it retired meanwhile
    async fn dispatch<T>(
        &self,
        identity: &str,
        build: impl Fn(oneshot::Sender<Result<T>>) -> ActorMessage,
    ) -> Result<T> {
        if let Some(result) = self.actor(identity).await.try_call(&build).await {
            return result;
        }
        debug!(identity = %identity, "Actor retired mid-call; retrying");
        self.actor(identity).await.call(build).await
    }

    pub async fn start(&self, ctx: &CallContext, request: StartRequest) -> Result<StartOutput> {
        let identity = resolve_run_id(None, request.run_id.as_deref());
        let request = StartRequest {
            run_id: Some(identity.clone()),
            ..request
        };
        self.dispatch(&identity, |respond_to| ActorMessage::Start {
            request: request.clone(),
            ctx: ctx.clone(),
            respond_to,
        })
        .await
    }

    /// Without a run id, every live actor is asked to cancel its run of the workflow
    pub async fn cancel(&self, request: CancelRequest) -> Result<CancelOutput> {
        if let Some(run_id) = request.run_id.as_deref() {
            let idle = !self.is_live(run_id).await;
            if idle && self.store.get_run(run_id).await?.map_or(true, |run| run.status.is_terminal()) {
                debug!(run_id = %run_id, "Nothing to cancel");
                return Ok(CancelOutput { cancelled: true });
            }
            return self
                .dispatch(run_id, |respond_to| ActorMessage::Cancel {
                    request: request.clone(),
                    respond_to,
                })
                .await;
        }
        let handles: Vec<WorkflowActorHandle> = self.actors.lock().await.values().cloned().collect();
        for handle in handles {
            // A retired actor has nothing left to cancel
            if let Some(result) = handle
                .try_call(|respond_to| ActorMessage::Cancel {
                    request: request.clone(),
                    respond_to,
                })
                .await
            {
                result?;
            }
        }
        Ok(CancelOutput { cancelled: true })
    }

    pub async fn resume(&self, ctx: &CallContext, request: ResumeRequest) -> Result<ResumeOutput> {
        let run_id = request
            .run_id
            .clone()
            .ok_or_else(|| Error::user_input("runId is required to resume a run"))?;
        if !self.is_live(&run_id).await && self.store.get_run(&run_id).await?.is_none() {
            return Err(Error::not_found(format!("Run {}", run_id)));
        }
        self.dispatch(&run_id, |respond_to| ActorMessage::Resume {
            request: request.clone(),
            ctx: ctx.clone(),
            respond_to,
        })
        .await
    }

    /// Reads go straight to storage; no actor is spawned for them
    pub async fn status(&self, run_id: &str) -> Result<WorkflowRun> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Run {}", run_id)))
    }

    /// Pick up runs a previous process left `pending` or `running`.
    /// Runs of registered workflows execute again from their checkpoints;
    /// the rest are marked failed. Returns how many were re-executed.
    pub async fn recover(&self, ctx: &CallContext) -> Result<usize> {
        let interrupted = self
            .store
            .runs_with_status(&[RunStatus::Pending, RunStatus::Running])
            .await?;
        let mut recovered = 0;
        for run in interrupted {
            if !self.engine.contains(&run.workflow_id).await {
                warn!(run_id = %run.run_id, workflow_id = %run.workflow_id, "Interrupted run has no registered workflow");
                self.store
                    .set_status(
                        &run.run_id,
                        RunStatus::Failed,
                        StatusUpdate::error(format!(
                            "Interrupted by a restart; workflow {} is no longer registered",
                            run.workflow_id
                        )),
                    )
                    .await?;
                continue;
            }
            let run_id = run.run_id.clone();
            self.dispatch(&run_id, |respond_to| ActorMessage::Recover {
                run: run.clone(),
                ctx: ctx.clone(),
                respond_to,
            })
            .await?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(count = recovered, "Recovered interrupted workflow runs");
        }
        Ok(recovered)
    }
}
