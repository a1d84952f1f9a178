//! # Node Core
//!
//! State and lifecycle shared by every hierarchy level. A node runs as one
//! spawned task through `prepare → Init → Start → Finish`; any error or
//! cancellation diverts it into Abort.
//!
//! ## Init
//!
//! 1. register a run in the catalog run log;
//! 2. if the level is announced, queue on the level's admission queue until first;
//! 3. an exclusive node announces its lock;
//! 4. a normal node waits until the level is unannounced;
//! 5. count the node as executing (may block on the level permit);
//! 6. leave the admission queue.
//!
//! ## Finish and Abort
//!
//! Every reservation is recorded in the node's [`ResourceLedger`]. Finish and
//! Abort both drain that ledger, so nothing is released twice whichever runs
//! first. Abort cancels the node's scope, waits for every child to complete,
//! then releases what is left. Errors inside Abort are logged and sent to the
//! notifier, never returned.

use super::arena::NodeKey;
use super::completion::{CompletionHandle, CompletionSignal, NodeOutcome};
use super::realization::ParallelSlots;
use crate::concurrency::{QueueFamily, ResourceLedger, ResourceToken};
use crate::constants::{events, Level, RunStatus};
use crate::error::{OrchestratorError, Result, RunContext};
use crate::logging::{log_node_operation, log_suppressed_error};
use crate::models::WorkflowParameters;
use crate::orchestration::SharedState;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Level-specific behavior plugged into the common lifecycle
#[async_trait]
pub trait NodeBehavior: Send + Sync + fmt::Debug {
    /// Runs before Init; packages await their dependencies here
    async fn prepare(&self, _node: &Arc<NodeCore>) -> Result<()> {
        Ok(())
    }

    /// Whether Init counts the node as executing; steps count themselves in Start
    fn counts_at_admission(&self) -> bool {
        true
    }

    async fn start(&self, node: &Arc<NodeCore>) -> Result<()>;
}

/// Identity and reservations of a node about to be attached
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub key: NodeKey,
    pub name: String,
    pub locked: bool,
    pub tables: Vec<String>,
    pub parallel: Option<Arc<ParallelSlots>>,
}

impl NodeSpec {
    pub fn new(level: Level, id: i64, name: impl Into<String>, locked: bool) -> Self {
        Self {
            key: NodeKey::new(level, id),
            name: name.into(),
            locked,
            tables: Vec::new(),
            parallel: None,
        }
    }

    pub fn with_tables(mut self, tables: Vec<String>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_parallel(mut self, parallel: Arc<ParallelSlots>) -> Self {
        self.parallel = Some(parallel);
        self
    }
}

pub struct NodeCore {
    key: NodeKey,
    parent: Option<NodeKey>,
    workflow_id: i64,
    name: String,
    locked: bool,
    shared: Arc<SharedState>,
    parameters: Arc<WorkflowParameters>,
    cancel: CancellationToken,
    run_id: AtomicI64,
    run_context: Mutex<RunContext>,
    ledger: Mutex<ResourceLedger>,
    tables: Vec<String>,
    parallel: Option<Arc<ParallelSlots>>,
    children: Mutex<Vec<Arc<NodeCore>>>,
    completion: CompletionSignal,
}

impl fmt::Debug for NodeCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeCore")
            .field("key", &self.key)
            .field("parent", &self.parent)
            .field("workflow_id", &self.workflow_id)
            .field("locked", &self.locked)
            .field("run_id", &self.run_id())
            .finish()
    }
}

impl NodeCore {
    /// Create and track the root node of a workflow run
    pub fn root(
        shared: Arc<SharedState>,
        spec: NodeSpec,
        parameters: WorkflowParameters,
        scope: &CancellationToken,
    ) -> Result<Arc<Self>> {
        let node = Arc::new(Self {
            key: spec.key,
            parent: None,
            workflow_id: spec.key.id,
            name: spec.name,
            locked: spec.locked,
            parameters: Arc::new(parameters),
            cancel: scope.child_token(),
            run_id: AtomicI64::new(-1),
            run_context: Mutex::new(RunContext::default()),
            ledger: Mutex::new(ResourceLedger::new()),
            tables: spec.tables,
            parallel: spec.parallel,
            children: Mutex::new(Vec::new()),
            completion: CompletionSignal::new(),
            shared,
        });
        node.shared.arena().insert(node.clone())?;
        Ok(node)
    }

    /// Create a child of `parent` and attach it
    ///
    /// Refused once the parent's scope is cancelled, so an aborting parent
    /// never gains children it will not wait for.
    pub fn attach_child(parent: &Arc<NodeCore>, spec: NodeSpec) -> Result<Arc<Self>> {
        let node = Arc::new(Self {
            key: spec.key,
            parent: Some(parent.key),
            workflow_id: parent.workflow_id,
            name: spec.name,
            locked: spec.locked,
            shared: parent.shared.clone(),
            parameters: parent.parameters.clone(),
            cancel: parent.cancel.child_token(),
            run_id: AtomicI64::new(-1),
            run_context: Mutex::new(parent.run_context()),
            ledger: Mutex::new(ResourceLedger::new()),
            tables: spec.tables,
            parallel: spec.parallel,
            children: Mutex::new(Vec::new()),
            completion: CompletionSignal::new(),
        });

        let mut children = parent.children.lock();
        if parent.cancel.is_cancelled() {
            return Err(OrchestratorError::cancelled(format!(
                "attaching {} to {}",
                node.key, parent.key
            )));
        }
        parent.shared.arena().insert(node.clone())?;
        children.push(node.clone());
        Ok(node)
    }

    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn level(&self) -> Level {
        self.key.level
    }

    pub fn id(&self) -> i64 {
        self.key.id
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Workflow run this node executes under
    pub fn workflow_id(&self) -> i64 {
        self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Catalog run id, −1 until Init registered one
    pub fn run_id(&self) -> i64 {
        self.run_id.load(Ordering::SeqCst)
    }

    pub fn run_context(&self) -> RunContext {
        *self.run_context.lock()
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn parameters(&self) -> &WorkflowParameters {
        &self.parameters
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn parallel(&self) -> Option<&Arc<ParallelSlots>> {
        self.parallel.as_ref()
    }

    pub fn children(&self) -> Vec<Arc<NodeCore>> {
        self.children.lock().clone()
    }

    pub fn completion(&self) -> CompletionHandle {
        self.completion.handle()
    }

    pub fn outcome(&self) -> Option<NodeOutcome> {
        self.completion.outcome()
    }

    pub fn holds(&self, token: ResourceToken) -> bool {
        self.ledger.lock().holds(token)
    }

    /// Cancel this node's subtree and wait until it has completed
    ///
    /// Calling it again, or after the node finished, releases nothing twice.
    pub async fn abort(&self) -> NodeOutcome {
        self.cancel.cancel();
        self.completion.handle().wait().await
    }

    pub(crate) fn check_cancelled(&self, operation: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::cancelled(operation));
        }
        Ok(())
    }

    pub(crate) fn contextual(&self, operation: &'static str) -> impl Fn(OrchestratorError) -> OrchestratorError + '_ {
        move |error| error.with_context(operation, self.run_context())
    }

    pub(crate) fn log(&self, operation: &str, status: &str, details: Option<&str>) {
        log_node_operation(
            operation,
            self.key.level,
            self.key.id,
            &self.run_context(),
            status,
            details,
        );
    }

    pub(crate) fn publish(&self, event: &str, details: Option<&str>) {
        self.shared.events().publish_node(
            event,
            self.key.level,
            self.key.id,
            &self.run_context(),
            details,
        );
    }

    // Init

    pub(crate) async fn init(&self, counts_at_admission: bool) -> Result<()> {
        let shared = self.shared.clone();
        let level = self.key.level;
        let id = self.key.id;

        self.check_cancelled("init")?;
        self.publish(events::NODE_INIT_STARTED, None);

        let parent_context = self.run_context();
        let run_id = shared
            .catalog()
            .start_run(level, id, &parent_context)
            .await
            .map_err(self.contextual("start_run"))?;
        self.run_id.store(run_id, Ordering::SeqCst);
        *self.run_context.lock() = parent_context.with_run(level, run_id);
        self.log("init", "run_registered", None);

        if shared.level_lock().is_announced(level) {
            shared
                .run_queue()
                .enqueue(QueueFamily::Admission, level, id)
                .map_err(self.contextual("enqueue_admission"))?;
            self.hold(ResourceToken::AdmissionQueued);
            shared
                .poller()
                .wait_until(&self.cancel, "admission queue head", || {
                    shared.run_queue().is_first(QueueFamily::Admission, level, id)
                })
                .await?;
        }

        if self.locked {
            shared.level_lock().announce_lock(level);
            self.hold(ResourceToken::Announced);
        } else {
            shared
                .level_lock()
                .await_admission(level, false, &self.cancel)
                .await?;
        }

        if counts_at_admission {
            self.increase_counters().await?;
        }

        self.release(ResourceToken::AdmissionQueued)
            .map_err(self.contextual("dequeue_admission"))?;

        self.publish(events::NODE_ADMITTED, None);
        self.log("init", "admitted", None);
        Ok(())
    }

    pub(crate) async fn increase_counters(&self) -> Result<()> {
        self.shared
            .counters()
            .increase_num_executing(self.key.level, self.locked, self.key.id, &self.cancel)
            .await
            .map_err(|e| {
                if e.is_cancellation() {
                    e
                } else {
                    e.with_context("increase_num_executing", self.run_context())
                }
            })?;
        self.hold(ResourceToken::Counters);
        Ok(())
    }

    // Ledger

    pub(crate) fn hold(&self, token: ResourceToken) {
        if !self.ledger.lock().acquire(token) {
            warn!(node = %self.key, token = token.as_str(), "reservation recorded twice");
        }
    }

    /// Release one reservation if it is held
    pub(crate) fn release(&self, token: ResourceToken) -> Result<()> {
        let held = self.ledger.lock().release(token);
        if held {
            self.release_resource(token)?;
        }
        Ok(())
    }

    /// Release every held reservation; keeps going past failures and returns the first
    pub(crate) fn release_all(&self) -> Result<()> {
        let tokens = self.ledger.lock().drain();
        let mut first_error = None;
        for token in tokens {
            if let Err(e) = self.release_resource(token) {
                warn!(node = %self.key, token = token.as_str(), error = %e, "release failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release_resource(&self, token: ResourceToken) -> Result<()> {
        let shared = &self.shared;
        let level = self.key.level;
        let id = self.key.id;
        match token {
            ResourceToken::TablesAccessed => {
                shared
                    .counters()
                    .remove_accessed_tables(self.workflow_id, &self.tables);
            }
            ResourceToken::Thread => {
                shared.counters().decrease_threads()?;
            }
            ResourceToken::Counters => {
                shared
                    .counters()
                    .decrease_num_executing(level, self.locked, id)?;
            }
            ResourceToken::ParallelSlot => {
                if let Some(parallel) = &self.parallel {
                    parallel.release();
                }
            }
            ResourceToken::TablesQueued => {
                shared.run_queue().dequeue_tables(&self.tables, id);
            }
            ResourceToken::AdmissionQueued => {
                shared.run_queue().dequeue(QueueFamily::Admission, level, id);
            }
            ResourceToken::Announced => {
                shared.level_lock().remove_lock_flag(level)?;
            }
        }
        debug!(node = %self.key, token = token.as_str(), "reservation released");
        Ok(())
    }

    // Children

    /// Wait for `pending` children; the first one that does not finish fails the wait
    pub(crate) async fn await_children(
        &self,
        pending: Vec<(NodeKey, CompletionHandle)>,
    ) -> Result<()> {
        let mut waits: FuturesUnordered<_> = pending
            .into_iter()
            .map(|(key, handle)| async move { (key, handle.wait().await) })
            .collect();

        while let Some((key, outcome)) = waits.next().await {
            if !outcome.is_finished() {
                return Err(OrchestratorError::ChildFailed {
                    level: key.level,
                    id: key.id,
                    reason: outcome.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Wait until the child list is empty, including children attached meanwhile
    pub(crate) async fn await_all_children(&self) -> Result<()> {
        loop {
            let pending: Vec<_> = self
                .children()
                .iter()
                .map(|child| (child.key, child.completion()))
                .collect();
            if pending.is_empty() {
                return Ok(());
            }
            self.await_children(pending).await?;
        }
    }

    fn detach(&self) {
        let arena = self.shared.arena();
        if let Some(parent) = self.parent.and_then(|key| arena.get(key)) {
            parent.children.lock().retain(|child| child.key != self.key);
        }
        arena.remove_node(self);
    }

    // Finish / Abort

    pub(crate) async fn finish(&self) -> Result<()> {
        self.release_all().map_err(self.contextual("finish"))?;
        self.record_run(RunStatus::Finished)
            .await
            .map_err(self.contextual("finish_run"))?;
        self.detach();

        self.log("finish", "finished", None);
        self.publish(events::NODE_FINISHED, None);
        self.completion.complete(NodeOutcome::Finished);
        Ok(())
    }

    async fn record_run(&self, status: RunStatus) -> Result<()> {
        let run_id = self.run_id();
        if run_id < 0 {
            return Ok(());
        }
        self.shared
            .catalog()
            .finish_run(self.key.level, run_id, status, &self.run_context())
            .await
    }

    pub(crate) async fn abort_cleanup(&self, outcome: NodeOutcome) {
        self.cancel.cancel();

        let children: Vec<CompletionHandle> = self
            .children
            .lock()
            .iter()
            .map(|child| child.completion())
            .collect();
        futures::future::join_all(children.iter().map(CompletionHandle::wait)).await;

        if let Err(e) = self.release_all() {
            self.suppressed("release", &e);
        }
        if let Err(e) = self.record_run(outcome.run_status()).await {
            self.suppressed("finish_run", &e);
        }
        self.detach();

        let details = outcome.to_string();
        let event = match outcome {
            NodeOutcome::Failed(_) => events::NODE_FAILED,
            _ => events::NODE_ABORTED,
        };
        self.log("abort", outcome.run_status().as_str(), Some(&details));
        self.publish(event, Some(&details));
        self.completion.complete(outcome);
    }

    fn suppressed(&self, operation: &str, error: &OrchestratorError) {
        let context = self.run_context();
        log_suppressed_error("abort", operation, &error.to_string(), &context);
        self.shared.notifier().notify(
            &format!("{} abort could not {operation}", self.key),
            &format!("{error} {context}"),
        );
    }
}

/// Spawn the lifecycle task of an attached node
pub fn spawn_node(node: Arc<NodeCore>, behavior: Arc<dyn NodeBehavior>) -> CompletionHandle {
    let handle = node.completion();
    tokio::spawn(async move {
        let driven = AssertUnwindSafe(drive(node.clone(), behavior))
            .catch_unwind()
            .await;
        if driven.is_err() {
            node.abort_cleanup(NodeOutcome::Failed("node task panicked".to_string()))
                .await;
        }
    });
    handle
}

async fn drive(node: Arc<NodeCore>, behavior: Arc<dyn NodeBehavior>) -> NodeOutcome {
    let result = async {
        behavior.prepare(&node).await?;
        node.init(behavior.counts_at_admission()).await?;
        node.check_cancelled("start")?;
        node.log("start", "started", None);
        node.publish(events::NODE_STARTED, None);
        behavior.start(&node).await?;
        node.check_cancelled("finish")?;
        node.finish().await
    }
    .await;

    match result {
        Ok(()) => NodeOutcome::Finished,
        Err(error) => {
            let outcome = if node.cancel.is_cancelled() || error.is_cancellation() {
                NodeOutcome::Aborted
            } else {
                NodeOutcome::Failed(error.to_string())
            };
            debug!(node = %node.key, error = %error, "node diverted into abort");
            node.abort_cleanup(outcome.clone()).await;
            outcome
        }
    }
}
