//! # Shared Orchestrator State
//!
//! Every piece of process-wide mutable state the scheduler uses, plus the
//! external collaborators, behind one handle. Each node receives an
//! `Arc<SharedState>` when it is constructed; nothing lives in globals, so
//! independent instances can run side by side.

use crate::catalog::Catalog;
use crate::concurrency::{LevelLock, Poller, ResourceCounter, RunQueue};
use crate::config::SchedulerConfig;
use crate::events::{EventPublisher, LogNotifier, Notifier};
use crate::execution::{ConnectionFactory, DataMover, StandardConnectionFactory};
use crate::nodes::{NodeArena, PackageExecutionRegistry};
use crate::state_machine::LifecycleRegistry;
use std::fmt;
use std::sync::Arc;

pub struct SharedState {
    scheduler: SchedulerConfig,
    poller: Poller,
    run_queue: Arc<RunQueue>,
    level_lock: Arc<LevelLock>,
    counters: ResourceCounter,
    arena: NodeArena,
    packages: PackageExecutionRegistry,
    lifecycle: LifecycleRegistry,
    catalog: Arc<dyn Catalog>,
    connections: Arc<dyn ConnectionFactory>,
    mover: Arc<dyn DataMover>,
    notifier: Arc<dyn Notifier>,
    events: EventPublisher,
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("scheduler", &self.scheduler)
            .field("live_nodes", &self.arena.len())
            .field("threads", &self.counters.threads())
            .finish()
    }
}

impl SharedState {
    pub fn builder(
        scheduler: SchedulerConfig,
        catalog: Arc<dyn Catalog>,
        mover: Arc<dyn DataMover>,
    ) -> SharedStateBuilder {
        SharedStateBuilder {
            scheduler,
            catalog,
            mover,
            connections: None,
            notifier: None,
            events: None,
        }
    }

    pub fn scheduler(&self) -> &SchedulerConfig {
        &self.scheduler
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn run_queue(&self) -> &RunQueue {
        &self.run_queue
    }

    pub fn level_lock(&self) -> &LevelLock {
        &self.level_lock
    }

    pub fn counters(&self) -> &ResourceCounter {
        &self.counters
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn packages(&self) -> &PackageExecutionRegistry {
        &self.packages
    }

    pub fn lifecycle(&self) -> &LifecycleRegistry {
        &self.lifecycle
    }

    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }

    pub fn connections(&self) -> &dyn ConnectionFactory {
        self.connections.as_ref()
    }

    pub fn mover(&self) -> &dyn DataMover {
        self.mover.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }
}

pub struct SharedStateBuilder {
    scheduler: SchedulerConfig,
    catalog: Arc<dyn Catalog>,
    mover: Arc<dyn DataMover>,
    connections: Option<Arc<dyn ConnectionFactory>>,
    notifier: Option<Arc<dyn Notifier>>,
    events: Option<EventPublisher>,
}

impl SharedStateBuilder {
    pub fn connections(mut self, connections: Arc<dyn ConnectionFactory>) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Arc<SharedState> {
        let poller = Poller::new(self.scheduler.poll_interval());
        let run_queue = Arc::new(RunQueue::new());
        let level_lock = Arc::new(LevelLock::new(run_queue.clone(), poller));
        let counters = ResourceCounter::new(level_lock.clone(), self.scheduler.max_threads);
        let events = self.events.unwrap_or_default();

        Arc::new(SharedState {
            poller,
            run_queue,
            level_lock,
            counters,
            arena: NodeArena::new(),
            packages: PackageExecutionRegistry::new(),
            lifecycle: LifecycleRegistry::new(events.clone()),
            catalog: self.catalog,
            connections: self
                .connections
                .unwrap_or_else(|| Arc::new(StandardConnectionFactory::new())),
            mover: self.mover,
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(LogNotifier::default())),
            events,
            scheduler: self.scheduler,
        })
    }
}
