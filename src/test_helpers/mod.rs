// Test Helpers Module - In-process scheduling harness
//
// Drives the full hierarchy without a database: hierarchy definitions live in
// a MemoryCatalog, steps run against a ScriptedDataMover that records how
// they overlapped, and notifications are captured for assertions.

pub mod fixtures;
pub mod recording;
pub mod scripted_mover;

pub use fixtures::{package_definition, realization_definition, step_definition, HierarchyFixture};
pub use recording::{drain_events, RecordingNotifier};
pub use scripted_mover::ScriptedDataMover;

use crate::catalog::MemoryCatalog;
use crate::config::{OrchestratorConfig, SchedulerConfig};
use crate::orchestration::{Orchestrator, SharedState};
use std::sync::Arc;
use std::time::Duration;

/// Scheduler settings with a 5ms poll interval
pub fn test_scheduler() -> SchedulerConfig {
    OrchestratorConfig::for_testing().scheduler
}

/// Catalog, mover, notifier and orchestrator wired together
#[derive(Debug)]
pub struct TestHarness {
    pub fixture: HierarchyFixture,
    pub catalog: Arc<MemoryCatalog>,
    pub mover: Arc<ScriptedDataMover>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_scheduler(test_scheduler())
    }

    pub fn with_max_threads(max_threads: usize) -> Self {
        Self::with_scheduler(SchedulerConfig {
            max_threads,
            ..test_scheduler()
        })
    }

    pub fn with_scheduler(scheduler: SchedulerConfig) -> Self {
        let fixture = HierarchyFixture::new();
        let catalog = fixture.catalog();
        let mover = Arc::new(ScriptedDataMover::new(Duration::from_millis(20)));
        let notifier = Arc::new(RecordingNotifier::new());
        let shared = SharedState::builder(scheduler, catalog.clone(), mover.clone())
            .notifier(notifier.clone())
            .build();
        Self {
            fixture,
            catalog,
            mover,
            notifier,
            orchestrator: Orchestrator::new(shared),
        }
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        self.orchestrator.shared()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
