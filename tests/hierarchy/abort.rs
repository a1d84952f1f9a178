//! Abort cascades and idempotence.

use crate::common::{assert_quiescent, eventually, within};
use etl_orchestrator::models::RealizationDefinition;
use etl_orchestrator::nodes::NodeKey;
use etl_orchestrator::test_helpers::{realization_definition, TestHarness};
use etl_orchestrator::{Level, NodeOutcome, RunStatus};
use std::time::Duration;

#[tokio::test]
async fn aborting_a_realization_waits_for_its_steps() {
    let harness = TestHarness::new();
    harness
        .fixture
        .workflow(1, false)
        .package(10, 1, false)
        .realization_with(RealizationDefinition {
            locked: true,
            ..realization_definition(100, 10, 1, 3)
        });
    for step in [1000, 1001, 1002] {
        let table = format!("table_{step}");
        harness.fixture.step(step, 100, &[table.as_str()]);
        harness.mover.block_step(step);
    }

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(3, Duration::from_secs(2)).await);

    let shared = harness.shared().clone();
    assert!(shared.level_lock().is_announced(Level::Realization));
    let realization = shared
        .arena()
        .get(NodeKey::new(Level::Realization, 100))
        .unwrap();
    assert_eq!(realization.children().len(), 3);

    assert_eq!(within(realization.abort()).await, NodeOutcome::Aborted);

    // every step completed its own abort before the realization did
    for step in [1000, 1001, 1002] {
        assert!(!shared.arena().contains(NodeKey::new(Level::Step, step)));
        assert_eq!(
            harness.catalog.runs_for(Level::Step, step)[0].status,
            RunStatus::Aborted
        );
    }
    assert!(!shared.arena().contains(realization.key()));
    assert!(!shared.level_lock().is_announced(Level::Realization));
    assert_eq!(shared.counters().total_executing(Level::Realization), 0);
    assert_eq!(shared.counters().threads(), 0);
    assert_eq!(harness.mover.running(), 0);

    assert!(matches!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Failed(_))
    ));
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn repeated_abort_releases_nothing_twice() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);
    harness.mover.block_step(1000);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(1, Duration::from_secs(2)).await);

    let step = harness
        .shared()
        .arena()
        .get(NodeKey::new(Level::Step, 1000))
        .unwrap();
    let (first, second) = tokio::join!(step.abort(), step.abort());
    assert_eq!(first, NodeOutcome::Aborted);
    assert_eq!(second, NodeOutcome::Aborted);
    assert_eq!(within(step.abort()).await, NodeOutcome::Aborted);

    within(harness.orchestrator.wait_for_workflow(1)).await;
    assert!(harness.notifier.subjects().iter().all(|s| !s.contains("abort could not")));
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn abort_after_finish_keeps_the_finished_outcome() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);
    harness.mover.delay_step(1000, Duration::from_millis(80));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    let shared = harness.shared().clone();
    eventually(|| shared.arena().contains(NodeKey::new(Level::Step, 1000))).await;
    let step = shared.arena().get(NodeKey::new(Level::Step, 1000)).unwrap();

    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Finished)
    );
    assert_eq!(within(step.abort()).await, NodeOutcome::Finished);
    assert_eq!(step.outcome(), Some(NodeOutcome::Finished));
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn aborting_a_waiting_step_rolls_back_its_queue_position() {
    let harness = TestHarness::new();
    harness
        .fixture
        .chain(1, 10, 100)
        .realization(101, 10, 1)
        .step(1000, 100, &["shared"])
        .step(1010, 101, &["shared"]);
    harness.mover.block_step(1000);
    harness.mover.block_step(1010);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(1, Duration::from_secs(2)).await);

    let shared = harness.shared().clone();
    let running = harness.mover.started()[0];
    let waiting = if running == 1000 { 1010 } else { 1000 };
    eventually(|| shared.run_queue().table_queue("shared") == vec![waiting]).await;

    let node = shared.arena().get(NodeKey::new(Level::Step, waiting)).unwrap();
    assert_eq!(within(node.abort()).await, NodeOutcome::Aborted);
    assert!(shared.run_queue().table_queue("shared").is_empty());
    assert!(!shared.arena().contains(NodeKey::new(Level::Step, waiting)));

    within(harness.orchestrator.abort_workflow(1)).await;
    assert_eq!(harness.mover.started().len(), 1);
    assert_quiescent(harness.shared());
}
