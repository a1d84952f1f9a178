//! Workflow lifecycle as driven by real runs.

use crate::common::within;
use etl_orchestrator::constants::events;
use etl_orchestrator::test_helpers::{drain_events, TestHarness};
use etl_orchestrator::{NodeOutcome, WorkflowEvent, WorkflowState};

#[tokio::test]
async fn finished_run_walks_the_lifecycle_in_order() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);
    let mut receiver = harness.shared().events().subscribe();

    let definition = harness.fixture.scheduled(1);
    let schedule_run_id = definition.schedule_run_id;
    harness.orchestrator.start_workflow(definition).await.unwrap();
    within(harness.orchestrator.wait_for_workflow(1)).await;

    let lifecycle = harness.shared().lifecycle();
    assert_eq!(lifecycle.current_state(1), Some(WorkflowState::Finished));
    assert_eq!(lifecycle.schedule_run_id(1), Some(schedule_run_id));
    assert!(lifecycle.has_executed_once(1));

    let workflow_events: Vec<String> = drain_events(&mut receiver)
        .into_iter()
        .filter(|event| event.name.starts_with("workflow."))
        .map(|event| event.name)
        .collect();
    assert_eq!(
        workflow_events,
        vec![
            events::WORKFLOW_SCHEDULED,
            events::WORKFLOW_EXECUTING,
            events::WORKFLOW_FINISHED,
        ]
    );
}

#[tokio::test]
async fn step_publishes_node_events_in_lifecycle_order() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);
    let mut receiver = harness.shared().events().subscribe();

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    within(harness.orchestrator.wait_for_workflow(1)).await;

    let step_events: Vec<String> = drain_events(&mut receiver)
        .into_iter()
        .filter(|event| event.level() == Some("step") && event.node_id() == Some(1000))
        .map(|event| event.name)
        .collect();
    assert_eq!(
        step_events,
        vec![
            events::NODE_INIT_STARTED,
            events::NODE_ADMITTED,
            events::NODE_STARTED,
            events::NODE_FINISHED,
        ]
    );
}

#[tokio::test]
async fn finished_workflow_can_run_again() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);

    for _ in 0..2 {
        harness
            .orchestrator
            .start_workflow(harness.fixture.scheduled(1))
            .await
            .unwrap();
        assert_eq!(
            within(harness.orchestrator.wait_for_workflow(1)).await,
            Some(NodeOutcome::Finished)
        );
    }

    assert_eq!(harness.mover.completed(), vec![1000, 1000]);
    assert_eq!(harness.shared().lifecycle().executed_once(), vec![1]);
    assert_eq!(harness.shared().packages().constructed_count(10), 2);
}

#[tokio::test]
async fn failing_a_finished_workflow_keeps_both_memberships() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);
    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    within(harness.orchestrator.wait_for_workflow(1)).await;

    let lifecycle = harness.shared().lifecycle();
    lifecycle
        .transition(1, WorkflowEvent::fail_with_error("late failure"))
        .unwrap();
    assert!(lifecycle.is_in(1, WorkflowState::Finished));
    assert!(lifecycle.is_in(1, WorkflowState::Failed));

    lifecycle
        .transition(1, WorkflowEvent::Schedule { schedule_run_id: 99 })
        .unwrap();
    assert_eq!(lifecycle.workflows_in(WorkflowState::Finished), Vec::<i64>::new());
    assert_eq!(lifecycle.workflows_in(WorkflowState::Failed), Vec::<i64>::new());
    assert_eq!(lifecycle.workflows_in(WorkflowState::Scheduled), vec![1]);
}

#[tokio::test]
async fn running_workflow_cannot_be_started_twice() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);
    harness.mover.block_step(1000);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await;
    assert!(second.is_err());
    assert!(harness.shared().lifecycle().is_active(1));

    assert_eq!(
        within(harness.orchestrator.abort_workflow(1)).await,
        Some(NodeOutcome::Aborted)
    );
    assert_eq!(
        harness.shared().lifecycle().current_state(1),
        Some(WorkflowState::Failed)
    );
}
