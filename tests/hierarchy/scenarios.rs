//! End-to-end hierarchy runs over the in-memory catalog.

use crate::common::{assert_quiescent, eventually, within};
use etl_orchestrator::concurrency::QueueFamily;
use etl_orchestrator::models::StepDefinition;
use etl_orchestrator::test_helpers::{realization_definition, step_definition, TestHarness};
use etl_orchestrator::{Level, NodeOutcome, RunStatus, WorkflowState};
use std::time::Duration;

#[tokio::test]
async fn independent_steps_run_concurrently() {
    let harness = TestHarness::new();
    harness
        .fixture
        .chain(1, 10, 100)
        .step(1000, 100, &["stage.orders"])
        .step(1001, 100, &["stage.customers"]);
    harness.mover.delay_step(1000, Duration::from_millis(60));
    harness.mover.delay_step(1001, Duration::from_millis(60));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    let outcome = within(harness.orchestrator.wait_for_workflow(1)).await;

    assert_eq!(outcome, Some(NodeOutcome::Finished));
    assert_eq!(harness.mover.peak(), 2);
    let mut completed = harness.mover.completed();
    completed.sort_unstable();
    assert_eq!(completed, vec![1000, 1001]);
    assert!(harness.mover.table_conflicts().is_empty());
    assert_quiescent(harness.shared());

    assert!(harness
        .shared()
        .lifecycle()
        .is_in(1, WorkflowState::Finished));
    for (level, id) in [
        (Level::Workflow, 1),
        (Level::Package, 10),
        (Level::Realization, 100),
        (Level::Step, 1000),
        (Level::Step, 1001),
    ] {
        let runs = harness.catalog.runs_for(level, id);
        assert_eq!(runs.len(), 1, "{level} {id}");
        assert_eq!(runs[0].status, RunStatus::Finished);
    }
}

#[tokio::test]
async fn step_run_context_carries_every_ancestor_run() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["t"]);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    within(harness.orchestrator.wait_for_workflow(1)).await;

    let workflow_run = harness.catalog.runs_for(Level::Workflow, 1)[0].run_id;
    let package_run = harness.catalog.runs_for(Level::Package, 10)[0].run_id;
    let realization_run = harness.catalog.runs_for(Level::Realization, 100)[0].run_id;
    let step = &harness.catalog.runs_for(Level::Step, 1000)[0];

    assert_eq!(step.context.workflow_run_id, Some(workflow_run));
    assert_eq!(step.context.package_run_id, Some(package_run));
    assert_eq!(step.context.realization_run_id, Some(realization_run));
    assert_eq!(step.context.step_run_id, None);
}

#[tokio::test]
async fn locked_package_holds_off_normal_package() {
    let harness = TestHarness::new();
    harness
        .fixture
        .workflow(1, false)
        .package(20, 1, true)
        .realization(200, 20, 1)
        .step(2000, 200, &["a"])
        .workflow(2, false)
        .package(30, 2, false)
        .realization(300, 30, 1)
        .step(3000, 300, &["b"]);
    harness.mover.delay_step(2000, Duration::from_millis(120));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(1, Duration::from_secs(2)).await);
    assert!(harness.shared().level_lock().is_announced(Level::Package));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(2))
        .await
        .unwrap();
    let shared = harness.shared().clone();
    eventually(|| {
        shared
            .run_queue()
            .is_queued(QueueFamily::Admission, Level::Package, 30)
    })
    .await;
    assert_eq!(harness.mover.started(), vec![2000]);

    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Finished)
    );
    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(2)).await,
        Some(NodeOutcome::Finished)
    );
    assert_eq!(harness.mover.started(), vec![2000, 3000]);
    assert_eq!(harness.mover.peak(), 1);
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn shared_table_is_granted_in_queue_order() {
    let harness = TestHarness::new();
    for workflow in 1..=3_i64 {
        let package = workflow * 10;
        let realization = workflow * 100;
        harness
            .fixture
            .chain(workflow, package, realization)
            .step(realization * 10, realization, &["T"]);
    }
    harness.mover.delay_step(1000, Duration::from_millis(150));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(1, Duration::from_secs(2)).await);

    let shared = harness.shared().clone();
    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(2))
        .await
        .unwrap();
    eventually(|| shared.run_queue().table_queue("T") == vec![2000]).await;
    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(3))
        .await
        .unwrap();
    eventually(|| shared.run_queue().table_queue("T") == vec![2000, 3000]).await;

    for workflow in 1..=3 {
        assert_eq!(
            within(harness.orchestrator.wait_for_workflow(workflow)).await,
            Some(NodeOutcome::Finished)
        );
    }
    assert_eq!(harness.mover.started(), vec![1000, 2000, 3000]);
    assert!(harness.mover.table_conflicts().is_empty());
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn locked_step_takes_table_ahead_of_earlier_normal_step() {
    let harness = TestHarness::new();
    harness.fixture.chain(1, 10, 100).step(1000, 100, &["T"]);
    harness.fixture.chain(2, 20, 200).step(2000, 200, &["T"]);
    harness.fixture.chain(3, 30, 300).step_with(StepDefinition {
        locked: true,
        ..step_definition(3000, 300, 1, &["T"])
    });
    harness.mover.delay_step(1000, Duration::from_millis(150));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(1, Duration::from_secs(2)).await);

    let shared = harness.shared().clone();
    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(2))
        .await
        .unwrap();
    eventually(|| shared.run_queue().table_queue("T") == vec![2000]).await;
    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(3))
        .await
        .unwrap();
    eventually(|| shared.run_queue().table_queue("T") == vec![2000, 3000]).await;
    assert!(shared.level_lock().is_announced(Level::Step));

    for workflow in 1..=3 {
        assert_eq!(
            within(harness.orchestrator.wait_for_workflow(workflow)).await,
            Some(NodeOutcome::Finished)
        );
    }
    assert_eq!(harness.mover.started(), vec![1000, 3000, 2000]);
    assert!(harness.mover.table_conflicts().is_empty());
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn shared_dependency_is_constructed_once() {
    let harness = TestHarness::new();
    harness
        .fixture
        .workflow(1, false)
        .package(4, 1, false)
        .package(5, 1, false)
        .dependency(4, 5)
        .realization(40, 4, 1)
        .realization(50, 5, 1)
        .step(400, 40, &["p4"])
        .step(500, 50, &["p5"])
        .workflow(2, false)
        .package(6, 2, false)
        .dependency(6, 5)
        .realization(60, 6, 1)
        .step(600, 60, &["p6"]);
    harness.mover.delay_step(500, Duration::from_millis(120));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert!(harness.mover.wait_for_started(1, Duration::from_secs(2)).await);
    assert_eq!(harness.mover.started(), vec![500]);
    assert!(harness.shared().packages().is_executing(5));

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(2))
        .await
        .unwrap();

    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Finished)
    );
    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(2)).await,
        Some(NodeOutcome::Finished)
    );

    assert_eq!(harness.shared().packages().constructed_count(5), 1);
    assert_eq!(harness.catalog.runs_for(Level::Package, 5).len(), 1);
    let started = harness.mover.started();
    assert_eq!(started.len(), 3);
    assert_eq!(started[0], 500);
    assert!(!harness.shared().packages().is_executing(5));
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn thread_cap_serializes_independent_steps() {
    let harness = TestHarness::with_max_threads(1);
    harness
        .fixture
        .chain(1, 10, 100)
        .realization(101, 10, 1)
        .step(1000, 100, &["left"])
        .step(1010, 101, &["right"]);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Finished)
    );

    assert_eq!(harness.mover.peak(), 1);
    assert_eq!(harness.mover.completed().len(), 2);
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn parallel_cap_limits_steps_of_one_realization() {
    let harness = TestHarness::new();
    harness
        .fixture
        .workflow(1, false)
        .package(10, 1, false)
        .realization_with(realization_definition(100, 10, 1, 2));
    for step in 1000..1005 {
        let table = format!("t{step}");
        harness.fixture.step(step, 100, &[table.as_str()]);
    }

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Finished)
    );

    assert_eq!(harness.mover.peak(), 2);
    assert_eq!(harness.mover.completed().len(), 5);
    assert_quiescent(harness.shared());
}

#[tokio::test]
async fn priority_tiers_run_in_order() {
    let harness = TestHarness::new();
    harness
        .fixture
        .workflow(1, false)
        .package(10, 1, false)
        .realization(100, 10, 1)
        .realization(101, 10, 1)
        .realization(102, 10, 2)
        .step(1000, 100, &["a"])
        .step(1010, 101, &["b"])
        .step(1020, 102, &["c"]);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    within(harness.orchestrator.wait_for_workflow(1)).await;

    let started = harness.mover.started();
    assert_eq!(started.len(), 3);
    assert_eq!(started[2], 1020);
    let completed = harness.mover.completed();
    let tier_two = completed.iter().position(|id| *id == 1020).unwrap();
    assert_eq!(tier_two, 2);
}

#[tokio::test]
async fn placeholders_resolve_from_workflow_parameters() {
    let harness = TestHarness::new();
    harness.catalog.set_parameter(1, "SCHEMA", "sales");
    harness
        .fixture
        .chain(1, 10, 100)
        .step(1000, 100, &["${SCHEMA}.orders"])
        .step(1001, 100, &["sales.orders"]);

    harness
        .orchestrator
        .start_workflow(harness.fixture.scheduled(1))
        .await
        .unwrap();
    assert_eq!(
        within(harness.orchestrator.wait_for_workflow(1)).await,
        Some(NodeOutcome::Finished)
    );

    // both resolve to the same table, so they never overlap
    assert_eq!(harness.mover.peak(), 1);
    assert!(harness.mover.table_conflicts().is_empty());
}
