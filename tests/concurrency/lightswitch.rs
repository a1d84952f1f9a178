//! Lightswitch behavior of the level permit under the resource counters.

use crate::common::within;
use etl_orchestrator::concurrency::{
    GroupPermit, LevelLock, Poller, QueueFamily, ResourceCounter, RunQueue,
};
use etl_orchestrator::{Level, OrchestratorError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn counters(max_threads: usize) -> (Arc<RunQueue>, Arc<LevelLock>, Arc<ResourceCounter>) {
    counters_polling(max_threads, Duration::from_millis(2))
}

fn counters_polling(
    max_threads: usize,
    poll_interval: Duration,
) -> (Arc<RunQueue>, Arc<LevelLock>, Arc<ResourceCounter>) {
    let queue = Arc::new(RunQueue::new());
    let lock = Arc::new(LevelLock::new(queue.clone(), Poller::new(poll_interval)));
    let counters = Arc::new(ResourceCounter::new(lock.clone(), max_threads));
    (queue, lock, counters)
}

#[tokio::test]
async fn exclusive_holder_blocks_normal_group() {
    let (_, lock, counters) = counters(4);
    let cancel = CancellationToken::new();

    counters
        .increase_num_executing(Level::Package, true, 1, &cancel)
        .await
        .unwrap();
    let snapshot = counters.snapshot(Level::Package);
    assert_eq!(snapshot.exclusive_holder, Some(1));
    assert!(snapshot.lightswitch_consistent());

    let waiting = counters.clone();
    let token = cancel.clone();
    let normal = tokio::spawn(async move {
        waiting
            .increase_num_executing(Level::Package, false, 2, &token)
            .await
    });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!normal.is_finished(), "normal node ran beside the exclusive one");

    counters
        .decrease_num_executing(Level::Package, true, 1)
        .unwrap();
    within(normal).await.unwrap().unwrap();

    let snapshot = counters.snapshot(Level::Package);
    assert_eq!(snapshot.total_executing, 1);
    assert_eq!(snapshot.non_exclusive_executing, 1);
    assert_eq!(snapshot.group, GroupPermit::Holding);
    assert!(snapshot.lightswitch_consistent());

    counters
        .decrease_num_executing(Level::Package, false, 2)
        .unwrap();
    assert!(lock.permit_available(Level::Package));
}

#[tokio::test]
async fn normal_group_shares_one_permit() {
    let (_, lock, counters) = counters(4);
    let cancel = CancellationToken::new();

    for id in 1..=3 {
        counters
            .increase_num_executing(Level::Realization, false, id, &cancel)
            .await
            .unwrap();
    }
    let snapshot = counters.snapshot(Level::Realization);
    assert_eq!(snapshot.non_exclusive_executing, 3);
    assert_eq!(snapshot.group, GroupPermit::Holding);
    assert!(!snapshot.permit_available);

    counters
        .decrease_num_executing(Level::Realization, false, 1)
        .unwrap();
    counters
        .decrease_num_executing(Level::Realization, false, 2)
        .unwrap();
    assert!(!lock.permit_available(Level::Realization));

    counters
        .decrease_num_executing(Level::Realization, false, 3)
        .unwrap();
    let snapshot = counters.snapshot(Level::Realization);
    assert_eq!(snapshot.group, GroupPermit::Idle);
    assert!(snapshot.permit_available);
    assert!(snapshot.lightswitch_consistent());
}

#[tokio::test]
async fn exclusive_node_waits_for_normal_group_to_drain() {
    let (_, lock, counters) = counters(4);
    let cancel = CancellationToken::new();

    counters
        .increase_num_executing(Level::Step, false, 10, &cancel)
        .await
        .unwrap();
    counters
        .increase_num_executing(Level::Step, false, 11, &cancel)
        .await
        .unwrap();

    let exclusive = counters.clone();
    let token = cancel.clone();
    let locked = tokio::spawn(async move {
        exclusive
            .increase_num_executing(Level::Step, true, 12, &token)
            .await
    });

    counters.decrease_num_executing(Level::Step, false, 10).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!locked.is_finished());

    counters.decrease_num_executing(Level::Step, false, 11).unwrap();
    within(locked).await.unwrap().unwrap();
    assert_eq!(counters.snapshot(Level::Step).exclusive_holder, Some(12));
    assert!(!lock.permit_available(Level::Step));

    counters.decrease_num_executing(Level::Step, true, 12).unwrap();
    assert!(lock.permit_available(Level::Step));
}

#[tokio::test]
async fn cancelled_permit_wait_rolls_back_counters() {
    let (queue, _, counters) = counters(4);
    let holder = CancellationToken::new();
    counters
        .increase_num_executing(Level::Workflow, true, 1, &holder)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let waiting = counters.clone();
    let token = cancel.clone();
    let normal = tokio::spawn(async move {
        waiting
            .increase_num_executing(Level::Workflow, false, 2, &token)
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(counters.total_executing(Level::Workflow), 2);

    cancel.cancel();
    let error = within(normal).await.unwrap().unwrap_err();
    assert!(error.is_cancellation());

    let snapshot = counters.snapshot(Level::Workflow);
    assert_eq!(snapshot.total_executing, 1);
    assert_eq!(snapshot.non_exclusive_executing, 0);
    assert_eq!(snapshot.group, GroupPermit::Idle);
    assert_eq!(queue.len(QueueFamily::Permit, Level::Workflow), 0);

    counters
        .decrease_num_executing(Level::Workflow, true, 1)
        .unwrap();
    assert!(counters.snapshot(Level::Workflow).permit_available);
}

#[tokio::test]
async fn cancelled_last_group_member_returns_group_permit() {
    // long poll so the second member is still asleep when the group takes the permit
    let (_, lock, counters) = counters_polling(4, Duration::from_millis(200));
    let cancel = CancellationToken::new();
    counters
        .increase_num_executing(Level::Package, true, 1, &cancel)
        .await
        .unwrap();

    let acquiring = counters.clone();
    let token = cancel.clone();
    let first = tokio::spawn(async move {
        acquiring
            .increase_num_executing(Level::Package, false, 2, &token)
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(counters.snapshot(Level::Package).group, GroupPermit::Acquiring);

    let second_cancel = CancellationToken::new();
    let polling = counters.clone();
    let token = second_cancel.clone();
    let second = tokio::spawn(async move {
        polling
            .increase_num_executing(Level::Package, false, 3, &token)
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    counters
        .decrease_num_executing(Level::Package, true, 1)
        .unwrap();
    within(first).await.unwrap().unwrap();
    assert_eq!(counters.snapshot(Level::Package).group, GroupPermit::Holding);
    counters
        .decrease_num_executing(Level::Package, false, 2)
        .unwrap();
    assert!(!lock.permit_available(Level::Package));

    second_cancel.cancel();
    assert!(within(second).await.unwrap().unwrap_err().is_cancellation());

    let snapshot = counters.snapshot(Level::Package);
    assert_eq!(snapshot.total_executing, 0);
    assert_eq!(snapshot.group, GroupPermit::Idle);
    assert!(snapshot.permit_available);
    assert!(snapshot.lightswitch_consistent());

    let exclusive = counters.clone();
    let token = cancel.clone();
    let later = tokio::spawn(async move {
        exclusive
            .increase_num_executing(Level::Package, true, 4, &token)
            .await
    });
    within(later).await.unwrap().unwrap();
    assert_eq!(counters.snapshot(Level::Package).exclusive_holder, Some(4));
}

#[test]
fn decrement_at_zero_is_fatal() {
    let (_, _, counters) = counters(4);
    let error = counters
        .decrease_num_executing(Level::Package, false, 1)
        .unwrap_err();
    assert!(matches!(
        error,
        OrchestratorError::CounterUnderflow {
            level: Level::Package,
            ..
        }
    ));
    assert!(counters.decrease_threads().is_err());
}

#[test]
fn thread_cap_is_never_exceeded() {
    let (_, _, counters) = counters(2);
    assert_eq!(counters.increase_threads().unwrap(), 1);
    assert_eq!(counters.increase_threads().unwrap(), 2);
    assert!(counters.thread_limit_reached());

    let error = counters.increase_threads().unwrap_err();
    assert!(error.is_thread_limit());
    assert_eq!(counters.threads(), 2);

    counters.decrease_threads().unwrap();
    assert!(!counters.thread_limit_reached());
}

#[test]
fn table_sets_stay_consistent() {
    let (_, _, counters) = counters(2);
    let tables = vec!["sales.orders".to_string(), "sales.items".to_string()];
    counters.add_accessed_tables(7, &tables).unwrap();
    assert!(counters.is_table_accessed("sales.orders"));
    assert_eq!(counters.workflow_tables(7).len(), 2);

    let error = counters
        .add_accessed_tables(8, &["sales.items".to_string()])
        .unwrap_err();
    assert!(matches!(error, OrchestratorError::DuplicateTable { .. }));
    assert!(counters.workflow_tables(8).is_empty());

    assert_eq!(counters.remove_accessed_tables(7, &tables), 2);
    assert_eq!(counters.accessed_table_count(), 0);
    assert!(counters.workflow_tables(7).is_empty());
}
