//! FIFO ordering of the permit, admission and table queues.

use crate::common::within;
use etl_orchestrator::concurrency::{LevelLock, Poller, QueueFamily, RunQueue};
use etl_orchestrator::Level;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[tokio::test]
async fn level_permit_is_granted_in_arrival_order() {
    let queue = Arc::new(RunQueue::new());
    let lock = Arc::new(LevelLock::new(
        queue.clone(),
        Poller::new(Duration::from_millis(2)),
    ));
    let cancel = CancellationToken::new();

    lock.get_semaphore(Level::Package, 0, &cancel).await.unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();
    for id in 1..=4_i64 {
        let lock = lock.clone();
        let order = order.clone();
        let cancel = cancel.clone();
        waiters.push(tokio::spawn(async move {
            lock.get_semaphore(Level::Package, id, &cancel).await.unwrap();
            order.lock().push(id);
            tokio::time::sleep(Duration::from_millis(5)).await;
            lock.free_semaphore(Level::Package).unwrap();
        }));
        // each waiter is queued before the next one arrives
        crate::common::eventually(|| queue.is_queued(QueueFamily::Permit, Level::Package, id))
            .await;
    }

    lock.free_semaphore(Level::Package).unwrap();
    for waiter in waiters {
        within(waiter).await.unwrap();
    }

    assert_eq!(*order.lock(), vec![1, 2, 3, 4]);
    assert!(lock.permit_available(Level::Package));
    assert_eq!(queue.len(QueueFamily::Permit, Level::Package), 0);
}

#[test]
fn admission_queue_is_fifo_and_rejects_duplicates() {
    let queue = RunQueue::new();
    for id in [30, 10, 20] {
        queue.enqueue(QueueFamily::Admission, Level::Step, id).unwrap();
    }
    assert!(queue.enqueue(QueueFamily::Admission, Level::Step, 10).is_err());
    assert!(queue.is_first(QueueFamily::Admission, Level::Step, 30));
    assert_eq!(queue.snapshot(QueueFamily::Admission, Level::Step), vec![30, 10, 20]);

    assert!(queue.dequeue(QueueFamily::Admission, Level::Step, 30));
    assert!(queue.is_first(QueueFamily::Admission, Level::Step, 10));
    assert!(!queue.dequeue(QueueFamily::Admission, Level::Step, 30));

    // levels are independent
    assert_eq!(queue.len(QueueFamily::Admission, Level::Package), 0);
}

#[test]
fn table_enqueue_is_all_or_nothing() {
    let queue = RunQueue::new();
    queue.enqueue_tables(&tables(&["a", "b"]), 1).unwrap();
    queue.enqueue_tables(&tables(&["b", "c"]), 2).unwrap();

    assert!(queue.is_first_on_all(&tables(&["a", "b"]), 1));
    assert!(!queue.is_first_on_all(&tables(&["b", "c"]), 2));

    let error = queue.enqueue_tables(&tables(&["c", "a"]), 2);
    assert!(error.is_err());
    assert_eq!(queue.table_queue("a"), vec![1]);
    assert_eq!(queue.table_queue("c"), vec![2]);

    assert_eq!(queue.dequeue_tables(&tables(&["a", "b"]), 1), 2);
    assert!(queue.is_first_on_all(&tables(&["b", "c"]), 2));
    assert!(queue.table_queue("a").is_empty());
}
