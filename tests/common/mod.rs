//! Shared assertions for integration tests.

use etl_orchestrator::concurrency::QueueFamily;
use etl_orchestrator::{Level, SharedState};
use std::future::Future;
use std::time::Duration;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, failing the test when it takes longer than [`TEST_TIMEOUT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation did not complete in time")
}

/// Poll `condition` every few milliseconds until it holds
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
}

/// Every lock, counter, queue and table set is back at rest
pub fn assert_quiescent(shared: &SharedState) {
    for level in Level::ALL {
        let snapshot = shared.counters().snapshot(level);
        assert_eq!(snapshot.total_executing, 0, "{level} still counted as executing");
        assert_eq!(snapshot.non_exclusive_executing, 0, "{level} normal nodes still counted");
        assert!(snapshot.permit_available, "{level} permit still held");
        assert!(!shared.level_lock().is_announced(level), "{level} still announced");
        assert_eq!(shared.run_queue().len(QueueFamily::Admission, level), 0);
        assert_eq!(shared.run_queue().len(QueueFamily::Permit, level), 0);
    }
    assert_eq!(shared.counters().threads(), 0, "threads still counted");
    assert_eq!(shared.counters().accessed_table_count(), 0, "tables still accessed");
    assert!(shared.arena().is_empty(), "nodes still live: {:?}", shared.arena());
}
