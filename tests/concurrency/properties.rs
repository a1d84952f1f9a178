//! Model checks for the counters, FIFO queues and resource ledger.

use etl_orchestrator::concurrency::{
    FifoQueue, GroupPermit, LevelLock, Poller, ResourceCounter, ResourceLedger, ResourceToken,
    RunQueue,
};
use etl_orchestrator::Level;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One node contending for a level: locked or not, when it arrives, how long it
/// stays counted, and when (if ever) its scope is cancelled
#[derive(Debug, Clone)]
struct Contender {
    locked: bool,
    arrive_ms: u64,
    hold_ms: u64,
    cancel_after_ms: Option<u64>,
}

fn contender() -> impl Strategy<Value = Contender> {
    (
        any::<bool>(),
        0u64..6,
        0u64..5,
        prop::option::weighted(0.4, 0u64..10),
    )
        .prop_map(|(locked, arrive_ms, hold_ms, cancel_after_ms)| Contender {
            locked,
            arrive_ms,
            hold_ms,
            cancel_after_ms,
        })
}

#[derive(Debug, Default)]
struct Admitted {
    normal: u32,
    exclusive: u32,
}

/// Run every contender against one level and return the first violation seen
async fn contend(counters: Arc<ResourceCounter>, contenders: Vec<Contender>) -> Result<(), String> {
    let admitted = Arc::new(Mutex::new(Admitted::default()));
    let mut tasks = Vec::with_capacity(contenders.len());

    for (index, contender) in contenders.into_iter().enumerate() {
        let counters = counters.clone();
        let admitted = admitted.clone();
        let node_id = index as i64 + 1;
        let cancel = CancellationToken::new();
        if let Some(after) = contender.cancel_after_ms {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(after)).await;
                cancel.cancel();
            });
        }

        tasks.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(contender.arrive_ms)).await;
            let joined = counters
                .increase_num_executing(Level::Step, contender.locked, node_id, &cancel)
                .await;
            if let Err(e) = joined {
                if !e.is_cancellation() {
                    return Err(format!("node {node_id} failed to join: {e}"));
                }
                let snapshot = counters.snapshot(Level::Step);
                if !snapshot.lightswitch_consistent() {
                    return Err(format!("after rollback of {node_id}: {snapshot:?}"));
                }
                return Ok(());
            }

            {
                let mut admitted = admitted.lock();
                if contender.locked {
                    if admitted.normal > 0 || admitted.exclusive > 0 {
                        return Err(format!("exclusive {node_id} admitted beside {admitted:?}"));
                    }
                    admitted.exclusive += 1;
                } else {
                    if admitted.exclusive > 0 {
                        return Err(format!("normal {node_id} admitted beside an exclusive node"));
                    }
                    admitted.normal += 1;
                }
            }
            let snapshot = counters.snapshot(Level::Step);
            if !snapshot.lightswitch_consistent() {
                return Err(format!("after admitting {node_id}: {snapshot:?}"));
            }

            tokio::time::sleep(Duration::from_millis(contender.hold_ms)).await;

            {
                let mut admitted = admitted.lock();
                if contender.locked {
                    admitted.exclusive -= 1;
                } else {
                    admitted.normal -= 1;
                }
            }
            counters
                .decrease_num_executing(Level::Step, contender.locked, node_id)
                .map_err(|e| format!("node {node_id} failed to leave: {e}"))
        }));
    }

    for task in tasks {
        task.await.map_err(|e| e.to_string())??;
    }
    Ok(())
}

fn token() -> impl Strategy<Value = ResourceToken> {
    prop::sample::select(ResourceToken::RELEASE_ORDER.to_vec())
}

proptest! {
    #[test]
    fn thread_counter_matches_model(max in 1usize..8, ops in prop::collection::vec(any::<bool>(), 0..64)) {
        let lock = Arc::new(LevelLock::new(
            Arc::new(RunQueue::new()),
            Poller::new(Duration::from_millis(1)),
        ));
        let counters = ResourceCounter::new(lock, max);
        let mut model = 0usize;

        for increase in ops {
            if increase {
                let result = counters.increase_threads();
                if model < max {
                    model += 1;
                    prop_assert_eq!(result.ok(), Some(model));
                } else {
                    prop_assert!(result.is_err());
                }
            } else {
                let result = counters.decrease_threads();
                if model > 0 {
                    model -= 1;
                    prop_assert_eq!(result.ok(), Some(model));
                } else {
                    prop_assert!(result.is_err());
                }
            }
            prop_assert!(counters.threads() <= max);
            prop_assert_eq!(counters.threads(), model);
        }
    }

    #[test]
    fn fifo_queue_matches_model(ops in prop::collection::vec((any::<bool>(), 0i64..6), 0..64)) {
        let mut queue = FifoQueue::default();
        let mut model: VecDeque<i64> = VecDeque::new();

        for (push, id) in ops {
            if push {
                let fresh = !model.contains(&id);
                prop_assert_eq!(queue.push(id), fresh);
                if fresh {
                    model.push_back(id);
                }
            } else {
                let held = model.iter().position(|entry| *entry == id);
                prop_assert_eq!(queue.remove(id), held.is_some());
                if let Some(index) = held {
                    model.remove(index);
                }
            }
            prop_assert_eq!(queue.snapshot(), model.iter().copied().collect::<Vec<_>>());
            if let Some(head) = model.front() {
                prop_assert!(queue.is_first(*head));
            }
        }
    }

    #[test]
    fn ledger_drains_each_token_once_in_release_order(tokens in prop::collection::vec(token(), 0..16)) {
        let mut ledger = ResourceLedger::new();
        for token in &tokens {
            ledger.acquire(*token);
        }

        let drained = ledger.drain();
        let expected: Vec<ResourceToken> = ResourceToken::RELEASE_ORDER
            .iter()
            .copied()
            .filter(|token| tokens.contains(token))
            .collect();
        prop_assert_eq!(drained, expected);
        prop_assert!(ledger.is_empty());
        prop_assert!(ledger.drain().is_empty());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn level_counters_drain_to_a_free_permit(contenders in prop::collection::vec(contender(), 1..10)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _runtime_guard = runtime.enter();
        let lock = Arc::new(LevelLock::new(
            Arc::new(RunQueue::new()),
            Poller::new(Duration::from_millis(1)),
        ));
        let counters = Arc::new(ResourceCounter::new(lock, 4));

        let outcome = runtime.block_on(tokio::time::timeout(
            Duration::from_secs(10),
            contend(counters.clone(), contenders),
        ));
        prop_assert!(outcome.is_ok(), "contenders never drained: {:?}", counters.snapshot(Level::Step));
        if let Ok(Err(violation)) = outcome {
            return Err(TestCaseError::fail(violation));
        }

        let snapshot = counters.snapshot(Level::Step);
        prop_assert_eq!(snapshot.total_executing, 0);
        prop_assert_eq!(snapshot.non_exclusive_executing, 0);
        prop_assert_eq!(snapshot.group, GroupPermit::Idle);
        prop_assert_eq!(snapshot.exclusive_holder, None);
        prop_assert!(snapshot.permit_available);
        prop_assert!(snapshot.lightswitch_consistent());
    }
}
