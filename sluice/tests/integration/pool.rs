/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Pool manager behavior, exercised directly without the scheduler loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

use crate::fixtures::{wait_for_status, Script, ScriptedGateway, WAIT};
use sluice::gateway::{GatewayAdapter, GatewayCall, StorageGateway, TransferParams};
use sluice::pool::LinkPool;
use sluice::store::MemoryTaskStore;
use sluice::{CancellationRegistry, Link, TaskKind, TaskStatus, TaskStore};

struct PoolHarness {
    store: Arc<MemoryTaskStore>,
    gateway: Arc<ScriptedGateway>,
    registry: Arc<CancellationRegistry>,
    stop: Arc<AtomicBool>,
    pool: LinkPool,
}

fn deletion_pool(max_concurrent: usize) -> PoolHarness {
    let store = Arc::new(MemoryTaskStore::new());
    let gateway = Arc::new(ScriptedGateway::new());
    let registry = Arc::new(CancellationRegistry::new());
    let stop = Arc::new(AtomicBool::new(false));

    let gateway_handle: Arc<dyn StorageGateway> = Arc::clone(&gateway) as _;
    let store_handle: Arc<dyn TaskStore> = Arc::clone(&store) as _;
    let adapter = Arc::new(GatewayAdapter::new(gateway_handle, TransferParams::default()));
    let pool = LinkPool::new(
        Link::Deletion {
            site: "SITE_X".into(),
        },
        max_concurrent,
        Duration::from_millis(20),
        store_handle,
        adapter,
        Arc::clone(&registry),
        Arc::clone(&stop),
    );

    PoolHarness {
        store,
        gateway,
        registry,
        stop,
        pool,
    }
}

async fn wait_until_recyclable(pool: &LinkPool) {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if pool.ready_for_recycle().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("pool never became recyclable");
}

#[tokio::test]
async fn registry_matches_queued_rows_while_a_worker_runs() {
    let harness = deletion_pool(1);
    harness.store.seed_deletion(1, "gsiftp://x/one", "SITE_X", TaskStatus::New);
    harness.store.seed_deletion(2, "gsiftp://x/two", "SITE_X", TaskStatus::New);

    let gate = Arc::new(Semaphore::new(0));
    harness.gateway.push_unlink(Script::Block {
        gate: Arc::clone(&gate),
        then: GatewayCall::ok(),
    });

    for task in harness.store.fetch_new(TaskKind::Deletion).await.unwrap() {
        harness.pool.add_task(&task).await.unwrap();
    }

    // Task 1 is inside the gateway; task 2 still waits on the pool.
    assert!(wait_for_status(&harness.store, TaskKind::Deletion, 1, TaskStatus::Active, WAIT).await);
    let queued = harness.store.list_queued(TaskKind::Deletion).await.unwrap();
    assert_eq!(queued, [2].into_iter().collect());
    assert_eq!(harness.registry.snapshot().await, queued);

    gate.add_permits(1);
    assert!(wait_for_status(&harness.store, TaskKind::Deletion, 1, TaskStatus::Done, WAIT).await);
    assert!(wait_for_status(&harness.store, TaskKind::Deletion, 2, TaskStatus::Done, WAIT).await);

    wait_until_recyclable(&harness.pool).await;
    // The probe is idempotent once the pool has drained.
    assert!(harness.pool.ready_for_recycle().await);
}

#[tokio::test]
async fn cancelled_task_skips_storage_and_keeps_its_status() {
    let harness = deletion_pool(1);
    harness.store.seed_deletion(1, "gsiftp://x/one", "SITE_X", TaskStatus::New);
    harness.store.seed_deletion(2, "gsiftp://x/two", "SITE_X", TaskStatus::New);

    let gate = Arc::new(Semaphore::new(0));
    harness.gateway.push_unlink(Script::Block {
        gate: Arc::clone(&gate),
        then: GatewayCall::ok(),
    });

    for task in harness.store.fetch_new(TaskKind::Deletion).await.unwrap() {
        harness.pool.add_task(&task).await.unwrap();
    }
    assert!(wait_for_status(&harness.store, TaskKind::Deletion, 1, TaskStatus::Active, WAIT).await);

    // The manager cancels task 2 out of band; the next refresh drops it
    // from the registry before its worker gets the semaphore.
    harness
        .store
        .force_status(TaskKind::Deletion, 2, TaskStatus::Cancelled);
    let queued = harness.store.list_queued(TaskKind::Deletion).await.unwrap();
    assert!(queued.is_empty());
    harness.registry.replace(queued).await;

    gate.add_permits(1);
    assert!(wait_for_status(&harness.store, TaskKind::Deletion, 1, TaskStatus::Done, WAIT).await);
    assert!(
        wait_for_status(&harness.store, TaskKind::Deletion, 2, TaskStatus::Cancelled, WAIT).await
    );
    wait_until_recyclable(&harness.pool).await;

    let snap = harness.store.snapshot(TaskKind::Deletion, 2).unwrap();
    assert!(!snap.history.contains(&TaskStatus::Active));
    assert!(!harness.gateway.touched("two"));
    // Cancellation carries no exit code or timestamps.
    assert_eq!(snap.exit_code, None);
    assert_eq!(snap.start_time, None);
}

#[tokio::test]
async fn add_task_skips_rows_claimed_out_of_band() {
    let harness = deletion_pool(2);
    harness.store.seed_deletion(5, "gsiftp://x/f", "SITE_X", TaskStatus::New);

    let tasks = harness.store.fetch_new(TaskKind::Deletion).await.unwrap();
    harness
        .store
        .force_status(TaskKind::Deletion, 5, TaskStatus::Cancelled);

    harness.pool.add_task(&tasks[0]).await.unwrap();

    // The guarded transition lost, so nothing was dispatched.
    assert_eq!(harness.pool.in_flight_count().await, 0);
    assert!(!harness.registry.contains(5).await);
    assert_eq!(harness.gateway.total_calls(), 0);
    assert_eq!(
        harness.store.status(TaskKind::Deletion, 5),
        Some(TaskStatus::Cancelled)
    );
}

#[tokio::test]
async fn stop_flag_terminates_blocked_workers() {
    let harness = deletion_pool(1);
    harness.store.seed_deletion(9, "gsiftp://x/slow", "SITE_X", TaskStatus::New);

    let gate = Arc::new(Semaphore::new(0));
    harness.gateway.push_unlink(Script::Block {
        gate: Arc::clone(&gate),
        then: GatewayCall::ok(),
    });

    for task in harness.store.fetch_new(TaskKind::Deletion).await.unwrap() {
        harness.pool.add_task(&task).await.unwrap();
    }
    assert!(wait_for_status(&harness.store, TaskKind::Deletion, 9, TaskStatus::Active, WAIT).await);

    harness.stop.store(true, Ordering::Relaxed);
    wait_until_recyclable(&harness.pool).await;

    // The worker was killed mid-call; no terminal status was written. The
    // recovery sweep is what returns the row to new.
    assert_eq!(
        harness.store.status(TaskKind::Deletion, 9),
        Some(TaskStatus::Active)
    );
    assert_eq!(harness.store.recover_orphans().await.unwrap(), 1);
    assert_eq!(
        harness.store.status(TaskKind::Deletion, 9),
        Some(TaskStatus::New)
    );
}

#[tokio::test]
async fn worker_error_is_recorded_as_failed_not_cancelled() {
    let harness = deletion_pool(1);
    harness.store.seed_deletion(11, "gsiftp://x/f", "SITE_X", TaskStatus::New);
    harness
        .gateway
        .push_unlink(Script::Fail("engine unavailable".into()));

    for task in harness.store.fetch_new(TaskKind::Deletion).await.unwrap() {
        harness.pool.add_task(&task).await.unwrap();
    }

    assert!(
        wait_for_status(&harness.store, TaskKind::Deletion, 11, TaskStatus::Failed, WAIT).await
    );
    wait_until_recyclable(&harness.pool).await;

    let snap = harness.store.snapshot(TaskKind::Deletion, 11).unwrap();
    assert_eq!(snap.exit_code, Some(-1));
    assert!(!snap.history.contains(&TaskStatus::Cancelled));
}
