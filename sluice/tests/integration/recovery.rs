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

//! Orphan recovery across daemon restarts and interrupts.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::fixtures::{fast_config, spawn_daemon, wait_for_status, Script, ScriptedGateway, WAIT};
use sluice::gateway::{GatewayCall, StorageGateway};
use sluice::store::MemoryTaskStore;
use sluice::{Daemon, TaskKind, TaskStatus, TaskStore};

#[tokio::test]
async fn seeded_orphans_are_reset_without_spawning_workers() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_transfer(1, "s", "d", "SITE_A", "SITE_B", TaskStatus::Active);
    store.seed_transfer(2, "s", "d", "SITE_A", "SITE_B", TaskStatus::Active);
    store.seed_deletion(3, "f", "SITE_C", TaskStatus::Active);
    store.seed_deletion(4, "f", "SITE_C", TaskStatus::Queued);
    store.seed_transfer(5, "s", "d", "SITE_A", "SITE_B", TaskStatus::Queued);

    let gateway = Arc::new(ScriptedGateway::new());
    let daemon = Daemon::new(
        &fast_config(),
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::clone(&gateway) as Arc<dyn StorageGateway>,
    );

    // Stop before the first poll cycle: startup recovery still runs, the
    // scheduler never dispatches.
    daemon.shutdown_handle().trigger();
    daemon.run().await.unwrap();

    for (kind, id) in [
        (TaskKind::Transfer, 1),
        (TaskKind::Transfer, 2),
        (TaskKind::Deletion, 3),
        (TaskKind::Deletion, 4),
        (TaskKind::Transfer, 5),
    ] {
        assert_eq!(store.status(kind, id), Some(TaskStatus::New), "task {}", id);
    }
    assert_eq!(gateway.total_calls(), 0);
}

#[tokio::test]
async fn start_stop_cycle_leaves_the_queue_untouched() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_transfer(1, "s", "d", "SITE_A", "SITE_B", TaskStatus::New);
    store.seed_deletion(2, "f", "SITE_C", TaskStatus::New);
    store.seed_deletion(3, "f", "SITE_C", TaskStatus::Done);
    store.seed_transfer(4, "s", "d", "SITE_A", "SITE_B", TaskStatus::Failed);
    store.seed_transfer(5, "s", "d", "SITE_A", "SITE_B", TaskStatus::Cancelled);

    let before = store.non_terminal_ids();

    let gateway = Arc::new(ScriptedGateway::new());
    let daemon = Daemon::new(
        &fast_config(),
        Arc::clone(&store) as Arc<dyn TaskStore>,
        Arc::clone(&gateway) as Arc<dyn StorageGateway>,
    );
    daemon.shutdown_handle().trigger();
    daemon.run().await.unwrap();

    assert_eq!(store.non_terminal_ids(), before);
    assert_eq!(store.status(TaskKind::Transfer, 1), Some(TaskStatus::New));
    assert_eq!(store.status(TaskKind::Deletion, 3), Some(TaskStatus::Done));
    assert_eq!(store.status(TaskKind::Transfer, 4), Some(TaskStatus::Failed));
    assert_eq!(gateway.total_calls(), 0);
}

#[tokio::test]
async fn interrupted_daemon_resets_in_flight_rows_to_new() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_deletion(7, "gsiftp://x/slow", "SITE_X", TaskStatus::New);

    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_unlink(Script::Block {
        gate,
        then: GatewayCall::ok(),
    });

    let (daemon, shutdown) = spawn_daemon(&fast_config(), Arc::clone(&store), gateway);

    // The worker is now wedged inside the gateway; interrupt the daemon.
    assert!(wait_for_status(&store, TaskKind::Deletion, 7, TaskStatus::Active, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    // Clean exit leaves nothing queued or active.
    assert_eq!(store.status(TaskKind::Deletion, 7), Some(TaskStatus::New));
    assert!(store.list_queued(TaskKind::Deletion).await.unwrap().is_empty());
}

#[tokio::test]
async fn queued_row_without_registry_entry_is_recovered() {
    // A crash between the queued write and the registry append leaves the
    // row queued with no registry entry; the next recovery sweep resets it.
    let store = MemoryTaskStore::new();
    store.seed_transfer(1, "s", "d", "SITE_A", "SITE_B", TaskStatus::Queued);

    assert_eq!(store.recover_orphans().await.unwrap(), 1);
    assert_eq!(store.status(TaskKind::Transfer, 1), Some(TaskStatus::New));
}
