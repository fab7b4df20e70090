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

//! End-to-end scheduler scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::fixtures::{fast_config, spawn_daemon, wait_for_status, Script, ScriptedGateway, WAIT};
use sluice::gateway::GatewayCall;
use sluice::store::MemoryTaskStore;
use sluice::{TaskKind, TaskStatus};

#[tokio::test]
async fn happy_deletion_advances_through_the_state_machine() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_deletion(1, "gsiftp://x/y", "SITE_X", TaskStatus::New);
    let gateway = Arc::new(ScriptedGateway::new());

    let (daemon, shutdown) = spawn_daemon(&fast_config(), Arc::clone(&store), Arc::clone(&gateway));

    assert!(wait_for_status(&store, TaskKind::Deletion, 1, TaskStatus::Done, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    let snap = store.snapshot(TaskKind::Deletion, 1).unwrap();
    assert_eq!(
        snap.history,
        vec![
            TaskStatus::New,
            TaskStatus::Queued,
            TaskStatus::Active,
            TaskStatus::Done
        ]
    );
    assert_eq!(snap.exit_code, Some(0));
    assert!(snap.start_time.unwrap() > 0);
    assert!(snap.finish_time.unwrap() >= snap.start_time.unwrap());
    assert_eq!(gateway.unlink_calls(), 1);
}

#[tokio::test]
async fn missing_deletion_target_is_recorded_as_done() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_deletion(3, "gsiftp://x/gone", "SITE_X", TaskStatus::New);
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_unlink(Script::Respond(GatewayCall::with_code(
        2,
        "no such file or directory",
    )));

    let (daemon, shutdown) = spawn_daemon(&fast_config(), Arc::clone(&store), gateway);

    assert!(wait_for_status(&store, TaskKind::Deletion, 3, TaskStatus::Done, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    let snap = store.snapshot(TaskKind::Deletion, 3).unwrap();
    assert_eq!(snap.exit_code, Some(0));
}

#[tokio::test]
async fn forbidden_overwrite_with_destination_present_skips_the_copy() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_transfer(
        10,
        "gsiftp://a/f",
        "gsiftp://b/f",
        "SITE_A",
        "SITE_B",
        TaskStatus::New,
    );
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_stat(Script::Respond(GatewayCall::ok()));

    let config = fast_config();
    assert!(!config.file_operations.daemon.overwrite);
    let (daemon, shutdown) = spawn_daemon(&config, Arc::clone(&store), Arc::clone(&gateway));

    assert!(wait_for_status(&store, TaskKind::Transfer, 10, TaskStatus::Done, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    assert_eq!(gateway.copy_calls(), 0);
    assert_eq!(gateway.stat_calls(), 1);

    let snap = store.snapshot(TaskKind::Transfer, 10).unwrap();
    assert_eq!(snap.exit_code, Some(0));
    assert!(snap.start_time.unwrap() > 0);
    assert!(snap.finish_time.unwrap() >= snap.start_time.unwrap());
}

#[tokio::test]
async fn port_bind_flap_yields_a_single_done_row() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_transfer(
        20,
        "gsiftp://a/big",
        "gsiftp://b/big",
        "SITE_A",
        "SITE_B",
        TaskStatus::New,
    );
    let gateway = Arc::new(ScriptedGateway::new());
    // Destination absent, then two port-bind failures before success.
    gateway.push_stat(Script::Respond(GatewayCall::with_code(2, "no such file")));
    gateway.push_copy(Script::Respond(GatewayCall::with_code(
        70,
        "could not bind data port",
    )));
    gateway.push_copy(Script::Respond(GatewayCall::with_code(
        70,
        "could not bind data port",
    )));
    gateway.push_copy(Script::Respond(GatewayCall::ok()));

    let (daemon, shutdown) = spawn_daemon(&fast_config(), Arc::clone(&store), Arc::clone(&gateway));

    assert!(wait_for_status(&store, TaskKind::Transfer, 20, TaskStatus::Done, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    assert_eq!(gateway.copy_calls(), 3);

    let snap = store.snapshot(TaskKind::Transfer, 20).unwrap();
    // No intermediate failed row, exactly one terminal write.
    assert!(!snap.history.contains(&TaskStatus::Failed));
    assert_eq!(snap.terminal_writes, 1);
    assert_eq!(snap.exit_code, Some(0));
}

#[tokio::test]
async fn transfer_failure_records_exit_code() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_transfer(
        30,
        "gsiftp://a/f",
        "gsiftp://b/f",
        "SITE_A",
        "SITE_B",
        TaskStatus::New,
    );
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_stat(Script::Respond(GatewayCall::with_code(2, "no such file")));
    gateway.push_copy(Script::Respond(GatewayCall::with_code(
        13,
        "permission denied",
    )));

    let (daemon, shutdown) = spawn_daemon(&fast_config(), Arc::clone(&store), gateway);

    assert!(wait_for_status(&store, TaskKind::Transfer, 30, TaskStatus::Failed, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    let snap = store.snapshot(TaskKind::Transfer, 30).unwrap();
    assert_eq!(snap.exit_code, Some(13));
    assert!(snap.finish_time.unwrap() >= snap.start_time.unwrap());
}

#[tokio::test]
async fn cancellation_between_polls_never_reaches_storage() {
    let store = Arc::new(MemoryTaskStore::new());
    // Two transfers on the same link; pool width 1 so the second waits
    // behind the first, which we hold inside the gateway.
    store.seed_transfer(
        40,
        "gsiftp://a/one",
        "gsiftp://b/one",
        "SITE_A",
        "SITE_B",
        TaskStatus::New,
    );
    store.seed_transfer(
        41,
        "gsiftp://a/two",
        "gsiftp://b/two",
        "SITE_A",
        "SITE_B",
        TaskStatus::New,
    );

    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(ScriptedGateway::new());
    gateway.push_stat(Script::Respond(GatewayCall::with_code(2, "no such file")));
    gateway.push_copy(Script::Block {
        gate: Arc::clone(&gate),
        then: GatewayCall::ok(),
    });

    let mut config = fast_config();
    config.file_operations.daemon.max_parallel_links = 1;
    let (daemon, shutdown) = spawn_daemon(&config, Arc::clone(&store), Arc::clone(&gateway));

    // First task is inside the gateway; second is queued behind it.
    assert!(wait_for_status(&store, TaskKind::Transfer, 40, TaskStatus::Active, WAIT).await);
    assert_eq!(store.status(TaskKind::Transfer, 41), Some(TaskStatus::Queued));

    // Out-of-band cancellation by the manager, then a few poll cycles so
    // the registry refresh observes it.
    store.force_status(TaskKind::Transfer, 41, TaskStatus::Cancelled);
    tokio::time::sleep(Duration::from_millis(100)).await;

    gate.add_permits(1);

    assert!(wait_for_status(&store, TaskKind::Transfer, 40, TaskStatus::Done, WAIT).await);

    // Wait until the collector has recorded the cancelled verdict, so the
    // assertion below really covers the worker's registry check.
    let deadline = std::time::Instant::now() + WAIT;
    while store
        .snapshot(TaskKind::Transfer, 41)
        .map(|s| s.terminal_writes)
        .unwrap_or(0)
        == 0
    {
        assert!(std::time::Instant::now() < deadline, "verdict never recorded");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    let snap = store.snapshot(TaskKind::Transfer, 41).unwrap();
    assert_eq!(snap.status, TaskStatus::Cancelled);
    assert!(!snap.history.contains(&TaskStatus::Active));
    assert!(!gateway.touched("two"));
}

#[tokio::test]
async fn tasks_on_distinct_links_run_in_separate_pools() {
    let store = Arc::new(MemoryTaskStore::new());
    store.seed_transfer(50, "gsiftp://a/f", "gsiftp://b/f", "SITE_A", "SITE_B", TaskStatus::New);
    store.seed_transfer(51, "gsiftp://c/f", "gsiftp://d/f", "SITE_C", "SITE_D", TaskStatus::New);
    store.seed_deletion(52, "gsiftp://e/f", "SITE_E", TaskStatus::New);

    let gateway = Arc::new(ScriptedGateway::new());
    let mut config = fast_config();
    config.file_operations.daemon.overwrite = true;
    let (daemon, shutdown) = spawn_daemon(&config, Arc::clone(&store), Arc::clone(&gateway));

    assert!(wait_for_status(&store, TaskKind::Transfer, 50, TaskStatus::Done, WAIT).await);
    assert!(wait_for_status(&store, TaskKind::Transfer, 51, TaskStatus::Done, WAIT).await);
    assert!(wait_for_status(&store, TaskKind::Deletion, 52, TaskStatus::Done, WAIT).await);
    shutdown.trigger();
    daemon.await.unwrap().unwrap();

    assert_eq!(gateway.copy_calls(), 2);
    assert_eq!(gateway.unlink_calls(), 1);
}
