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

//! Pool Manager
//!
//! One [`LinkPool`] exists per live link. It owns a semaphore-bounded
//! worker group, the list of in-flight result handles, and a collector
//! task that writes terminal statuses back to the store. The pool is the
//! only component that moves a task from `new` to `queued`, which makes
//! that transition the synchronization point guaranteeing at most one
//! worker per task id.
//!
//! Workers receive the cancellation registry as an explicit argument and
//! never reach back into the pool.
//!
//! Lifecycle: pools are created lazily by the scheduler, drain naturally
//! as their collector empties the in-flight list, and are reclaimed on the
//! next scheduler pass once [`LinkPool::ready_for_recycle`] reports true.
//! Prompt reclamation keeps resource usage from growing with the set of
//! historically-seen links.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::gateway::GatewayAdapter;
use crate::models::{Link, OpReport, Operation, PendingTask, TaskKind, TaskStatus};
use crate::registry::CancellationRegistry;
use crate::store::TaskStore;
use crate::error::StoreError;

/// What a worker hands back through its result handle.
#[derive(Debug)]
pub enum WorkerVerdict {
    /// The task id was gone from the registry: cancelled between enqueue
    /// and dispatch. No storage operation was made.
    Cancelled,
    /// A storage operation ran (or failed to run); the report says how it
    /// went.
    Completed(OpReport),
}

struct InFlight {
    task_id: i64,
    handle: JoinHandle<WorkerVerdict>,
}

/// Bounded worker pool plus results collector for one link.
pub struct LinkPool {
    link: Link,
    store: Arc<dyn TaskStore>,
    adapter: Arc<GatewayAdapter>,
    registry: Arc<CancellationRegistry>,
    stop: Arc<AtomicBool>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<Vec<InFlight>>>,
    collector: Mutex<Option<JoinHandle<()>>>,
    collector_interval: Duration,
}

impl LinkPool {
    pub fn new(
        link: Link,
        max_concurrent: usize,
        collector_interval: Duration,
        store: Arc<dyn TaskStore>,
        adapter: Arc<GatewayAdapter>,
        registry: Arc<CancellationRegistry>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            link,
            store,
            adapter,
            registry,
            stop,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            in_flight: Arc::new(Mutex::new(Vec::new())),
            collector: Mutex::new(None),
            collector_interval,
        }
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Accepts one task: transitions the row `new -> queued`, registers the
    /// id with the cancellation registry, and submits a worker.
    ///
    /// The database write and the registry append happen under the registry
    /// lock so a concurrent refresh never observes the row queued without
    /// its registry entry. A row that is no longer `new` (cancelled out of
    /// band, or already claimed) is skipped without dispatching a worker.
    pub async fn add_task(&self, task: &PendingTask) -> Result<(), StoreError> {
        let kind = self.link.kind();

        {
            let mut queued = self.registry.lock().await;
            if !self.store.mark_queued(kind, task.id).await? {
                debug!(task_id = task.id, link = %self.link, "row no longer new, not dispatching");
                return Ok(());
            }
            queued.insert(task.id);
        }

        let handle = tokio::spawn(run_worker(
            task.id,
            kind,
            task.op.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.adapter),
            Arc::clone(&self.registry),
            Arc::clone(&self.semaphore),
        ));

        self.in_flight
            .lock()
            .await
            .push(InFlight {
                task_id: task.id,
                handle,
            });
        self.ensure_collector().await;

        Ok(())
    }

    /// Starts the collector if it is not running and there is work to
    /// collect. Called from `add_task` and again on every scheduler pass,
    /// which is what restarts a collector that died.
    pub async fn ensure_collector(&self) {
        let mut slot = self.collector.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        if self.in_flight.lock().await.is_empty() {
            return;
        }

        *slot = Some(tokio::spawn(collect_loop(
            self.link.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.in_flight),
            Arc::clone(&self.stop),
            self.collector_interval,
        )));
    }

    /// Idempotent probe: true once the pool holds no in-flight results and
    /// its collector has exited, at which point the scheduler may drop it.
    ///
    /// Under the stop flag the remaining workers are terminated forcibly
    /// and joined first, so a true result always means every worker is
    /// accounted for.
    pub async fn ready_for_recycle(&self) -> bool {
        if self.stop.load(Ordering::Relaxed) {
            let drained: Vec<InFlight> = {
                let mut guard = self.in_flight.lock().await;
                guard.drain(..).collect()
            };
            for entry in drained {
                entry.handle.abort();
                let _ = entry.handle.await;
                warn!(task_id = entry.task_id, link = %self.link, "worker terminated at shutdown");
            }
        }

        if !self.in_flight.lock().await.is_empty() {
            return false;
        }

        let mut slot = self.collector.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                return false;
            }
        }
        if let Some(handle) = slot.take() {
            let _ = handle.await;
        }
        true
    }
}

/// Single-task worker body.
///
/// The registry removal is the first step: losing it means the upstream
/// manager cancelled the task after enqueue, and the worker must not touch
/// storage. The semaphore is acquired before that so queued-but-cancelled
/// tasks drain in dispatch order like any other.
async fn run_worker(
    task_id: i64,
    kind: TaskKind,
    op: Operation,
    store: Arc<dyn TaskStore>,
    adapter: Arc<GatewayAdapter>,
    registry: Arc<CancellationRegistry>,
    semaphore: Arc<Semaphore>,
) -> WorkerVerdict {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return WorkerVerdict::Completed(OpReport::internal_error(
                "worker pool semaphore closed",
            ))
        }
    };

    if !registry.take(task_id).await {
        return WorkerVerdict::Cancelled;
    }

    if let Err(e) = store.mark_active(kind, task_id).await {
        return WorkerVerdict::Completed(OpReport::internal_error(format!(
            "failed to mark task active: {}",
            e
        )));
    }

    debug!(task_id, kind = %kind, "task active, invoking storage gateway");
    WorkerVerdict::Completed(adapter.execute(&op).await)
}

/// Collector body: harvests finished result handles and writes terminal
/// statuses. Exits when the in-flight list is empty or the stop flag is
/// set; the scheduler restarts it if more work arrives.
async fn collect_loop(
    link: Link,
    store: Arc<dyn TaskStore>,
    in_flight: Arc<Mutex<Vec<InFlight>>>,
    stop: Arc<AtomicBool>,
    interval: Duration,
) {
    debug!(link = %link, "collector started");
    let kind = link.kind();

    loop {
        if stop.load(Ordering::Relaxed) {
            debug!(link = %link, "collector exiting on stop flag");
            return;
        }

        let finished: Vec<InFlight> = {
            let mut guard = in_flight.lock().await;
            let mut finished = Vec::new();
            let mut i = 0;
            while i < guard.len() {
                if guard[i].handle.is_finished() {
                    finished.push(guard.remove(i));
                } else {
                    i += 1;
                }
            }
            finished
        };

        for entry in finished {
            let verdict = match entry.handle.await {
                Ok(verdict) => verdict,
                Err(e) => WorkerVerdict::Completed(OpReport::internal_error(format!(
                    "worker terminated abnormally: {}",
                    e
                ))),
            };
            record_verdict(store.as_ref(), kind, &link, entry.task_id, verdict).await;
        }

        if in_flight.lock().await.is_empty() {
            debug!(link = %link, "collector idle, exiting");
            return;
        }

        tokio::time::sleep(interval).await;
    }
}

async fn record_verdict(
    store: &dyn TaskStore,
    kind: TaskKind,
    link: &Link,
    task_id: i64,
    verdict: WorkerVerdict,
) {
    let result = match verdict {
        WorkerVerdict::Cancelled => {
            info!(task_id, link = %link, "task cancelled before dispatch");
            store
                .record_terminal(kind, task_id, TaskStatus::Cancelled, None)
                .await
        }
        WorkerVerdict::Completed(report) => {
            if report.is_success() {
                info!(
                    task_id,
                    link = %link,
                    message = %report.message,
                    log = %truncated(&report.log, 512),
                    "task done"
                );
            } else {
                warn!(
                    task_id,
                    link = %link,
                    exit_code = report.exit_code,
                    message = %report.message,
                    log = %report.log,
                    "task failed"
                );
            }
            let status = if report.is_success() {
                TaskStatus::Done
            } else {
                TaskStatus::Failed
            };
            store
                .record_terminal(kind, task_id, status, Some(&report))
                .await
        }
    };

    if let Err(e) = result {
        error!(task_id, link = %link, "failed to record task outcome: {}", e);
    }
}

fn truncated(log: &str, max_chars: usize) -> String {
    if log.chars().count() <= max_chars {
        log.to_string()
    } else {
        let mut out: String = log.chars().take(max_chars).collect();
        out.push_str(" ...");
        out
    }
}
