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

//! Scheduler Loop
//!
//! The daemon's main loop. Each iteration processes deletions first, then
//! transfers: fetch all `new` rows, hand each to the pool for its link
//! (creating pools lazily), and rebuild that kind's cancellation registry
//! from the database's current `queued` set. After both kinds, pools that
//! have drained are dropped. The loop then sleeps for the poll interval,
//! interruptible by the stop signal.
//!
//! The sleep is unconditional even when new rows were just dispatched,
//! as intentional back-pressure on the upstream manager.
//!
//! [`crate::pool::LinkPool::add_task`] is the only path from `new` to
//! `queued`; the scheduler itself never writes statuses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::gateway::GatewayAdapter;
use crate::models::{Link, TaskKind};
use crate::pool::LinkPool;
use crate::registry::CancellationRegistry;
use crate::store::TaskStore;

/// Timing and sizing knobs for the scheduler and its pools.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker-pool width per link.
    pub max_concurrent: usize,
    /// Sleep between poll cycles.
    pub poll_interval: Duration,
    /// Sleep between collector sweeps inside each pool.
    pub collector_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            poll_interval: Duration::from_secs(30),
            collector_interval: Duration::from_secs(5),
        }
    }
}

/// The polling loop and its pool registry.
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    adapter: Arc<GatewayAdapter>,
    transfer_registry: Arc<CancellationRegistry>,
    deletion_registry: Arc<CancellationRegistry>,
    pools: HashMap<Link, Arc<LinkPool>>,
    stop: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<()>,
    config: SchedulerConfig,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TaskStore>,
        adapter: Arc<GatewayAdapter>,
        transfer_registry: Arc<CancellationRegistry>,
        deletion_registry: Arc<CancellationRegistry>,
        stop: Arc<AtomicBool>,
        shutdown_rx: broadcast::Receiver<()>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            adapter,
            transfer_registry,
            deletion_registry,
            pools: HashMap::new(),
            stop,
            shutdown_rx,
            config,
        }
    }

    pub fn registry(&self, kind: TaskKind) -> &Arc<CancellationRegistry> {
        match kind {
            TaskKind::Transfer => &self.transfer_registry,
            TaskKind::Deletion => &self.deletion_registry,
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Runs poll cycles until the stop flag is raised.
    pub async fn run(&mut self) -> Result<(), StoreError> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            for kind in TaskKind::ALL {
                self.run_cycle(kind).await?;
            }
            self.recycle_pools().await;

            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = self.shutdown_rx.recv() => {}
            }
        }
        Ok(())
    }

    /// One poll iteration for one kind: dispatch every `new` row to its
    /// link's pool, then refresh the cancellation registry.
    pub async fn run_cycle(&mut self, kind: TaskKind) -> Result<(), StoreError> {
        let tasks = self.store.fetch_new(kind).await?;
        let mut dispatched = 0usize;

        for task in &tasks {
            let pool = self.pool_for(&task.link);
            pool.add_task(task).await?;
            dispatched += 1;
        }

        if dispatched > 0 {
            info!(kind = %kind, count = dispatched, "dispatched new tasks");
        }

        let queued = self.store.list_queued(kind).await?;
        self.registry(kind).replace(queued).await;

        Ok(())
    }

    /// Sweeps all pools: restarts any dead collector that still has work,
    /// and drops pools whose worker group has fully drained.
    pub async fn recycle_pools(&mut self) {
        let mut recycled = Vec::new();
        for (link, pool) in &self.pools {
            pool.ensure_collector().await;
            if pool.ready_for_recycle().await {
                recycled.push(link.clone());
            }
        }
        for link in recycled {
            self.pools.remove(&link);
            debug!(link = %link, "recycled idle pool");
        }
    }

    /// Polls all remaining pools until every one has closed. Used on the
    /// shutdown path, after the stop flag forces workers to terminate.
    pub async fn drain(&mut self) {
        loop {
            let mut closed = Vec::new();
            for (link, pool) in &self.pools {
                if pool.ready_for_recycle().await {
                    closed.push(link.clone());
                }
            }
            for link in closed {
                self.pools.remove(&link);
            }
            if self.pools.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    fn pool_for(&mut self, link: &Link) -> Arc<LinkPool> {
        if let Some(pool) = self.pools.get(link) {
            return Arc::clone(pool);
        }

        info!(link = %link, "creating worker pool");
        let registry = Arc::clone(self.registry(link.kind()));
        let pool = Arc::new(LinkPool::new(
            link.clone(),
            self.config.max_concurrent,
            self.config.collector_interval,
            Arc::clone(&self.store),
            Arc::clone(&self.adapter),
            registry,
            Arc::clone(&self.stop),
        ));
        self.pools.insert(link.clone(), Arc::clone(&pool));
        pool
    }
}
