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

//! Daemon assembly and shutdown supervision.
//!
//! [`Daemon`] wires the store, the gateway adapter, the per-kind
//! cancellation registries, and the scheduler into one value constructed at
//! startup; nothing in the library lives in a global. Tests build their own
//! daemon against the in-memory store.
//!
//! Shutdown is cooperative: OS termination signals (or
//! [`ShutdownHandle::trigger`]) raise a shared stop flag and wake the
//! scheduler's sleep through a broadcast channel. The run loop then resets
//! any still-`queued`/`active` rows to `new` and polls the pools until
//! every worker is accounted for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::DaemonError;
use crate::gateway::{GatewayAdapter, StorageGateway, TransferParams};
use crate::registry::CancellationRegistry;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::store::TaskStore;

/// The file-operations daemon.
pub struct Daemon {
    instance_id: Uuid,
    store: Arc<dyn TaskStore>,
    stop: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    scheduler: Scheduler,
}

impl Daemon {
    /// Assembles a daemon from its collaborators. The gateway is wrapped in
    /// the adapter configured with the transfer parameters from `config`.
    pub fn new(
        config: &Config,
        store: Arc<dyn TaskStore>,
        gateway: Arc<dyn StorageGateway>,
    ) -> Self {
        let opts = &config.file_operations.daemon;

        let params = TransferParams {
            create_parents: true,
            overwrite: opts.overwrite,
            checksum: opts.checksum,
            timeout: Duration::from_secs(opts.transfer_timeout),
            verbosity: opts.gfal2_verbosity.clone(),
        };
        let adapter = Arc::new(GatewayAdapter::new(gateway, params));

        let stop = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let scheduler = Scheduler::new(
            Arc::clone(&store),
            adapter,
            Arc::new(CancellationRegistry::new()),
            Arc::new(CancellationRegistry::new()),
            Arc::clone(&stop),
            shutdown_rx,
            SchedulerConfig {
                max_concurrent: opts.max_parallel_links,
                poll_interval: Duration::from_secs_f64(opts.poll_interval),
                collector_interval: Duration::from_secs_f64(opts.collector_interval),
            },
        );

        Self {
            instance_id: Uuid::new_v4(),
            store,
            stop,
            shutdown_tx,
            scheduler,
        }
    }

    /// Handle that stops this daemon from another task or a signal
    /// handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    /// Runs the daemon to completion.
    ///
    /// Startup normalizes orphaned rows, then the scheduler loop runs until
    /// the stop flag is raised or it fails. The shutdown path executes in
    /// all cases: stop flag (collectors exit), orphan recovery, pool drain,
    /// termination log.
    pub async fn run(mut self) -> Result<(), DaemonError> {
        info!(instance = %self.instance_id, "file operations daemon starting");

        let recovered = self.store.recover_orphans().await?;
        if recovered > 0 {
            info!(rows = recovered, "reset orphaned tasks to new");
        }

        let loop_result = self.scheduler.run().await;
        if let Err(e) = &loop_result {
            error!("scheduler loop failed: {}", e);
        }

        self.stop.store(true, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());

        match self.store.recover_orphans().await {
            Ok(rows) if rows > 0 => info!(rows, "reset in-flight tasks to new"),
            Ok(_) => {}
            Err(e) => error!("orphan recovery at shutdown failed: {}", e),
        }

        self.scheduler.drain().await;

        info!(instance = %self.instance_id, "file operations daemon terminated");
        loop_result.map_err(DaemonError::from)
    }
}

/// Cooperative stop switch shared with signal handlers and tests.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    /// Raises the stop flag and wakes the scheduler's sleep.
    pub fn trigger(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}

/// Translates host termination signals into the cooperative stop
/// mechanism. Resolves after the first SIGTERM or SIGHUP.
pub async fn listen_for_signals(handle: ShutdownHandle) -> std::io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = term.recv() => info!("received SIGTERM, stopping"),
        _ = hangup.recv() => info!("received SIGHUP, stopping"),
    }

    handle.trigger();
    Ok(())
}
