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

//! # Sluice
//!
//! Sluice is a daemon that drains two database-backed work queues, a
//! transfer queue and a deletion queue, by executing bulk file copies and
//! unlinks against remote storage endpoints. An upstream file-operations
//! manager authors task rows; sluice picks them up, groups them by link
//! (source/destination site pair for transfers, target site for deletions),
//! runs each link's tasks in a bounded worker pool, and records every
//! outcome back to the database.
//!
//! The core pieces:
//!
//! - [`store::TaskStore`]: typed access to the task tables, with atomic
//!   status transitions and crash-recovery sweeps.
//! - [`registry::CancellationRegistry`]: shared set of queued task ids
//!   that lets the upstream manager cancel work between enqueue and
//!   dispatch.
//! - [`pool::LinkPool`]: one bounded worker pool plus results collector
//!   per live link.
//! - [`scheduler::Scheduler`]: the polling loop that demultiplexes new
//!   rows to pools and reclaims idle ones.
//! - [`gateway`]: the storage gateway seam and the adapter that maps
//!   gateway result codes onto task outcomes.
//! - [`daemon::Daemon`]: ties the above together with signal handling and
//!   orderly shutdown.
//!
//! Every task advances forward-only through
//! `new -> queued -> active -> {done, failed, cancelled}`; rows left in
//! `queued` or `active` by an unclean stop are reset to `new` on the next
//! start.

pub mod config;
pub mod daemon;
pub mod database;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use daemon::{Daemon, ShutdownHandle};
pub use database::Database;
pub use error::{ConfigError, DaemonError, GatewayError, StoreError};
pub use gateway::{
    ChecksumAlgorithm, GatewayAdapter, GatewayCall, GfalCliGateway, StorageGateway, TransferParams,
};
pub use logging::init_logging;
pub use models::{Link, OpReport, Operation, PendingTask, TaskKind, TaskStatus};
pub use registry::CancellationRegistry;
pub use store::{MemoryTaskStore, MysqlTaskStore, TaskStore};
