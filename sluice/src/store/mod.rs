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

//! Task Record Store
//!
//! Typed access layer over the transfer and deletion task tables. All
//! status transitions go through this trait; every mutation is a single-row
//! update, atomic at the database level, and the daemon never holds a
//! transaction open across a worker invocation.
//!
//! Two backends are provided: [`MysqlTaskStore`] against the
//! file-operations manager's bookkeeping database, and [`MemoryTaskStore`]
//! for standalone operation and the test suite.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::StoreError;
use crate::models::{OpReport, PendingTask, TaskKind, TaskStatus};

pub use memory::MemoryTaskStore;
pub use mysql::MysqlTaskStore;

/// Access layer over the two task tables.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Returns all rows of `kind` in status `new`, joined to their batches
    /// for the link identity. Rows sharing a link are contiguous and
    /// ordered by task id within the link.
    async fn fetch_new(&self, kind: TaskKind) -> Result<Vec<PendingTask>, StoreError>;

    /// Guarded `new -> queued` transition. Returns `false` when the row is
    /// no longer `new`, in which case the caller must not dispatch a
    /// worker: this update is the synchronization point that guarantees at
    /// most one worker per task id.
    async fn mark_queued(&self, kind: TaskKind, task_id: i64) -> Result<bool, StoreError>;

    /// `queued -> active` transition, written by a worker as it starts.
    async fn mark_active(&self, kind: TaskKind, task_id: i64) -> Result<(), StoreError>;

    /// Writes a terminal status. For `done` and `failed` the report's exit
    /// code and timestamps are recorded alongside; for `cancelled` only the
    /// status changes.
    async fn record_terminal(
        &self,
        kind: TaskKind,
        task_id: i64,
        status: TaskStatus,
        report: Option<&OpReport>,
    ) -> Result<(), StoreError>;

    /// Ids of all rows of `kind` currently in status `queued`.
    async fn list_queued(&self, kind: TaskKind) -> Result<HashSet<i64>, StoreError>;

    /// Resets every row in `queued` or `active` back to `new`, across both
    /// kinds. Idempotent; called once at daemon start and once at stop.
    /// Returns the number of rows reset.
    async fn recover_orphans(&self) -> Result<u64, StoreError>;
}
