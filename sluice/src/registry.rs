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

//! Cancellation Registry
//!
//! A shared set of task ids currently in `queued` status, one instance per
//! task kind. The scheduler rebuilds it from the database on every poll;
//! each worker's first act is to remove its own id. A worker that finds its
//! id missing knows the upstream manager cancelled the task between enqueue
//! and dispatch, and terminates without touching storage.
//!
//! All access is serialized through one async mutex so the composite
//! "database write + registry append" in [`crate::pool::LinkPool::add_task`]
//! can hold the lock across the await without a concurrent refresh
//! observing a torn state.

use std::collections::HashSet;
use tokio::sync::{Mutex, MutexGuard};

/// Shared set of queued task ids for one task kind.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    queued: Mutex<HashSet<i64>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the registry for a composite operation. The guard must not be
    /// held across anything slower than a single database write.
    pub async fn lock(&self) -> MutexGuard<'_, HashSet<i64>> {
        self.queued.lock().await
    }

    /// Atomically removes `task_id`. Returns `true` when the caller won the
    /// removal race and may proceed to execute the task.
    pub async fn take(&self, task_id: i64) -> bool {
        self.queued.lock().await.remove(&task_id)
    }

    /// Replaces the whole set with the database's current view of `queued`
    /// rows.
    pub async fn replace(&self, ids: HashSet<i64>) {
        *self.queued.lock().await = ids;
    }

    pub async fn contains(&self, task_id: i64) -> bool {
        self.queued.lock().await.contains(&task_id)
    }

    pub async fn snapshot(&self) -> HashSet<i64> {
        self.queued.lock().await.clone()
    }
}
