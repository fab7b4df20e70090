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

//! In-memory task record store.
//!
//! Backend that keeps task rows in process memory instead of MySQL. The
//! integration suite constructs daemons against it; it also records the
//! full status history of every row so tests can assert which states were
//! ever observable.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::TaskStore;
use crate::error::StoreError;
use crate::models::{Link, OpReport, Operation, PendingTask, TaskKind, TaskStatus};

#[derive(Debug, Clone)]
struct MemoryRow {
    link: Link,
    op: Operation,
    status: TaskStatus,
    exit_code: Option<i32>,
    start_time: Option<i64>,
    finish_time: Option<i64>,
    history: Vec<TaskStatus>,
    terminal_writes: usize,
}

impl MemoryRow {
    fn new(link: Link, op: Operation, status: TaskStatus) -> Self {
        Self {
            link,
            op,
            status,
            exit_code: None,
            start_time: None,
            finish_time: None,
            history: vec![status],
            terminal_writes: 0,
        }
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.history.push(status);
    }
}

/// Point-in-time copy of one row, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub exit_code: Option<i32>,
    pub start_time: Option<i64>,
    pub finish_time: Option<i64>,
    /// Every status the row has ever held, in order.
    pub history: Vec<TaskStatus>,
    /// How many terminal-status writes the store has received for the row.
    pub terminal_writes: usize,
}

/// [`TaskStore`] backend holding rows in memory.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    transfers: Mutex<BTreeMap<i64, MemoryRow>>,
    deletions: Mutex<BTreeMap<i64, MemoryRow>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: TaskKind) -> &Mutex<BTreeMap<i64, MemoryRow>> {
        match kind {
            TaskKind::Transfer => &self.transfers,
            TaskKind::Deletion => &self.deletions,
        }
    }

    /// Inserts a transfer task row.
    pub fn seed_transfer(
        &self,
        id: i64,
        source: &str,
        destination: &str,
        source_site: &str,
        dest_site: &str,
        status: TaskStatus,
    ) {
        let row = MemoryRow::new(
            Link::Transfer {
                source_site: source_site.to_string(),
                dest_site: dest_site.to_string(),
            },
            Operation::Copy {
                source: source.to_string(),
                destination: destination.to_string(),
            },
            status,
        );
        self.transfers.lock().unwrap().insert(id, row);
    }

    /// Inserts a deletion task row.
    pub fn seed_deletion(&self, id: i64, file: &str, site: &str, status: TaskStatus) {
        let row = MemoryRow::new(
            Link::Deletion {
                site: site.to_string(),
            },
            Operation::Unlink {
                target: file.to_string(),
            },
            status,
        );
        self.deletions.lock().unwrap().insert(id, row);
    }

    /// Overwrites a row's status directly, bypassing the state machine.
    /// This is the path the upstream manager uses to cancel a task out of
    /// band.
    pub fn force_status(&self, kind: TaskKind, id: i64, status: TaskStatus) {
        if let Some(row) = self.table(kind).lock().unwrap().get_mut(&id) {
            row.set_status(status);
        }
    }

    pub fn status(&self, kind: TaskKind, id: i64) -> Option<TaskStatus> {
        self.table(kind).lock().unwrap().get(&id).map(|r| r.status)
    }

    pub fn snapshot(&self, kind: TaskKind, id: i64) -> Option<TaskSnapshot> {
        self.table(kind).lock().unwrap().get(&id).map(|r| TaskSnapshot {
            status: r.status,
            exit_code: r.exit_code,
            start_time: r.start_time,
            finish_time: r.finish_time,
            history: r.history.clone(),
            terminal_writes: r.terminal_writes,
        })
    }

    /// Ids of rows currently in a non-terminal status, both kinds.
    pub fn non_terminal_ids(&self) -> HashSet<(TaskKind, i64)> {
        let mut ids = HashSet::new();
        for kind in [TaskKind::Transfer, TaskKind::Deletion] {
            for (id, row) in self.table(kind).lock().unwrap().iter() {
                if !row.status.is_terminal() {
                    ids.insert((kind, *id));
                }
            }
        }
        ids
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn fetch_new(&self, kind: TaskKind) -> Result<Vec<PendingTask>, StoreError> {
        let table = self.table(kind).lock().unwrap();
        let mut tasks: Vec<PendingTask> = table
            .iter()
            .filter(|(_, row)| row.status == TaskStatus::New)
            .map(|(id, row)| PendingTask {
                id: *id,
                link: row.link.clone(),
                op: row.op.clone(),
            })
            .collect();

        // Rows sharing a link must be contiguous, ordered by id within it.
        tasks.sort_by(|a, b| {
            let key = |t: &PendingTask| match &t.link {
                Link::Transfer {
                    source_site,
                    dest_site,
                } => (source_site.clone(), dest_site.clone()),
                Link::Deletion { site } => (site.clone(), String::new()),
            };
            key(a).cmp(&key(b)).then(a.id.cmp(&b.id))
        });

        Ok(tasks)
    }

    async fn mark_queued(&self, kind: TaskKind, task_id: i64) -> Result<bool, StoreError> {
        let mut table = self.table(kind).lock().unwrap();
        match table.get_mut(&task_id) {
            Some(row) if row.status == TaskStatus::New => {
                row.set_status(TaskStatus::Queued);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_active(&self, kind: TaskKind, task_id: i64) -> Result<(), StoreError> {
        if let Some(row) = self.table(kind).lock().unwrap().get_mut(&task_id) {
            row.set_status(TaskStatus::Active);
        }
        Ok(())
    }

    async fn record_terminal(
        &self,
        kind: TaskKind,
        task_id: i64,
        status: TaskStatus,
        report: Option<&OpReport>,
    ) -> Result<(), StoreError> {
        debug_assert!(status.is_terminal());

        if let Some(row) = self.table(kind).lock().unwrap().get_mut(&task_id) {
            row.set_status(status);
            row.terminal_writes += 1;
            if let Some(report) = report {
                row.exit_code = Some(report.exit_code);
                row.start_time = Some(report.start_time);
                row.finish_time = Some(report.finish_time);
            }
        }
        Ok(())
    }

    async fn list_queued(&self, kind: TaskKind) -> Result<HashSet<i64>, StoreError> {
        Ok(self
            .table(kind)
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, row)| row.status == TaskStatus::Queued)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn recover_orphans(&self) -> Result<u64, StoreError> {
        let mut reset = 0;
        for kind in [TaskKind::Transfer, TaskKind::Deletion] {
            for row in self.table(kind).lock().unwrap().values_mut() {
                if matches!(row.status, TaskStatus::Queued | TaskStatus::Active) {
                    row.set_status(TaskStatus::New);
                    reset += 1;
                }
            }
        }
        Ok(reset)
    }
}
