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

//! Task Model
//!
//! Core types shared by the store, the scheduler, and the worker pools:
//! the two task kinds, the task status state machine, the link identity
//! that tasks are grouped by, and the structured result a storage
//! operation produces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two queues the daemon drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Bulk file copy between two sites.
    Transfer,
    /// Bulk unlink at a single site.
    Deletion,
}

impl TaskKind {
    /// Both kinds, in the order the scheduler processes them.
    pub const ALL: [TaskKind; 2] = [TaskKind::Deletion, TaskKind::Transfer];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Transfer => "transfer",
            TaskKind::Deletion => "deletion",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task row.
///
/// Statuses only ever advance along
/// `new -> queued -> active -> {done, failed, cancelled}`; the store never
/// writes a backward transition. The upstream manager may additionally move
/// a row straight to `cancelled` while it is still `new` or `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    New,
    Queued,
    Active,
    Done,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::Queued => "queued",
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(TaskStatus::New),
            "queued" => Some(TaskStatus::Queued),
            "active" => Some(TaskStatus::Active),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether this status is an end state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::New => matches!(next, TaskStatus::Queued | TaskStatus::Cancelled),
            TaskStatus::Queued => matches!(next, TaskStatus::Active | TaskStatus::Cancelled),
            TaskStatus::Active => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity tasks are grouped and pooled by.
///
/// A transfer link is the ordered pair of sites data moves between; a
/// deletion link is the single site files are removed from. One
/// [`crate::pool::LinkPool`] exists per live link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Link {
    Transfer {
        source_site: String,
        dest_site: String,
    },
    Deletion {
        site: String,
    },
}

impl Link {
    pub fn kind(&self) -> TaskKind {
        match self {
            Link::Transfer { .. } => TaskKind::Transfer,
            Link::Deletion { .. } => TaskKind::Deletion,
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Transfer {
                source_site,
                dest_site,
            } => write!(f, "{} -> {}", source_site, dest_site),
            Link::Deletion { site } => f.write_str(site),
        }
    }
}

/// The storage primitive a task asks for, with its physical file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Copy { source: String, destination: String },
    Unlink { target: String },
}

/// A `new` task row as returned by [`crate::store::TaskStore::fetch_new`].
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub id: i64,
    pub link: Link,
    pub op: Operation,
}

/// Structured result of one storage operation.
///
/// Timestamps are integer Unix seconds (UTC); the store converts to SQL
/// `DATETIME` on write. An exit code of zero means success; the adapter
/// maps the gateway's known non-error codes onto zero before the report
/// reaches the collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpReport {
    pub exit_code: i32,
    pub start_time: i64,
    pub finish_time: i64,
    pub message: String,
    /// Verbose gateway log captured during the call, per invocation.
    pub log: String,
}

impl OpReport {
    pub fn completed(
        exit_code: i32,
        start_time: i64,
        finish_time: i64,
        message: impl Into<String>,
        log: impl Into<String>,
    ) -> Self {
        Self {
            exit_code,
            start_time,
            finish_time,
            message: message.into(),
            log: log.into(),
        }
    }

    /// Report for a failure inside worker plumbing, before or instead of a
    /// storage call. Distinguished from pre-dispatch cancellation by its
    /// nonempty message.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            exit_code: -1,
            start_time: 0,
            finish_time: 0,
            message: message.into(),
            log: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}
