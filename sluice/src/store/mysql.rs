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

//! MySQL task record store.
//!
//! Diesel-backed implementation of [`TaskStore`] over the authoritative
//! task/batch schema. Timestamps are stored as `DATETIME` in UTC and
//! converted to/from integer Unix seconds at this boundary.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use std::collections::HashSet;

use diesel::prelude::*;

use super::TaskStore;
use crate::database::schema::{
    deletion_batch_members, deletion_batches, deletion_tasks, transfer_batch_members,
    transfer_batches, transfer_tasks,
};
use crate::database::Database;
use crate::error::StoreError;
use crate::models::{Link, OpReport, Operation, PendingTask, TaskKind, TaskStatus};

/// [`TaskStore`] backend over the file-operations manager's MySQL database.
#[derive(Clone, Debug)]
pub struct MysqlTaskStore {
    database: Database,
}

impl MysqlTaskStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    fn interact_err(e: deadpool_diesel::InteractError) -> StoreError {
        StoreError::Interact(e.to_string())
    }

    fn pool_err(e: impl std::fmt::Display) -> StoreError {
        StoreError::Pool(e.to_string())
    }
}

fn unix_to_datetime(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

#[async_trait]
impl TaskStore for MysqlTaskStore {
    async fn fetch_new(&self, kind: TaskKind) -> Result<Vec<PendingTask>, StoreError> {
        let conn = self.database.pool().get().await.map_err(Self::pool_err)?;

        match kind {
            TaskKind::Transfer => {
                let rows: Vec<(i64, String, String, String, String)> = conn
                    .interact(|conn| {
                        transfer_tasks::table
                            .inner_join(
                                transfer_batch_members::table
                                    .on(transfer_batch_members::task_id.eq(transfer_tasks::id)),
                            )
                            .inner_join(
                                transfer_batches::table.on(transfer_batches::batch_id
                                    .eq(transfer_batch_members::batch_id)),
                            )
                            .filter(transfer_tasks::status.eq(TaskStatus::New.as_str()))
                            .order((
                                transfer_batches::source_site.asc(),
                                transfer_batches::destination_site.asc(),
                                transfer_tasks::id.asc(),
                            ))
                            .select((
                                transfer_tasks::id,
                                transfer_tasks::source,
                                transfer_tasks::destination,
                                transfer_batches::source_site,
                                transfer_batches::destination_site,
                            ))
                            .load(conn)
                    })
                    .await
                    .map_err(Self::interact_err)??;

                Ok(rows
                    .into_iter()
                    .map(|(id, source, destination, source_site, dest_site)| PendingTask {
                        id,
                        link: Link::Transfer {
                            source_site,
                            dest_site,
                        },
                        op: Operation::Copy {
                            source,
                            destination,
                        },
                    })
                    .collect())
            }
            TaskKind::Deletion => {
                let rows: Vec<(i64, String, String)> = conn
                    .interact(|conn| {
                        deletion_tasks::table
                            .inner_join(
                                deletion_batch_members::table
                                    .on(deletion_batch_members::task_id.eq(deletion_tasks::id)),
                            )
                            .inner_join(
                                deletion_batches::table.on(deletion_batches::batch_id
                                    .eq(deletion_batch_members::batch_id)),
                            )
                            .filter(deletion_tasks::status.eq(TaskStatus::New.as_str()))
                            .order((deletion_batches::site.asc(), deletion_tasks::id.asc()))
                            .select((
                                deletion_tasks::id,
                                deletion_tasks::file,
                                deletion_batches::site,
                            ))
                            .load(conn)
                    })
                    .await
                    .map_err(Self::interact_err)??;

                Ok(rows
                    .into_iter()
                    .map(|(id, file, site)| PendingTask {
                        id,
                        link: Link::Deletion { site },
                        op: Operation::Unlink { target: file },
                    })
                    .collect())
            }
        }
    }

    async fn mark_queued(&self, kind: TaskKind, task_id: i64) -> Result<bool, StoreError> {
        let conn = self.database.pool().get().await.map_err(Self::pool_err)?;

        let updated = conn
            .interact(move |conn| match kind {
                TaskKind::Transfer => diesel::update(
                    transfer_tasks::table
                        .filter(transfer_tasks::id.eq(task_id))
                        .filter(transfer_tasks::status.eq(TaskStatus::New.as_str())),
                )
                .set(transfer_tasks::status.eq(TaskStatus::Queued.as_str()))
                .execute(conn),
                TaskKind::Deletion => diesel::update(
                    deletion_tasks::table
                        .filter(deletion_tasks::id.eq(task_id))
                        .filter(deletion_tasks::status.eq(TaskStatus::New.as_str())),
                )
                .set(deletion_tasks::status.eq(TaskStatus::Queued.as_str()))
                .execute(conn),
            })
            .await
            .map_err(Self::interact_err)??;

        Ok(updated == 1)
    }

    async fn mark_active(&self, kind: TaskKind, task_id: i64) -> Result<(), StoreError> {
        let conn = self.database.pool().get().await.map_err(Self::pool_err)?;

        conn.interact(move |conn| match kind {
            TaskKind::Transfer => {
                diesel::update(transfer_tasks::table.filter(transfer_tasks::id.eq(task_id)))
                    .set(transfer_tasks::status.eq(TaskStatus::Active.as_str()))
                    .execute(conn)
            }
            TaskKind::Deletion => {
                diesel::update(deletion_tasks::table.filter(deletion_tasks::id.eq(task_id)))
                    .set(deletion_tasks::status.eq(TaskStatus::Active.as_str()))
                    .execute(conn)
            }
        })
        .await
        .map_err(Self::interact_err)??;

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

        let conn = self.database.pool().get().await.map_err(Self::pool_err)?;
        let times = report.map(|r| {
            (
                r.exit_code,
                unix_to_datetime(r.start_time),
                unix_to_datetime(r.finish_time),
            )
        });

        conn.interact(move |conn| match (kind, times) {
            (TaskKind::Transfer, Some((code, start, finish))) => {
                diesel::update(transfer_tasks::table.filter(transfer_tasks::id.eq(task_id)))
                    .set((
                        transfer_tasks::status.eq(status.as_str()),
                        transfer_tasks::exit_code.eq(Some(code)),
                        transfer_tasks::start_time.eq(Some(start)),
                        transfer_tasks::finish_time.eq(Some(finish)),
                    ))
                    .execute(conn)
            }
            (TaskKind::Transfer, None) => {
                diesel::update(transfer_tasks::table.filter(transfer_tasks::id.eq(task_id)))
                    .set(transfer_tasks::status.eq(status.as_str()))
                    .execute(conn)
            }
            (TaskKind::Deletion, Some((code, start, finish))) => {
                diesel::update(deletion_tasks::table.filter(deletion_tasks::id.eq(task_id)))
                    .set((
                        deletion_tasks::status.eq(status.as_str()),
                        deletion_tasks::exit_code.eq(Some(code)),
                        deletion_tasks::start_time.eq(Some(start)),
                        deletion_tasks::finish_time.eq(Some(finish)),
                    ))
                    .execute(conn)
            }
            (TaskKind::Deletion, None) => {
                diesel::update(deletion_tasks::table.filter(deletion_tasks::id.eq(task_id)))
                    .set(deletion_tasks::status.eq(status.as_str()))
                    .execute(conn)
            }
        })
        .await
        .map_err(Self::interact_err)??;

        Ok(())
    }

    async fn list_queued(&self, kind: TaskKind) -> Result<HashSet<i64>, StoreError> {
        let conn = self.database.pool().get().await.map_err(Self::pool_err)?;

        let ids: Vec<i64> = conn
            .interact(move |conn| match kind {
                TaskKind::Transfer => transfer_tasks::table
                    .filter(transfer_tasks::status.eq(TaskStatus::Queued.as_str()))
                    .select(transfer_tasks::id)
                    .load(conn),
                TaskKind::Deletion => deletion_tasks::table
                    .filter(deletion_tasks::status.eq(TaskStatus::Queued.as_str()))
                    .select(deletion_tasks::id)
                    .load(conn),
            })
            .await
            .map_err(Self::interact_err)??;

        Ok(ids.into_iter().collect())
    }

    async fn recover_orphans(&self) -> Result<u64, StoreError> {
        let conn = self.database.pool().get().await.map_err(Self::pool_err)?;
        let orphan_statuses = [TaskStatus::Queued.as_str(), TaskStatus::Active.as_str()];

        let reset = conn
            .interact(move |conn| -> QueryResult<usize> {
                let transfers = diesel::update(
                    transfer_tasks::table
                        .filter(transfer_tasks::status.eq_any(orphan_statuses)),
                )
                .set(transfer_tasks::status.eq(TaskStatus::New.as_str()))
                .execute(conn)?;

                let deletions = diesel::update(
                    deletion_tasks::table
                        .filter(deletion_tasks::status.eq_any(orphan_statuses)),
                )
                .set(deletion_tasks::status.eq(TaskStatus::New.as_str()))
                .execute(conn)?;

                Ok(transfers + deletions)
            })
            .await
            .map_err(Self::interact_err)??;

        Ok(reset as u64)
    }
}
