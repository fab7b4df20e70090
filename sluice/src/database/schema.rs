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

//! Diesel schema for the task and batch tables.
//!
//! The schema is owned by the file-operations manager; the daemon never
//! creates or migrates these tables and mutates only `status`, `exit_code`,
//! `start_time` and `finish_time` on the task rows. Batch tables map each
//! task to its link (site pair for transfers, site for deletions) through
//! an id-matching membership table.

diesel::table! {
    transfer_tasks (id) {
        id -> Bigint,
        source -> Text,
        destination -> Text,
        #[max_length = 16]
        status -> Varchar,
        exit_code -> Nullable<Integer>,
        start_time -> Nullable<Datetime>,
        finish_time -> Nullable<Datetime>,
    }
}

diesel::table! {
    transfer_batch_members (task_id) {
        task_id -> Bigint,
        batch_id -> Bigint,
    }
}

diesel::table! {
    transfer_batches (batch_id) {
        batch_id -> Bigint,
        #[max_length = 64]
        source_site -> Varchar,
        #[max_length = 64]
        destination_site -> Varchar,
    }
}

diesel::table! {
    deletion_tasks (id) {
        id -> Bigint,
        file -> Text,
        #[max_length = 16]
        status -> Varchar,
        exit_code -> Nullable<Integer>,
        start_time -> Nullable<Datetime>,
        finish_time -> Nullable<Datetime>,
    }
}

diesel::table! {
    deletion_batch_members (task_id) {
        task_id -> Bigint,
        batch_id -> Bigint,
    }
}

diesel::table! {
    deletion_batches (batch_id) {
        batch_id -> Bigint,
        #[max_length = 64]
        site -> Varchar,
    }
}

diesel::joinable!(transfer_batch_members -> transfer_batches (batch_id));
diesel::joinable!(deletion_batch_members -> deletion_batches (batch_id));

diesel::allow_tables_to_appear_in_same_query!(
    transfer_tasks,
    transfer_batch_members,
    transfer_batches,
);

diesel::allow_tables_to_appear_in_same_query!(
    deletion_tasks,
    deletion_batch_members,
    deletion_batches,
);
