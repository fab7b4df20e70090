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

//! Storage Gateway Adapter
//!
//! Executes one storage primitive through the configured gateway and
//! normalizes the outcome into an [`OpReport`]:
//!
//! - transfer code 17 (destination already exists) and deletion codes 2
//!   and 70 (target does not exist) are recorded as success, with an
//!   explanatory message;
//! - transfer code 70 (port-bind failure) is retried transparently, up to
//!   five attempts; only the final attempt's outcome propagates;
//! - when overwrite is forbidden, a stat pre-flight on the destination
//!   short-circuits the copy if the file is already there; some backends
//!   overwrite regardless of the flag, so the engine is never given the
//!   chance;
//! - gateway errors are stringified into the report with exit code -1.
//!
//! The adapter never panics and always returns a structured report.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{GatewayCall, StorageGateway, TransferParams};
use crate::models::{OpReport, Operation};

/// Transfer result code meaning the destination file already exists.
///
/// Accepted as success on the contract that the caller has verified size
/// and checksum of the destination beforehand.
const CODE_DEST_EXISTS: i32 = 17;

/// Code meaning the target of a deletion does not exist.
const CODE_NO_SUCH_FILE: i32 = 2;

/// Communication-layer code: no such target on deletion, failure to bind a
/// data port on transfer.
const CODE_COMM: i32 = 70;

/// Port-bind failures are transient; retry this many times before giving
/// up on the transfer.
const MAX_PORT_BIND_ATTEMPTS: u32 = 5;

/// Wraps a [`StorageGateway`] with the daemon's result-code policy.
pub struct GatewayAdapter {
    gateway: Arc<dyn StorageGateway>,
    params: TransferParams,
}

impl GatewayAdapter {
    pub fn new(gateway: Arc<dyn StorageGateway>, params: TransferParams) -> Self {
        Self { gateway, params }
    }

    pub fn params(&self) -> &TransferParams {
        &self.params
    }

    /// Executes one operation and returns its structured report.
    pub async fn execute(&self, op: &Operation) -> OpReport {
        match op {
            Operation::Copy {
                source,
                destination,
            } => self.execute_copy(source, destination).await,
            Operation::Unlink { target } => self.execute_unlink(target).await,
        }
    }

    async fn execute_copy(&self, source: &str, destination: &str) -> OpReport {
        if !self.params.overwrite {
            let start = Utc::now().timestamp();
            match self.gateway.stat(destination).await {
                Ok(call) if call.code == 0 => {
                    let finish = Utc::now().timestamp();
                    debug!(destination, "destination present, skipping copy");
                    return OpReport::completed(
                        0,
                        start,
                        finish,
                        "Destination file already exists.",
                        call.log,
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    // A failed stat is indistinguishable from a missing
                    // destination; let the copy decide.
                    debug!(destination, error = %e, "pre-flight stat failed");
                }
            }
        }

        let mut attempt = 1;
        loop {
            let start = Utc::now().timestamp();
            let result = self.gateway.copy(source, destination, &self.params).await;
            let finish = Utc::now().timestamp();

            let call = match result {
                Ok(call) => call,
                Err(e) => return OpReport::completed(-1, start, finish, e.to_string(), ""),
            };

            return match call.code {
                0 => OpReport::completed(0, start, finish, call.message, call.log),
                CODE_DEST_EXISTS => OpReport::completed(
                    0,
                    start,
                    finish,
                    "Destination file already exists.",
                    call.log,
                ),
                CODE_COMM if attempt < MAX_PORT_BIND_ATTEMPTS => {
                    warn!(
                        source,
                        destination, attempt, "port bind failure, retrying transfer"
                    );
                    attempt += 1;
                    continue;
                }
                code => OpReport::completed(code, start, finish, call.message, call.log),
            };
        }
    }

    async fn execute_unlink(&self, target: &str) -> OpReport {
        let start = Utc::now().timestamp();
        let result = self.gateway.unlink(target).await;
        let finish = Utc::now().timestamp();

        let call = match result {
            Ok(call) => call,
            Err(e) => return OpReport::completed(-1, start, finish, e.to_string(), ""),
        };

        match call.code {
            0 => OpReport::completed(0, start, finish, call.message, call.log),
            CODE_NO_SUCH_FILE | CODE_COMM => OpReport::completed(
                0,
                start,
                finish,
                "Target file does not exist.",
                call.log,
            ),
            code => OpReport::completed(code, start, finish, call.message, call.log),
        }
    }
}
