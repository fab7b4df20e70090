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

//! gfal2 command-line gateway.
//!
//! Drives the gfal2 tools (`gfal-copy`, `gfal-rm`, `gfal-stat`) with one
//! process per invocation. The gfal2 library leaks state through globals
//! when embedded, so a fresh process per call is what gives each worker its
//! own storage context; it also makes log capture per-invocation for free.
//! Child processes are killed if the owning worker is dropped mid-flight.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{GatewayCall, StorageGateway, TransferParams};
use crate::error::GatewayError;

const COPY_BIN: &str = "gfal-copy";
const RM_BIN: &str = "gfal-rm";
const STAT_BIN: &str = "gfal-stat";

/// [`StorageGateway`] backed by the gfal2 command-line tools.
#[derive(Debug, Clone, Default)]
pub struct GfalCliGateway;

impl GfalCliGateway {
    pub fn new() -> Self {
        Self
    }

    fn verbosity_flag(verbosity: Option<&str>) -> Option<&'static str> {
        match verbosity {
            Some("verbose") => Some("-v"),
            Some("debug") => Some("-vv"),
            Some("trace") => Some("-vvv"),
            _ => None,
        }
    }

    async fn run(tool: &str, mut command: Command) -> Result<GatewayCall, GatewayError> {
        debug!(tool, "invoking storage tool");

        let output = command
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GatewayError::Spawn {
                tool: tool.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let code = output.status.code().unwrap_or(-1);
        let message = if code == 0 {
            String::new()
        } else {
            stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if output.status.code().is_none() {
                        format!("{} terminated by signal", tool)
                    } else {
                        format!("{} exited with code {}", tool, code)
                    }
                })
        };

        let mut log = String::with_capacity(stdout.len() + stderr.len());
        log.push_str(&stdout);
        if !stdout.is_empty() && !stderr.is_empty() {
            log.push('\n');
        }
        log.push_str(&stderr);

        Ok(GatewayCall { code, message, log })
    }
}

#[async_trait]
impl StorageGateway for GfalCliGateway {
    async fn copy(
        &self,
        source: &str,
        destination: &str,
        params: &TransferParams,
    ) -> Result<GatewayCall, GatewayError> {
        let mut command = Command::new(COPY_BIN);

        if params.create_parents {
            command.arg("-p");
        }
        if params.overwrite {
            command.arg("-f");
        }
        command.arg("-t").arg(params.timeout.as_secs().to_string());
        if let Some(checksum) = params.checksum {
            command.arg("-K").arg(checksum.as_str());
        }
        if let Some(flag) = Self::verbosity_flag(params.verbosity.as_deref()) {
            command.arg(flag);
        }
        command.arg(source).arg(destination);

        Self::run(COPY_BIN, command).await
    }

    async fn unlink(&self, target: &str) -> Result<GatewayCall, GatewayError> {
        let mut command = Command::new(RM_BIN);
        command.arg(target);
        Self::run(RM_BIN, command).await
    }

    async fn stat(&self, pfn: &str) -> Result<GatewayCall, GatewayError> {
        let mut command = Command::new(STAT_BIN);
        command.arg(pfn);
        Self::run(STAT_BIN, command).await
    }
}
