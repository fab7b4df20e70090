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

//! Storage Gateway
//!
//! Seam to the external file-copy/unlink engine. [`StorageGateway`] is the
//! raw interface: one call per storage primitive, returning the engine's
//! result code and captured log. [`GatewayAdapter`] wraps a gateway and
//! applies the daemon's result-code policy: known non-error codes map to
//! success, port-bind failures are retried, and an overwrite-forbidding
//! configuration gets a stat pre-flight. Workers only ever talk to the
//! adapter.

pub mod adapter;
pub mod gfal;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::GatewayError;

pub use adapter::GatewayAdapter;
pub use gfal::GfalCliGateway;

/// Raw result of one gateway invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    /// Engine result code; zero is success, nonzero codes follow the
    /// engine's errno-style convention.
    pub code: i32,
    /// One-line summary of the outcome.
    pub message: String,
    /// Verbose engine output captured during this call only.
    pub log: String,
}

impl GatewayCall {
    pub fn ok() -> Self {
        Self {
            code: 0,
            message: String::new(),
            log: String::new(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            log: String::new(),
        }
    }
}

/// Checksum algorithms the transfer engine can validate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Crc32,
    Adler32,
    Md5,
}

impl ChecksumAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Adler32 => "adler32",
            ChecksumAlgorithm::Md5 => "md5",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer parameters, fixed once at daemon startup.
#[derive(Debug, Clone)]
pub struct TransferParams {
    /// Create missing parent directories at the destination.
    pub create_parents: bool,
    /// Overwrite an existing destination file. When false the adapter
    /// stats the destination first and skips the copy if it exists.
    pub overwrite: bool,
    /// End-to-end checksum validation algorithm, if any.
    pub checksum: Option<ChecksumAlgorithm>,
    /// Per-operation timeout enforced by the engine.
    pub timeout: Duration,
    /// Engine verbosity selector; opaque to the core.
    pub verbosity: Option<String>,
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            create_parents: true,
            overwrite: false,
            checksum: None,
            timeout: Duration::from_secs(3600),
            verbosity: None,
        }
    }
}

/// The external copy/unlink engine.
///
/// Implementations must not share mutable engine state across concurrent
/// calls; every invocation gets its own context and its own log sink.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Copies `source` to `destination`.
    async fn copy(
        &self,
        source: &str,
        destination: &str,
        params: &TransferParams,
    ) -> Result<GatewayCall, GatewayError>;

    /// Removes `target`.
    async fn unlink(&self, target: &str) -> Result<GatewayCall, GatewayError>;

    /// Stats `pfn`; code zero means the file exists.
    async fn stat(&self, pfn: &str) -> Result<GatewayCall, GatewayError>;
}
