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

//! Error types for the sluice library.
//!
//! Each subsystem carries its own error enum; the daemon-level
//! [`DaemonError`] wraps the ones that can surface from [`crate::Daemon::run`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by task record store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection pool could not be built or refused a connection.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// A database query failed.
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// The blocking database closure panicked or was aborted.
    #[error("database interaction failed: {0}")]
    Interact(String),
}

/// Errors raised by storage gateway implementations.
///
/// The gateway adapter stringifies these into the task's failure message;
/// they never propagate past a worker.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The external storage tool could not be launched at all.
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other gateway-internal failure.
    #[error("{0}")]
    Internal(String),
}

/// Errors raised while loading or validating the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level daemon failure.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
