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

//! Logging initialization.
//!
//! Logs always go to stderr; when `logging.path` names a directory, a
//! daily-rotating file under it receives the same stream through a
//! non-blocking writer. The writer guard is leaked so the appender stays
//! alive for the life of the process.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Initializes the global tracing subscriber from the logging
/// configuration. Safe to call more than once; later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| ConfigError::Invalid(format!("bad logging level '{}': {}", config.level, e)))?;

    match &config.path {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                ConfigError::Invalid(format!(
                    "cannot create log directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;

            let appender = tracing_appender::rolling::daily(dir, "sluice.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            Box::leak(Box::new(guard));

            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
        }
    }

    Ok(())
}
