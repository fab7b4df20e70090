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

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use sluice::{Config, Daemon, Database, GfalCliGateway, MysqlTaskStore};

mod cli;
mod privileges;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

/// Startup failures exit nonzero; once the daemon loop is entered, all
/// outcomes are recorded in the database and the process exits zero.
async fn run(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path).context("loading configuration")?;
    sluice::init_logging(&config.logging).context("initializing logging")?;

    if let Some(user) = &config.user {
        privileges::drop_to_user(user).context("dropping privileges")?;
    }

    let database = Database::new(&config.database.url, config.database.pool_size as usize)
        .context("building database pool")?;
    let store = Arc::new(MysqlTaskStore::new(database));
    let gateway = Arc::new(GfalCliGateway::new());

    let daemon = Daemon::new(&config, store, gateway);
    let shutdown = daemon.shutdown_handle();

    tokio::spawn(async move {
        if let Err(e) = sluice::daemon::listen_for_signals(shutdown).await {
            tracing::error!("signal handler failed: {}", e);
        }
    });

    if let Err(e) = daemon.run().await {
        tracing::error!("daemon stopped after unrecoverable error: {}", e);
    }

    Ok(())
}

fn check_config(config_path: &Path) -> Result<()> {
    let config = Config::from_file(config_path).context("loading configuration")?;
    let opts = &config.file_operations.daemon;

    println!("configuration ok");
    println!("  user:               {}", config.user.as_deref().unwrap_or("(unchanged)"));
    println!("  max_parallel_links: {}", opts.max_parallel_links);
    println!(
        "  checksum:           {}",
        opts.checksum.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
    );
    println!("  transfer_timeout:   {}s", opts.transfer_timeout);
    println!("  overwrite:          {}", opts.overwrite);
    println!("  poll_interval:      {}s", opts.poll_interval);

    Ok(())
}
