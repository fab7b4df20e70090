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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sluice-ctl",
    version,
    about = "Operator interface for the sluice file operations daemon",
    long_about = "Runs the daemon that drains the transfer and deletion queues \
                  written by the file operations manager"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the file operations daemon in the foreground
    Run {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file and exit
    CheckConfig {
        /// Path to the JSON configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}
