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

//! Privilege drop.
//!
//! The daemon is typically launched by an init system as root and must not
//! keep those privileges while talking to remote storage. Group id is
//! dropped before user id; the other order would leave the process unable
//! to change group.

use anyhow::{bail, Context, Result};
use nix::unistd::{setgid, setuid, Uid, User};

/// Drops the process to the named user. A no-op when already running as
/// that user; an error when not root and a change would be required.
pub fn drop_to_user(name: &str) -> Result<()> {
    let user = User::from_name(name)
        .with_context(|| format!("looking up user '{}'", name))?
        .with_context(|| format!("user '{}' does not exist", name))?;

    if Uid::effective() == user.uid {
        return Ok(());
    }
    if !Uid::effective().is_root() {
        bail!(
            "cannot drop privileges to '{}' without starting as root",
            name
        );
    }

    setgid(user.gid).context("setgid failed")?;
    setuid(user.uid).context("setuid failed")?;

    tracing::info!(user = name, "dropped privileges");
    Ok(())
}
