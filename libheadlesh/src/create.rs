// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `create` subcommand (`spec.md` §4.1, bootstrap steps 1-9).
//!
//! Steps 1-4 run synchronously on the caller's own terminal, so that an
//! already-running session or an unwritable rendezvous root is reported
//! there rather than silently lost after the process detaches. Steps
//! 5-9 happen in [`crate::daemon::run`], on the other side of the
//! double fork.

use tracing::info;

use crate::{
    config::Config,
    consts::{self, ENVELOPE_MAX},
    daemon::{self, lock::LockFile, BootstrapState},
    paths,
};

pub fn run(session_id: String, shell_path: Option<String>, config: &Config) -> anyhow::Result<()> {
    paths::validate_session_id(&session_id)?;

    let session_dir = paths::session_dir(config, &session_id);
    paths::ensure_dir_all(&session_dir)?;

    let lock_path = paths::lock_path(&session_dir);
    let lock = LockFile::acquire(&lock_path, &session_id)?;

    let cmd_fifo_path = paths::cmd_fifo_path(&session_dir);
    let _ = std::fs::remove_file(&cmd_fifo_path);
    paths::mkfifo_0666(&cmd_fifo_path)?;

    let log_path = paths::log_file_path(&session_id)?;
    paths::ensure_dir_all(log_path.parent().expect("log file path always has a parent"))?;

    let shell = match shell_path {
        Some(shell) if !shell.is_empty() => shell,
        _ => config.shell.clone().unwrap_or_else(|| consts::DEFAULT_SHELL.to_string()),
    };

    let envelope_max = config.envelope_max.unwrap_or(ENVELOPE_MAX).min(ENVELOPE_MAX);
    let cwd = std::env::current_dir().map_err(|e| anyhow::anyhow!("reading current working directory: {}", e))?;

    info!("bootstrapped session {:?} at {}; detaching", session_id, session_dir.display());

    daemon::run(BootstrapState {
        session_id,
        session_dir,
        cmd_fifo_path,
        lock_path,
        lock,
        log_path,
        shell,
        cwd,
        envelope_max,
    })
}
