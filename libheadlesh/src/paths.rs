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

//! Shared path construction for the rendezvous directory tree and the
//! per-session log file, per the resolver rules described in `spec.md` §4.5.

use std::{env, fs, path::{Path, PathBuf}};

use anyhow::{anyhow, Context};
use nix::fcntl::AT_FDCWD;
use nix::sys::stat::{fchmodat, FchmodatFlags, Mode};

use crate::{config::Config, consts, error::HeadleshError};

pub fn validate_session_id(session_id: &str) -> Result<(), HeadleshError> {
    if session_id.is_empty() || session_id.contains('/') {
        return Err(HeadleshError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}

pub fn rendezvous_root(config: &Config) -> PathBuf {
    match &config.rendezvous_root {
        Some(root) => PathBuf::from(root),
        None => PathBuf::from(consts::DEFAULT_RENDEZVOUS_ROOT),
    }
}

pub fn session_dir(config: &Config, session_id: &str) -> PathBuf {
    rendezvous_root(config).join(session_id)
}

pub fn cmd_fifo_path(session_dir: &std::path::Path) -> PathBuf {
    session_dir.join("cmd.fifo")
}

pub fn lock_path(session_dir: &std::path::Path) -> PathBuf {
    session_dir.join("pid.lock")
}

/// Ensures `dir` and all of its ancestors exist, mode `0755`. Tolerates
/// the directory already existing.
pub fn ensure_dir_all(dir: &std::path::Path) -> anyhow::Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(e).with_context(|| format!("creating directory {}", dir.display())),
    }
}

/// The first existing, non-empty of `$XDG_DATA_HOME` or `$HOME/.local/share`.
fn data_home() -> anyhow::Result<PathBuf> {
    if let Ok(xdg_data) = env::var("XDG_DATA_HOME") {
        if !xdg_data.is_empty() {
            return Ok(PathBuf::from(xdg_data));
        }
    }
    let home = env::var("HOME").map_err(|_| {
        anyhow!("neither XDG_DATA_HOME nor HOME is set; cannot resolve the session log directory")
    })?;
    Ok(PathBuf::from(home).join(".local").join("share"))
}

pub fn log_dir(session_id: &str) -> anyhow::Result<PathBuf> {
    Ok(data_home()?.join("hinata").join("headlesh").join(session_id))
}

pub fn log_file_path(session_id: &str) -> anyhow::Result<PathBuf> {
    Ok(log_dir(session_id)?.join("server.log"))
}

/// Creates a named pipe at `path` with mode `0666`, regardless of the
/// caller's umask. `mkfifo()` masks its requested mode by the process
/// umask the same way `open()`/`creat()` do, so a bare `mkfifo(path,
/// 0o666)` under the common `0o022` default ends up `0o644` on disk; an
/// explicit `fchmodat` after creation forces the mode spec.md requires.
pub fn mkfifo_0666(path: &Path) -> anyhow::Result<()> {
    nix::unistd::mkfifo(path, Mode::from_bits_truncate(0o666))
        .with_context(|| format!("creating named pipe at {}", path.display()))?;
    fchmodat(AT_FDCWD, path, Mode::from_bits_truncate(0o666), FchmodatFlags::FollowSymlink)
        .with_context(|| format!("forcing mode 0666 on {}", path.display()))?;
    Ok(())
}
