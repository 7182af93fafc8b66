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

//! The session's persistent shell child: spawned once at bootstrap
//! (`spec.md` §4.1 step 9), fed shell fragments on its standard input
//! for the lifetime of the session.

use std::{
    io::Write,
    path::Path,
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
    time::Instant,
};

use anyhow::Context;
use nix::{
    sys::signal::{kill, Signal},
    unistd::Pid,
};
use tracing::warn;

use crate::consts::{SHELL_REAP_POLL, SHELL_SHUTDOWN_GRACE};

pub struct ShellChild {
    child: Child,
    stdin: ChildStdin,
}

impl ShellChild {
    /// Spawns `shell` with a piped stdin and its own stdout/stderr sent
    /// to the null device (every real output is routed per-request by
    /// the fragment's own redirections). `cwd` is applied best-effort:
    /// if it no longer exists, the shell starts in the daemon's `/`
    /// working directory instead and the mismatch is logged, per
    /// `spec.md` §4.1 step 9.
    pub fn spawn(shell: &str, cwd: &Path) -> anyhow::Result<ShellChild> {
        let mut cmd = Command::new(shell);
        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::null());

        if cwd.is_dir() {
            cmd.current_dir(cwd);
        } else {
            warn!("working directory {} no longer exists; starting shell in /", cwd.display());
        }

        let mut child = cmd.spawn().with_context(|| format!("spawning shell {:?}", shell))?;
        let stdin = child.stdin.take().expect("piped stdin must be present");
        Ok(ShellChild { child, stdin })
    }

    /// Non-blocking reap check (listen loop step a). `Ok(None)` means
    /// still running.
    pub fn try_wait(&mut self) -> anyhow::Result<Option<ExitStatus>> {
        self.child.try_wait().context("polling shell child status")
    }

    /// Writes a shell fragment to the child's standard input. Callers
    /// treat a broken-pipe error as `ShellGone` and shut the session down.
    pub fn write_fragment(&mut self, fragment: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(fragment)?;
        self.stdin.flush()
    }

    /// `spec.md` §4.1 "Shutdown and cleanup" step 1: SIGTERM, wait up
    /// to one second, then SIGKILL, then reap.
    pub fn terminate(&mut self) {
        let pid = Pid::from_raw(self.child.id() as i32);
        if let Err(e) = kill(pid, Signal::SIGTERM) {
            warn!("sending SIGTERM to shell child {}: {}", pid, e);
        }

        let deadline = Instant::now() + SHELL_SHUTDOWN_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => {}
                Err(e) => {
                    warn!("polling shell child during shutdown: {}", e);
                    return;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(SHELL_REAP_POLL);
        }

        if let Err(e) = self.child.kill() {
            warn!("force-killing shell child {}: {}", pid, e);
        }
        if let Err(e) = self.child.wait() {
            warn!("reaping shell child {}: {}", pid, e);
        }
    }
}
