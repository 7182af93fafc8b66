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

//! The standard double-fork detach sequence (`spec.md` §4.1 step 5).
//! Must run before any background thread exists in this process (no
//! `tracing_subscriber` writer, no `signal_hook` registration) since
//! `fork()` only duplicates the calling thread.

use std::{
    fs::OpenOptions,
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::Path,
};

use anyhow::Context;
use nix::{
    sys::signal::{signal, SigHandler, Signal},
    unistd::{chdir, fork, setsid, ForkResult},
};

/// Detaches the calling process from its controlling terminal. Returns
/// `Ok(())` only in the final grandchild; the original process and the
/// intermediate session-leader child both exit directly and never
/// return from this function.
pub fn daemonize(log_path: &Path) -> anyhow::Result<()> {
    match unsafe { fork() }.context("first daemonizing fork")? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    if let Err(e) = setsid() {
        eprintln!("headlesh daemon: setsid failed: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = unsafe { signal(Signal::SIGHUP, SigHandler::SigIgn) } {
        eprintln!("headlesh daemon: failed to ignore SIGHUP: {}", e);
        std::process::exit(1);
    }

    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => {
            eprintln!("headlesh daemon: second daemonizing fork failed: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = chdir("/") {
        eprintln!("headlesh daemon: chdir(/) failed: {}", e);
    }
    unsafe { libc::umask(0o022) };

    if let Err(e) = redirect_stdio(log_path) {
        eprintln!("headlesh daemon: failed to redirect stdio to {}: {:#}", log_path.display(), e);
        std::process::exit(1);
    }

    Ok(())
}

fn redirect_stdio(log_path: &Path) -> anyhow::Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o644)
        .open(log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;
    let log_fd = log_file.as_raw_fd();
    unsafe {
        libc::dup2(log_fd, libc::STDOUT_FILENO);
        libc::dup2(log_fd, libc::STDERR_FILENO);
    }

    let devnull = OpenOptions::new().read(true).open("/dev/null").context("opening /dev/null")?;
    unsafe {
        libc::dup2(devnull.as_raw_fd(), libc::STDIN_FILENO);
    }

    Ok(())
}
