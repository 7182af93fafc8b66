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

//! Orchestrates the session server side of bootstrap (`spec.md` §4.1,
//! steps 5-9) and shutdown. The synchronous precondition steps (1-4:
//! validating the session id, acquiring the lock, creating the command
//! channel) happen in [`crate::create`] before this module is reached,
//! so that their failures are visible on the caller's terminal rather
//! than silently swallowed after detaching.

pub mod daemonize;
pub mod lock;
pub mod server;
pub mod shell;
pub mod signals;

use std::path::PathBuf;

use tracing::{error, info};

use self::{lock::LockFile, server::ServerContext, shell::ShellChild};

/// Everything gathered by `create::run` before detaching, handed off to
/// [`run`] once the precondition checks have passed.
pub struct BootstrapState {
    pub session_id: String,
    pub session_dir: PathBuf,
    pub cmd_fifo_path: PathBuf,
    pub lock_path: PathBuf,
    pub lock: LockFile,
    pub log_path: PathBuf,
    pub shell: String,
    pub cwd: PathBuf,
    pub envelope_max: usize,
}

/// Detaches from the terminal and runs the session server until it
/// shuts down, then exits the process. Never returns: the original
/// process and the intermediate session-leader child exit inside
/// `daemonize::daemonize` itself, and the grandchild exits explicitly
/// at the end of this function.
pub fn run(mut state: BootstrapState) -> ! {
    if let Err(e) = daemonize::daemonize(&state.log_path) {
        eprintln!("headlesh daemon: failed to detach: {:#}", e);
        std::process::exit(1);
    }

    // From here on we're the detached grandchild; stdout/stderr are
    // already redirected to the log file, so the subscriber installed
    // in lib.rs::run before the fork now writes there transparently.
    if let Err(e) = state.lock.write_pid(std::process::id() as i32) {
        error!("writing pid to pid.lock: {:#}", e);
        std::process::exit(1);
    }

    let shutdown = match signals::install() {
        Ok(flag) => flag,
        Err(e) => {
            error!("installing signal handlers: {:#}", e);
            std::process::exit(1);
        }
    };

    let shell = match ShellChild::spawn(&state.shell, &state.cwd) {
        Ok(shell) => shell,
        Err(e) => {
            error!("spawning shell {:?}: {:#}", state.shell, e);
            std::process::exit(1);
        }
    };

    info!("session {} bootstrapped, shell {:?}, cwd {}", state.session_id, state.shell, state.cwd.display());

    let ctx = ServerContext::new(
        state.session_dir,
        state.cmd_fifo_path,
        state.lock_path,
        state.envelope_max,
        shutdown,
        state.lock,
        shell,
    );

    let result = server::serve(ctx);
    match &result {
        Ok(()) => info!("session {} shut down", state.session_id),
        Err(e) => error!("session {} terminated with error: {:#}", state.session_id, e),
    }
    std::process::exit(if result.is_ok() { 0 } else { 1 });
}
