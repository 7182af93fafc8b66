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

//! Minimal signal handling for the session server: `SIGTERM`/`SIGINT`
//! set a shared flag the listen loop observes at its next iteration
//! (the flag-setting handlers themselves are installed by
//! `signal_hook::flag::register`, which is itself async-signal-safe).
//! `SIGHUP` is ignored during daemonization; `SIGPIPE` is ignored here
//! for the server's lifetime since writes to the shell pipe are
//! explicitly checked for broken-pipe instead.

use std::sync::{atomic::AtomicBool, Arc};

use anyhow::Context;
use nix::sys::signal::{signal, SigHandler, Signal};
use signal_hook::{consts::SIGINT, consts::SIGTERM, flag};

/// Registers `SIGTERM`/`SIGINT` against a freshly-allocated shutdown
/// flag and returns it. Also ignores `SIGPIPE` for the process.
pub fn install() -> anyhow::Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown)).context("registering SIGTERM handler")?;
    flag::register(SIGINT, Arc::clone(&shutdown)).context("registering SIGINT handler")?;

    unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }.context("ignoring SIGPIPE")?;

    Ok(shutdown)
}
