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

//! The exit client (`spec.md` §4.3): submits the exit sentinel and
//! returns as soon as the write succeeds, without waiting for the
//! session to actually finish tearing down.

use anyhow::anyhow;
use nix::{errno::Errno, fcntl::{open, OFlag}, sys::stat::Mode};

use crate::{config::Config, consts::EXIT_SENTINEL, error::HeadleshError, paths, protocol};

pub fn run(session_id: &str, config: &Config) -> anyhow::Result<()> {
    paths::validate_session_id(session_id)?;

    let session_dir = paths::session_dir(config, session_id);
    let cmd_fifo_path = paths::cmd_fifo_path(&session_dir);

    // The out/err/status paths are never consulted for an exit request
    // (the server returns from its listen loop before dispatching
    // anything), but the envelope format always carries three absolute
    // path fields, so synthesize unused placeholders.
    let envelope = protocol::encode(b"/dev/null", b"/dev/null", b"/dev/null", EXIT_SENTINEL);

    let fd = match open(&cmd_fifo_path, OFlag::O_WRONLY, Mode::empty()) {
        Ok(fd) => fd,
        Err(Errno::ENOENT) => return Err(HeadleshError::RendezvousMissing(session_id.to_string()).into()),
        Err(e) => return Err(anyhow!("opening session {:?}'s command channel: {}", session_id, e)),
    };

    let n = nix::unistd::write(&fd, &envelope).map_err(|e| anyhow!("writing exit request: {}", e))?;
    if n != envelope.len() {
        return Err(anyhow!("partial write of exit request ({} of {} bytes)", n, envelope.len()));
    }

    Ok(())
}
