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

//! The exec client (`spec.md` §4.2): submit a script from stdin to a
//! named session and stream back its two output channels and exit code.

use std::{
    ffi::CString,
    io::{self, Read, Write},
    os::{
        fd::{AsFd, AsRawFd, OwnedFd},
        unix::ffi::OsStrExt,
    },
    path::{Path, PathBuf},
    sync::OnceLock,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use nix::{
    errno::Errno,
    fcntl::{open, OFlag},
    poll::{poll, PollFd, PollFlags, PollTimeout},
    sys::stat::Mode,
};
use tracing::debug;

use crate::{
    config::Config,
    consts::{CLIENT_PIPE_PREFIX, ENVELOPE_MAX, STATUS_TIMEOUT},
    error::HeadleshError,
    paths, protocol,
};

pub fn run(session_id: &str, config: &Config) -> anyhow::Result<()> {
    paths::validate_session_id(session_id)?;

    let pid = std::process::id();
    let out_path = client_pipe_path(pid, "out");
    let err_path = client_pipe_path(pid, "err");
    let status_path = client_pipe_path(pid, "status");

    let envelope_max = config.envelope_max.unwrap_or(ENVELOPE_MAX).min(ENVELOPE_MAX);
    let overhead = out_path.as_os_str().len() + err_path.as_os_str().len() + status_path.as_os_str().len() + 3;
    let script_budget = envelope_max.saturating_sub(overhead);
    let script = read_script_bounded(script_budget)?;

    for path in [&out_path, &err_path, &status_path] {
        let _ = std::fs::remove_file(path);
    }
    install_signal_cleanup(&out_path, &err_path, &status_path)?;

    paths::mkfifo_0666(&out_path)?;
    paths::mkfifo_0666(&err_path)?;
    paths::mkfifo_0666(&status_path)?;

    let outcome = run_inner(session_id, config, &out_path, &err_path, &status_path, &script);

    for path in [&out_path, &err_path, &status_path] {
        let _ = std::fs::remove_file(path);
    }

    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("headlesh exec: {:#}", e);
            1
        }
    };
    std::process::exit(code as i32);
}

fn run_inner(
    session_id: &str,
    config: &Config,
    out_path: &Path,
    err_path: &Path,
    status_path: &Path,
    script: &[u8],
) -> anyhow::Result<u8> {
    let envelope = protocol::encode(
        out_path.as_os_str().as_bytes(),
        err_path.as_os_str().as_bytes(),
        status_path.as_os_str().as_bytes(),
        script,
    );

    let session_dir = paths::session_dir(config, session_id);
    let cmd_fifo_path = paths::cmd_fifo_path(&session_dir);
    send_envelope(session_id, &cmd_fifo_path, &envelope)?;

    let out_fd = open_client_pipe(out_path)?;
    let err_fd = open_client_pipe(err_path)?;
    stream_output(out_fd, err_fd)?;

    let status_fd = open_client_pipe(status_path)?;
    read_status(status_fd)
}

fn send_envelope(session_id: &str, cmd_fifo_path: &Path, envelope: &[u8]) -> anyhow::Result<()> {
    let fd = match open(cmd_fifo_path, OFlag::O_WRONLY, Mode::empty()) {
        Ok(fd) => fd,
        Err(Errno::ENOENT) => return Err(HeadleshError::RendezvousMissing(session_id.to_string()).into()),
        Err(e) => return Err(anyhow!("opening session {:?}'s command channel: {}", session_id, e)),
    };

    let n = nix::unistd::write(&fd, envelope).context("writing request envelope")?;
    if n != envelope.len() {
        return Err(anyhow!("partial write of request envelope ({} of {} bytes)", n, envelope.len()));
    }
    Ok(())
}

fn open_client_pipe(path: &Path) -> anyhow::Result<OwnedFd> {
    open(path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
        .with_context(|| format!("opening {}", path.display()))
}

/// Reads from `out_fd`/`err_fd` until both report end-of-file, relaying
/// bytes to our own stdout/stderr as they arrive. Both are opened
/// non-blocking; per `spec.md` §4.2's documented failure behaviour ("the
/// three client pipes may remain open with no writer; end-of-file is
/// reached normally"), a pipe that never gets a writer reads as EOF
/// immediately rather than hanging the client.
fn stream_output(out_fd: OwnedFd, err_fd: OwnedFd) -> anyhow::Result<()> {
    let mut out_done = false;
    let mut err_done = false;
    let mut chunk = [0u8; 8192];

    while !out_done || !err_done {
        let mut fds = Vec::with_capacity(2);
        if !out_done {
            fds.push(PollFd::new(out_fd.as_fd(), PollFlags::POLLIN));
        }
        if !err_done {
            fds.push(PollFd::new(err_fd.as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(anyhow!("polling out/err pipes: {}", e)),
        }

        let mut idx = 0;
        if !out_done {
            let ready = fds[idx].revents().unwrap_or_else(PollFlags::empty).intersects(
                PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR,
            );
            idx += 1;
            if ready {
                out_done = relay_chunk(out_fd.as_raw_fd(), &mut chunk, &mut io::stdout())?;
            }
        }
        if !err_done {
            let ready = fds[idx].revents().unwrap_or_else(PollFlags::empty).intersects(
                PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR,
            );
            if ready {
                err_done = relay_chunk(err_fd.as_raw_fd(), &mut chunk, &mut io::stderr())?;
            }
        }
    }
    Ok(())
}

/// Reads one chunk from `fd` and writes it verbatim to `sink`. Returns
/// `true` once end-of-file is observed.
fn relay_chunk(fd: std::os::fd::RawFd, chunk: &mut [u8], sink: &mut dyn Write) -> anyhow::Result<bool> {
    let fd = unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) };
    match nix::unistd::read(fd, chunk) {
        Ok(0) => Ok(true),
        Ok(n) => {
            sink.write_all(&chunk[..n]).context("relaying output to caller")?;
            Ok(false)
        }
        Err(Errno::EAGAIN) => Ok(false),
        Err(e) => Err(anyhow!("reading output pipe: {}", e)),
    }
}

fn read_status(status_fd: OwnedFd) -> anyhow::Result<u8> {
    let deadline = Instant::now() + STATUS_TIMEOUT;
    let mut status_buf = Vec::new();
    let mut chunk = [0u8; 64];

    loop {
        if Instant::now() >= deadline {
            return Err(HeadleshError::StatusTimeout(STATUS_TIMEOUT).into());
        }
        match nix::unistd::read(&status_fd, &mut chunk) {
            Ok(0) => break,
            Ok(n) => status_buf.extend_from_slice(&chunk[..n]),
            Err(Errno::EAGAIN) => std::thread::sleep(Duration::from_millis(20)),
            Err(Errno::EINTR) => {}
            Err(e) => return Err(anyhow!("reading status pipe: {}", e)),
        }
    }

    protocol::parse_status(&status_buf)
        .ok_or_else(|| HeadleshError::StatusParseFailure(String::from_utf8_lossy(&status_buf).into_owned()).into())
}

fn read_script_bounded(budget: usize) -> anyhow::Result<Vec<u8>> {
    let mut script = Vec::new();
    io::stdin()
        .take(budget as u64 + 1)
        .read_to_end(&mut script)
        .context("reading script from standard input")?;
    if script.len() > budget {
        return Err(HeadleshError::EnvelopeTooLarge { got: script.len(), max: budget }.into());
    }
    Ok(script)
}

fn client_pipe_path(pid: u32, kind: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}_{}_{}", CLIENT_PIPE_PREFIX, kind, pid))
}

static CLIENT_PIPES: OnceLock<[CString; 3]> = OnceLock::new();

/// Installs a minimal `SIGINT`/`SIGTERM` handler that best-effort
/// unlinks this invocation's three pipes, then restores the default
/// disposition and re-raises, per `spec.md` §4.2's "Failure behaviour".
fn install_signal_cleanup(out_path: &Path, err_path: &Path, status_path: &Path) -> anyhow::Result<()> {
    let paths = [to_cstring(out_path)?, to_cstring(err_path)?, to_cstring(status_path)?];
    CLIENT_PIPES.set(paths).map_err(|_| anyhow!("signal cleanup already installed"))?;

    unsafe {
        libc::signal(libc::SIGINT, cleanup_and_reraise as libc::sighandler_t);
        libc::signal(libc::SIGTERM, cleanup_and_reraise as libc::sighandler_t);
    }
    Ok(())
}

fn to_cstring(path: &Path) -> anyhow::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).with_context(|| format!("{} contains a NUL byte", path.display()))
}

extern "C" fn cleanup_and_reraise(sig: libc::c_int) {
    if let Some(paths) = CLIENT_PIPES.get() {
        for path in paths {
            unsafe {
                libc::unlink(path.as_ptr());
            }
        }
    }
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

#[allow(dead_code)]
fn log_signal_install(path: &Path) {
    debug!("registered cleanup for {}", path.display());
}
