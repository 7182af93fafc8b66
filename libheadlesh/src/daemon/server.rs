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

//! The session server's listen loop (`spec.md` §4.1, steps a-h) and its
//! cleanup-on-drop `ServerContext`.

use std::{
    io::Write,
    os::unix::io::OwnedFd,
    path::{Path, PathBuf},
    sync::{atomic::{AtomicBool, Ordering}, Arc},
};

use anyhow::anyhow;
use nix::{errno::Errno, fcntl::{open, OFlag}, sys::stat::Mode};
use tracing::{error, info, instrument, warn};

use crate::{consts::SCRIPT_TEMP_PREFIX, daemon::{lock::LockFile, shell::ShellChild}, protocol};

/// Everything the listen loop needs, and everything that must be torn
/// down when the session ends, however it ends. Cleanup runs
/// unconditionally from `Drop`, which is the idiomatic-Rust stand-in
/// for the archived implementation's multiple manual cleanup call
/// sites at each of its exit paths.
pub struct ServerContext {
    session_dir: PathBuf,
    cmd_fifo_path: PathBuf,
    lock_path: PathBuf,
    envelope_max: usize,
    shutdown: Arc<AtomicBool>,
    lock: Option<LockFile>,
    shell: Option<ShellChild>,
}

impl ServerContext {
    pub fn new(
        session_dir: PathBuf,
        cmd_fifo_path: PathBuf,
        lock_path: PathBuf,
        envelope_max: usize,
        shutdown: Arc<AtomicBool>,
        lock: LockFile,
        shell: ShellChild,
    ) -> Self {
        ServerContext {
            session_dir,
            cmd_fifo_path,
            lock_path,
            envelope_max,
            shutdown,
            lock: Some(lock),
            shell: Some(shell),
        }
    }
}

impl Drop for ServerContext {
    fn drop(&mut self) {
        if let Some(mut shell) = self.shell.take() {
            shell.terminate();
        }
        remove_if_exists(&self.cmd_fifo_path, "command channel");
        drop(self.lock.take());
        remove_if_exists(&self.lock_path, "lock file");
        // Best-effort: fails silently (ENOTEMPTY) if something else is
        // still in the directory, which is fine; nothing owns removing
        // a non-empty rendezvous directory.
        let _ = std::fs::remove_dir(&self.session_dir);
    }
}

fn remove_if_exists(path: &Path, what: &str) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("removing {} at {}: {}", what, path.display(), e),
    }
}

/// Runs the listen loop until shutdown is requested, the shell exits,
/// the exit sentinel arrives, or a fatal channel error occurs. Consumes
/// `ctx`, so the `Drop` cleanup above always runs when this returns.
#[instrument(skip_all)]
pub fn serve(mut ctx: ServerContext) -> anyhow::Result<()> {
    let mut buf = vec![0u8; ctx.envelope_max.saturating_sub(1)];
    let mut fifo_fd: Option<OwnedFd> = None;

    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            info!("shutdown requested; terminating listen loop");
            return Ok(());
        }

        match ctx.shell.as_mut().expect("shell present until drop").try_wait() {
            Ok(Some(status)) => {
                info!("shell child exited ({:?}); terminating listen loop", status);
                return Ok(());
            }
            Ok(None) => {}
            Err(e) => {
                warn!("reap check failed, treating as shell gone: {:#}", e);
                return Ok(());
            }
        }

        if fifo_fd.is_none() {
            match open_cmd_fifo(&ctx.cmd_fifo_path, &ctx.shutdown)? {
                Some(fd) => {
                    fifo_fd = Some(fd);
                }
                None => return Ok(()),
            }
            continue;
        }

        let fd = fifo_fd.as_ref().expect("just ensured fd is open");
        let n = match nix::unistd::read(fd, &mut buf) {
            Ok(n) => n,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!("reading command channel: {}", e);
                return Err(anyhow!("reading command channel: {}", e));
            }
        };

        if n == 0 {
            fifo_fd = None;
            continue;
        }

        let raw = &buf[..n];
        let env = match protocol::parse(raw) {
            Ok(env) => env,
            Err(e) => {
                warn!("malformed envelope: {}", e);
                fifo_fd = None;
                continue;
            }
        };

        if protocol::is_exit_sentinel(env.script) {
            info!("received exit sentinel; shutting down");
            return Ok(());
        }

        match dispatch(&mut ctx, env.out_path, env.err_path, env.status_path, env.script) {
            DispatchResult::Ok => {}
            DispatchResult::Dropped => fifo_fd = None,
            DispatchResult::ShellGone => {
                warn!("shell input pipe is gone; terminating listen loop");
                return Ok(());
            }
        }
    }
}

enum DispatchResult {
    Ok,
    Dropped,
    ShellGone,
}

fn dispatch(
    ctx: &mut ServerContext,
    out_path: &[u8],
    err_path: &[u8],
    status_path: &[u8],
    script: &[u8],
) -> DispatchResult {
    let mut tmp = match tempfile::Builder::new().prefix(SCRIPT_TEMP_PREFIX).tempfile_in(std::env::temp_dir()) {
        Ok(tmp) => tmp,
        Err(e) => {
            warn!("creating script temp file: {}", e);
            return DispatchResult::Dropped;
        }
    };
    if let Err(e) = tmp.write_all(script) {
        warn!("writing script temp file: {}", e);
        return DispatchResult::Dropped;
    }
    let script_path = tmp.path().to_path_buf();

    let fragment = format!(
        "{{ . \"{script}\" ; EXIT_STATUS=$? ; }} > \"{out}\" 2> \"{err}\" ; echo $EXIT_STATUS > \"{status}\" ; rm -f \"{script}\"\n",
        script = script_path.display(),
        out = String::from_utf8_lossy(out_path),
        err = String::from_utf8_lossy(err_path),
        status = String::from_utf8_lossy(status_path),
    );

    if fragment.len() > ctx.envelope_max {
        warn!("formatted fragment ({} bytes) exceeds the envelope budget; dropping request", fragment.len());
        return DispatchResult::Dropped;
    }

    match ctx.shell.as_mut().expect("shell present until drop").write_fragment(fragment.as_bytes()) {
        Ok(()) => {
            // The shell now owns deleting `script_path`; stop our
            // NamedTempFile from removing it when it goes out of scope.
            let _ = tmp.into_temp_path().keep();
            DispatchResult::Ok
        }
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => DispatchResult::ShellGone,
        Err(e) => {
            warn!("writing shell fragment: {}", e);
            DispatchResult::Dropped
        }
    }
}

/// Blocking open of the command channel for read, retried on `EINTR`
/// unless shutdown has been requested in the meantime.
fn open_cmd_fifo(path: &Path, shutdown: &AtomicBool) -> anyhow::Result<Option<OwnedFd>> {
    loop {
        match open(path, OFlag::O_RDONLY, Mode::empty()) {
            Ok(fd) => return Ok(Some(fd)),
            Err(Errno::EINTR) => {
                if shutdown.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                continue;
            }
            Err(e) => return Err(anyhow!("opening command channel {}: {}", path.display(), e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cleanup_removes_fifo_lock_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("s1");
        std::fs::create_dir_all(&session_dir).unwrap();
        let cmd_fifo_path = session_dir.join("cmd.fifo");
        nix::unistd::mkfifo(&cmd_fifo_path, Mode::from_bits_truncate(0o666)).unwrap();
        let lock_path = session_dir.join("pid.lock");
        let lock = LockFile::acquire(&lock_path, "s1").unwrap();
        let shell = ShellChild::spawn("true", dir.path()).unwrap();

        let ctx = ServerContext::new(
            session_dir.clone(),
            cmd_fifo_path.clone(),
            lock_path.clone(),
            65536,
            Arc::new(AtomicBool::new(false)),
            lock,
            shell,
        );
        drop(ctx);

        assert!(!cmd_fifo_path.exists());
        assert!(!lock_path.exists());
        assert!(!session_dir.exists());
    }
}
