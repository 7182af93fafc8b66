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

//! Exclusive advisory locking on `pid.lock`. The lock is held by
//! keeping the file descriptor open for the server's lifetime; it
//! survives `fork()` since no `exec()` ever happens in this process.

use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::Path,
};

use anyhow::{anyhow, Context};

use crate::error::HeadleshError;

#[derive(Debug)]
pub struct LockFile {
    file: File,
}

impl LockFile {
    /// Opens (creating if absent) and exclusively, non-blockingly locks
    /// `path`. Lock contention is reported as `HeadleshError::AlreadyRunning`.
    pub fn acquire(path: &Path, session_id: &str) -> anyhow::Result<LockFile> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o644)
            .open(path)
            .with_context(|| format!("opening {}", path.display()))?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                return Err(HeadleshError::AlreadyRunning(session_id.to_string()).into());
            }
            return Err(anyhow!("acquiring lock on {}: {}", path.display(), err));
        }

        Ok(LockFile { file })
    }

    /// Truncates the lock file and writes `pid\n`, per bootstrap step 6.
    pub fn write_pid(&mut self, pid: i32) -> anyhow::Result<()> {
        self.file.set_len(0).context("truncating pid.lock")?;
        self.file.seek(SeekFrom::Start(0)).context("seeking pid.lock")?;
        writeln!(self.file, "{}", pid).context("writing pid to pid.lock")?;
        self.file.flush().context("flushing pid.lock")?;
        Ok(())
    }
}

/// Reads the leading integer out of a `pid.lock`'s contents. Used by
/// `list`, which reads PIDs without acquiring the lock.
pub fn read_pid(path: &Path) -> anyhow::Result<i32> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let digits_end = contents.find(|c: char| !c.is_ascii_digit()).unwrap_or(contents.len());
    contents[..digits_end]
        .parse()
        .with_context(|| format!("{} does not start with a decimal pid", path.display()))
}

/// Probes whether `pid` names a live process via signal 0, per `spec.md`
/// §4.4. Returns `Some(true)` if live, `Some(false)` if definitively
/// stale (`ESRCH`), `None` if the probe was inconclusive (e.g. `EPERM`).
pub fn probe_pid(pid: i32) -> Option<bool> {
    use nix::{sys::signal::kill, unistd::Pid};
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => Some(true),
        Err(nix::errno::Errno::ESRCH) => Some(false),
        Err(_) => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acquire_then_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid.lock");

        let _held = LockFile::acquire(&path, "s1").unwrap();
        let err = LockFile::acquire(&path, "s1").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HeadleshError>(),
            Some(HeadleshError::AlreadyRunning(id)) if id == "s1"
        ));
    }

    #[test]
    fn write_pid_then_read_pid_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid.lock");

        let mut lock = LockFile::acquire(&path, "s1").unwrap();
        lock.write_pid(4242).unwrap();
        assert_eq!(read_pid(&path).unwrap(), 4242);
    }

    #[test]
    fn probe_self_pid_is_live() {
        let pid = std::process::id() as i32;
        assert_eq!(probe_pid(pid), Some(true));
    }

    #[test]
    fn probe_unlikely_pid_is_stale() {
        // PID 1 << 30 is not a valid process id on any real system.
        assert_eq!(probe_pid(1 << 30), Some(false));
    }
}
