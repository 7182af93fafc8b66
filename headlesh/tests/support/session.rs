use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Output, Stdio},
};

use anyhow::{anyhow, Context};

use super::{headlesh_bin, tmpdir};

/// A `headlesh` session created against an isolated, per-test
/// rendezvous root (so parallel tests never collide in the real
/// `/tmp/headlesh_sessions`). Submits an exit request when dropped.
#[derive(Debug)]
pub struct Session {
    id: String,
    config_path: PathBuf,
    rendezvous_root: PathBuf,
    _tmp: tmpdir::Dir,
}

impl Session {
    pub fn create(id: &str) -> anyhow::Result<Session> {
        Session::create_with_envelope_max(id, None)
    }

    pub fn create_with_envelope_max(id: &str, envelope_max: Option<usize>) -> anyhow::Result<Session> {
        let tmp = tmpdir::Dir::new(std::env::temp_dir().join("headlesh-test"))?;
        let rendezvous_root = tmp.path().join("sessions");
        let config_path = tmp.path().join("config.toml");

        let mut config_toml = format!("rendezvous_root = {:?}\n", rendezvous_root.display().to_string());
        if let Some(max) = envelope_max {
            config_toml.push_str(&format!("envelope_max = {}\n", max));
        }
        std::fs::write(&config_path, config_toml).context("writing test config.toml")?;

        let session = Session { id: id.to_string(), config_path, rendezvous_root, _tmp: tmp };

        let out = session.headlesh(&["create", id]).output().context("spawning create proc")?;
        if !out.status.success() {
            return Err(anyhow!("create failed: {}", String::from_utf8_lossy(&out.stderr)));
        }

        Ok(session)
    }

    pub fn exec(&self, script: &str) -> anyhow::Result<Output> {
        let mut child = self
            .headlesh(&["exec", &self.id])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawning exec proc")?;
        {
            let mut stdin = child.stdin.take().expect("piped stdin");
            stdin.write_all(script.as_bytes()).context("writing script to exec proc")?;
        }
        child.wait_with_output().context("waiting for exec proc")
    }

    pub fn exit(&self) -> anyhow::Result<Output> {
        self.headlesh(&["exit", &self.id]).output().context("spawning exit proc")
    }

    /// Creates a new session under `id` reusing this session's
    /// rendezvous root, to exercise id reuse after a prior session at
    /// the same id has fully torn down.
    pub fn recreate(mut self, id: &str) -> anyhow::Result<Session> {
        self.id = id.to_string();
        let out = self.headlesh(&["create", id]).output().context("spawning create proc")?;
        if !out.status.success() {
            return Err(anyhow!("create failed: {}", String::from_utf8_lossy(&out.stderr)));
        }
        Ok(self)
    }

    /// Attempts `create id` against this session's own, still-live
    /// rendezvous root/config -- i.e. a second `create` racing the same
    /// `pid.lock` this session already holds, without tearing this one
    /// down first. Returns the raw process output so the caller can
    /// assert the failure rather than getting a `Session` to manage.
    pub fn attempt_create(&self, id: &str) -> anyhow::Result<Output> {
        self.headlesh(&["create", id]).output().context("spawning duplicate create proc")
    }

    pub fn session_dir(&self) -> PathBuf {
        self.rendezvous_root.join(&self.id)
    }

    pub fn rendezvous_root(&self) -> &std::path::Path {
        &self.rendezvous_root
    }

    pub fn config_path(&self) -> &std::path::Path {
        &self.config_path
    }

    fn headlesh(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(headlesh_bin());
        cmd.arg("--config-file").arg(&self.config_path);
        cmd.args(args);
        cmd
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.exit();
    }
}
