use std::sync::Arc;

use anyhow::Context;
use ntest::timeout;

mod support;

use support::session::Session;

fn stdout_of(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr_of(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
#[timeout(30000)]
fn echo_roundtrip() -> anyhow::Result<()> {
    let sess = Session::create("echo").context("creating session")?;

    let out = sess.exec("echo hello")?;
    assert!(out.status.success());
    assert_eq!(stdout_of(&out), "hello\n");
    assert_eq!(stderr_of(&out), "");

    Ok(())
}

#[test]
#[timeout(30000)]
fn stdout_and_stderr_are_kept_separate() -> anyhow::Result<()> {
    let sess = Session::create("streams").context("creating session")?;

    let out = sess.exec("echo on-out; echo on-err >&2")?;
    assert_eq!(stdout_of(&out), "on-out\n");
    assert_eq!(stderr_of(&out), "on-err\n");

    Ok(())
}

#[test]
#[timeout(30000)]
fn environment_persists_across_requests() -> anyhow::Result<()> {
    let sess = Session::create("env-persist").context("creating session")?;

    let set = sess.exec("export GREETING=hi")?;
    assert!(set.status.success());

    let read = sess.exec("echo $GREETING")?;
    assert_eq!(stdout_of(&read), "hi\n");

    Ok(())
}

#[test]
#[timeout(30000)]
fn working_directory_persists_across_requests() -> anyhow::Result<()> {
    let sess = Session::create("cwd-persist").context("creating session")?;

    let cd = sess.exec("cd /tmp && pwd")?;
    assert_eq!(stdout_of(&cd).trim_end(), "/tmp");

    let pwd = sess.exec("pwd")?;
    assert_eq!(stdout_of(&pwd).trim_end(), "/tmp");

    Ok(())
}

#[test]
#[timeout(30000)]
fn exit_codes_propagate() -> anyhow::Result<()> {
    let sess = Session::create("exit-codes").context("creating session")?;

    for code in [0, 1, 2, 42, 127, 255] {
        let out = sess.exec(&format!("exit {}", code))?;
        assert_eq!(out.status.code(), Some(code), "exit {} did not propagate", code);
    }

    Ok(())
}

#[test]
#[timeout(30000)]
fn requests_serialize_against_a_slow_script() -> anyhow::Result<()> {
    let sess = Arc::new(Session::create("serialize").context("creating session")?);
    let marker = sess.session_dir().join("order.marker");

    let sess1 = Arc::clone(&sess);
    let marker1 = marker.clone();
    let handle =
        std::thread::spawn(move || sess1.exec(&format!("sleep 0.3; echo 1 >> '{}'", marker1.display())));

    // Give the first request time to actually submit its envelope before
    // the second one races it for the command channel.
    std::thread::sleep(std::time::Duration::from_millis(100));
    let out2 = sess.exec(&format!("echo 2 >> '{}'", marker.display()))?;
    let out1 = handle.join().expect("exec thread panicked")?;

    assert!(out1.status.success());
    assert!(out2.status.success());

    let contents = std::fs::read_to_string(&marker).context("reading order marker")?;
    assert_eq!(contents, "1\n2\n", "requests interleaved or ran out of order");

    Ok(())
}

#[test]
#[timeout(30000)]
fn nonexistent_session_reports_missing() -> anyhow::Result<()> {
    let tmp = support::tmpdir::Dir::new(std::env::temp_dir().join("headlesh-test"))?;
    let config_path = tmp.path().join("config.toml");
    std::fs::write(&config_path, format!("rendezvous_root = {:?}\n", tmp.path().join("sessions").display().to_string()))?;

    let out = std::process::Command::new(support::headlesh_bin())
        .arg("--config-file")
        .arg(&config_path)
        .arg("exec")
        .arg("never-created")
        .stdin(std::process::Stdio::piped())
        .output()
        .context("spawning exec proc")?;

    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("not running"), "got: {}", stderr_of(&out));

    Ok(())
}

#[test]
#[timeout(30000)]
fn oversized_script_is_rejected_before_dispatch() -> anyhow::Result<()> {
    let sess = Session::create_with_envelope_max("budget", Some(200)).context("creating session")?;

    let out = sess.exec(&"a".repeat(1000))?;
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("exceeds"), "got: {}", stderr_of(&out));

    Ok(())
}
