use anyhow::Context;
use ntest::timeout;

mod support;

use support::session::Session;

#[test]
#[timeout(30000)]
fn exit_tears_down_rendezvous_state() -> anyhow::Result<()> {
    let sess = Session::create("exit-cleanup").context("creating session")?;
    assert!(sess.session_dir().join("cmd.fifo").exists());

    let out = sess.exit().context("submitting exit request")?;
    assert!(out.status.success());

    support::wait_until(|| Ok(!sess.session_dir().exists()))
        .context("session directory was never cleaned up after exit")?;

    Ok(())
}

#[test]
#[timeout(30000)]
fn exec_after_exit_reports_missing() -> anyhow::Result<()> {
    let sess = Session::create("exit-then-exec").context("creating session")?;
    sess.exit().context("submitting exit request")?;

    support::wait_until(|| Ok(!sess.session_dir().join("cmd.fifo").exists()))
        .context("command channel was never removed after exit")?;

    let out = sess.exec("echo hi")?;
    assert!(!out.status.success());
    assert!(
        String::from_utf8_lossy(&out.stderr).contains("not running"),
        "got: {}",
        String::from_utf8_lossy(&out.stderr)
    );

    Ok(())
}

#[test]
#[timeout(30000)]
fn id_can_be_recreated_after_exit() -> anyhow::Result<()> {
    let sess = Session::create("recreate").context("creating first session")?;
    sess.exit().context("submitting exit request")?;
    support::wait_until(|| Ok(!sess.session_dir().exists())).context("cleanup never completed")?;

    let sess2 = sess.recreate("recreate").context("recreating session under the same id")?;
    let out = sess2.exec("echo again")?;
    assert_eq!(String::from_utf8_lossy(&out.stdout), "again\n");

    Ok(())
}
