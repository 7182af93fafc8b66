use anyhow::Context;
use ntest::timeout;

mod support;

use support::session::Session;

#[test]
#[timeout(30000)]
fn empty_rendezvous_root_lists_nothing() -> anyhow::Result<()> {
    let tmp = support::tmpdir::Dir::new(std::env::temp_dir().join("headlesh-test"))?;
    let config_path = tmp.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!("rendezvous_root = {:?}\n", tmp.path().join("sessions").display().to_string()),
    )?;

    let out = std::process::Command::new(support::headlesh_bin())
        .arg("--config-file")
        .arg(&config_path)
        .arg("list")
        .output()
        .context("spawning list proc")?;

    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout), "");

    Ok(())
}

#[test]
#[timeout(30000)]
fn lists_a_running_session() -> anyhow::Result<()> {
    let sess = Session::create("listed").context("creating session")?;

    let out = std::process::Command::new(support::headlesh_bin())
        .arg("--config-file")
        .arg(sess.config_path())
        .arg("list")
        .output()
        .context("spawning list proc")?;

    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim_end(), "listed");
    assert_eq!(String::from_utf8_lossy(&out.stderr), "");

    Ok(())
}
