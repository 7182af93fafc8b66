// This module is used from multiple different test files, each of which
// gets compiled into its own binary. Not all the binaries use all the
// stuff here.
#![allow(dead_code)]

use std::{path::PathBuf, time};

use anyhow::anyhow;

pub mod session;
pub mod tmpdir;

/// The compiled `headlesh` binary under test, provided by Cargo for any
/// integration test belonging to the same package as the `headlesh` bin target.
pub fn headlesh_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_headlesh"))
}

pub fn wait_until<P>(mut pred: P) -> anyhow::Result<()>
where
    P: FnMut() -> anyhow::Result<bool>,
{
    let mut sleep_dur = time::Duration::from_millis(5);
    for _ in 0..12 {
        if pred()? {
            return Ok(());
        } else {
            std::thread::sleep(sleep_dur);
            sleep_dur *= 2;
        }
    }

    Err(anyhow!("pred never became true"))
}
