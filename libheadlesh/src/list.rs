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

//! The list enumerator (`spec.md` §4.4): walks the rendezvous root and
//! reports what it finds. Always exits 0; a missing or empty
//! rendezvous root just means there's nothing to list.

use tracing::warn;

use crate::{config::Config, daemon::lock, paths};

pub fn run(config: &Config) -> anyhow::Result<()> {
    let root = paths::rendezvous_root(config);

    let entries = match std::fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(anyhow::anyhow!("reading rendezvous root {}: {}", root.display(), e)),
    };

    let mut sessions: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    sessions.sort();

    for session_id in sessions {
        let session_dir = paths::session_dir(config, &session_id);
        let lock_path = paths::lock_path(&session_dir);

        let pid = match lock::read_pid(&lock_path) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("{}: {:#}", session_id, e);
                eprintln!("{} (stale: unreadable pid.lock)", session_id);
                continue;
            }
        };

        match lock::probe_pid(pid) {
            Some(true) => println!("{}", session_id),
            Some(false) => eprintln!("{} (stale: pid {} is gone)", session_id, pid),
            None => println!("{} (pid {}, liveness unknown)", session_id, pid),
        }
    }

    Ok(())
}
