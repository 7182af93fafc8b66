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

use std::time::Duration;

/// Hard ceiling on a single request envelope, matching the wire format's
/// `ENVELOPE_MAX`. A client's script payload budget is this minus the
/// three path fields and their separators.
pub const ENVELOPE_MAX: usize = 65536;

/// Maximum length, in bytes, of each of the three path fields in a
/// request envelope (not counting the trailing separator).
pub const PATH_FIELD_MAX: usize = 256;

/// The literal bytes that, as the entire script payload of an envelope,
/// instruct the session server to shut down.
pub const EXIT_SENTINEL: &[u8] = b"__HEADLESH_INTERNAL_EXIT_CMD__";

/// How long the exec client will wait for the status pipe to produce a
/// value once both the out and err pipes have closed.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// How long the server waits for its shell child to exit in response to
/// a termination signal before force-killing it.
pub const SHELL_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Polling granularity used while waiting out `SHELL_SHUTDOWN_GRACE`.
pub const SHELL_REAP_POLL: Duration = Duration::from_millis(50);

pub const DEFAULT_RENDEZVOUS_ROOT: &str = "/tmp/headlesh_sessions";

pub const DEFAULT_SHELL: &str = "bash";

/// Prefix for the per-request ephemeral pipes a client creates under
/// the system temp directory.
pub const CLIENT_PIPE_PREFIX: &str = "headlesh";

/// Prefix for the race-free temporary files the server materializes
/// script bodies into before sourcing them into the session shell.
pub const SCRIPT_TEMP_PREFIX: &str = "headlesh_cmd_script_";
