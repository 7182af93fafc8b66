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

//! The handful of failure kinds callers need to branch on by name.
//! Everything else stays an opaque `anyhow::Error` propagated with
//! `.context(...)`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeadleshError {
    #[error("invalid session id {0:?}: must be non-empty and contain no '/'")]
    InvalidSessionId(String),

    #[error("session {0:?} is already running")]
    AlreadyRunning(String),

    #[error("session {0:?} is not running (no command channel found)")]
    RendezvousMissing(String),

    #[error("script of {got} bytes exceeds the {max} byte envelope budget")]
    EnvelopeTooLarge { got: usize, max: usize },

    #[error("timed out after {0:?} waiting for the session to report a status")]
    StatusTimeout(std::time::Duration),

    #[error("status channel did not contain a decimal integer: {0:?}")]
    StatusParseFailure(String),
}
