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

use std::{env, fs, path::PathBuf};

use anyhow::Context;
use serde_derive::Deserialize;
use tracing::{info, instrument};

#[instrument(skip_all)]
pub fn read_config(config_file: &Option<String>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    if let Some(config_path) = config_file {
        info!("parsing explicitly passed in config ({})", config_path);
        let config_str = fs::read_to_string(config_path).context("reading config toml (1)")?;
        config = toml::from_str(&config_str).context("parsing config file (1)")?;
    } else if let Some(config_path) = default_config_path() {
        if config_path.exists() {
            info!("parsing default config ({})", config_path.display());
            let config_str = fs::read_to_string(&config_path).context("reading config toml (2)")?;
            config = toml::from_str(&config_str).context("parsing config file (2)")?;
        }
    }

    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        if !xdg_config.is_empty() {
            return Some(PathBuf::from(xdg_config).join("headlesh").join("config.toml"));
        }
    }
    let home = env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config").join("headlesh").join("config.toml"))
}

#[derive(Deserialize, Default, Debug, Clone)]
pub struct Config {
    /// Overrides the default shell binary (`bash`) used for new sessions
    /// when `create` is not given an explicit shell path.
    pub shell: Option<String>,

    /// Overrides the rendezvous root directory (default
    /// `/tmp/headlesh_sessions`).
    pub rendezvous_root: Option<String>,

    /// Overrides the per-envelope byte budget. Still capped at the wire
    /// format's hard ceiling; see `consts::ENVELOPE_MAX`.
    pub envelope_max: Option<usize>,
}
