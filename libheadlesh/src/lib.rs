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

//! `headlesh`: persistent, re-attachable headless shell sessions
//! addressed over a filesystem rendezvous point (`spec.md` §1-§2).

pub mod config;
pub mod consts;
pub mod create;
pub mod daemon;
pub mod error;
pub mod exec;
pub mod exit;
pub mod list;
pub mod paths;
pub mod protocol;

use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Persistent headless shell sessions")]
pub struct Args {
    /// A file to write logs into. If not given, the create subcommand
    /// logs to stderr (until it detaches, after which its stderr is the
    /// session log file anyway) and the other subcommands don't log at all.
    #[clap(short, long)]
    pub log_file: Option<String>,

    /// Show more logging. Provide twice for trace-level logging.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// A toml file containing configuration. Defaults to
    /// $XDG_CONFIG_HOME/headlesh/config.toml or ~/.config/headlesh/config.toml.
    #[clap(short, long)]
    pub config_file: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstraps a detached session server listening for exec requests.
    Create {
        /// The session id to create; becomes the name of its rendezvous directory.
        session_id: String,
        /// The shell binary to run as the session's persistent child. Defaults to bash.
        shell_path: Option<String>,
    },
    /// Submits a script (read from standard input) to a session and streams back its output.
    Exec {
        /// The session id to submit the script to.
        session_id: String,
    },
    /// Asks a session to shut down after finishing any request already in flight.
    Exit {
        /// The session id to terminate.
        session_id: String,
    },
    /// Lists the sessions found under the rendezvous root.
    List,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let trace_level = match args.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .map_err(|e| anyhow::anyhow!("opening log file {}: {}", log_file, e))?;
        tracing_subscriber::fmt()
            .with_max_level(trace_level)
            .with_thread_ids(true)
            .with_target(false)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else if matches!(args.command, Commands::Create { .. }) {
        tracing_subscriber::fmt()
            .with_max_level(trace_level)
            .with_thread_ids(true)
            .with_target(false)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::read_config(&args.config_file)?;

    match args.command {
        Commands::Create { session_id, shell_path } => create::run(session_id, shell_path, &config),
        Commands::Exec { session_id } => exec::run(&session_id, &config),
        Commands::Exit { session_id } => exit::run(&session_id, &config),
        Commands::List => list::run(&config),
    }
}
