// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};

/// Output format for `surf run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RunOutputFormat {
    /// One line per step: `ok  <cmd>` or `fail <cmd>: <message>`.
    #[default]
    Text,
    /// A JSON array of step outcomes.
    Json,
}

/// Failure policy for `surf run`: stop at the first failed step, or
/// continue running the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum PolicyArg {
    #[default]
    Stop,
    Continue,
}

#[derive(Parser, Debug)]
#[command(
    name = "surf",
    about = "Local bridge daemon that drives a browser for CLI and AI-agent clients",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the config file (overrides the search-path layers).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Verbose stderr logging (daemon stdout is reserved for the
    /// native-messaging frame stream and is never used for logs).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge daemon as a native-messaging host.
    ///
    /// Reads framed messages from stdin, writes framed replies to
    /// stdout, and listens on the local socket for client connections.
    /// This is the command the browser launches.
    Serve,

    /// Run a workflow file against a running daemon.
    Run {
        /// Path to a YAML (or JSON) file containing a list of workflow steps.
        workflow: PathBuf,
        /// Seed variable in `KEY=VALUE` form; may be repeated.
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
        /// Output format.
        #[arg(long, value_enum, default_value = "text")]
        output: RunOutputFormat,
        /// What to do when a leaf step fails.
        #[arg(long, value_enum, default_value = "stop")]
        on_error: PolicyArg,
        /// Skip the automatic post-action wait step.
        #[arg(long)]
        no_auto_wait: bool,
    },

    /// Issue a single tool request against a running daemon and print the reply.
    Call {
        /// Tool name, e.g. `nav.go`.
        tool: String,
        /// Tool arguments as a JSON object (default `{}`).
        #[arg(default_value = "{}")]
        args: String,
        /// Target tab id.
        #[arg(long)]
        tab_id: Option<u32>,
    },

    /// Print the effective merged configuration and exit.
    ShowConfig,

    /// Print shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "surf", &mut std::io::stdout());
}
