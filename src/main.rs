// Copyright (c) 2026 surf contributors
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, PolicyArg, RunOutputFormat};
use surf_daemon::{bind_socket, Daemon};
use surf_protocol::{Config, WorkflowStep};
use surf_workflow::{FailurePolicy, ToolIssuer, UnixSocketClient, WorkflowEngine};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = surf_protocol::config::load(cli.config.as_deref())
        .context("loading configuration")?;

    match &cli.command {
        Commands::Serve => {
            run_serve(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { workflow, vars, output, on_error, no_auto_wait } => {
            run_workflow(&config, workflow, vars, *output, *on_error, *no_auto_wait).await
        }
        Commands::Call { tool, args, tab_id } => run_call(&config, tool, args, *tab_id).await,
        Commands::ShowConfig => {
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The daemon's stdout is the native-messaging frame stream — tracing
/// output must never be written there. Logs go to stderr by default, or
/// to `SURF_LOG_FILE` when set.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Ok(log_path) = std::env::var("SURF_LOG_FILE") {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_ansi(false).with_writer(std::sync::Mutex::new(file)))
                .with(filter)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

/// Runs the bridge daemon as a native-messaging host: stdin/stdout carry
/// the framed pipe to the browser, the local socket accepts client
/// connections for the lifetime of the process.
async fn run_serve(config: &Config) -> anyhow::Result<()> {
    let socket_path = PathBuf::from(&config.socket_path);
    let listener = bind_socket(&socket_path).await.context("binding local socket")?;
    info!(socket = %socket_path.display(), "bridge daemon listening");

    let daemon = Arc::new(Daemon::new(Duration::from_secs(config.tool_timeout_secs)));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let socket_task = {
        let daemon = daemon.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { daemon.serve_socket(listener, shutdown_rx).await })
    };
    let sweeper_task = daemon.spawn_timeout_sweeper(Duration::from_secs(5), shutdown_rx);

    // Drives the native pipe until the browser closes it (clean EOF
    // exits 0) or Ctrl-C is pressed in an interactive run.
    tokio::select! {
        _ = daemon.run_upstream(tokio::io::stdin(), tokio::io::stdout()) => {
            info!("native pipe closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = socket_task.await;
    sweeper_task.abort();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

/// Loads a workflow file (YAML, or JSON — a strict subset of YAML) as a
/// flat list of steps.
fn load_workflow(path: &std::path::Path) -> anyhow::Result<Vec<WorkflowStep>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing workflow {}", path.display()))
}

async fn run_workflow(
    config: &Config,
    workflow_path: &std::path::Path,
    raw_vars: &[String],
    output: RunOutputFormat,
    on_error: PolicyArg,
    no_auto_wait: bool,
) -> anyhow::Result<ExitCode> {
    let steps = load_workflow(workflow_path)?;

    let mut vars: HashMap<String, serde_json::Value> = HashMap::new();
    for raw in raw_vars {
        match surf_workflow::parse_var(raw) {
            Some((k, v)) => {
                vars.insert(k, v);
            }
            None => anyhow::bail!("invalid --var {raw:?}, expected KEY=VALUE"),
        }
    }

    let client = UnixSocketClient::connect(&config.socket_path)
        .await
        .with_context(|| format!("connecting to {}", config.socket_path))?;

    let policy = match on_error {
        PolicyArg::Stop => FailurePolicy::Stop,
        PolicyArg::Continue => FailurePolicy::Continue,
    };
    let mut engine = WorkflowEngine::new(client, policy);
    if no_auto_wait {
        engine = engine.without_auto_wait();
    }

    let outcomes = engine.run(&steps, &mut vars).await.context("running workflow")?;

    match output {
        RunOutputFormat::Text => {
            for o in &outcomes {
                if o.success {
                    println!("ok   {}", o.cmd);
                } else {
                    println!("fail {}: {}", o.cmd, o.message.as_deref().unwrap_or(""));
                }
            }
        }
        RunOutputFormat::Json => {
            let json: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "cmd": o.cmd,
                        "success": o.success,
                        "message": o.message,
                        "capturedAs": o.captured_as,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    let failed = outcomes.iter().any(|o| !o.success);
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

async fn run_call(config: &Config, tool: &str, args: &str, tab_id: Option<u32>) -> anyhow::Result<ExitCode> {
    let args: serde_json::Value = serde_json::from_str(args).context("parsing tool args as JSON")?;
    let mut client = UnixSocketClient::connect(&config.socket_path)
        .await
        .with_context(|| format!("connecting to {}", config.socket_path))?;

    let reply = client.call(tool, args, tab_id).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(if reply.is_error() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
