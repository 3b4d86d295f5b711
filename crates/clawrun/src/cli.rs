//! Terminal front-end: owns the UI loop that drains runner events and status changes.

use crate::{
    ChannelSink, CommandRequest, CommandRunner, ExecutionResult, RunnerConfig, RunnerEvent,
};
use anyhow::Context;
use clap::{Parser, ValueEnum};
use clawrun_core::{Platform, ShellSelector};
use std::path::PathBuf;
use tracing::info;

/// Top-level CLI parser for `clawrun`.
#[derive(Debug, Parser)]
#[command(
    name = "clawrun",
    version,
    about = "Run an installer command in the background and stream its output"
)]
pub struct Cli {
    /// Classify output lines into the gateway service status
    #[arg(long, conflicts_with = "detect_status")]
    pub status_query: bool,

    /// Treat the command as a status query when its text mentions `status`
    #[arg(long)]
    pub detect_status: bool,

    /// Working directory of the command
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the command
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Label shown in the announce header
    #[arg(long)]
    pub description: Option<String>,

    /// Interpreter conventions of the command text (defaults to the host's)
    #[arg(long, value_enum)]
    pub shell: Option<ShellArg>,

    /// JSON runner configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Frame the output with header and footer lines
    #[arg(long)]
    pub announce: bool,

    /// Emit diagnostics as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Command text; the words are joined with single spaces
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ShellArg {
    Windows,
    Posix,
}

impl From<ShellArg> for ShellSelector {
    fn from(shell: ShellArg) -> Self {
        match shell {
            ShellArg::Windows => Platform::Windows.into(),
            ShellArg::Posix => Platform::Posix.into(),
        }
    }
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

impl Cli {
    pub fn request(&self) -> anyhow::Result<CommandRequest> {
        let mut builder = CommandRequest::builder();
        builder
            .command(self.command.join(" "))
            .env_multi(self.env.iter().cloned())
            .status_query(self.status_query);

        if self.detect_status {
            builder.detect_status_query();
        }
        if let Some(shell) = self.shell {
            builder.shell(ShellSelector::from(shell));
        }
        if let Some(dir) = &self.cwd {
            builder.working_directory(dir.clone());
        }
        if let Some(description) = &self.description {
            builder.description(description.clone());
        }

        builder.build().context("Invalid command")
    }

    pub fn runner_config(&self) -> anyhow::Result<RunnerConfig> {
        let mut config = match (&self.config, self.announce) {
            (Some(path), _) => RunnerConfig::from_json_file(path)?,
            (None, true) => RunnerConfig::announced(),
            (None, false) => RunnerConfig::new(),
        };
        config.announce |= self.announce;
        Ok(config)
    }
}

/// Process exit code for `result`: the child's code, or 1 when the runner failed
pub fn process_exit_code(result: &ExecutionResult) -> u8 {
    match result.exit_code {
        code if code < 0 => 1,
        0 if result.had_error => 1,
        code => code.min(255) as u8,
    }
}

/// Run the command described by `cli`, printing its output until it finishes
pub async fn execute(cli: &Cli) -> anyhow::Result<u8> {
    let runner = CommandRunner::new(cli.runner_config()?)?;
    let request = cli.request()?;
    let status_query = request.status_query;

    let (sink, mut events) = ChannelSink::channel();
    let mut status = runner.status().subscribe();
    let invocation = runner.run(request, sink);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(RunnerEvent::Line { line, .. }) => println!("{}", line.text),
                Some(RunnerEvent::Done { result, .. }) => {
                    if status_query {
                        eprintln!("[status] {}", runner.status().current());
                    }
                    return Ok(process_exit_code(&result));
                }
                None => break,
            },
            Ok(()) = status.changed() => {
                eprintln!("[status] {}", *status.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                info!(invocation = %invocation.id(), "Interrupted, cancelling command");
                invocation.cancel();
            }
        }
    }

    // Sink dropped without a result; fall back to the handle
    Ok(process_exit_code(&invocation.wait().await))
}
