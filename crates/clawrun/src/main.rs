//! Binary entrypoint for the `clawrun` CLI.

use clap::Parser;
use clawrun::cli::{Cli, execute};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = clawrun::logging::init_tracing(cli.json_logs) {
        eprintln!("{err}");
    }

    match execute(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
