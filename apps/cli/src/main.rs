//! `dirpool`: check pool configuration and simulate load against an
//! in-memory directory.

mod config;
mod simulate;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::simulate::SimulateArgs;

/// Directory connection pool toolkit
#[derive(Parser, Debug)]
#[command(name = "dirpool")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE", env = "DIRPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load, validate and print the effective configuration
    CheckConfig,

    /// Run operations through a pool backed by an in-memory directory
    Simulate(SimulateArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AppConfig::load(cli.config.as_deref())?;

    let mut log = config.log.clone();
    if cli.verbose > 0 {
        log.level = dirpool_log::Config::cli(cli.verbose).level;
    }
    let _guard = dirpool_log::init_with(log)?;

    match cli.command {
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Simulate(args) => {
            let summary = dirpool_log::measure!("simulate", simulate::run(config, &args))
                .map_err(|err| dirpool_log::log_error!(err, "simulation aborted"))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(if summary.failed() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}
