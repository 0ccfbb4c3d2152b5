mod bridge;
mod config;
mod convert;
mod mqtt;
mod telemetry;

use crate::config::Config;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "allsky-wxbridge")]
#[command(about = "Bridges weewx LOOP telemetry to an indi-allsky MQTT broker")]
struct Args {
    /// Path to the JSON config file
    config: PathBuf,
}

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,allsky_wxbridge=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_tracing() {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "bridge exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    bridge::run(config).await
}
