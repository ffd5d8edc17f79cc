//! Starling CLI: load song and play-event JSON into a Parquet star schema.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use starling::{CliArgs, Config, PipelineError, init_metrics, init_tracing, run};

fn load_config(args: &CliArgs) -> Result<Config, PipelineError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    config.apply_cli(args);
    config.validate()?;
    Ok(config)
}

async fn execute(args: &CliArgs) -> Result<(), PipelineError> {
    let config = load_config(args)?;

    if let Some(address) = &config.metrics.address {
        init_metrics(address)?;
    }

    run(&config).await?.ensure_success()?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = CliArgs::parse();

    match execute(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("Run failed: {e}");
            ExitCode::FAILURE
        }
    }
}
