//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;

use crate::transform::{JoinType, UserLevelPolicy};

/// Load song and play-event JSON into a partitioned Parquet star schema.
#[derive(Parser, Debug)]
#[command(name = "starling", version, about, long_about = None)]
pub struct CliArgs {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Source root URL, overriding `source.path`.
    #[arg(long)]
    pub input: Option<String>,

    /// Destination root URL, overriding `sink.path`.
    #[arg(long)]
    pub output: Option<String>,

    /// How plays without a catalog match are treated.
    #[arg(long, value_enum)]
    pub join_type: Option<JoinType>,

    /// Which level a user keeps in the users table.
    #[arg(long, value_enum)]
    pub user_level: Option<UserLevelPolicy>,

    /// Read every table back after commit and compare row counts.
    #[arg(long)]
    pub verify: bool,

    /// Serve Prometheus metrics on this address while the run lasts.
    #[arg(long)]
    pub metrics_address: Option<String>,
}
