//! Starling: batch ETL from song and play-event JSON into a Parquet star schema.
//!
//! This crate handles:
//! - Reading song catalog and play-event JSON files from S3 or the local filesystem
//! - Deriving the `songs`, `artists`, `users` and `time` dimensions
//! - Joining play events to the catalog into the `songplays` fact table
//! - Writing Hive-partitioned Parquet tables committed with a `_SUCCESS` marker

pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod transform;

// Re-export commonly used items
pub use config::{CliArgs, Config};
pub use error::PipelineError;
pub use model::TableName;
pub use pipeline::{RunReport, run};
pub use transform::{JoinStats, JoinType, UserLevelPolicy};

pub use starling_core::{
    MetricsConfig, ParquetCompression, StorageProvider, StorageProviderRef, init_metrics,
    init_tracing,
};
