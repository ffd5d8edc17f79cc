//! Configuration for a starling run.
//!
//! A run is configured from an optional YAML file, with `$VAR` references
//! resolved from the environment, and then from command-line overrides.

mod cli;

pub use cli::CliArgs;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;

use starling_core::error::{
    ConfigError, EmptySinkPathSnafu, EmptySourcePathSnafu, InvalidValueSnafu, ReadFileSnafu,
    YamlParseSnafu,
};

use crate::transform::{JoinType, UserLevelPolicy};

pub use starling_core::config::{KB, MB, MetricsConfig, ParquetCompression, interpolate};

/// Where and how source JSON is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Root of both datasets (S3 or local).
    #[serde(default)]
    pub path: String,
    /// Glob below the root selecting catalog files.
    #[serde(default = "default_song_pattern")]
    pub song_pattern: String,
    /// Glob below the root selecting play-event files.
    #[serde(default = "default_log_pattern")]
    pub log_pattern: String,
    /// Number of records per decoded batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum concurrent file downloads.
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    /// Backend options (credentials, region, endpoint).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            song_pattern: default_song_pattern(),
            log_pattern: default_log_pattern(),
            batch_size: default_batch_size(),
            max_concurrent_files: default_max_concurrent_files(),
            storage_options: HashMap::new(),
        }
    }
}

fn default_song_pattern() -> String {
    "song_data/*/*/*/*.json".to_string()
}

fn default_log_pattern() -> String {
    "log_data/*.json".to_string()
}

fn default_batch_size() -> usize {
    8192
}

fn default_max_concurrent_files() -> usize {
    16
}

/// Where and how tables are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    /// Destination root; each table gets a directory below it.
    #[serde(default)]
    pub path: String,
    /// Parquet compression codec.
    #[serde(default)]
    pub compression: ParquetCompression,
    /// Target Parquet file size in MB.
    #[serde(default = "default_file_size_mb")]
    pub file_size_mb: usize,
    /// Read every table back after commit and compare row counts.
    #[serde(default)]
    pub verify: bool,
    /// Backend options (credentials, region, endpoint).
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            compression: ParquetCompression::default(),
            file_size_mb: default_file_size_mb(),
            verify: false,
            storage_options: HashMap::new(),
        }
    }
}

fn default_file_size_mb() -> usize {
    128
}

/// Choices left open by the source data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default)]
    pub join_type: JoinType,
    #[serde(default)]
    pub user_level: UserLevelPolicy,
}

/// Main configuration for starling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// The result is not validated, since paths may still come from the
    /// command line.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let text = interpolate(contents)?;
        serde_yaml::from_str(&text).context(YamlParseSnafu)
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(input) = &args.input {
            self.source.path = input.clone();
        }
        if let Some(output) = &args.output {
            self.sink.path = output.clone();
        }
        if let Some(join_type) = args.join_type {
            self.transform.join_type = join_type;
        }
        if let Some(user_level) = args.user_level {
            self.transform.user_level = user_level;
        }
        if args.verify {
            self.sink.verify = true;
        }
        if let Some(address) = &args.metrics_address {
            self.metrics.address = Some(address.clone());
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.path.is_empty(), EmptySourcePathSnafu);
        ensure!(!self.sink.path.is_empty(), EmptySinkPathSnafu);

        for (key, value) in [
            ("source.batch_size", self.source.batch_size),
            ("source.max_concurrent_files", self.source.max_concurrent_files),
            ("sink.file_size_mb", self.sink.file_size_mb),
        ] {
            ensure!(
                value > 0,
                InvalidValueSnafu {
                    key,
                    message: "must be greater than 0",
                }
            );
        }
        Ok(())
    }
}
