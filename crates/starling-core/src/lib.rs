//! starling-core: Shared components for the starling ETL job.
//!
//! This crate contains the plumbing that the transformation core relies on
//! but that carries no star-schema knowledge of its own:
//!
//! - `storage/` - Storage abstraction over S3 and the local filesystem
//! - `config/` - Shared configuration types and environment variable interpolation
//! - `metrics/` - Metric events and the optional Prometheus exporter
//! - `partition` - Hive-style partition path encoding and extraction
//! - `schema` - Unification of JSON schemas inferred from many files
//! - `tracing` - Subscriber initialisation for the CLI
//! - `error` - Common error types

pub mod config;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod schema;
pub mod storage;
pub mod tracing;

// Re-export commonly used items
pub use config::{KB, MB, MetricsConfig, ParquetCompression, interpolate};
pub use error::{ConfigError, MetricsError, StorageError};
pub use metrics::init as init_metrics;
pub use partition::{HIVE_DEFAULT_PARTITION, PartitionExtractor, PartitionValue, partition_path};
pub use schema::{UnifyError, unify_schemas};
pub use storage::{StorageProvider, StorageProviderRef, object_path};
pub use tracing::init_tracing;
