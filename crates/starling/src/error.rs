//! Error types for the starling ETL job.

use snafu::prelude::*;

use crate::model::TableName;

// Re-export common errors
pub use starling_core::error::{ConfigError, MetricsError, StorageError};

/// Errors raised while locating and decoding a source dataset.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// No file under the dataset root matches the pattern.
    #[snafu(display("No files match '{pattern}' under {location}"))]
    SourceNotFound { pattern: String, location: String },

    /// Two files disagree on a field type.
    #[snafu(display("Schema conflict in '{pattern}': {source}"))]
    SchemaConflict {
        pattern: String,
        source: starling_core::UnifyError,
    },

    /// The glob pattern could not be compiled.
    #[snafu(display("Invalid file pattern '{pattern}': {source}"))]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// Listing the dataset root failed.
    #[snafu(display("Failed to list {location}: {source}"))]
    Listing {
        location: String,
        source: StorageError,
    },

    /// Fetching a source file failed.
    #[snafu(display("Failed to read {path}: {source}"))]
    ReadFile { path: String, source: StorageError },

    /// A source file is not valid JSON.
    #[snafu(display("Failed to decode JSON in {path}: {message}"))]
    JsonDecode { path: String, message: String },
}

/// Errors raised while deriving a table from source records.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TransformError {
    /// An Arrow compute kernel failed.
    #[snafu(display("Failed to compute {table}: {source}"))]
    Compute {
        table: TableName,
        source: arrow::error::ArrowError,
    },

    /// A source column cannot be cast to the column it feeds.
    #[snafu(display(
        "Column '{column}' of type {found} cannot feed {table}.{target} ({expected})"
    ))]
    ColumnType {
        table: TableName,
        column: String,
        target: String,
        found: arrow::datatypes::DataType,
        expected: arrow::datatypes::DataType,
    },

    /// A blocking transform task panicked or was cancelled.
    #[snafu(display("Transform task failed: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

/// Errors that can occur during Parquet encoding and decoding.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParquetError {
    /// Failed to write to Parquet.
    #[snafu(display("Failed to write to Parquet: {source}"))]
    ParquetWrite {
        source: parquet::errors::ParquetError,
    },

    /// Failed to create Parquet writer.
    #[snafu(display("Failed to create Parquet writer: {source}"))]
    WriterCreate {
        source: parquet::errors::ParquetError,
    },

    /// Failed to decode a Parquet file.
    #[snafu(display("Failed to read Parquet file {path}: {source}"))]
    ParquetRead {
        path: String,
        source: parquet::errors::ParquetError,
    },

    /// Writer unavailable (already closed).
    #[snafu(display("Parquet writer unavailable (already closed)"))]
    WriterUnavailable,

    /// Buffer lock failed.
    #[snafu(display("Failed to lock Parquet buffer"))]
    BufferLock,

    /// Buffer still in use.
    #[snafu(display("Parquet buffer still in use by another task"))]
    BufferInUse,
}

/// Errors raised while writing or reading a committed table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Storage operation failed.
    #[snafu(display("Storage error: {source}"))]
    Store { source: StorageError },

    /// Parquet encoding or decoding failed.
    #[snafu(display("Parquet error: {source}"))]
    Encode { source: ParquetError },

    /// Splitting or reassembling rows failed.
    #[snafu(display("Failed to arrange rows: {source}"))]
    Arrange { source: arrow::error::ArrowError },

    /// The commit marker could not be encoded or decoded.
    #[snafu(display("Invalid commit marker {path}: {source}"))]
    Marker {
        path: String,
        source: serde_json::Error,
    },

    /// The table has no commit marker, so its contents are not valid.
    #[snafu(display("Table at {location} has no _SUCCESS marker"))]
    MissingMarker { location: String },

    /// A table read back after commit has a different row count.
    #[snafu(display("Expected {expected} rows after commit, found {found}"))]
    VerifyMismatch { expected: usize, found: usize },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Source dataset error.
    #[snafu(display("Source error: {source}"))]
    Source { source: SourceError },

    /// Transformation error.
    #[snafu(display("Transform error: {source}"))]
    Transform { source: TransformError },

    /// A single table failed to write or verify.
    #[snafu(display("Failed to write table {table}: {source}"))]
    WriteFailure { table: TableName, source: SinkError },

    /// One or more tables failed; the others were still attempted.
    #[snafu(display("{} table(s) failed: {}", tables.len(), tables.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", ")))]
    TablesFailed { tables: Vec<TableName> },

    /// Metrics error.
    #[snafu(display("Metrics error: {source}"))]
    Metrics { source: MetricsError },
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<SourceError> for PipelineError {
    fn from(source: SourceError) -> Self {
        PipelineError::Source { source }
    }
}

impl From<TransformError> for PipelineError {
    fn from(source: TransformError) -> Self {
        PipelineError::Transform { source }
    }
}

impl From<MetricsError> for PipelineError {
    fn from(source: MetricsError) -> Self {
        PipelineError::Metrics { source }
    }
}

impl From<StorageError> for SinkError {
    fn from(source: StorageError) -> Self {
        SinkError::Store { source }
    }
}

impl From<ParquetError> for SinkError {
    fn from(source: ParquetError) -> Self {
        SinkError::Encode { source }
    }
}
