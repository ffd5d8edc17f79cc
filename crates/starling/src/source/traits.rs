//! Traits for source file readers.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;

use crate::error::SourceError;

/// Result of reading and parsing a file.
#[derive(Debug)]
pub struct ReadResult {
    /// Parsed record batches.
    pub batches: Vec<RecordBatch>,
    /// Total number of records read.
    pub total_records: usize,
}

/// Trait for file readers that convert raw bytes to Arrow RecordBatches.
///
/// Every file of a dataset is decoded against the same schema, so the
/// resulting batches can be concatenated without further alignment.
pub trait FileReader: Send + Sync {
    /// Parse the raw file contents into record batches.
    ///
    /// `path` is only used for error messages and logging.
    fn read(&self, data: Bytes, path: &str) -> Result<ReadResult, SourceError>;

    /// Get the schema used by this reader.
    fn schema(&self) -> &SchemaRef;
}
