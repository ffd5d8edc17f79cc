//! Newline-delimited JSON reader.
//!
//! Decodes JSON records into Arrow batches against a fixed schema. Fields
//! missing from a record decode as null and fields absent from the schema
//! are ignored, which is what lets files with different field sets share one
//! union schema.

use std::io::Cursor;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::json::ReaderBuilder;
use bytes::Bytes;
use tracing::trace;

use crate::error::{JsonDecodeSnafu, SourceError};

use super::traits::{FileReader, ReadResult};

/// Reader for JSON files holding one object per line.
#[derive(Debug, Clone)]
pub struct JsonReader {
    schema: SchemaRef,
    batch_size: usize,
}

impl JsonReader {
    /// Create a reader that decodes into `schema` in batches of `batch_size` rows.
    pub fn new(schema: SchemaRef, batch_size: usize) -> Self {
        Self { schema, batch_size }
    }
}

impl FileReader for JsonReader {
    fn read(&self, data: Bytes, path: &str) -> Result<ReadResult, SourceError> {
        let decode_error = |e: arrow::error::ArrowError| {
            JsonDecodeSnafu {
                path,
                message: e.to_string(),
            }
            .build()
        };

        let reader = ReaderBuilder::new(Arc::clone(&self.schema))
            .with_batch_size(self.batch_size)
            .with_strict_mode(false)
            .build(Cursor::new(data))
            .map_err(decode_error)?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_error)?;
        let total_records = batches.iter().map(|b| b.num_rows()).sum();

        trace!(
            file = path,
            batches = batches.len(),
            records = total_records,
            "Decoded file"
        );

        Ok(ReadResult {
            batches,
            total_records,
        })
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }
}
