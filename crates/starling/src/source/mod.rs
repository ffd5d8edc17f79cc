//! Source datasets.
//!
//! A dataset is every JSON file below a root that matches a glob pattern,
//! decoded into Arrow batches against one inferred union schema. Files are
//! listed and decoded in path order, so the partition indices of a dataset
//! are stable for an unchanged listing.

mod inference;
mod pattern;
mod reader;
mod traits;

pub use inference::{infer_dataset_schema, infer_file_schema};
pub use pattern::FilePattern;
pub use reader::JsonReader;
pub use traits::{FileReader, ReadResult};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use snafu::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

use starling_core::emit;
use starling_core::metrics::events::{BytesRead, FilesRead, RowsRead};
use starling_core::{StorageProvider, StorageProviderRef, object_path};

use crate::error::{
    InvalidPatternSnafu, ListingSnafu, ReadFileSnafu, SourceError, SourceNotFoundSnafu,
};

/// An in-memory source dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Metrics and logging label (`"song"`, `"log"`).
    pub name: &'static str,
    /// Union schema shared by every partition.
    pub schema: SchemaRef,
    /// Record batches in listing order. A batch's index is its partition index.
    pub partitions: Vec<RecordBatch>,
}

impl Dataset {
    /// An empty dataset with the given schema.
    pub fn empty(name: &'static str, schema: SchemaRef) -> Self {
        Self {
            name,
            schema,
            partitions: Vec::new(),
        }
    }

    /// Total rows across all partitions.
    pub fn num_rows(&self) -> usize {
        self.partitions.iter().map(|b| b.num_rows()).sum()
    }

    /// All partitions as a single batch.
    pub fn concat(&self) -> Result<RecordBatch, arrow::error::ArrowError> {
        concat_batches(&self.schema, &self.partitions)
    }
}

/// Reads datasets below a storage root.
#[derive(Debug, Clone)]
pub struct SourceReader {
    storage: StorageProviderRef,
    batch_size: usize,
    max_concurrent_files: usize,
}

impl SourceReader {
    pub fn new(storage: StorageProviderRef, batch_size: usize, max_concurrent_files: usize) -> Self {
        Self {
            storage,
            batch_size,
            max_concurrent_files: max_concurrent_files.max(1),
        }
    }

    /// List the files below the root that match `pattern`, sorted by path.
    pub async fn list(&self, pattern: &FilePattern) -> Result<Vec<String>, SourceError> {
        let files = self
            .storage
            .list_files(pattern.prefix())
            .await
            .context(ListingSnafu {
                location: self.storage.url(),
            })?;

        Ok(files.into_iter().filter(|f| pattern.matches(f)).collect())
    }

    /// Load every file matching `pattern` into one dataset.
    pub async fn read(&self, name: &'static str, pattern: &str) -> Result<Dataset, SourceError> {
        let start = Instant::now();
        let pattern = FilePattern::new(pattern).context(InvalidPatternSnafu { pattern })?;

        let paths = self.list(&pattern).await?;
        ensure!(
            !paths.is_empty(),
            SourceNotFoundSnafu {
                pattern: pattern.as_str(),
                location: self.storage.url(),
            }
        );
        debug!(dataset = name, files = paths.len(), "Listed source files");

        let files = fetch_all(&self.storage, paths, self.max_concurrent_files).await?;
        let bytes: u64 = files.iter().map(|(_, data)| data.len() as u64).sum();
        emit!(FilesRead {
            dataset: name,
            count: files.len() as u64,
        });
        emit!(BytesRead {
            dataset: name,
            bytes,
        });

        let schema = infer_dataset_schema(
            pattern.as_str(),
            files.iter().map(|(path, data)| (path.as_str(), data)),
        )?;

        let reader = JsonReader::new(schema.clone(), self.batch_size);
        let mut partitions = Vec::new();
        for (path, data) in files {
            let result = reader.read(data, &path)?;
            partitions.extend(result.batches);
        }

        let dataset = Dataset {
            name,
            schema,
            partitions,
        };
        emit!(RowsRead {
            dataset: name,
            count: dataset.num_rows() as u64,
        });

        info!(
            dataset = name,
            location = self.storage.url(),
            pattern = pattern.as_str(),
            rows = dataset.num_rows(),
            partitions = dataset.partitions.len(),
            fields = dataset.schema.fields().len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Read source dataset"
        );

        Ok(dataset)
    }
}

/// Fetch files concurrently and return them in path order.
async fn fetch_all(
    storage: &StorageProvider,
    paths: Vec<String>,
    concurrency: usize,
) -> Result<Vec<(String, Bytes)>, SourceError> {
    let mut files: Vec<(String, Bytes)> = stream::iter(paths)
        .map(|path| async move {
            let data = storage
                .get(object_path(&path))
                .await
                .context(ReadFileSnafu { path: path.as_str() })?;
            Ok::<_, SourceError>((path, data))
        })
        .buffer_unordered(concurrency)
        .try_collect()
        .await?;

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
