//! Partitioned table writer.
//!
//! A table is written in two phases. Data files are first staged below
//! `_temporary/<run_id>/` inside the table root. The commit then removes
//! the previous marker and contents, moves the staged files into their
//! partition directories and writes a fresh `_SUCCESS` marker last. A run
//! that fails before the marker is written leaves a table with no marker,
//! which readers reject.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use arrow::array::{RecordBatch, UInt32Array};
use arrow::compute::take_record_batch;
use arrow::error::ArrowError;
use futures::{StreamExt, TryStreamExt, stream};
use object_store::PutPayload;
use object_store::path::Path;
use snafu::prelude::*;
use tracing::{debug, info};

use starling_core::emit;
use starling_core::metrics::events::{BytesWritten, FilesWritten};
use starling_core::{
    PartitionValue, StorageProvider, StorageProviderRef, object_path, partition_path,
};

use crate::error::{ArrangeSnafu, SinkError};
use crate::model::TableName;

use super::marker::{MARKER_FILE, SuccessMarker};
use super::parquet::{FinishedFile, ParquetWriter, ParquetWriterConfig};

/// Staging directory below each table root.
pub const TEMPORARY_DIR: &str = "_temporary";

const MAX_CONCURRENT_UPLOADS: usize = 8;

/// Outcome of a committed table write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableWriteSummary {
    pub table: TableName,
    pub rows: usize,
    /// Committed data files, relative to the table root.
    pub files: Vec<String>,
    pub bytes: u64,
    /// Distinct partition directories written.
    pub partitions: usize,
    pub duration: Duration,
}

/// A data file staged for commit.
struct StagedFile {
    staged: Path,
    target: String,
}

/// Writes tables below an output root, one directory per table.
#[derive(Debug, Clone)]
pub struct TableWriter {
    storage: StorageProviderRef,
    config: ParquetWriterConfig,
    run_id: String,
}

impl TableWriter {
    pub fn new(storage: StorageProviderRef, config: ParquetWriterConfig, run_id: String) -> Self {
        Self {
            storage,
            config,
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Replace the contents of `table` with `batch`.
    ///
    /// Partition columns are moved into the directory layout and dropped
    /// from the file contents. An empty batch still commits an empty table.
    pub async fn write(
        &self,
        table: TableName,
        batch: &RecordBatch,
    ) -> Result<TableWriteSummary, SinkError> {
        let start = Instant::now();
        let storage = self.storage.child(table.as_str());

        let groups = split_partitions(table, batch)?;
        let partitions = groups.len();

        let mut finished: Vec<(String, FinishedFile)> = Vec::new();
        for (directory, rows) in groups {
            let mut writer = ParquetWriter::new(rows.schema(), self.config.clone())?;
            writer.write_batch(&rows)?;
            finished.extend(writer.close()?.into_iter().map(|f| (directory.clone(), f)));
        }

        let bytes: u64 = finished.iter().map(|(_, f)| f.size as u64).sum();
        let staged = self.stage(&storage, finished).await?;
        emit!(FilesWritten {
            table: table.as_str(),
            count: staged.len() as u64,
        });
        emit!(BytesWritten {
            table: table.as_str(),
            bytes,
        });
        debug!(
            table = %table,
            files = staged.len(),
            run_id = %self.run_id,
            "Staged table files"
        );

        let files = self.commit(&storage, table, batch.num_rows(), staged).await?;

        let summary = TableWriteSummary {
            table,
            rows: batch.num_rows(),
            files,
            bytes,
            partitions,
            duration: start.elapsed(),
        };
        info!(
            table = %table,
            rows = summary.rows,
            files = summary.files.len(),
            partitions = summary.partitions,
            bytes = summary.bytes,
            location = %storage.url(),
            "Committed table"
        );
        Ok(summary)
    }

    async fn stage(
        &self,
        storage: &StorageProvider,
        finished: Vec<(String, FinishedFile)>,
    ) -> Result<Vec<StagedFile>, SinkError> {
        stream::iter(finished)
            .map(|(directory, file)| async move {
                let target = match directory.as_str() {
                    "" => file.filename.clone(),
                    dir => format!("{dir}/{}", file.filename),
                };
                let staged = object_path(&format!("{TEMPORARY_DIR}/{}/{target}", self.run_id));
                storage
                    .put_parquet(&staged, PutPayload::from(file.bytes))
                    .await?;
                Ok::<_, SinkError>(StagedFile { staged, target })
            })
            .buffered(MAX_CONCURRENT_UPLOADS)
            .try_collect()
            .await
    }

    async fn commit(
        &self,
        storage: &StorageProvider,
        table: TableName,
        row_count: usize,
        staged: Vec<StagedFile>,
    ) -> Result<Vec<String>, SinkError> {
        let temporary = format!("{TEMPORARY_DIR}/");

        // Invalidate the previous commit before touching its files
        storage.delete(&Path::from(MARKER_FILE)).await?;

        let previous = storage.list_files("").await?;
        for path in previous.iter().filter(|p| !p.starts_with(&temporary)) {
            storage.delete(&object_path(path)).await?;
        }

        let mut files = Vec::with_capacity(staged.len());
        for file in staged {
            storage
                .rename(&file.staged, &object_path(&file.target))
                .await?;
            files.push(file.target);
        }

        // Also clears staging left behind by earlier failed runs
        for path in storage.list_files(TEMPORARY_DIR).await? {
            storage.delete(&object_path(&path)).await?;
        }

        let marker = SuccessMarker::new(&self.run_id, table, row_count, files);
        storage
            .atomic_write(&Path::from(MARKER_FILE), marker.to_bytes()?)
            .await?;

        Ok(marker.files)
    }
}

/// Group rows by partition directory and drop the partition columns.
///
/// Directories come back in path order. A table without partition columns
/// yields a single group with an empty directory, unless it has no rows.
fn split_partitions(
    table: TableName,
    batch: &RecordBatch,
) -> Result<Vec<(String, RecordBatch)>, SinkError> {
    let columns = table.partition_columns();
    let schema = batch.schema();

    let partition_indices = columns
        .iter()
        .map(|c| schema.index_of(c))
        .collect::<Result<Vec<_>, _>>()
        .context(ArrangeSnafu)?;
    let data_indices: Vec<usize> = (0..schema.fields().len())
        .filter(|i| !partition_indices.contains(i))
        .collect();
    let data = batch.project(&data_indices).context(ArrangeSnafu)?;

    if batch.num_rows() == 0 {
        return Ok(Vec::new());
    }
    if columns.is_empty() {
        return Ok(vec![(String::new(), data)]);
    }

    let mut groups: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        let values = columns
            .iter()
            .zip(&partition_indices)
            .map(|(&column, &index)| {
                PartitionValue::from_array(batch.column(index), row)
                    .map(|value| (column, value))
                    .ok_or_else(|| {
                        ArrowError::InvalidArgumentError(format!(
                            "column '{column}' of {table} cannot be used as a partition"
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .context(ArrangeSnafu)?;

        groups
            .entry(partition_path(&values))
            .or_default()
            .push(row as u32);
    }

    groups
        .into_iter()
        .map(|(directory, rows)| {
            let rows = take_record_batch(&data, &UInt32Array::from(rows)).context(ArrangeSnafu)?;
            Ok((directory, rows))
        })
        .collect()
}
