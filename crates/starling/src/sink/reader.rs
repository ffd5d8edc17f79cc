//! Reads committed tables back into memory.
//!
//! Used to verify a run and by tests. Partition columns are restored from
//! the directory layout, so a table read back has its declared schema.

use arrow::array::{ArrayRef, RecordBatch, StringArray, new_null_array};
use arrow::compute::{cast, concat_batches};
use arrow::datatypes::Field;
use object_store::path::Path;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use starling_core::{PartitionExtractor, StorageProvider, StorageProviderRef, object_path};

use crate::error::{ArrangeSnafu, MissingMarkerSnafu, ParquetReadSnafu, SinkError};
use crate::model::TableName;

use super::marker::{MARKER_FILE, SuccessMarker};
use super::table::TEMPORARY_DIR;

/// Reads tables below an output root.
#[derive(Debug, Clone)]
pub struct TableReader {
    storage: StorageProviderRef,
}

impl TableReader {
    pub fn new(storage: StorageProviderRef) -> Self {
        Self { storage }
    }

    /// The commit marker of `table`, failing if the table is not committed.
    pub async fn marker(&self, table: TableName) -> Result<SuccessMarker, SinkError> {
        let storage = self.storage.child(table.as_str());
        self.read_marker(&storage).await
    }

    async fn read_marker(&self, storage: &StorageProvider) -> Result<SuccessMarker, SinkError> {
        let path = Path::from(MARKER_FILE);
        ensure!(
            storage.exists(&path).await?,
            MissingMarkerSnafu {
                location: storage.url(),
            }
        );
        let bytes = storage.get(path).await?;
        SuccessMarker::from_bytes(&format!("{}/{MARKER_FILE}", storage.url()), &bytes)
    }

    /// Read every committed row of `table`.
    pub async fn read(&self, table: TableName) -> Result<RecordBatch, SinkError> {
        let storage = self.storage.child(table.as_str());
        self.read_marker(&storage).await?;

        let schema = table.schema();
        let extractor = PartitionExtractor::new(
            table
                .partition_columns()
                .iter()
                .map(|c| c.to_string())
                .collect(),
        );
        let temporary = format!("{TEMPORARY_DIR}/");

        let mut batches = Vec::new();
        for path in storage.list_files("").await? {
            if path.starts_with(&temporary) || !path.ends_with(".parquet") {
                continue;
            }

            let bytes = storage.get(object_path(&path)).await?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)
                .and_then(|builder| builder.build())
                .context(ParquetReadSnafu { path: path.as_str() })?;

            let values = extractor.extract(&path);
            for batch in reader {
                let batch = batch.context(ArrangeSnafu)?;
                let columns = schema
                    .fields()
                    .iter()
                    .map(|field| restore_column(field, &batch, &values))
                    .collect::<Result<Vec<_>, _>>()
                    .context(ArrangeSnafu)?;
                batches.push(RecordBatch::try_new(schema.clone(), columns).context(ArrangeSnafu)?);
            }
            debug!(table = %table, path = %path, "Read table file");
        }

        concat_batches(&schema, &batches).context(ArrangeSnafu)
    }
}

/// A column of the declared schema, from the file body or the partition path.
fn restore_column(
    field: &Arc<Field>,
    batch: &RecordBatch,
    partition_values: &HashMap<String, Option<String>>,
) -> Result<ArrayRef, arrow::error::ArrowError> {
    let rows = batch.num_rows();
    let from_file = batch.column_by_name(field.name());
    let from_path = partition_values.get(field.name());
    let column: ArrayRef = match (from_file, from_path) {
        (Some(column), _) => column.clone(),
        (None, Some(value)) => Arc::new(StringArray::from(vec![value.as_deref(); rows])),
        (None, None) => return Ok(new_null_array(field.data_type(), rows)),
    };

    if column.data_type() == field.data_type() {
        Ok(column)
    } else {
        cast(&column, field.data_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{ParquetWriterConfig, TableWriter};
    use arrow::array::{Array, AsArray, Float64Array, Int64Array};
    use arrow::datatypes::Int64Type;
    use tempfile::TempDir;

    async fn storage(dir: &TempDir) -> StorageProviderRef {
        Arc::new(
            StorageProvider::for_url_with_options(dir.path().to_str().unwrap(), HashMap::new())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_read_restores_partition_columns() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        let songs = RecordBatch::try_new(
            TableName::Songs.schema(),
            vec![
                Arc::new(StringArray::from(vec!["S1", "S2"])),
                Arc::new(StringArray::from(vec!["Song A", "Song B"])),
                Arc::new(StringArray::from(vec![Some("AC/DC"), None])),
                Arc::new(Int64Array::from(vec![Some(2018), None])),
                Arc::new(Float64Array::from(vec![200.5, 180.0])),
            ],
        )
        .unwrap();

        TableWriter::new(storage.clone(), ParquetWriterConfig::default(), "run".into())
            .write(TableName::Songs, &songs)
            .await
            .unwrap();

        let read = TableReader::new(storage).read(TableName::Songs).await.unwrap();
        assert_eq!(read.schema(), TableName::Songs.schema());
        assert_eq!(read.num_rows(), 2);

        let ids = read.column(0).as_string::<i32>();
        let s1 = (0..2).find(|&i| ids.value(i) == "S1").unwrap();
        let s2 = 1 - s1;

        assert_eq!(read.column(2).as_string::<i32>().value(s1), "AC/DC");
        assert_eq!(read.column(3).as_primitive::<Int64Type>().value(s1), 2018);
        assert!(read.column(2).is_null(s2));
        assert!(read.column(3).is_null(s2));
    }

    #[tokio::test]
    async fn test_empty_partition_value_stays_distinct_from_null() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        let songs = RecordBatch::try_new(
            TableName::Songs.schema(),
            vec![
                Arc::new(StringArray::from(vec!["S1", "S2"])),
                Arc::new(StringArray::from(vec!["Song A", "Song B"])),
                Arc::new(StringArray::from(vec![Some(""), None])),
                Arc::new(Int64Array::from(vec![Some(2000), Some(2000)])),
                Arc::new(Float64Array::from(vec![210.5, 180.0])),
            ],
        )
        .unwrap();

        let summary = TableWriter::new(storage.clone(), ParquetWriterConfig::default(), "run".into())
            .write(TableName::Songs, &songs)
            .await
            .unwrap();
        assert_eq!(summary.partitions, 2);

        let read = TableReader::new(storage).read(TableName::Songs).await.unwrap();
        let ids = read.column(0).as_string::<i32>();
        let artists = read.column(2).as_string::<i32>();
        let s1 = (0..2).find(|&i| ids.value(i) == "S1").unwrap();
        let s2 = 1 - s1;

        assert!(artists.is_valid(s1));
        assert_eq!(artists.value(s1), "");
        assert!(artists.is_null(s2));
    }

    #[tokio::test]
    async fn test_uncommitted_table_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("users")).unwrap();
        std::fs::write(dir.path().join("users/part-00000.parquet"), b"partial").unwrap();

        let err = TableReader::new(storage(&dir).await)
            .read(TableName::Users)
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::MissingMarker { .. }));
    }

    #[tokio::test]
    async fn test_empty_committed_table() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir).await;

        TableWriter::new(storage.clone(), ParquetWriterConfig::default(), "run".into())
            .write(TableName::Time, &RecordBatch::new_empty(TableName::Time.schema()))
            .await
            .unwrap();

        let reader = TableReader::new(storage);
        let read = reader.read(TableName::Time).await.unwrap();
        assert_eq!(read.num_rows(), 0);
        assert_eq!(read.schema(), TableName::Time.schema());
        assert_eq!(reader.marker(TableName::Time).await.unwrap().row_count, 0);
    }
}
