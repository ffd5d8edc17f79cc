//! Relational building blocks over Arrow batches.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, StringArray, UInt32Array, new_null_array};
use arrow::compute::kernels::cmp::eq;
use arrow::compute::{
    and, can_cast_types, cast, filter_record_batch, is_not_null, take_record_batch,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::row::{OwnedRow, RowConverter, Rows, SortField};
use snafu::prelude::*;

use crate::error::{ColumnTypeSnafu, ComputeSnafu, TransformError};
use crate::model::{NEXT_SONG, TableName};

/// A target column fed from a source column.
#[derive(Debug, Clone, Copy)]
pub struct Column<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub data_type: &'a DataType,
}

impl<'a> Column<'a> {
    pub fn new(source: &'a str, target: &'a str, data_type: &'a DataType) -> Self {
        Self {
            source,
            target,
            data_type,
        }
    }
}

/// Select, rename and cast columns.
///
/// A source column that is absent from the batch projects as all-null. The
/// result is nullable everywhere; [`conform`] applies the declared
/// nullability once null keys have been filtered out.
pub fn project(
    table: TableName,
    batch: &RecordBatch,
    columns: &[Column<'_>],
) -> Result<RecordBatch, TransformError> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());

    for column in columns {
        let array = match schema.index_of(column.source) {
            Ok(index) => {
                let source = batch.column(index);
                ensure!(
                    can_cast_types(source.data_type(), column.data_type),
                    ColumnTypeSnafu {
                        table,
                        column: column.source,
                        target: column.target,
                        found: source.data_type().clone(),
                        expected: column.data_type.clone(),
                    }
                );
                cast(source, column.data_type).context(ComputeSnafu { table })?
            }
            Err(_) => new_null_array(column.data_type, batch.num_rows()),
        };
        fields.push(Field::new(column.target, column.data_type.clone(), true));
        arrays.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).context(ComputeSnafu { table })
}

/// Rebuild `batch` under the declared table schema.
pub fn conform(
    table: TableName,
    batch: RecordBatch,
    schema: &SchemaRef,
) -> Result<RecordBatch, TransformError> {
    RecordBatch::try_new(schema.clone(), batch.columns().to_vec()).context(ComputeSnafu { table })
}

/// Keep rows where `column` is not null.
pub fn filter_not_null(
    table: TableName,
    batch: &RecordBatch,
    column: &str,
) -> Result<RecordBatch, TransformError> {
    let Ok(index) = batch.schema().index_of(column) else {
        return Ok(batch.slice(0, 0));
    };
    let mask = is_not_null(batch.column(index)).context(ComputeSnafu { table })?;
    filter_record_batch(batch, &mask).context(ComputeSnafu { table })
}

/// Keep song-play events: `page == 'NextSong'`, optionally also requiring
/// a non-null `ts`.
///
/// A dataset without a `page` field has no plays.
pub fn filter_plays(
    table: TableName,
    batch: &RecordBatch,
    require_ts: bool,
) -> Result<RecordBatch, TransformError> {
    let schema = batch.schema();
    let Ok(page_index) = schema.index_of("page") else {
        return Ok(batch.slice(0, 0));
    };

    let page = cast(batch.column(page_index), &DataType::Utf8).context(ComputeSnafu { table })?;
    let next_song = StringArray::new_scalar(NEXT_SONG);
    let mut mask = eq(&page, &next_song).context(ComputeSnafu { table })?;

    if require_ts {
        let Ok(ts_index) = schema.index_of("ts") else {
            return Ok(batch.slice(0, 0));
        };
        let has_ts = is_not_null(batch.column(ts_index)).context(ComputeSnafu { table })?;
        mask = and(&mask, &has_ts).context(ComputeSnafu { table })?;
    }

    filter_record_batch(batch, &mask).context(ComputeSnafu { table })
}

/// Row-encode `columns` so rows can be hashed and compared.
pub fn row_keys(columns: &[ArrayRef]) -> Result<Rows, ArrowError> {
    let fields = columns
        .iter()
        .map(|c| SortField::new(c.data_type().clone()))
        .collect();
    RowConverter::new(fields)?.convert_columns(columns)
}

/// Remove fully duplicated rows, keeping the first occurrence of each.
pub fn distinct_rows(table: TableName, batch: &RecordBatch) -> Result<RecordBatch, TransformError> {
    if batch.num_rows() == 0 {
        return Ok(batch.clone());
    }

    let rows = row_keys(batch.columns()).context(ComputeSnafu { table })?;
    let mut seen: HashSet<OwnedRow> = HashSet::with_capacity(rows.num_rows());
    let keep = UInt32Array::from_iter_values(
        rows.iter()
            .enumerate()
            .filter(|(_, row)| seen.insert(row.owned()))
            .map(|(i, _)| i as u32),
    );

    take_rows(table, batch, &keep)
}

/// Gather rows of `batch` by index.
pub fn take_rows(
    table: TableName,
    batch: &RecordBatch,
    indices: &dyn Array,
) -> Result<RecordBatch, TransformError> {
    take_record_batch(batch, indices).context(ComputeSnafu { table })
}
