//! Schema inference for JSON source files.
//!
//! Each file is inferred on its own with Arrow's JSON inference; the
//! per-file schemas are then folded into one dataset schema.

use std::io::Cursor;

use arrow::datatypes::{Schema, SchemaRef};
use arrow::json::reader::infer_json_schema;
use bytes::Bytes;
use snafu::prelude::*;
use tracing::debug;

use starling_core::unify_schemas;

use crate::error::{JsonDecodeSnafu, SchemaConflictSnafu, SourceError};

/// Infer the schema of a single file from all of its records.
pub fn infer_file_schema(data: &Bytes, path: &str) -> Result<Schema, SourceError> {
    let (schema, records) = infer_json_schema(Cursor::new(data.as_ref()), None).map_err(|e| {
        JsonDecodeSnafu {
            path,
            message: e.to_string(),
        }
        .build()
    })?;

    debug!(file = path, records, fields = schema.fields().len(), "Inferred schema");
    Ok(schema)
}

/// Infer the union schema of a set of files.
///
/// `files` must be in listing order; field order follows first appearance.
pub fn infer_dataset_schema<'a>(
    pattern: &str,
    files: impl IntoIterator<Item = (&'a str, &'a Bytes)>,
) -> Result<SchemaRef, SourceError> {
    let schemas = files
        .into_iter()
        .map(|(path, data)| infer_file_schema(data, path))
        .collect::<Result<Vec<_>, _>>()?;

    unify_schemas(schemas.iter()).context(SchemaConflictSnafu { pattern })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    #[test]
    fn test_infer_file_schema_reads_every_record() {
        let data = Bytes::from_static(
            b"{\"artist\": null, \"ts\": 1541121934796}\n{\"artist\": \"Artist X\", \"page\": \"NextSong\"}\n",
        );

        let schema = infer_file_schema(&data, "log_data/a.json").unwrap();
        assert_eq!(
            schema.field_with_name("artist").unwrap().data_type(),
            &DataType::Utf8
        );
        assert_eq!(
            schema.field_with_name("ts").unwrap().data_type(),
            &DataType::Int64
        );
        assert!(schema.field_with_name("page").is_ok());
    }

    #[test]
    fn test_dataset_schema_unifies_files() {
        let a = Bytes::from_static(b"{\"song_id\": \"S1\", \"artist_latitude\": null}");
        let b = Bytes::from_static(b"{\"song_id\": \"S2\", \"artist_latitude\": 40.7}");

        let schema =
            infer_dataset_schema("song_data/*.json", [("a.json", &a), ("b.json", &b)]).unwrap();
        assert_eq!(
            schema.field_with_name("artist_latitude").unwrap().data_type(),
            &DataType::Float64
        );
    }

    #[test]
    fn test_dataset_schema_conflict() {
        let a = Bytes::from_static(b"{\"year\": 2000}");
        let b = Bytes::from_static(b"{\"year\": \"two thousand\"}");

        let err =
            infer_dataset_schema("song_data/*.json", [("a.json", &a), ("b.json", &b)]).unwrap_err();
        assert!(matches!(err, SourceError::SchemaConflict { .. }));
    }
}
