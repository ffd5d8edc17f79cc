//! Song and artist dimensions from catalog records.

use arrow::array::RecordBatch;
use arrow::datatypes::DataType;
use snafu::prelude::*;

use crate::error::{ComputeSnafu, TransformError};
use crate::model::TableName;
use crate::source::Dataset;

use super::kernels::{Column, conform, distinct_rows, filter_not_null, project};

/// `songs`: one row per catalog record with a `song_id`.
///
/// Duplicate catalog records are kept as they are.
pub fn build_songs(catalog: &Dataset) -> Result<RecordBatch, TransformError> {
    let table = TableName::Songs;
    let schema = table.schema();
    let all = catalog.concat().context(ComputeSnafu { table })?;

    let columns = [
        Column::new("song_id", "song_id", &DataType::Utf8),
        Column::new("title", "title", &DataType::Utf8),
        Column::new("artist_id", "artist_id", &DataType::Utf8),
        Column::new("year", "year", &DataType::Int64),
        Column::new("duration", "duration", &DataType::Float64),
    ];

    let projected = project(table, &all, &columns)?;
    let songs = filter_not_null(table, &projected, "song_id")?;
    conform(table, songs, &schema)
}

/// `artists`: distinct artist rows of catalog records with an `artist_id`.
///
/// Distinctness covers the whole row, so an artist whose name or location
/// differs between records keeps one row per variant.
pub fn build_artists(catalog: &Dataset) -> Result<RecordBatch, TransformError> {
    let table = TableName::Artists;
    let schema = table.schema();
    let all = catalog.concat().context(ComputeSnafu { table })?;

    let columns = [
        Column::new("artist_id", "artist_id", &DataType::Utf8),
        Column::new("artist_name", "artist_name", &DataType::Utf8),
        Column::new("artist_location", "artist_location", &DataType::Utf8),
        Column::new("artist_latitude", "artist_latitude", &DataType::Float64),
        Column::new("artist_longitude", "artist_longitude", &DataType::Float64),
    ];

    let projected = project(table, &all, &columns)?;
    let artists = filter_not_null(table, &projected, "artist_id")?;
    let artists = distinct_rows(table, &artists)?;
    conform(table, artists, &schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
    use arrow::datatypes::Int64Type;
    use std::sync::Arc;

    fn catalog(rows: Vec<(Option<&str>, Option<&str>, Option<&str>)>) -> Dataset {
        let song_ids: Vec<_> = rows.iter().map(|r| r.0).collect();
        let artist_ids: Vec<_> = rows.iter().map(|r| r.1).collect();
        let names: Vec<_> = rows.iter().map(|r| r.2).collect();
        let n = rows.len();

        let batch = RecordBatch::try_from_iter(vec![
            ("num_songs", Arc::new(Int64Array::from(vec![1; n])) as ArrayRef),
            ("artist_id", Arc::new(StringArray::from(artist_ids)) as ArrayRef),
            ("artist_latitude", Arc::new(Float64Array::from(vec![Some(40.7); n])) as ArrayRef),
            ("artist_name", Arc::new(StringArray::from(names)) as ArrayRef),
            ("song_id", Arc::new(StringArray::from(song_ids)) as ArrayRef),
            ("title", Arc::new(StringArray::from(vec!["Song A"; n])) as ArrayRef),
            ("year", Arc::new(Int64Array::from(vec![2000; n])) as ArrayRef),
            ("duration", Arc::new(Float64Array::from(vec![210.5; n])) as ArrayRef),
        ])
        .unwrap();

        Dataset {
            name: "song",
            schema: batch.schema(),
            partitions: vec![batch],
        }
    }

    #[test]
    fn test_songs_identity_projection() {
        let dataset = catalog(vec![(Some("S1"), Some("A1"), Some("Artist X"))]);
        let songs = build_songs(&dataset).unwrap();

        assert_eq!(songs.schema(), TableName::Songs.schema());
        assert_eq!(songs.num_rows(), 1);
        assert_eq!(songs.column(0).as_string::<i32>().value(0), "S1");
        assert_eq!(songs.column(1).as_string::<i32>().value(0), "Song A");
        assert_eq!(songs.column(2).as_string::<i32>().value(0), "A1");
        assert_eq!(songs.column(3).as_primitive::<Int64Type>().value(0), 2000);
    }

    #[test]
    fn test_null_song_id_excluded_from_songs_but_not_artists() {
        let dataset = catalog(vec![
            (Some("S1"), Some("A1"), Some("Artist X")),
            (None, Some("A2"), Some("Artist Y")),
        ]);

        let songs = build_songs(&dataset).unwrap();
        assert_eq!(songs.num_rows(), 1);

        let artists = build_artists(&dataset).unwrap();
        let ids = artists.column(0).as_string::<i32>();
        assert_eq!(artists.num_rows(), 2);
        assert_eq!(ids.value(0), "A1");
        assert_eq!(ids.value(1), "A2");
    }

    #[test]
    fn test_duplicate_songs_are_kept() {
        let dataset = catalog(vec![
            (Some("S1"), Some("A1"), Some("Artist X")),
            (Some("S1"), Some("A1"), Some("Artist X")),
        ]);
        assert_eq!(build_songs(&dataset).unwrap().num_rows(), 2);
    }

    #[test]
    fn test_identical_artists_collapse() {
        let dataset = catalog(vec![
            (Some("S1"), Some("A1"), Some("Artist X")),
            (Some("S2"), Some("A1"), Some("Artist X")),
            (Some("S3"), None, Some("Artist Z")),
        ]);

        let artists = build_artists(&dataset).unwrap();
        assert_eq!(artists.num_rows(), 1);
        assert_eq!(artists.schema(), TableName::Artists.schema());
        // Location never appears in the catalog
        assert_eq!(artists.column(2).null_count(), 1);
    }

    #[test]
    fn test_empty_catalog() {
        let schema = catalog(vec![]).schema;
        let dataset = Dataset::empty("song", schema);

        assert_eq!(build_songs(&dataset).unwrap().num_rows(), 0);
        assert_eq!(build_artists(&dataset).unwrap().num_rows(), 0);
    }
}
