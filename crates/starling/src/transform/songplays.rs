//! The `songplays` fact table.
//!
//! Play events are hash-joined to catalog records on
//! `(event.artist, event.song) == (catalog.artist_name, catalog.title)`.
//! Keys compare exactly, and a null on either side never matches.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, Int32Array, Int64Array, RecordBatch, TimestampMicrosecondArray,
    UInt32Array,
};
use arrow::compute::{concat_batches, take};
use arrow::datatypes::{DataType, Int64Type};
use arrow::row::OwnedRow;
use snafu::prelude::*;
use tracing::{debug, warn};

use starling_core::emit;
use starling_core::metrics::events::UnmatchedEvents;

use crate::error::{ComputeSnafu, TransformError};
use crate::model::{TIMEZONE, TableName};
use crate::source::Dataset;

use super::JoinType;
use super::calendar::{Calendar, millis_to_seconds};
use super::kernels::{Column, conform, filter_plays, project, row_keys};

const SEQUENCE_BITS: u32 = 33;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

/// Surrogate key of a fact row.
///
/// `partition` is the index of the event partition the play came from and
/// `sequence` the row's position among that partition's output rows. The
/// pair is unique within a run and stable for an unchanged input listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SongplayId {
    pub partition: u32,
    pub sequence: u64,
}

impl SongplayId {
    /// Pack into a non-negative `i64`: the partition above bit 33, the
    /// sequence below it.
    pub fn encode(&self) -> i64 {
        (i64::from(self.partition) << SEQUENCE_BITS) | (self.sequence as i64 & SEQUENCE_MASK)
    }

    pub fn decode(id: i64) -> Self {
        Self {
            partition: (id >> SEQUENCE_BITS) as u32,
            sequence: (id & SEQUENCE_MASK) as u64,
        }
    }
}

/// Outcome of matching play events to the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Play events considered.
    pub events: usize,
    /// Events with at least one catalog match.
    pub matched: usize,
    /// Events with no catalog match.
    pub unmatched: usize,
}

impl JoinStats {
    fn merge(&mut self, other: JoinStats) {
        self.events += other.events;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
    }
}

/// Catalog side of the join: `(artist_name, title)` to catalog rows.
struct CatalogIndex {
    song_ids: ArrayRef,
    artist_ids: ArrayRef,
    rows: HashMap<OwnedRow, Vec<u32>>,
}

impl CatalogIndex {
    fn build(table: TableName, catalog: &Dataset) -> Result<Self, TransformError> {
        let all = catalog.concat().context(ComputeSnafu { table })?;
        let projected = project(
            table,
            &all,
            &[
                Column::new("artist_name", "artist_name", &DataType::Utf8),
                Column::new("title", "title", &DataType::Utf8),
                Column::new("song_id", "song_id", &DataType::Utf8),
                Column::new("artist_id", "artist_id", &DataType::Utf8),
            ],
        )?;

        let keys = &projected.columns()[..2];
        let encoded = row_keys(keys).context(ComputeSnafu { table })?;

        let mut rows: HashMap<OwnedRow, Vec<u32>> = HashMap::new();
        for (i, row) in encoded.iter().enumerate() {
            if keys.iter().any(|k| k.is_null(i)) {
                continue;
            }
            rows.entry(row.owned()).or_default().push(i as u32);
        }

        Ok(Self {
            song_ids: projected.column(2).clone(),
            artist_ids: projected.column(3).clone(),
            rows,
        })
    }
}

/// Build the fact table and report how many plays found a song.
pub fn build_songplays(
    events: &Dataset,
    catalog: &Dataset,
    join_type: JoinType,
) -> Result<(RecordBatch, JoinStats), TransformError> {
    let table = TableName::Songplays;
    let schema = table.schema();
    let index = CatalogIndex::build(table, catalog)?;

    let mut stats = JoinStats::default();
    let mut outputs = Vec::with_capacity(events.partitions.len());
    for (partition, batch) in events.partitions.iter().enumerate() {
        let (output, partition_stats) =
            join_partition(table, partition as u32, batch, &index, join_type)?;
        stats.merge(partition_stats);
        outputs.push(conform(table, output, &schema)?);
    }

    let songplays = concat_batches(&schema, &outputs).context(ComputeSnafu { table })?;

    if stats.unmatched > 0 {
        warn!(
            events = stats.events,
            unmatched = stats.unmatched,
            join = %join_type,
            "Join key mismatch: play events without a catalog match"
        );
        emit!(UnmatchedEvents {
            count: stats.unmatched as u64,
        });
    }
    debug!(
        rows = songplays.num_rows(),
        matched = stats.matched,
        "Built songplays"
    );

    Ok((songplays, stats))
}

fn join_partition(
    table: TableName,
    partition: u32,
    batch: &RecordBatch,
    index: &CatalogIndex,
    join_type: JoinType,
) -> Result<(RecordBatch, JoinStats), TransformError> {
    let plays = filter_plays(table, batch, false)?;
    let plays = project(
        table,
        &plays,
        &[
            Column::new("artist", "artist", &DataType::Utf8),
            Column::new("song", "song", &DataType::Utf8),
            Column::new("ts", "ts", &DataType::Int64),
            Column::new("userId", "user_id", &DataType::Utf8),
            Column::new("level", "level", &DataType::Utf8),
            Column::new("sessionId", "session_id", &DataType::Int64),
            Column::new("location", "location", &DataType::Utf8),
            Column::new("userAgent", "user_agent", &DataType::Utf8),
        ],
    )?;

    let keys = &plays.columns()[..2];
    let encoded = row_keys(keys).context(ComputeSnafu { table })?;

    let mut event_rows: Vec<u32> = Vec::with_capacity(plays.num_rows());
    let mut catalog_rows: Vec<Option<u32>> = Vec::with_capacity(plays.num_rows());
    let mut stats = JoinStats {
        events: plays.num_rows(),
        ..Default::default()
    };

    for (i, row) in encoded.iter().enumerate() {
        let matches = if keys.iter().any(|k| k.is_null(i)) {
            None
        } else {
            index.rows.get(&row.owned())
        };

        match matches {
            Some(found) => {
                stats.matched += 1;
                for &j in found {
                    event_rows.push(i as u32);
                    catalog_rows.push(Some(j));
                }
            }
            None => {
                stats.unmatched += 1;
                if join_type == JoinType::LeftOuter {
                    event_rows.push(i as u32);
                    catalog_rows.push(None);
                }
            }
        }
    }

    let event_rows = UInt32Array::from(event_rows);
    let catalog_rows = UInt32Array::from(catalog_rows);
    let gather = |array: &ArrayRef, indices: &UInt32Array| {
        take(array, indices, None).context(ComputeSnafu { table })
    };

    let ts = gather(plays.column(2), &event_rows)?;
    let (start_time, year, month) = start_time_columns(table, ts.as_primitive::<Int64Type>())?;

    let songplay_id = Int64Array::from_iter_values((0..event_rows.len() as u64).map(|sequence| {
        SongplayId {
            partition,
            sequence,
        }
        .encode()
    }));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(songplay_id),
        start_time,
        gather(plays.column(3), &event_rows)?,
        gather(plays.column(4), &event_rows)?,
        gather(&index.song_ids, &catalog_rows)?,
        gather(&index.artist_ids, &catalog_rows)?,
        gather(plays.column(5), &event_rows)?,
        gather(plays.column(6), &event_rows)?,
        gather(plays.column(7), &event_rows)?,
        year,
        month,
    ];

    let output = RecordBatch::try_new(table.schema(), columns).context(ComputeSnafu { table })?;
    Ok((output, stats))
}

/// `start_time`, `year` and `month` from epoch-millisecond `ts`.
fn start_time_columns(
    table: TableName,
    ts: &Int64Array,
) -> Result<(ArrayRef, ArrayRef, ArrayRef), TransformError> {
    let calendars = ts
        .iter()
        .map(|ts| ts.map(|ms| Calendar::from_seconds(millis_to_seconds(ms))).transpose())
        .collect::<Result<Vec<_>, _>>()
        .context(ComputeSnafu { table })?;

    let start_time: TimestampMicrosecondArray = calendars.iter().map(|c| c.map(|c| c.micros)).collect();
    let year: Int32Array = calendars.iter().map(|c| c.map(|c| c.year)).collect();
    let month: Int32Array = calendars.iter().map(|c| c.map(|c| c.month)).collect();

    Ok((
        Arc::new(start_time.with_timezone(TIMEZONE)),
        Arc::new(year),
        Arc::new(month),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::StringArray;
    use arrow::datatypes::{Int32Type, TimestampMicrosecondType};
    use std::collections::HashSet;

    fn catalog(rows: &[(Option<&str>, Option<&str>, &str, &str)]) -> Dataset {
        let batch = RecordBatch::try_from_iter(vec![
            (
                "artist_name",
                Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())) as ArrayRef,
            ),
            (
                "title",
                Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())) as ArrayRef,
            ),
            (
                "song_id",
                Arc::new(StringArray::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())) as ArrayRef,
            ),
            (
                "artist_id",
                Arc::new(StringArray::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())) as ArrayRef,
            ),
        ])
        .unwrap();

        Dataset {
            name: "song",
            schema: batch.schema(),
            partitions: vec![batch],
        }
    }

    fn events_batch(rows: &[(&str, Option<&str>, Option<&str>, Option<i64>)]) -> RecordBatch {
        let n = rows.len();
        RecordBatch::try_from_iter(vec![
            (
                "artist",
                Arc::new(StringArray::from(rows.iter().map(|r| r.1).collect::<Vec<_>>())) as ArrayRef,
            ),
            ("level", Arc::new(StringArray::from(vec!["free"; n])) as ArrayRef),
            ("location", Arc::new(StringArray::from(vec!["NY-NJ"; n])) as ArrayRef),
            (
                "page",
                Arc::new(StringArray::from(rows.iter().map(|r| r.0).collect::<Vec<_>>())) as ArrayRef,
            ),
            ("sessionId", Arc::new(Int64Array::from(vec![139; n])) as ArrayRef),
            (
                "song",
                Arc::new(StringArray::from(rows.iter().map(|r| r.2).collect::<Vec<_>>())) as ArrayRef,
            ),
            (
                "ts",
                Arc::new(Int64Array::from(rows.iter().map(|r| r.3).collect::<Vec<_>>())) as ArrayRef,
            ),
            ("userAgent", Arc::new(StringArray::from(vec!["UA1"; n])) as ArrayRef),
            ("userId", Arc::new(StringArray::from(vec!["7"; n])) as ArrayRef),
        ])
        .unwrap()
    }

    fn events(partitions: Vec<RecordBatch>) -> Dataset {
        Dataset {
            name: "log",
            schema: partitions[0].schema(),
            partitions,
        }
    }

    #[test]
    fn test_songplay_id_packing() {
        let id = SongplayId {
            partition: 3,
            sequence: 42,
        };
        let encoded = id.encode();

        assert_eq!(encoded, (3 << 33) | 42);
        assert_eq!(SongplayId::decode(encoded), id);
        assert!(encoded > 0);
    }

    #[test]
    fn test_matched_play() {
        let catalog = catalog(&[(Some("Artist X"), Some("Song A"), "S1", "A1")]);
        let events = events(vec![events_batch(&[(
            "NextSong",
            Some("Artist X"),
            Some("Song A"),
            Some(1541121934796),
        )])]);

        let (songplays, stats) = build_songplays(&events, &catalog, JoinType::LeftOuter).unwrap();
        assert_eq!(songplays.schema(), TableName::Songplays.schema());
        assert_eq!(
            stats,
            JoinStats {
                events: 1,
                matched: 1,
                unmatched: 0
            }
        );

        assert_eq!(songplays.num_rows(), 1);
        assert_eq!(songplays.column(4).as_string::<i32>().value(0), "S1");
        assert_eq!(songplays.column(5).as_string::<i32>().value(0), "A1");
        assert_eq!(
            songplays
                .column(1)
                .as_primitive::<TimestampMicrosecondType>()
                .value(0),
            1_541_121_934_000_000
        );
        assert_eq!(songplays.column(9).as_primitive::<Int32Type>().value(0), 2018);
        assert_eq!(songplays.column(10).as_primitive::<Int32Type>().value(0), 11);
    }

    #[test]
    fn test_unmatched_play_left_outer_vs_inner() {
        let catalog = catalog(&[(Some("Artist X"), Some("Song A"), "S1", "A1")]);
        let events = events(vec![events_batch(&[
            ("NextSong", Some("Artist X"), Some("Song A"), Some(1)),
            ("NextSong", Some("artist x"), Some("Song A"), Some(2)),
            ("NextSong", None, Some("Song A"), Some(3)),
            ("Home", Some("Artist X"), Some("Song A"), Some(4)),
        ])]);

        let (left, stats) = build_songplays(&events, &catalog, JoinType::LeftOuter).unwrap();
        assert_eq!(left.num_rows(), 3);
        assert_eq!(stats.unmatched, 2);
        let song_ids = left.column(4).as_string::<i32>();
        assert_eq!(song_ids.value(0), "S1");
        assert!(song_ids.is_null(1));
        assert!(song_ids.is_null(2));

        let (inner, stats) = build_songplays(&events, &catalog, JoinType::Inner).unwrap();
        assert_eq!(inner.num_rows(), 1);
        assert_eq!(stats.events, 3);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_multiple_catalog_matches_multiply_rows() {
        let catalog = catalog(&[
            (Some("Artist X"), Some("Song A"), "S1", "A1"),
            (Some("Artist X"), Some("Song A"), "S2", "A1"),
            (None, None, "S3", "A3"),
        ]);
        let events = events(vec![events_batch(&[(
            "NextSong",
            Some("Artist X"),
            Some("Song A"),
            Some(1),
        )])]);

        let (songplays, stats) = build_songplays(&events, &catalog, JoinType::Inner).unwrap();
        assert_eq!(songplays.num_rows(), 2);
        assert_eq!(stats.matched, 1);
    }

    #[test]
    fn test_ids_unique_across_partitions() {
        let catalog = catalog(&[(Some("Artist X"), Some("Song A"), "S1", "A1")]);
        let play = ("NextSong", Some("Artist X"), Some("Song A"), Some(1));
        let events = events(vec![
            events_batch(&[play, play]),
            events_batch(&[("Home", None, None, None)]),
            events_batch(&[play]),
        ]);

        let (songplays, _) = build_songplays(&events, &catalog, JoinType::LeftOuter).unwrap();
        let ids: Vec<i64> = songplays
            .column(0)
            .as_primitive::<Int64Type>()
            .values()
            .to_vec();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 3);
        assert_eq!(
            SongplayId::decode(ids[2]),
            SongplayId {
                partition: 2,
                sequence: 0
            }
        );
    }

    #[test]
    fn test_null_ts_gives_null_start_time() {
        let catalog = catalog(&[]);
        let events = events(vec![events_batch(&[("NextSong", None, None, None)])]);

        let (songplays, _) = build_songplays(&events, &catalog, JoinType::LeftOuter).unwrap();
        assert_eq!(songplays.num_rows(), 1);
        assert!(songplays.column(1).is_null(0));
        assert!(songplays.column(9).is_null(0));
    }
}
