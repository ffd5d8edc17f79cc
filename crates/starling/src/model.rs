//! The star schema: table names, column layouts and partitioning.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Page value that marks an event as a song play.
pub const NEXT_SONG: &str = "NextSong";

/// Timezone attached to every timestamp column.
pub const TIMEZONE: &str = "UTC";

/// The `start_time` column type shared by `time` and `songplays`.
pub fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some(TIMEZONE.into()))
}

/// Output tables of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl TableName {
    /// All tables, in write order.
    pub const ALL: [TableName; 5] = [
        TableName::Songs,
        TableName::Artists,
        TableName::Users,
        TableName::Time,
        TableName::Songplays,
    ];

    /// Directory name below the destination root.
    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Songs => "songs",
            TableName::Artists => "artists",
            TableName::Users => "users",
            TableName::Time => "time",
            TableName::Songplays => "songplays",
        }
    }

    /// Columns stored in the directory layout instead of the file body.
    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            TableName::Songs => &["year", "artist_id"],
            TableName::Time | TableName::Songplays => &["year", "month"],
            TableName::Artists | TableName::Users => &[],
        }
    }

    /// Declared schema of the table.
    pub fn schema(&self) -> SchemaRef {
        match self {
            TableName::Songs => SONGS.clone(),
            TableName::Artists => ARTISTS.clone(),
            TableName::Users => USERS.clone(),
            TableName::Time => TIME.clone(),
            TableName::Songplays => SONGPLAYS.clone(),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static SONGS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("song_id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("year", DataType::Int64, true),
        Field::new("duration", DataType::Float64, true),
    ]))
});

static ARTISTS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, false),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
    ]))
});

static USERS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("user_id", DataType::Utf8, false),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ]))
});

static TIME: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("start_time", start_time_type(), false),
        Field::new("hour", DataType::Int32, true),
        Field::new("day", DataType::Int32, true),
        Field::new("week", DataType::Int32, true),
        Field::new("month", DataType::Int32, true),
        Field::new("year", DataType::Int32, true),
        Field::new("weekday", DataType::Int32, true),
    ]))
});

static SONGPLAYS: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_time", start_time_type(), true),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
        Field::new("year", DataType::Int32, true),
        Field::new("month", DataType::Int32, true),
    ]))
});
