//! Star-schema derivation.
//!
//! Every builder is a pure function of in-memory datasets and returns one
//! batch that matches the table's declared schema exactly. Builders are
//! CPU-bound and run on blocking threads from the pipeline.

mod calendar;
mod catalog;
mod events;
mod kernels;
mod songplays;

pub use calendar::{Calendar, millis_to_seconds};
pub use catalog::{build_artists, build_songs};
pub use events::{build_time, build_users};
pub use songplays::{JoinStats, SongplayId, build_songplays};

use serde::{Deserialize, Serialize};
use std::fmt;

/// How play events without a catalog match are treated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum JoinType {
    /// Keep the play with null `song_id` and `artist_id`.
    #[default]
    #[serde(rename = "left")]
    #[value(name = "left")]
    LeftOuter,
    /// Drop the play.
    #[serde(rename = "inner")]
    #[value(name = "inner")]
    Inner,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::LeftOuter => f.write_str("left"),
            JoinType::Inner => f.write_str("inner"),
        }
    }
}

/// Which `level` a user keeps in the `users` table.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum UserLevelPolicy {
    /// The level of the user's most recent play.
    #[default]
    Latest,
    /// One row per distinct attribute combination seen.
    Distinct,
}

impl fmt::Display for UserLevelPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserLevelPolicy::Latest => f.write_str("latest"),
            UserLevelPolicy::Distinct => f.write_str("distinct"),
        }
    }
}
