//! The `_SUCCESS` commit marker.
//!
//! A table directory is valid only while its marker exists. The marker is
//! written last, after every data file is in place, and removed first when
//! a table is rewritten.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::error::{MarkerSnafu, SinkError};
use crate::model::TableName;

/// File name of the commit marker, directly below the table root.
pub const MARKER_FILE: &str = "_SUCCESS";

/// Contents of a table's commit marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMarker {
    /// Identifier of the run that committed the table.
    pub run_id: String,
    pub table: String,
    /// Rows across all committed files.
    pub row_count: usize,
    /// Committed data files, relative to the table root, sorted.
    pub files: Vec<String>,
    /// Commit time, RFC 3339 in UTC.
    pub written_at: String,
}

impl SuccessMarker {
    pub fn new(run_id: &str, table: TableName, row_count: usize, mut files: Vec<String>) -> Self {
        files.sort();
        Self {
            run_id: run_id.to_string(),
            table: table.as_str().to_string(),
            row_count,
            files,
            written_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SinkError> {
        serde_json::to_vec_pretty(self).context(MarkerSnafu { path: MARKER_FILE })
    }

    pub fn from_bytes(path: &str, bytes: &[u8]) -> Result<Self, SinkError> {
        serde_json::from_slice(bytes).context(MarkerSnafu { path })
    }
}
