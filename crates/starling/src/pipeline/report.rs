//! Outcome of a run.

use snafu::prelude::*;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{PipelineError, TablesFailedSnafu};
use crate::model::TableName;
use crate::sink::TableWriteSummary;
use crate::transform::JoinStats;

/// Write outcome of a single table.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: TableName,
    pub result: Result<TableWriteSummary, PipelineError>,
}

/// What a run did, table by table.
///
/// Tables are written independently, so one failed table leaves the
/// others committed. [`RunReport::ensure_success`] turns any failure into
/// an error for the caller.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub join: JoinStats,
    pub tables: Vec<TableOutcome>,
    pub duration: Duration,
}

impl RunReport {
    /// The committed summary of `table`, if it was written successfully.
    pub fn summary(&self, table: TableName) -> Option<&TableWriteSummary> {
        self.tables
            .iter()
            .find(|outcome| outcome.table == table)
            .and_then(|outcome| outcome.result.as_ref().ok())
    }

    pub fn failed_tables(&self) -> Vec<TableName> {
        self.tables
            .iter()
            .filter(|outcome| outcome.result.is_err())
            .map(|outcome| outcome.table)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.tables.iter().all(|outcome| outcome.result.is_ok())
    }

    pub fn ensure_success(self) -> Result<Self, PipelineError> {
        let tables = self.failed_tables();
        ensure!(tables.is_empty(), TablesFailedSnafu { tables });
        Ok(self)
    }

    pub fn log(&self) {
        for outcome in &self.tables {
            match &outcome.result {
                Ok(summary) => info!(
                    table = %outcome.table,
                    rows = summary.rows,
                    files = summary.files.len(),
                    duration_ms = summary.duration.as_millis(),
                    "Table committed"
                ),
                Err(e) => warn!(table = %outcome.table, error = %e, "Table not committed"),
            }
        }
        info!(
            run_id = %self.run_id,
            plays = self.join.events,
            unmatched = self.join.unmatched,
            failed = self.failed_tables().len(),
            duration_ms = self.duration.as_millis(),
            "Run finished"
        );
    }
}
