//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in a run. Events
//! implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.
//!
//! Source metrics carry a `dataset` label (`"song"`, `"log"`), sink metrics a
//! `table` label (`"songs"`, `"songplays"`, ...).

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Source events
// ============================================================================

/// Event emitted when a source file has been fetched.
pub struct FilesRead {
    pub dataset: &'static str,
    pub count: u64,
}

impl InternalEvent for FilesRead {
    fn emit(self) {
        trace!(dataset = self.dataset, count = self.count, "Files read");
        counter!("starling_files_read_total", "dataset" => self.dataset).increment(self.count);
    }
}

/// Event emitted for the raw bytes of a fetched source file.
pub struct BytesRead {
    pub dataset: &'static str,
    pub bytes: u64,
}

impl InternalEvent for BytesRead {
    fn emit(self) {
        trace!(dataset = self.dataset, bytes = self.bytes, "Bytes read");
        counter!("starling_bytes_read_total", "dataset" => self.dataset).increment(self.bytes);
    }
}

/// Event emitted when records have been decoded from a source dataset.
pub struct RowsRead {
    pub dataset: &'static str,
    pub count: u64,
}

impl InternalEvent for RowsRead {
    fn emit(self) {
        trace!(dataset = self.dataset, count = self.count, "Rows read");
        counter!("starling_rows_read_total", "dataset" => self.dataset).increment(self.count);
    }
}

// ============================================================================
// Transform events
// ============================================================================

/// Event emitted when a transformer has produced an output table.
pub struct RowsProduced {
    pub table: &'static str,
    pub count: u64,
}

impl InternalEvent for RowsProduced {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Rows produced");
        counter!("starling_rows_produced_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted for play events that found no matching song.
pub struct UnmatchedEvents {
    pub count: u64,
}

impl InternalEvent for UnmatchedEvents {
    fn emit(self) {
        trace!(count = self.count, "Unmatched events");
        counter!("starling_unmatched_events_total").increment(self.count);
    }
}

/// Pipeline stages timed end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Transform,
    Write,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Transform => "transform",
            Stage::Write => "write",
        }
    }
}

/// Event emitted when a pipeline stage completes.
pub struct StageDuration {
    pub stage: Stage,
    pub duration: Duration,
}

impl InternalEvent for StageDuration {
    fn emit(self) {
        trace!(
            stage = self.stage.as_str(),
            duration_ms = self.duration.as_millis(),
            "Stage completed"
        );
        histogram!("starling_stage_duration_seconds", "stage" => self.stage.as_str())
            .record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Sink events
// ============================================================================

/// Event emitted when a Parquet file has been staged for a table.
pub struct FilesWritten {
    pub table: &'static str,
    pub count: u64,
}

impl InternalEvent for FilesWritten {
    fn emit(self) {
        trace!(table = self.table, count = self.count, "Files written");
        counter!("starling_files_written_total", "table" => self.table).increment(self.count);
    }
}

/// Event emitted for the encoded size of a staged Parquet file.
pub struct BytesWritten {
    pub table: &'static str,
    pub bytes: u64,
}

impl InternalEvent for BytesWritten {
    fn emit(self) {
        trace!(table = self.table, bytes = self.bytes, "Bytes written");
        counter!("starling_bytes_written_total", "table" => self.table).increment(self.bytes);
    }
}

/// Outcome of a table write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    Committed,
    Failed,
}

impl WriteStatus {
    fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::Committed => "committed",
            WriteStatus::Failed => "failed",
        }
    }
}

/// Event emitted when a table write finishes, successfully or not.
pub struct TableWriteCompleted {
    pub table: &'static str,
    pub status: WriteStatus,
}

impl InternalEvent for TableWriteCompleted {
    fn emit(self) {
        trace!(table = self.table, status = self.status.as_str(), "Table write completed");
        counter!(
            "starling_table_writes_total",
            "table" => self.table,
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    List,
    Get,
    Head,
    Put,
    Delete,
    Rename,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::List => "list",
            StorageOperation::Get => "get",
            StorageOperation::Head => "head",
            StorageOperation::Put => "put",
            StorageOperation::Delete => "delete",
            StorageOperation::Rename => "rename",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "starling_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted with the latency of a storage request.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        histogram!(
            "starling_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
