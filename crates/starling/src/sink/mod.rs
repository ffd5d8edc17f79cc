//! Table output.
//!
//! Tables are written as Hive-partitioned Parquet directories below the
//! destination root and committed with a `_SUCCESS` marker.

mod marker;
mod parquet;
mod reader;
mod table;

pub use marker::{MARKER_FILE, SuccessMarker};
pub use parquet::{FinishedFile, ParquetWriter, ParquetWriterConfig};
pub use reader::TableReader;
pub use table::{TEMPORARY_DIR, TableWriteSummary, TableWriter};
