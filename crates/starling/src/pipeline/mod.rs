//! A complete run.
//!
//! Both datasets are read concurrently, the five tables are derived on
//! blocking threads and then written independently. A table that fails to
//! write does not stop the others; the failure is recorded in the report.

mod report;

pub use report::{RunReport, TableOutcome};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use arrow::array::RecordBatch;
use futures::future::join_all;
use snafu::prelude::*;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use uuid::Uuid;

use starling_core::emit;
use starling_core::metrics::events::{
    RowsProduced, Stage, StageDuration, TableWriteCompleted, WriteStatus,
};
use starling_core::{StorageProvider, StorageProviderRef};

use crate::config::{Config, SinkConfig, SourceConfig, TransformConfig};
use crate::error::{
    PipelineError, StorageSnafu, TaskJoinSnafu, TransformError, VerifyMismatchSnafu,
    WriteFailureSnafu,
};
use crate::model::TableName;
use crate::sink::{ParquetWriterConfig, TableReader, TableWriter};
use crate::source::{Dataset, SourceReader};
use crate::transform::{
    JoinStats, build_artists, build_songplays, build_songs, build_time, build_users,
};

/// Metrics label of the song catalog dataset.
pub const SONG_DATASET: &str = "song";
/// Metrics label of the play-event dataset.
pub const LOG_DATASET: &str = "log";

/// The five tables of a run, in write order.
#[derive(Debug)]
pub struct DerivedTables {
    pub tables: Vec<(TableName, RecordBatch)>,
    pub join: JoinStats,
}

async fn create_storage(
    url: &str,
    options: HashMap<String, String>,
) -> Result<StorageProviderRef, PipelineError> {
    Ok(Arc::new(
        StorageProvider::for_url_with_options(url, options)
            .await
            .context(StorageSnafu)?,
    ))
}

fn parquet_config(sink: &SinkConfig) -> ParquetWriterConfig {
    ParquetWriterConfig::default()
        .with_file_size_mb(sink.file_size_mb)
        .with_compression(sink.compression)
}

/// Run the whole job once.
///
/// Returns `Err` only when nothing could be written: bad storage roots,
/// unreadable sources or a failed transform. Per-table write failures are
/// in the report.
pub async fn run(config: &Config) -> Result<RunReport, PipelineError> {
    let start = Instant::now();
    let run_id = Uuid::now_v7().to_string();
    info!(
        run_id = %run_id,
        input = %config.source.path,
        output = %config.sink.path,
        join = %config.transform.join_type,
        user_level = %config.transform.user_level,
        "Starting run"
    );

    let input = create_storage(&config.source.path, config.source.storage_options.clone()).await?;
    let output = create_storage(&config.sink.path, config.sink.storage_options.clone()).await?;

    let (catalog, events) = read_datasets(input, &config.source).await?;
    let derived = derive_tables(catalog, events, config.transform).await?;

    let stage = Instant::now();
    let writer = TableWriter::new(output.clone(), parquet_config(&config.sink), run_id.clone());
    let mut outcomes = join_all(
        derived
            .tables
            .iter()
            .map(|(table, batch)| write_table(&writer, *table, batch)),
    )
    .await;

    if config.sink.verify {
        let reader = TableReader::new(output);
        for outcome in &mut outcomes {
            verify_table(&reader, outcome).await;
        }
    }
    emit!(StageDuration {
        stage: Stage::Write,
        duration: stage.elapsed(),
    });

    let report = RunReport {
        run_id,
        join: derived.join,
        tables: outcomes,
        duration: start.elapsed(),
    };
    report.log();
    Ok(report)
}

/// Read the catalog and the play events concurrently.
pub async fn read_datasets(
    storage: StorageProviderRef,
    source: &SourceConfig,
) -> Result<(Dataset, Dataset), PipelineError> {
    let stage = Instant::now();
    let reader = SourceReader::new(storage, source.batch_size, source.max_concurrent_files);

    let (catalog, events) = tokio::try_join!(
        reader.read(SONG_DATASET, &source.song_pattern),
        reader.read(LOG_DATASET, &source.log_pattern),
    )?;

    emit!(StageDuration {
        stage: Stage::Read,
        duration: stage.elapsed(),
    });
    Ok((catalog, events))
}

/// Derive all five tables from the two datasets.
pub async fn derive_tables(
    catalog: Dataset,
    events: Dataset,
    config: TransformConfig,
) -> Result<DerivedTables, PipelineError> {
    let stage = Instant::now();
    let catalog = Arc::new(catalog);
    let events = Arc::new(events);

    let catalog_dimensions = spawn_blocking({
        let catalog = catalog.clone();
        move || -> Result<_, TransformError> {
            Ok((build_songs(&catalog)?, build_artists(&catalog)?))
        }
    });
    let event_dimensions = spawn_blocking({
        let events = events.clone();
        move || -> Result<_, TransformError> {
            Ok((build_users(&events, config.user_level)?, build_time(&events)?))
        }
    });
    let (catalog_dimensions, event_dimensions) =
        tokio::try_join!(catalog_dimensions, event_dimensions).context(TaskJoinSnafu)?;
    let (songs, artists) = catalog_dimensions?;
    let (users, time) = event_dimensions?;

    // The fact join starts once both dimension builders are done
    let (songplays, join) =
        spawn_blocking(move || build_songplays(&events, &catalog, config.join_type))
            .await
            .context(TaskJoinSnafu)??;

    let tables = vec![
        (TableName::Songs, songs),
        (TableName::Artists, artists),
        (TableName::Users, users),
        (TableName::Time, time),
        (TableName::Songplays, songplays),
    ];
    for (table, batch) in &tables {
        emit!(RowsProduced {
            table: table.as_str(),
            count: batch.num_rows() as u64,
        });
        debug!(table = %table, rows = batch.num_rows(), "Derived table");
    }
    emit!(StageDuration {
        stage: Stage::Transform,
        duration: stage.elapsed(),
    });

    Ok(DerivedTables { tables, join })
}

async fn write_table(writer: &TableWriter, table: TableName, batch: &RecordBatch) -> TableOutcome {
    let result = writer
        .write(table, batch)
        .await
        .context(WriteFailureSnafu { table });

    let status = match &result {
        Ok(_) => WriteStatus::Committed,
        Err(e) => {
            error!(table = %table, error = %e, "Table write failed");
            WriteStatus::Failed
        }
    };
    emit!(TableWriteCompleted {
        table: table.as_str(),
        status,
    });

    TableOutcome { table, result }
}

/// Read a committed table back and compare its row count.
async fn verify_table(reader: &TableReader, outcome: &mut TableOutcome) {
    let Ok(summary) = &outcome.result else {
        return;
    };
    let table = outcome.table;
    let expected = summary.rows;

    let failure = match reader.read(table).await {
        Ok(batch) if batch.num_rows() == expected => {
            debug!(table = %table, rows = expected, "Verified table");
            return;
        }
        Ok(batch) => VerifyMismatchSnafu {
            expected,
            found: batch.num_rows(),
        }
        .build(),
        Err(e) => e,
    };

    error!(table = %table, error = %failure, "Table verification failed");
    outcome.result = Err(PipelineError::WriteFailure {
        table,
        source: failure,
    });
}
