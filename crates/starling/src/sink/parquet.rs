//! Parquet file encoder.
//!
//! Encodes Arrow RecordBatches into in-memory Parquet files with
//! configurable compression, rolling to a new file once the current one
//! reaches the target size.

use bytes::{BufMut, Bytes, BytesMut};
use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use starling_core::{MB, ParquetCompression};

use crate::error::{
    BufferInUseSnafu, BufferLockSnafu, ParquetError, ParquetWriteSnafu, WriterCreateSnafu,
    WriterUnavailableSnafu,
};

const INITIAL_BUFFER_CAPACITY: usize = 8 * MB;

/// Rows handed to the encoder between two file size checks.
const WRITE_CHUNK_ROWS: usize = 8192;

/// A complete Parquet file held in memory, ready to upload.
#[derive(Debug, Clone)]
pub struct FinishedFile {
    /// File name, without any partition directory.
    pub filename: String,
    /// Encoded size in bytes.
    pub size: usize,
    /// Number of records in the file.
    pub record_count: usize,
    /// The encoded file.
    pub bytes: Bytes,
}

/// A buffer with interior mutability for the ArrowWriter.
#[derive(Clone)]
struct SharedBuffer {
    buffer: Arc<Mutex<bytes::buf::Writer<BytesMut>>>,
}

impl SharedBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(BytesMut::with_capacity(capacity).writer())),
        }
    }

    fn into_inner(self) -> Result<BytesMut, ParquetError> {
        let mutex = Arc::into_inner(self.buffer).context(BufferInUseSnafu)?;
        let writer = mutex.into_inner().map_err(|_| BufferLockSnafu.build())?;
        Ok(writer.into_inner())
    }

    fn len(&self) -> Result<usize, ParquetError> {
        let guard = self.buffer.lock().map_err(|_| BufferLockSnafu.build())?;
        Ok(guard.get_ref().len())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.try_lock().map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::WouldBlock, "buffer lock contention")
        })?;
        Write::write(&mut *buffer, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Configuration for the Parquet writer.
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    /// A file is closed once its encoded size reaches this many bytes.
    pub target_file_size: usize,
    /// Row groups are flushed when the in-progress size exceeds this.
    pub row_group_size_bytes: usize,
    /// Compression codec.
    pub compression: ParquetCompression,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            target_file_size: 128 * MB,
            row_group_size_bytes: 128 * MB,
            compression: ParquetCompression::Snappy,
        }
    }
}

impl ParquetWriterConfig {
    /// Set the target file size in MB.
    pub fn with_file_size_mb(mut self, size_mb: usize) -> Self {
        self.target_file_size = size_mb * MB;
        self
    }

    /// Set the compression codec.
    pub fn with_compression(mut self, compression: ParquetCompression) -> Self {
        self.compression = compression;
        self
    }
}

fn compression_codec(compression: ParquetCompression) -> Compression {
    match compression {
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        ParquetCompression::Lz4 => Compression::LZ4,
    }
}

/// Encodes the rows of one partition directory into one or more files.
pub struct ParquetWriter {
    schema: SchemaRef,
    config: ParquetWriterConfig,
    writer: Option<ArrowWriter<SharedBuffer>>,
    buffer: SharedBuffer,
    records_written: usize,
    finished_files: Vec<FinishedFile>,
}

impl ParquetWriter {
    /// Create a new Parquet writer.
    pub fn new(schema: SchemaRef, config: ParquetWriterConfig) -> Result<Self, ParquetError> {
        let buffer = SharedBuffer::new(INITIAL_BUFFER_CAPACITY);
        let writer = Self::create_writer(&schema, &config, buffer.clone())?;

        Ok(Self {
            schema,
            config,
            writer: Some(writer),
            buffer,
            records_written: 0,
            finished_files: Vec::new(),
        })
    }

    fn create_writer(
        schema: &SchemaRef,
        config: &ParquetWriterConfig,
        buffer: SharedBuffer,
    ) -> Result<ArrowWriter<SharedBuffer>, ParquetError> {
        let properties = WriterProperties::builder()
            .set_compression(compression_codec(config.compression))
            .build();

        ArrowWriter::try_new(buffer, schema.clone(), Some(properties)).context(WriterCreateSnafu)
    }

    fn next_filename(&self) -> String {
        format!(
            "part-{:05}-{}.parquet",
            self.finished_files.len(),
            Uuid::now_v7()
        )
    }

    /// Write a batch, rolling to a new file whenever the current one reaches
    /// the target size.
    ///
    /// Large batches are encoded in chunks of at most `WRITE_CHUNK_ROWS` rows
    /// so a single batch can span several files.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), ParquetError> {
        let mut offset = 0;
        while offset < batch.num_rows() {
            let len = WRITE_CHUNK_ROWS.min(batch.num_rows() - offset);
            self.write_chunk(&batch.slice(offset, len))?;
            offset += len;
        }
        Ok(())
    }

    fn write_chunk(&mut self, chunk: &RecordBatch) -> Result<(), ParquetError> {
        let writer = self.writer.as_mut().context(WriterUnavailableSnafu)?;

        writer.write(chunk).context(ParquetWriteSnafu)?;
        self.records_written += chunk.num_rows();

        if writer.in_progress_size() > self.config.row_group_size_bytes {
            writer.flush().context(ParquetWriteSnafu)?;
        }

        let current_size = self.current_file_size();
        if current_size >= self.config.target_file_size {
            debug!(
                size = current_size,
                records = self.records_written,
                "Rolling parquet file"
            );
            self.roll_file()?;
        }

        Ok(())
    }

    /// Close the current file and start a new one.
    fn roll_file(&mut self) -> Result<(), ParquetError> {
        self.finish_current()?;
        self.writer = Some(Self::create_writer(
            &self.schema,
            &self.config,
            self.buffer.clone(),
        )?);
        Ok(())
    }

    fn finish_current(&mut self) -> Result<(), ParquetError> {
        let writer = self.writer.take().context(WriterUnavailableSnafu)?;
        writer.close().context(ParquetWriteSnafu)?;

        let bytes = std::mem::replace(
            &mut self.buffer,
            SharedBuffer::new(INITIAL_BUFFER_CAPACITY),
        )
        .into_inner()?
        .freeze();

        let finished = FinishedFile {
            filename: self.next_filename(),
            size: bytes.len(),
            record_count: self.records_written,
            bytes,
        };
        self.finished_files.push(finished);
        self.records_written = 0;
        Ok(())
    }

    /// Close the current file and return every finished file.
    ///
    /// A writer that never received a row produces no file.
    pub fn close(mut self) -> Result<Vec<FinishedFile>, ParquetError> {
        if self.records_written > 0 {
            self.finish_current()?;
        }
        Ok(self.finished_files)
    }

    /// Current file size in bytes, including data not yet flushed.
    pub fn current_file_size(&self) -> usize {
        let buffer_size = self.buffer.len().unwrap_or(0);
        let in_progress_size = self
            .writer
            .as_ref()
            .map(|w| w.in_progress_size())
            .unwrap_or(0);
        buffer_size + in_progress_size
    }
}
