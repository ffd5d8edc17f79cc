//! Storage abstraction.
//!
//! Provides a unified interface for working with S3 (and S3-compatible
//! endpoints) and the local filesystem. All paths handed to and returned
//! from a [`StorageProvider`] are relative to the key prefix of the URL it
//! was created for.

mod local;
mod s3;
mod url_parser;

pub use local::LocalConfig;
pub use s3::S3Config;
pub use url_parser::BackendConfig;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use object_store::path::Path;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over the supported backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

/// Convert a relative path string into an object store path.
///
/// Strings are taken as already escaped, the form [`StorageProvider::list_files`]
/// returns them in, so a Hive partition value such as `AC%2FDC` keeps its
/// single escape. Strings that are not valid escaped paths are escaped.
pub fn object_path(path: &str) -> Path {
    Path::parse(path).unwrap_or_else(|_| Path::from(path))
}

/// Record the outcome and latency of a single storage request.
fn record_request<T, E>(operation: StorageOperation, start: Instant, result: &Result<T, E>) {
    let status = if result.is_ok() {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    ///
    /// `options` carries backend settings such as credentials; they are
    /// applied to the backend builder and never read from or written to the
    /// process environment.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Canonical URL of the storage root, for logging.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// Get the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Create a provider rooted at `child` below this provider's root.
    ///
    /// Shares the underlying object store connection.
    pub fn child(&self, child: &str) -> Self {
        let key: Path = match self.config.key() {
            Some(key) => key.parts().chain(Path::from(child).parts()).collect(),
            None => Path::from(child),
        };
        let canonical_url = format!("{}/{}", self.canonical_url.trim_end_matches('/'), child);

        Self {
            config: self.config.with_key(Some(key)),
            object_store: self.object_store.clone(),
            canonical_url,
        }
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List objects under a prefix (relative to the configured base prefix).
    ///
    /// Returns paths relative to the configured base prefix. An empty prefix
    /// lists everything below the root.
    pub async fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<impl Stream<Item = Result<Path, object_store::Error>> + '_, StorageError> {
        let full_prefix: Option<Path> = match (self.config.key(), prefix.is_empty()) {
            (Some(key), false) => Some(key.parts().chain(Path::from(prefix).parts()).collect()),
            (Some(key), true) => Some(key.clone()),
            (None, false) => Some(Path::from(prefix)),
            (None, true) => None,
        };

        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let list = self.object_store.list(full_prefix.as_ref()).map(move |meta| {
            // Strip the base prefix so callers get relative paths
            meta.map(|metadata| -> Path {
                metadata.location.parts().skip(key_part_count).collect()
            })
        });

        Ok(list)
    }

    /// List all objects under a prefix, sorted by path.
    ///
    /// A prefix that does not exist yields an empty list.
    pub async fn list_files(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut files = Vec::new();
        let mut stream = match self.list_with_prefix(prefix).await {
            Ok(stream) => stream,
            Err(e) if e.is_not_found() => return Ok(files),
            Err(e) => return Err(e),
        };

        while let Some(result) = stream.next().await {
            match result {
                Ok(path) => files.push(path.to_string()),
                Err(object_store::Error::NotFound { .. }) => {
                    debug!("Prefix not found while listing (skipping): {prefix}");
                }
                Err(source) => return Err(StorageError::ObjectStore { source }),
            }
        }

        files.sort();
        Ok(files)
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;
        record_request(StorageOperation::Get, start, &result);

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Check whether an object exists.
    pub async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let start = Instant::now();
        let result = self.object_store.head(&self.qualify_path(path)).await;
        record_request(StorageOperation::Head, start, &result);

        match result {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        self.put_payload_with_opts(path, payload, PutOptions::default())
            .await
    }

    /// Put a Parquet file to a path with the correct content type.
    ///
    /// Sets `Content-Type: application/vnd.apache.parquet` on cloud storage backends.
    /// Local filesystem doesn't support attributes, so they are skipped.
    pub async fn put_parquet(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        if matches!(self.config, BackendConfig::Local(_)) {
            return self.put_payload(path, payload).await;
        }

        let opts = PutOptions {
            attributes: Attributes::from_iter([(
                Attribute::ContentType,
                AttributeValue::from("application/vnd.apache.parquet"),
            )]),
            ..Default::default()
        };
        self.put_payload_with_opts(path, payload, opts).await
    }

    async fn put_payload_with_opts(
        &self,
        path: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put_opts(&path, payload, opts).await;
        record_request(StorageOperation::Put, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete a file at the given path.
    ///
    /// Deleting a path that does not exist is not an error.
    pub async fn delete(&self, path: &Path) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.delete(&path).await;
        record_request(StorageOperation::Delete, start, &result);

        match result {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Atomically write content to a path using temp file + rename.
    ///
    /// This ensures the target file is never partially written:
    /// 1. Write to `{path}.tmp`
    /// 2. Rename `{path}.tmp` to `{path}`
    ///
    /// If the write or rename fails, the original file (if any) is unchanged.
    pub async fn atomic_write(&self, path: &Path, content: Vec<u8>) -> Result<(), StorageError> {
        let temp_path = object_path(&format!("{path}.tmp"));
        self.put_payload(&temp_path, PutPayload::from(Bytes::from(content)))
            .await?;
        self.rename(&temp_path, path).await
    }

    /// Server-side rename (move) operation.
    ///
    /// - **S3**: Server-side `CopyObject` + `DeleteObject`
    /// - **Local**: `std::fs::rename`
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), StorageError> {
        let from_qualified = self.qualify_path(from);
        let to_qualified = self.qualify_path(to);
        let start = Instant::now();
        let result = self
            .object_store
            .rename(&from_qualified, &to_qualified)
            .await;
        record_request(StorageOperation::Rename, start, &result);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }
}
