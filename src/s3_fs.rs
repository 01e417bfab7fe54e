// src/s3_fs.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Directory-shaped operations over a flat key space.
//!
//! Only what object storage can express is offered: create a directory marker,
//! list, recursive delete, single delete, whole-file write and streaming write.
//! There is no rename, stat, permission or link support.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::key_path::{dir_key, join_key, strip_leading_separators};
use crate::s3_client::{DeleteStatus, ObjectStoreClient};
use crate::write_stream::{S3WriteStream, WriteStreamOptions};

/// Outcome of an adapter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Fail,
    NotFound,
}

/// Outcome of `readdir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadDir {
    /// Keys and common prefixes in page-arrival order.
    Entries(Vec<String>),
    NotFound,
    Fail,
}

impl ReadDir {
    pub fn status(&self) -> Status {
        match self {
            ReadDir::Entries(_) => Status::Ok,
            ReadDir::NotFound => Status::NotFound,
            ReadDir::Fail => Status::Fail,
        }
    }

    pub fn entries(&self) -> Option<&[String]> {
        match self {
            ReadDir::Entries(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_entries(self) -> Option<Vec<String>> {
        match self {
            ReadDir::Entries(e) => Some(e),
            _ => None,
        }
    }
}

/// Filesystem view of one bucket, rooted at `base_path`.
#[derive(Clone)]
pub struct S3Fs {
    client: Arc<dyn ObjectStoreClient>,
    base_path: String,
}

impl std::fmt::Debug for S3Fs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Fs").field("base_path", &self.base_path).finish()
    }
}

impl S3Fs {
    pub fn new(client: Arc<dyn ObjectStoreClient>, base_path: impl Into<String>) -> Self {
        Self {
            client,
            base_path: base_path.into(),
        }
    }

    pub fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        &self.client
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Object key for `path` under the base path.
    pub fn resolve(&self, path: &str) -> String {
        join_key(&self.base_path, path)
    }

    /// Create a zero-byte `path/` marker object.
    pub async fn mkdir(&self, path: &str) -> Status {
        let key = self.resolve(path);
        if key.is_empty() {
            warn!("mkdir: refusing to create a marker for the bucket root");
            return Status::Fail;
        }
        let key = dir_key(&key);
        match self.client.upload_once(&key, Bytes::new()).await {
            Ok(()) => {
                debug!("mkdir {}", key);
                Status::Ok
            }
            Err(e) => {
                warn!("mkdir {} failed: {}", key, e);
                Status::Fail
            }
        }
    }

    /// List every key under `path`, following pagination to the end.
    ///
    /// Entries are collected in page order (objects first, then common
    /// prefixes, per page) with leading separators stripped.
    pub async fn readdir(&self, path: &str) -> ReadDir {
        let prefix = self.resolve(path);
        let mut entries: Vec<String> = Vec::new();
        let mut marker: Option<String> = None;
        let mut first_page = true;

        loop {
            let page = match self.client.list_objects(&prefix, marker.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("readdir {} failed: {}", prefix, e);
                    return ReadDir::Fail;
                }
            };

            if first_page && page.contents.is_none() {
                return ReadDir::NotFound;
            }
            first_page = false;

            entries.extend(
                page.contents
                    .unwrap_or_default()
                    .into_iter()
                    .chain(page.common_prefixes)
                    .map(|entry| strip_leading_separators(&entry).to_string()),
            );

            match (page.is_truncated, page.next_marker) {
                (true, Some(next)) => {
                    if marker.as_deref() == Some(next.as_str()) {
                        warn!("readdir {}: listing marker did not advance ({})", prefix, next);
                        return ReadDir::Fail;
                    }
                    marker = Some(next);
                }
                _ => break,
            }
        }

        debug!("readdir {}: {} entries", prefix, entries.len());
        ReadDir::Entries(entries)
    }

    /// Delete everything under `path` with one batch delete.
    pub async fn rmdir(&self, path: &str) -> Status {
        let keys = match self.readdir(path).await {
            ReadDir::Entries(keys) => keys,
            ReadDir::NotFound => return Status::NotFound,
            ReadDir::Fail => return Status::Fail,
        };
        self.delete_keys(&keys).await
    }

    /// Delete exactly one key.
    pub async fn rm(&self, path: &str) -> Status {
        let key = self.resolve(path);
        self.delete_keys(&[key]).await
    }

    /// Upload `data` as the whole object at `path`.
    pub async fn write_file(&self, path: &str, data: impl Into<Bytes>) -> Status {
        let key = self.resolve(path);
        match self.client.upload_once(&key, data.into()).await {
            Ok(()) => Status::Ok,
            Err(e) => {
                warn!("writeFile {} failed: {}", key, e);
                Status::Fail
            }
        }
    }

    /// New, unstarted stream bound to `path`; call `start()` before writing.
    pub fn create_write_stream(&self, path: &str, options: WriteStreamOptions) -> S3WriteStream {
        S3WriteStream::new(Arc::clone(&self.client), self.resolve(path), options)
    }

    async fn delete_keys(&self, keys: &[String]) -> Status {
        match self.client.delete_objects(keys).await {
            Ok(status) => status_from_delete(&status),
            Err(e) => {
                warn!("DeleteObjects for {} key(s) failed: {}", keys.len(), e);
                Status::Fail
            }
        }
    }
}

fn status_from_delete(status: &DeleteStatus) -> Status {
    if status.is_complete_success() {
        Status::Ok
    } else {
        for f in &status.failed {
            warn!(
                "delete {} failed: {} {}",
                f.key,
                f.code.as_deref().unwrap_or("-"),
                f.message.as_deref().unwrap_or("")
            );
        }
        Status::Fail
    }
}
