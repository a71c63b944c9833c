use std::collections::BTreeMap;
use std::future::Future;

use dashmap::DashMap;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A blob path travels as one URL segment, so `/` is escaped with the rest.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'@');

/// Binary object storage for uploaded images.
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `path` and return a URL that resolves to them.
    fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = StoreResult<String>> + Send;

    fn download(&self, url: &str) -> impl Future<Output = StoreResult<Blob>> + Send;

    /// Remove the blob behind `url`. Removing a missing blob is not an error.
    fn delete(&self, url: &str) -> impl Future<Output = StoreResult<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Blob store kept in memory, handing out `{base_url}/{encoded path}` URLs.
#[derive(Debug)]
pub struct MemoryBlobStore {
    base_url: String,
    blobs: DashMap<String, Blob>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            blobs: DashMap::new(),
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, utf8_percent_encode(path, PATH_SEGMENT))
    }

    fn path_of(&self, url: &str) -> Option<String> {
        let encoded = url.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        percent_decode_str(encoded)
            .decode_utf8()
            .ok()
            .map(|path| path.into_owned())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn export(&self) -> BTreeMap<String, Blob> {
        self.blobs
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn import(&self, blobs: BTreeMap<String, Blob>) {
        for (path, blob) in blobs {
            self.blobs.insert(path, blob);
        }
    }
}

impl BlobStore for MemoryBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<String> {
        tracing::debug!(path, size = bytes.len(), "storing blob");
        self.blobs.insert(
            path.to_string(),
            Blob {
                content_type: content_type.to_string(),
                bytes,
            },
        );
        Ok(self.url_for(path))
    }

    async fn download(&self, url: &str) -> StoreResult<Blob> {
        self.path_of(url)
            .and_then(|path| self.blobs.get(&path).map(|b| b.clone()))
            .ok_or_else(|| StoreError::BlobNotFound(url.to_string()))
    }

    async fn delete(&self, url: &str) -> StoreResult<()> {
        let path = self
            .path_of(url)
            .ok_or_else(|| StoreError::BlobNotFound(url.to_string()))?;
        if self.blobs.remove(&path).is_some() {
            tracing::debug!(path, "blob removed");
        }
        Ok(())
    }
}
