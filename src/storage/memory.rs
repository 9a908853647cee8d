//! In-memory object store.
//!
//! Buckets map keys to an ordered list of generations held in a
//! `tokio::sync::RwLock`.  The most recently stored generation is the
//! "latest" one.  Faults can be injected per key so callers can exercise
//! upstream error payloads and transport failures, and call counters record
//! how many metadata and reader round-trips were made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use md5::{Digest, Md5};
use tokio::sync::RwLock;

use super::client::{
    BucketHandle, ObjectAttrs, ObjectHandle, ObjectReader, ReaderAttrs, StorageClient, StoreFuture,
};
use crate::errors::{StoreError, UpstreamError};

/// Readers hand out the body in chunks of at most this many bytes.
const CHUNK_SIZE: usize = 64 * 1024;

/// A failure to report instead of looking the object up.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Answer with a structured upstream error.
    Status(UpstreamError),
    /// Fail as if the connection broke.
    Transport(String),
}

impl Fault {
    fn to_error(&self) -> StoreError {
        match self {
            Fault::Status(upstream) => StoreError::Status(upstream.clone()),
            Fault::Transport(message) => StoreError::Transport(anyhow::anyhow!("{message}")),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredVersion {
    attrs: ObjectAttrs,
    data: Bytes,
}

type Objects = HashMap<String, Vec<StoredVersion>>;

#[derive(Default)]
struct MemoryState {
    /// bucket -> key -> generations, oldest first.
    buckets: RwLock<HashMap<String, Objects>>,
    /// (bucket, key) -> fault.
    faults: RwLock<HashMap<(String, String), Fault>>,
    next_generation: AtomicI64,
    attrs_calls: AtomicUsize,
    reader_calls: AtomicUsize,
}

/// In-memory [`StorageClient`].  Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    state: Arc<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bucket.  Idempotent.
    pub async fn create_bucket(&self, bucket: &str) {
        self.state
            .buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// Store a new generation with the attributes exactly as given.
    ///
    /// The bucket is created if needed.  Only `bucket` and `name` are filled
    /// in when left empty.
    pub async fn insert(&self, bucket: &str, key: &str, mut attrs: ObjectAttrs, data: impl Into<Bytes>) {
        if attrs.bucket.is_empty() {
            attrs.bucket = bucket.to_string();
        }
        if attrs.name.is_empty() {
            attrs.name = key.to_string();
        }
        self.state.next_generation.fetch_max(attrs.generation, Ordering::SeqCst);
        let version = StoredVersion {
            attrs,
            data: data.into(),
        };
        self.state
            .buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(version);
    }

    /// Store `data` as the new latest generation of `key`, deriving the
    /// attributes the way the store would: size, MD5, CRC32-C, a fresh
    /// generation number and the current time.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
        data: impl Into<Bytes>,
    ) -> ObjectAttrs {
        let data = data.into();
        let generation = self.state.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let attrs = ObjectAttrs {
            bucket: bucket.to_string(),
            name: key.to_string(),
            content_type: content_type.to_string(),
            size: data.len() as i64,
            updated: Some(Utc::now()),
            md5: compute_md5(&data),
            crc32c: crc32c::crc32c(&data),
            generation,
            metageneration: 1,
            storage_class: "STANDARD".to_string(),
            ..Default::default()
        };
        self.insert(bucket, key, attrs.clone(), data).await;
        attrs
    }

    /// Make every lookup of `key` fail with `fault`.
    pub async fn inject_fault(&self, bucket: &str, key: &str, fault: Fault) {
        self.state
            .faults
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()), fault);
    }

    /// Number of attribute fetches served so far.
    pub fn attrs_calls(&self) -> usize {
        self.state.attrs_calls.load(Ordering::SeqCst)
    }

    /// Number of readers opened so far.
    pub fn reader_calls(&self) -> usize {
        self.state.reader_calls.load(Ordering::SeqCst)
    }
}

fn compute_md5(data: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

impl StorageClient for MemoryStorage {
    fn bucket(&self, name: &str) -> Box<dyn BucketHandle> {
        Box::new(MemoryBucket {
            state: self.state.clone(),
            bucket: name.to_string(),
        })
    }
}

struct MemoryBucket {
    state: Arc<MemoryState>,
    bucket: String,
}

impl BucketHandle for MemoryBucket {
    fn object(&self, key: &str) -> Box<dyn ObjectHandle> {
        Box::new(MemoryObject {
            state: self.state.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            generation: None,
        })
    }
}

struct MemoryObject {
    state: Arc<MemoryState>,
    bucket: String,
    key: String,
    generation: Option<i64>,
}

impl MemoryObject {
    async fn lookup(&self) -> Result<StoredVersion, StoreError> {
        if let Some(fault) = self
            .state
            .faults
            .read()
            .await
            .get(&(self.bucket.clone(), self.key.clone()))
        {
            return Err(fault.to_error());
        }

        let buckets = self.state.buckets.read().await;
        let objects = buckets.get(&self.bucket).ok_or(StoreError::BucketNotExist)?;
        let versions = objects.get(&self.key).ok_or(StoreError::ObjectNotExist)?;
        let version = match self.generation {
            Some(gen) => versions.iter().find(|v| v.attrs.generation == gen),
            None => versions.last(),
        };
        version.cloned().ok_or(StoreError::ObjectNotExist)
    }
}

impl ObjectHandle for MemoryObject {
    fn generation(&self, gen: i64) -> Box<dyn ObjectHandle> {
        Box::new(MemoryObject {
            state: self.state.clone(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            generation: Some(gen),
        })
    }

    fn attrs(&self) -> StoreFuture<'_, ObjectAttrs> {
        Box::pin(async move {
            self.state.attrs_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.lookup().await?.attrs)
        })
    }

    fn new_reader(&self) -> StoreFuture<'_, Box<dyn ObjectReader>> {
        Box::pin(async move {
            self.state.reader_calls.fetch_add(1, Ordering::SeqCst);
            let version = self.lookup().await?;
            let attrs = ReaderAttrs {
                content_type: version.attrs.content_type.clone(),
                content_encoding: version.attrs.content_encoding.clone(),
                cache_control: version.attrs.cache_control.clone(),
                size: version.data.len() as i64,
                last_modified: version.attrs.updated,
                generation: version.attrs.generation,
                metageneration: version.attrs.metageneration,
            };
            let reader: Box<dyn ObjectReader> = Box::new(MemoryReader {
                attrs,
                remaining: version.data,
            });
            Ok(reader)
        })
    }
}

struct MemoryReader {
    attrs: ReaderAttrs,
    remaining: Bytes,
}

impl ObjectReader for MemoryReader {
    fn attrs(&self) -> &ReaderAttrs {
        &self.attrs
    }

    fn chunk(&mut self) -> StoreFuture<'_, Option<Bytes>> {
        Box::pin(async move {
            if self.remaining.is_empty() {
                return Ok(None);
            }
            let n = self.remaining.len().min(CHUNK_SIZE);
            Ok(Some(self.remaining.split_to(n)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    async fn read_all(mut reader: Box<dyn ObjectReader>) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = reader.chunk().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_upload_derives_attrs() {
        let store = MemoryStorage::new();
        let attrs = store
            .upload("bucket", "hello.txt", "text/plain", "hello world")
            .await;

        assert_eq!(attrs.size, 11);
        assert_eq!(hex::encode(&attrs.md5), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(attrs.crc32c, crc32c::crc32c(b"hello world"));
        assert_eq!(attrs.generation, 1);
        assert!(attrs.updated.is_some());
    }

    #[tokio::test]
    async fn test_latest_and_pinned_generations() {
        let store = MemoryStorage::new();
        let first = store.upload("bucket", "key", "text/plain", "one").await;
        let second = store.upload("bucket", "key", "text/plain", "two").await;
        assert!(second.generation > first.generation);

        let object = store.bucket("bucket").object("key");
        assert_eq!(object.attrs().await.unwrap().generation, second.generation);

        let pinned = object.generation(first.generation);
        assert_eq!(pinned.attrs().await.unwrap().generation, first.generation);
        let reader = pinned.new_reader().await.unwrap();
        assert_eq!(reader.attrs().generation, first.generation);
        assert_eq!(read_all(reader).await, b"one");
    }

    #[tokio::test]
    async fn test_missing_bucket_key_and_generation() {
        let store = MemoryStorage::new();
        store.create_bucket("empty").await;
        store.upload("bucket", "key", "text/plain", "data").await;

        let err = store.bucket("nope").object("key").attrs().await.unwrap_err();
        assert!(matches!(err, StoreError::BucketNotExist));

        let err = store.bucket("empty").object("key").attrs().await.unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotExist));

        let err = store
            .bucket("bucket")
            .object("key")
            .generation(42)
            .attrs()
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotExist));
    }

    #[tokio::test]
    async fn test_insert_keeps_attrs_verbatim() {
        let store = MemoryStorage::new();
        let attrs = ObjectAttrs {
            generation: 1234567890,
            crc32c: 0,
            ..Default::default()
        };
        store.insert("bucket", "key", attrs, "x").await;

        let got = store.bucket("bucket").object("key").attrs().await.unwrap();
        assert_eq!(got.generation, 1234567890);
        assert!(got.md5.is_empty());
        assert_eq!(got.bucket, "bucket");
        assert_eq!(got.name, "key");

        // Uploads continue after the highest generation seen.
        let next = store.upload("bucket", "key", "text/plain", "y").await;
        assert_eq!(next.generation, 1234567891);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStorage::new();
        store.upload("bucket", "key", "text/plain", "data").await;
        store
            .inject_fault(
                "bucket",
                "key",
                Fault::Status(UpstreamError::new(StatusCode::BAD_REQUEST, "bad request")),
            )
            .await;

        let err = store.bucket("bucket").object("key").attrs().await.unwrap_err();
        match err {
            StoreError::Status(upstream) => {
                assert_eq!(upstream.status, StatusCode::BAD_REQUEST);
                assert_eq!(upstream.body, "bad request");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reader_chunks_large_bodies() {
        let store = MemoryStorage::new();
        let data = vec![7u8; CHUNK_SIZE + 10];
        store.upload("bucket", "big", "application/octet-stream", data.clone()).await;

        let mut reader = store.bucket("bucket").object("big").new_reader().await.unwrap();
        assert_eq!(reader.chunk().await.unwrap().unwrap().len(), CHUNK_SIZE);
        assert_eq!(reader.chunk().await.unwrap().unwrap().len(), 10);
        assert!(reader.chunk().await.unwrap().is_none());
        assert_eq!(store.reader_calls(), 1);
    }
}
