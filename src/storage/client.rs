//! Object Store Client capability traits.
//!
//! The transport never talks to a concrete store.  It resolves a bucket,
//! resolves an object in it, optionally pins a generation, and then asks for
//! attributes or a reader.  Each step is a small trait so an in-memory fake
//! can stand in for Google Cloud Storage.
//!
//! Every returned future may be dropped to cancel the call.  Dropping an
//! [`ObjectReader`] releases the underlying stream.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::errors::StoreError;

/// Boxed future returned by the store traits.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Read-only snapshot of one object generation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectAttrs {
    pub bucket: String,
    pub name: String,
    pub content_type: String,
    pub content_language: String,
    pub content_encoding: String,
    pub cache_control: String,
    pub content_disposition: String,
    /// Size in bytes.
    pub size: i64,
    /// Last modification time, if the store reported one.
    pub updated: Option<DateTime<Utc>>,
    /// Raw MD5 digest.  Empty for composite objects.
    pub md5: Vec<u8>,
    pub crc32c: u32,
    pub generation: i64,
    pub metageneration: i64,
    pub storage_class: String,
    /// Custom metadata.
    pub metadata: HashMap<String, String>,
}

/// Attributes observed when a reader is opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderAttrs {
    pub content_type: String,
    pub content_encoding: String,
    pub cache_control: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub generation: i64,
    pub metageneration: i64,
}

/// Entry point of a store: resolves buckets by name.
pub trait StorageClient: Send + Sync + 'static {
    fn bucket(&self, name: &str) -> Box<dyn BucketHandle>;
}

/// A bucket, resolving objects by key.
pub trait BucketHandle: Send + Sync {
    fn object(&self, key: &str) -> Box<dyn ObjectHandle>;
}

/// An object, optionally pinned to a single generation.
pub trait ObjectHandle: Send + Sync {
    /// Return a handle that only ever addresses generation `gen`.
    fn generation(&self, gen: i64) -> Box<dyn ObjectHandle>;

    /// Fetch the attributes of the addressed generation.
    fn attrs(&self) -> StoreFuture<'_, ObjectAttrs>;

    /// Open a byte stream over the addressed generation.
    fn new_reader(&self) -> StoreFuture<'_, Box<dyn ObjectReader>>;
}

/// An open byte stream.
pub trait ObjectReader: Send {
    /// Attributes as seen at open time.
    fn attrs(&self) -> &ReaderAttrs;

    /// Next chunk of the body, or `None` at end of stream.
    fn chunk(&mut self) -> StoreFuture<'_, Option<Bytes>>;
}
