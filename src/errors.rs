//! Error types for the object store collaborator and the transport.
//!
//! [`StoreError`] is what an Object Store Client reports.  Some of its
//! variants are recovered into HTTP responses by the transport (see
//! [`crate::transport`]); the rest surface as a hard [`Error`] so the
//! caller can decide whether to retry.

use std::fmt;
use std::num::ParseIntError;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use thiserror::Error;

/// A structured error returned by the upstream store, carrying its own
/// status, headers and body.
#[derive(Debug, Clone)]
pub struct UpstreamError {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Response payload, byte for byte.
    pub body: Bytes,
}

impl UpstreamError {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, String::from_utf8_lossy(&self.body))
    }
}

/// Failures reported by an Object Store Client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object (or the pinned generation of it) does not exist.
    #[error("storage: object doesn't exist")]
    ObjectNotExist,

    /// The bucket does not exist.
    #[error("storage: bucket doesn't exist")]
    BucketNotExist,

    /// The store answered with an error status and payload.
    #[error("storage: upstream returned {0}")]
    Status(UpstreamError),

    /// The streamed bytes did not match the CRC32-C the store advertised.
    #[error("storage: crc32c mismatch, expected {expected:#010x}, got {got:#010x}")]
    ChecksumMismatch { expected: u32, got: u32 },

    /// Network failure, auth failure or any other unexpected condition.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl StoreError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::ObjectNotExist => "object_not_exist",
            StoreError::BucketNotExist => "bucket_not_exist",
            StoreError::Status(_) => "status",
            StoreError::ChecksumMismatch { .. } => "checksum_mismatch",
            StoreError::Transport(_) => "transport",
        }
    }
}

/// Hard failures of a round trip.  These are never turned into HTTP
/// responses.
#[derive(Debug, Error)]
pub enum Error {
    /// The request URL could not be parsed.
    #[error("gsprotocol: invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The URL fragment is not a base-10 signed 64-bit generation.
    #[error("gsprotocol: invalid generation {fragment}: {source}")]
    InvalidGeneration {
        fragment: String,
        #[source]
        source: ParseIntError,
    },

    /// A store failure that has no HTTP translation.
    #[error(transparent)]
    Store(#[from] StoreError),
}
