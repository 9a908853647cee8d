//! Object store clients.
//!
//! The [`client::StorageClient`] trait abstracts over where objects live.
//! Implementations include the Cloud Storage JSON API and an in-memory
//! store used by tests.

pub mod client;
pub mod gcs;
pub mod memory;
