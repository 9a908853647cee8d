//! gsprotocol library -- HTTP GET/HEAD semantics over Cloud Storage objects.
//!
//! A [`transport::Transport`] turns requests for `gs://bucket/key[#generation]`
//! URLs into HTTP/1.0 responses: headers synthesized from object
//! attributes, RFC 7232 conditional requests, and the object body streamed
//! from a generation pinned at lookup time.

pub mod conditions;
pub mod config;
pub mod errors;
pub mod headers;
pub mod locator;
pub mod metrics;
pub mod storage;
pub mod transport;

pub use errors::{Error, StoreError};
pub use locator::ResourceLocator;
pub use transport::{ObjectBody, ObjectRequest, ObjectResponse, Transport};
