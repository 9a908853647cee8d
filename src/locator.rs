//! Request-to-object resolution.
//!
//! `gs://<bucket>/<key>[#<generation>]` names an object.  Without a
//! generation the latest one is looked up and the handle is then pinned to
//! the generation that lookup reported, so the bytes streamed afterwards
//! are exactly the ones whose metadata was inspected even if the object is
//! overwritten in between.

use std::fmt;

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::errors::{Error, StoreError};
use crate::storage::client::{ObjectAttrs, ObjectHandle, StorageClient};
use crate::transport::ObjectRequest;

/// Bucket, key and (optionally) generation of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    pub bucket: String,
    pub key: String,
    /// `None` means "latest at the time of the request".
    pub generation: Option<i64>,
}

/// A locator pinned to a concrete generation, with that generation's
/// attributes and a handle addressing it.
pub struct ResolvedObject {
    pub locator: ResourceLocator,
    pub handle: Box<dyn ObjectHandle>,
    pub attrs: ObjectAttrs,
}

impl ResourceLocator {
    /// Build a locator from the URL parts.  An empty `fragment` means no
    /// generation; anything else must be a base-10 `i64`.
    pub fn new(host: &str, path: &str, fragment: &str) -> Result<Self, Error> {
        let generation = if fragment.is_empty() {
            None
        } else {
            let gen = fragment
                .parse::<i64>()
                .map_err(|source| Error::InvalidGeneration {
                    fragment: fragment.to_string(),
                    source,
                })?;
            Some(gen)
        };
        Ok(Self {
            bucket: host.to_string(),
            key: path.strip_prefix('/').unwrap_or(path).to_string(),
            generation,
        })
    }

    /// Locator of `req`.  The transport-level host wins over the URL
    /// authority when it is set.
    pub fn from_request(req: &ObjectRequest) -> Result<Self, Error> {
        let host = if req.host.is_empty() {
            req.url.host_str().unwrap_or_default()
        } else {
            req.host.as_str()
        };
        let path = percent_decode_str(&req.path).decode_utf8_lossy();
        let fragment = percent_decode_str(req.url.fragment().unwrap_or_default()).decode_utf8_lossy();
        Self::new(host, &path, &fragment)
    }

    /// Fetch the attributes of the addressed object and pin the handle to a
    /// concrete generation.  Makes exactly one metadata round-trip.
    pub async fn resolve(self, client: &dyn StorageClient) -> Result<ResolvedObject, StoreError> {
        let object = client.bucket(&self.bucket).object(&self.key);

        let (handle, attrs) = match self.generation {
            Some(gen) => {
                let handle = object.generation(gen);
                let attrs = handle.attrs().await?;
                (handle, attrs)
            }
            None => {
                let attrs = object.attrs().await?;
                (object.generation(attrs.generation), attrs)
            }
        };

        let locator = ResourceLocator {
            generation: Some(attrs.generation),
            ..self
        };
        debug!(%locator, "resolved object");
        Ok(ResolvedObject {
            locator,
            handle,
            attrs,
        })
    }
}

impl fmt::Display for ResourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.key)?;
        if let Some(gen) = self.generation {
            write!(f, "#{gen}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_new_without_generation() {
        let locator = ResourceLocator::new("bucket-name", "/dir/object-key", "").unwrap();
        assert_eq!(locator.bucket, "bucket-name");
        assert_eq!(locator.key, "dir/object-key");
        assert_eq!(locator.generation, None);
    }

    #[test]
    fn test_new_with_generation() {
        let locator = ResourceLocator::new("b", "/k", "1587160158394554").unwrap();
        assert_eq!(locator.generation, Some(1587160158394554));

        let negative = ResourceLocator::new("b", "/k", "-1").unwrap();
        assert_eq!(negative.generation, Some(-1));
    }

    #[test]
    fn test_new_invalid_generation() {
        let err = ResourceLocator::new("b", "/k", "latest").unwrap_err();
        assert!(matches!(err, Error::InvalidGeneration { ref fragment, .. } if fragment == "latest"));

        let overflow = ResourceLocator::new("b", "/k", "99999999999999999999").unwrap_err();
        assert!(matches!(overflow, Error::InvalidGeneration { .. }));
    }

    #[test]
    fn test_only_one_leading_slash_is_stripped() {
        let locator = ResourceLocator::new("b", "//k", "").unwrap();
        assert_eq!(locator.key, "/k");
    }

    #[test]
    fn test_from_request() {
        let req = ObjectRequest::get("gs://bucket-name/dir/file%20name.txt#42").unwrap();
        let locator = ResourceLocator::from_request(&req).unwrap();
        assert_eq!(locator.bucket, "bucket-name");
        assert_eq!(locator.key, "dir/file name.txt");
        assert_eq!(locator.generation, Some(42));
        assert_eq!(locator.to_string(), "gs://bucket-name/dir/file name.txt#42");
    }

    #[test]
    fn test_from_request_keeps_dot_segments() {
        let req = ObjectRequest::get("gs://b/a/../c").unwrap();
        assert_eq!(ResourceLocator::from_request(&req).unwrap().key, "a/../c");

        let req = ObjectRequest::get("gs://b/a/./c#7").unwrap();
        let locator = ResourceLocator::from_request(&req).unwrap();
        assert_eq!(locator.key, "a/./c");
        assert_eq!(locator.generation, Some(7));
    }

    #[test]
    fn test_from_request_prefers_transport_host() {
        let mut req = ObjectRequest::get("gs://url-bucket/key").unwrap();
        req.host = "host-bucket".to_string();
        let locator = ResourceLocator::from_request(&req).unwrap();
        assert_eq!(locator.bucket, "host-bucket");
    }

    #[tokio::test]
    async fn test_resolve_latest_pins_generation() {
        let store = MemoryStorage::new();
        store.upload("bucket", "key", "text/plain", "old").await;
        let latest = store.upload("bucket", "key", "text/plain", "new").await;

        let resolved = ResourceLocator::new("bucket", "/key", "")
            .unwrap()
            .resolve(&store)
            .await
            .unwrap();
        assert_eq!(resolved.locator.generation, Some(latest.generation));
        assert_eq!(resolved.attrs.generation, latest.generation);
        assert_eq!(store.attrs_calls(), 1);

        // An overwrite after resolution doesn't change what the handle reads.
        store.upload("bucket", "key", "text/plain", "newer").await;
        let mut reader = resolved.handle.new_reader().await.unwrap();
        assert_eq!(reader.attrs().generation, latest.generation);
        assert_eq!(reader.chunk().await.unwrap().unwrap(), "new");
    }

    #[tokio::test]
    async fn test_resolve_pinned_generation() {
        let store = MemoryStorage::new();
        let old = store.upload("bucket", "key", "text/plain", "old").await;
        store.upload("bucket", "key", "text/plain", "new").await;

        let resolved = ResourceLocator {
            bucket: "bucket".to_string(),
            key: "key".to_string(),
            generation: Some(old.generation),
        }
        .resolve(&store)
        .await
        .unwrap();
        assert_eq!(resolved.attrs.generation, old.generation);
        assert_eq!(resolved.locator.generation, Some(old.generation));
    }

    #[tokio::test]
    async fn test_resolve_missing_generation() {
        let store = MemoryStorage::new();
        store.upload("bucket", "key", "text/plain", "data").await;

        let err = ResourceLocator::new("bucket", "/key", "7777")
            .unwrap()
            .resolve(&store)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::ObjectNotExist));
    }
}
