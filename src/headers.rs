//! Response header synthesis from object attributes.
//!
//! [`make_headers`] is a pure function of [`ObjectAttrs`].  Empty or zero
//! values are left out, except the CRC32-C hash which is always emitted.
//!
//! The store's native etag (e.g. `CPi68c7s4ugCEAM=`) is not a valid HTTP
//! entity tag, so the strong `ETag` is derived from the MD5 digest instead.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Datelike, Utc};
use http::header::{
    HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_ENCODING,
    CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use http::HeaderMap;
use tracing::warn;

use crate::storage::client::ObjectAttrs;

pub const X_GOOG_HASH: &str = "x-goog-hash";
pub const X_GOOG_GENERATION: &str = "x-goog-generation";
pub const X_GOOG_METAGENERATION: &str = "x-goog-metageneration";
pub const X_GOOG_META_PREFIX: &str = "x-goog-meta-";
pub const X_GOOG_STORED_CONTENT_LENGTH: &str = "x-goog-stored-content-length";
pub const X_GOOG_STORED_CONTENT_ENCODING: &str = "x-goog-stored-content-encoding";
pub const X_GOOG_STORAGE_CLASS: &str = "x-goog-storage-class";

/// Build the response headers describing `attrs`.
pub fn make_headers(attrs: &ObjectAttrs) -> HeaderMap {
    let mut headers = HeaderMap::new();

    // common http headers
    set_str(&mut headers, CONTENT_TYPE, &attrs.content_type);
    set_str(&mut headers, CONTENT_LANGUAGE, &attrs.content_language);
    set_str(&mut headers, CACHE_CONTROL, &attrs.cache_control);
    if attrs.size != 0 {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(attrs.size));
    }
    set_str(&mut headers, CONTENT_ENCODING, &attrs.content_encoding);
    set_str(&mut headers, CONTENT_DISPOSITION, &attrs.content_disposition);
    if let Some(date) = attrs.updated.and_then(http_date) {
        if let Ok(value) = HeaderValue::from_str(&date) {
            headers.insert(LAST_MODIFIED, value);
        }
    }

    // hashes
    if !attrs.md5.is_empty() {
        let md5 = format!("md5={}", STANDARD.encode(&attrs.md5));
        if let Ok(value) = HeaderValue::from_str(&md5) {
            headers.append(X_GOOG_HASH, value);
        }
        let etag = format!("\"{}\"", hex::encode(&attrs.md5));
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(ETAG, value);
        }
    }
    let crc32c = format!("crc32c={}", STANDARD.encode(attrs.crc32c.to_be_bytes()));
    if let Ok(value) = HeaderValue::from_str(&crc32c) {
        headers.append(X_GOOG_HASH, value);
    }

    // store-specific headers
    if attrs.generation != 0 {
        headers.insert(X_GOOG_GENERATION, HeaderValue::from(attrs.generation));
    }
    if attrs.metageneration != 0 {
        headers.insert(X_GOOG_METAGENERATION, HeaderValue::from(attrs.metageneration));
    }
    for (key, value) in &attrs.metadata {
        let name = format!("{X_GOOG_META_PREFIX}{key}");
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(key = %key, "skipping custom metadata not representable as a header"),
        }
    }
    if attrs.size != 0 {
        headers.insert(X_GOOG_STORED_CONTENT_LENGTH, HeaderValue::from(attrs.size));
    }
    set_str(&mut headers, X_GOOG_STORED_CONTENT_ENCODING, &attrs.content_encoding);
    set_str(&mut headers, X_GOOG_STORAGE_CLASS, &attrs.storage_class);

    headers
}

/// Format a timestamp as an RFC 1123 HTTP-date.  Sub-second precision is
/// dropped.  Returns `None` outside the representable range (1970..=9999).
pub fn http_date(t: DateTime<Utc>) -> Option<String> {
    if t.timestamp() < 0 || t.year() > 9999 {
        return None;
    }
    Some(httpdate::fmt_http_date(t.into()))
}

fn set_str<K>(headers: &mut HeaderMap, name: K, value: &str)
where
    K: http::header::IntoHeaderName,
{
    if value.is_empty() {
        return;
    }
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => warn!(value, "skipping attribute not representable as a header"),
    }
}
