//! HTTP/1.x round-trips against storage objects.
//!
//! [`Transport`] answers `GET` and `HEAD` requests for `gs://` URLs with
//! synthesized HTTP responses: headers derived from the object's
//! attributes, RFC 7232 preconditions, and the object bytes as a streamed
//! body.  Every response is `HTTP/1.0` with `close` set.
//!
//! Errors are split in two.  Anything the store reports as a structured
//! condition (missing object or bucket, an upstream HTTP status) becomes a
//! response; everything else is returned as an [`Error`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderValue, CONNECTION};
use http::{HeaderMap, Method, StatusCode, Version};
use tracing::{debug, warn};
use url::Url;

use crate::conditions::{self, ConditionalHeaders, Disposition};
use crate::config::GcsConfig;
use crate::errors::{Error, StoreError};
use crate::headers::make_headers;
use crate::locator::ResourceLocator;
use crate::metrics;
use crate::storage::client::{ObjectReader, ReaderAttrs, StorageClient};
use crate::storage::gcs::GcsClient;

// -- Request ------------------------------------------------------------------

/// An HTTP request addressed to a storage object.
#[derive(Debug, Clone)]
pub struct ObjectRequest {
    pub method: Method,
    /// Full request URL, fragment included.
    pub url: Url,
    /// Path exactly as written in the request, still percent-encoded.
    /// `Url` removes `.` and `..` segments, which would address another key.
    pub path: String,
    /// Transport-level host.  Takes precedence over the URL authority when
    /// not empty.
    pub host: String,
    pub headers: HeaderMap,
}

impl ObjectRequest {
    pub fn new(method: Method, url: &str) -> Result<Self, Error> {
        let path = raw_path(url).to_string();
        let url = Url::parse(url).map_err(|source| Error::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        Ok(Self {
            method,
            url,
            path,
            host: String::new(),
            headers: HeaderMap::new(),
        })
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    pub fn head(url: &str) -> Result<Self, Error> {
        Self::new(Method::HEAD, url)
    }
}

/// The path component of `input`: after the scheme and authority, before
/// any query or fragment.
fn raw_path(input: &str) -> &str {
    let input = input.trim();
    let rest = input.split_once(':').map_or(input, |(_, rest)| rest);
    let rest = match rest.strip_prefix("//") {
        Some(authority) => {
            let end = authority.find(['/', '?', '#']).unwrap_or(authority.len());
            &authority[end..]
        }
        None => rest,
    };
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

// -- Body ---------------------------------------------------------------------

/// Response body: nothing, a buffered payload, or an open object reader.
///
/// Dropping the body closes the reader.
#[derive(Default)]
pub struct ObjectBody {
    kind: BodyKind,
}

#[derive(Default)]
enum BodyKind {
    #[default]
    Empty,
    Full(Option<Bytes>),
    Reader(Box<dyn ObjectReader>),
}

impl ObjectBody {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn full(data: impl Into<Bytes>) -> Self {
        Self {
            kind: BodyKind::Full(Some(data.into())),
        }
    }

    pub fn reader(reader: Box<dyn ObjectReader>) -> Self {
        Self {
            kind: BodyKind::Reader(reader),
        }
    }

    /// Attributes reported by the underlying reader, if the body streams
    /// from one.
    pub fn reader_attrs(&self) -> Option<&ReaderAttrs> {
        match &self.kind {
            BodyKind::Reader(reader) => Some(reader.attrs()),
            _ => None,
        }
    }

    /// Next chunk of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, StoreError> {
        match &mut self.kind {
            BodyKind::Empty => Ok(None),
            BodyKind::Full(data) => Ok(data.take().filter(|d| !d.is_empty())),
            BodyKind::Reader(reader) => reader.chunk().await,
        }
    }

    /// Collect the remaining body into one buffer.
    pub async fn bytes(mut self) -> Result<Bytes, StoreError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BodyKind::Empty => f.write_str("ObjectBody::Empty"),
            BodyKind::Full(data) => f
                .debug_tuple("ObjectBody::Full")
                .field(&data.as_ref().map_or(0, Bytes::len))
                .finish(),
            BodyKind::Reader(reader) => f
                .debug_tuple("ObjectBody::Reader")
                .field(reader.attrs())
                .finish(),
        }
    }
}

// -- Response -----------------------------------------------------------------

/// A synthesized HTTP response.
#[derive(Debug)]
pub struct ObjectResponse {
    pub status: StatusCode,
    /// Always `HTTP/1.0`.
    pub version: Version,
    pub headers: HeaderMap,
    pub body: ObjectBody,
    /// Declared body length.  Zero for everything but successful reads,
    /// including `HEAD` which declares the object size.
    pub content_length: u64,
    /// Always `true`; the connection is not reused.
    pub close: bool,
}

impl ObjectResponse {
    fn new(status: StatusCode, headers: HeaderMap, body: ObjectBody, content_length: u64) -> Self {
        Self {
            status,
            version: Version::HTTP_10,
            headers,
            body,
            content_length,
            close: true,
        }
    }

    fn empty(status: StatusCode, headers: HeaderMap) -> Self {
        Self::new(status, headers, ObjectBody::empty(), 0)
    }

    /// Convert into an [`http::Response`], adding `Connection: close` when
    /// [`close`](Self::close) is set.
    pub fn into_http(self) -> http::Response<ObjectBody> {
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.version_mut() = self.version;
        *response.headers_mut() = self.headers;
        if self.close {
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}

// -- Transport ----------------------------------------------------------------

/// Serves object requests from a [`StorageClient`].
///
/// Holds no per-request state; clones share the client and may be used
/// from many tasks at once.
#[derive(Clone)]
pub struct Transport {
    client: Arc<dyn StorageClient>,
}

impl Transport {
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self { client }
    }

    /// Transport backed by the Cloud Storage JSON API.
    pub fn with_gcs(config: &GcsConfig) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(GcsClient::new(config)?)))
    }

    /// Execute one request.
    ///
    /// `Ok` carries every HTTP-level outcome, including 404, 405, 304, 412
    /// and upstream statuses.  `Err` means no response could be produced.
    /// Dropping the returned future abandons the request.
    pub async fn round_trip(&self, req: &ObjectRequest) -> Result<ObjectResponse, Error> {
        let started = Instant::now();
        let result = if req.method == Method::GET || req.method == Method::HEAD {
            self.serve_object(req).await
        } else {
            debug!(method = %req.method, "method not allowed");
            Ok(ObjectResponse::empty(
                StatusCode::METHOD_NOT_ALLOWED,
                HeaderMap::new(),
            ))
        };
        metrics::record_request(
            &req.method,
            result.as_ref().ok().map(|resp| resp.status),
            started.elapsed(),
        );
        result
    }

    async fn serve_object(&self, req: &ObjectRequest) -> Result<ObjectResponse, Error> {
        let locator = ResourceLocator::from_request(req)?;
        let resolved = match locator.resolve(self.client.as_ref()).await {
            Ok(resolved) => resolved,
            Err(err) => return handle_error(err, &req.method),
        };

        let mut headers = make_headers(&resolved.attrs);
        let cond = ConditionalHeaders::from_headers(&req.headers);
        match conditions::evaluate(&cond, &headers, resolved.attrs.updated) {
            Disposition::Proceed => {}
            Disposition::PreconditionFailed => {
                debug!(locator = %resolved.locator, "precondition failed");
                return Ok(ObjectResponse::empty(
                    StatusCode::PRECONDITION_FAILED,
                    headers,
                ));
            }
            Disposition::NotModified => {
                debug!(locator = %resolved.locator, "not modified");
                conditions::strip_for_not_modified(&mut headers);
                return Ok(ObjectResponse::empty(StatusCode::NOT_MODIFIED, headers));
            }
        }

        let size = u64::try_from(resolved.attrs.size).unwrap_or_default();
        if req.method == Method::HEAD {
            return Ok(ObjectResponse::new(
                StatusCode::OK,
                headers,
                ObjectBody::empty(),
                size,
            ));
        }

        let reader = match resolved.handle.new_reader().await {
            Ok(reader) => reader,
            Err(err) => return handle_error(err, &req.method),
        };
        if reader.attrs().generation != resolved.attrs.generation {
            warn!(
                locator = %resolved.locator,
                reader_generation = reader.attrs().generation,
                "reader generation differs from resolved generation"
            );
        }
        Ok(ObjectResponse::new(
            StatusCode::OK,
            headers,
            ObjectBody::reader(reader),
            size,
        ))
    }
}

/// Turn a storage error into a response where the store gave a definite
/// answer, or into a hard error otherwise.  HEAD responses never carry the
/// upstream payload, only its length.
fn handle_error(err: StoreError, method: &Method) -> Result<ObjectResponse, Error> {
    metrics::record_store_error(&err);
    match err {
        StoreError::ObjectNotExist | StoreError::BucketNotExist => {
            debug!(error = %err, "object not found");
            Ok(ObjectResponse::empty(StatusCode::NOT_FOUND, HeaderMap::new()))
        }
        StoreError::Status(upstream) => {
            debug!(status = %upstream.status, "passing through upstream status");
            let content_length = upstream.body.len() as u64;
            let body = if method == Method::HEAD {
                ObjectBody::empty()
            } else {
                ObjectBody::full(upstream.body)
            };
            Ok(ObjectResponse::new(
                upstream.status,
                upstream.headers,
                body,
                content_length,
            ))
        }
        err => Err(err.into()),
    }
}

impl tower::Service<ObjectRequest> for Transport {
    type Response = http::Response<ObjectBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ObjectRequest) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move {
            transport
                .round_trip(&req)
                .await
                .map(ObjectResponse::into_http)
        })
    }
}
