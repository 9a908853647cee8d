//! Google Cloud Storage client over the GCS JSON API.
//!
//! Attributes come from `GET /storage/v1/b/{bucket}/o/{object}` and bytes
//! from the same URL with `alt=media`.  A pinned generation is passed as the
//! `generation` query parameter on both calls.
//!
//! Credentials are resolved via Application Default Credentials (ADC):
//!   - `GOOGLE_OAUTH_ACCESS_TOKEN` environment variable (raw access token)
//!   - `GOOGLE_APPLICATION_CREDENTIALS` environment variable (key file)
//!   - gcloud CLI auth (`gcloud auth application-default login`)
//!   - GCE metadata server (when running on Google Cloud)
//!
//! or skipped entirely in anonymous mode for public buckets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{
    BucketHandle, ObjectAttrs, ObjectHandle, ObjectReader, ReaderAttrs, StorageClient, StoreFuture,
};
use crate::config::GcsConfig;
use crate::errors::{StoreError, UpstreamError};

/// Read-only access is all the transport needs.
const READ_ONLY_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";

/// Default OAuth2 token endpoint.
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// GCE metadata server token endpoint.
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

// -- GCS JSON API response types -----------------------------------------------

/// Object resource as returned by `objects.get`.  Integers are encoded as
/// decimal strings and hashes as base64.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct GcsObject {
    bucket: String,
    name: String,
    content_type: String,
    content_language: String,
    content_encoding: String,
    cache_control: String,
    content_disposition: String,
    size: Option<String>,
    updated: Option<DateTime<Utc>>,
    md5_hash: Option<String>,
    crc32c: Option<String>,
    generation: Option<String>,
    metageneration: Option<String>,
    storage_class: String,
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GcsErrorResponse {
    error: Option<GcsErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Claims of the JWT bearer assertion for a service account.
#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Subset of a credentials JSON file (service account or authorized user).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CredentialsFile {
    #[serde(rename = "type")]
    cred_type: String,
    client_email: String,
    private_key: String,
    token_uri: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl TryFrom<GcsObject> for ObjectAttrs {
    type Error = anyhow::Error;

    fn try_from(obj: GcsObject) -> anyhow::Result<Self> {
        let md5 = match obj.md5_hash.as_deref() {
            Some(v) if !v.is_empty() => STANDARD.decode(v).context("decoding md5Hash")?,
            _ => Vec::new(),
        };
        let crc32c = match obj.crc32c.as_deref() {
            Some(v) if !v.is_empty() => decode_crc32c(v).context("decoding crc32c")?,
            _ => 0,
        };
        Ok(ObjectAttrs {
            bucket: obj.bucket,
            name: obj.name,
            content_type: obj.content_type,
            content_language: obj.content_language,
            content_encoding: obj.content_encoding,
            cache_control: obj.cache_control,
            content_disposition: obj.content_disposition,
            size: parse_decimal(obj.size.as_deref()).context("parsing size")?,
            updated: obj.updated,
            md5,
            crc32c,
            generation: parse_decimal(obj.generation.as_deref()).context("parsing generation")?,
            metageneration: parse_decimal(obj.metageneration.as_deref())
                .context("parsing metageneration")?,
            storage_class: obj.storage_class,
            metadata: obj.metadata.unwrap_or_default(),
        })
    }
}

fn parse_decimal(v: Option<&str>) -> anyhow::Result<i64> {
    match v {
        Some(s) if !s.is_empty() => Ok(s.parse()?),
        _ => Ok(0),
    }
}

/// Decode a base64 big-endian CRC32-C.
fn decode_crc32c(v: &str) -> anyhow::Result<u32> {
    let raw = STANDARD.decode(v)?;
    let bytes: [u8; 4] = raw
        .as_slice()
        .try_into()
        .map_err(|_| anyhow::anyhow!("crc32c must be 4 bytes, got {}", raw.len()))?;
    Ok(u32::from_be_bytes(bytes))
}

/// Extract the `crc32c=` component of the `x-goog-hash` headers.
fn header_crc32c(headers: &HeaderMap) -> Option<u32> {
    headers
        .get_all("x-goog-hash")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|v| v.trim().strip_prefix("crc32c="))
        .and_then(|v| decode_crc32c(v).ok())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn header_i64(headers: &HeaderMap, name: &str) -> i64 {
    header_str(headers, name).parse().unwrap_or(0)
}

fn reader_attrs(headers: &HeaderMap) -> ReaderAttrs {
    let last_modified = httpdate::parse_http_date(header_str(headers, "last-modified"))
        .ok()
        .map(DateTime::<Utc>::from);
    ReaderAttrs {
        content_type: header_str(headers, "content-type").to_string(),
        content_encoding: header_str(headers, "content-encoding").to_string(),
        cache_control: header_str(headers, "cache-control").to_string(),
        size: header_i64(headers, "content-length"),
        last_modified,
        generation: header_i64(headers, "x-goog-generation"),
        metageneration: header_i64(headers, "x-goog-metageneration"),
    }
}

// -- Token management ---------------------------------------------------------

/// Cached access token with expiry.
struct CachedToken {
    access_token: String,
    expiry: Instant,
}

struct GcsInner {
    client: reqwest::Client,
    /// API endpoint, e.g. `https://storage.googleapis.com`.
    endpoint: String,
    /// Skip authentication entirely.
    anonymous: bool,
    /// Explicit key file, takes precedence over `GOOGLE_APPLICATION_CREDENTIALS`.
    credentials_file: Option<String>,
    token_cache: Mutex<Option<CachedToken>>,
}

/// [`StorageClient`] backed by Google Cloud Storage.
#[derive(Clone)]
pub struct GcsClient {
    inner: Arc<GcsInner>,
}

impl GcsClient {
    /// Create a client.  Credentials are resolved lazily on the first call.
    pub fn new(config: &GcsConfig) -> anyhow::Result<Self> {
        // Bounds connect and each read; a whole download may take longer.
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        let credentials_file =
            (!config.credentials_file.is_empty()).then(|| config.credentials_file.clone());

        info!(
            "GCS client initialized: endpoint={} anonymous={}",
            config.endpoint, config.anonymous
        );

        Ok(Self {
            inner: Arc::new(GcsInner {
                client,
                endpoint: config.endpoint.trim_end_matches('/').to_string(),
                anonymous: config.anonymous,
                credentials_file,
                token_cache: Mutex::new(None),
            }),
        })
    }
}

impl GcsInner {
    /// Get an OAuth2 access token, reusing the cached one until 60s before
    /// it expires.
    async fn access_token(&self) -> anyhow::Result<String> {
        let mut cache = self.token_cache.lock().await;
        if let Some(ref cached) = *cache {
            if cached.expiry > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let token = self.fetch_access_token().await?;
        let expiry = Instant::now() + Duration::from_secs(token.expires_in.saturating_sub(60));
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expiry,
        });
        Ok(token.access_token)
    }

    async fn fetch_access_token(&self) -> anyhow::Result<TokenResponse> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            return Ok(TokenResponse {
                access_token: token,
                expires_in: default_expires_in(),
            });
        }

        let explicit = self
            .credentials_file
            .clone()
            .or_else(|| std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok());
        if let Some(path) = explicit {
            return self.token_from_file(&path).await;
        }

        let adc_path = application_default_credentials_path();
        if let Ok(true) = tokio::fs::try_exists(&adc_path).await {
            return self.token_from_file(&adc_path).await;
        }

        self.token_from_metadata_server().await
    }

    async fn token_from_file(&self, path: &str) -> anyhow::Result<TokenResponse> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read credentials file {path}"))?;
        let creds: CredentialsFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials file {path}"))?;

        match creds.cred_type.as_str() {
            "service_account" => self.token_from_service_account(&creds).await,
            "authorized_user" => self.token_from_refresh(&creds).await,
            other => Err(anyhow::anyhow!(
                "Unsupported credential type in {path}: {other}"
            )),
        }
    }

    /// Sign a JWT with the service account key and exchange it for a token.
    async fn token_from_service_account(
        &self,
        creds: &CredentialsFile,
    ) -> anyhow::Result<TokenResponse> {
        let token_uri = if creds.token_uri.is_empty() {
            DEFAULT_TOKEN_URI
        } else {
            creds.token_uri.as_str()
        };
        let iat = Utc::now().timestamp();
        let claims = JwtClaims {
            iss: &creds.client_email,
            scope: READ_ONLY_SCOPE,
            aud: token_uri,
            iat,
            exp: iat + 3600,
        };
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(creds.private_key.as_bytes())
            .context("Invalid private_key in service account key")?;
        let assertion = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &key,
        )
        .context("Failed to sign service account JWT")?;

        self.exchange_token(
            token_uri,
            &[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ],
        )
        .await
    }

    /// Exchange a refresh token for an access token.
    async fn token_from_refresh(&self, creds: &CredentialsFile) -> anyhow::Result<TokenResponse> {
        self.exchange_token(
            DEFAULT_TOKEN_URI,
            &[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ],
        )
        .await
    }

    async fn exchange_token(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> anyhow::Result<TokenResponse> {
        let resp = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Token request failed ({status}): {body}"));
        }
        Ok(resp.json().await?)
    }

    async fn token_from_metadata_server(&self) -> anyhow::Result<TokenResponse> {
        let resp = self
            .client
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Metadata server request failed: {e}. \
                     Set GOOGLE_APPLICATION_CREDENTIALS, run 'gcloud auth application-default login', \
                     set GOOGLE_OAUTH_ACCESS_TOKEN, or enable anonymous access."
                )
            })?;

        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "Metadata server returned {}",
                resp.status()
            ));
        }
        Ok(resp.json().await?)
    }

    /// Build authorization headers for GCS API calls.
    async fn auth_headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if self.anonymous {
            return Ok(headers);
        }
        let token = self.access_token().await?;
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| anyhow::anyhow!("Invalid auth header value: {e}"))?,
        );
        Ok(headers)
    }

    fn object_url(&self, bucket: &str, object: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            url_encode(bucket),
            url_encode(object)
        )
    }

    /// Issue a GET against the object resource and map error statuses.
    async fn get_object(
        &self,
        bucket: &str,
        object: &str,
        generation: Option<i64>,
        media: bool,
    ) -> Result<reqwest::Response, StoreError> {
        let auth = self.auth_headers().await?;
        let mut query: Vec<(&str, String)> = Vec::new();
        if media {
            query.push(("alt", "media".to_string()));
        }
        if let Some(gen) = generation {
            query.push(("generation", gen.to_string()));
        }

        let url = self.object_url(bucket, object);
        debug!(%url, ?generation, media, "GCS object request");
        let resp = self
            .client
            .get(&url)
            .headers(auth)
            .query(&query)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("GCS request failed: {e}"))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let headers = resp.headers().clone();
        let body = resp.bytes().await.unwrap_or_default();
        Err(map_gcs_error(status, headers, body))
    }
}

/// Get the path to gcloud application-default credentials.
fn application_default_credentials_path() -> String {
    if let Ok(config_dir) = std::env::var("CLOUDSDK_CONFIG") {
        return format!("{config_dir}/application_default_credentials.json");
    }
    if let Ok(home) = std::env::var("HOME") {
        return format!("{home}/.config/gcloud/application_default_credentials.json");
    }
    ".config/gcloud/application_default_credentials.json".to_string()
}

/// URL-encode a bucket or object name for use in API paths.
fn url_encode(name: &str) -> String {
    percent_encoding::utf8_percent_encode(name, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// Map a GCS error response to a [`StoreError`].
///
/// 404 becomes one of the not-exist variants, depending on whether the
/// message says the bucket is missing.  Everything else is passed through.
fn map_gcs_error(status: StatusCode, headers: HeaderMap, body: Bytes) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        let message = serde_json::from_slice::<GcsErrorResponse>(&body)
            .ok()
            .and_then(|r| r.error)
            .and_then(|e| e.message)
            .unwrap_or_default()
            .to_ascii_lowercase();
        // "The specified bucket does not exist." vs "No such object: b/o".
        if message.contains("bucket does not exist") || message.starts_with("no such bucket") {
            return StoreError::BucketNotExist;
        }
        return StoreError::ObjectNotExist;
    }
    StoreError::Status(UpstreamError {
        status,
        headers,
        body,
    })
}

// -- Handles ------------------------------------------------------------------

impl StorageClient for GcsClient {
    fn bucket(&self, name: &str) -> Box<dyn BucketHandle> {
        Box::new(GcsBucket {
            inner: self.inner.clone(),
            bucket: name.to_string(),
        })
    }
}

struct GcsBucket {
    inner: Arc<GcsInner>,
    bucket: String,
}

impl BucketHandle for GcsBucket {
    fn object(&self, key: &str) -> Box<dyn ObjectHandle> {
        Box::new(GcsObjectHandle {
            inner: self.inner.clone(),
            bucket: self.bucket.clone(),
            name: key.to_string(),
            generation: None,
        })
    }
}

struct GcsObjectHandle {
    inner: Arc<GcsInner>,
    bucket: String,
    name: String,
    generation: Option<i64>,
}

impl ObjectHandle for GcsObjectHandle {
    fn generation(&self, gen: i64) -> Box<dyn ObjectHandle> {
        Box::new(GcsObjectHandle {
            inner: self.inner.clone(),
            bucket: self.bucket.clone(),
            name: self.name.clone(),
            generation: Some(gen),
        })
    }

    fn attrs(&self) -> StoreFuture<'_, ObjectAttrs> {
        Box::pin(async move {
            let resp = self
                .inner
                .get_object(&self.bucket, &self.name, self.generation, false)
                .await?;
            let obj: GcsObject = resp
                .json()
                .await
                .map_err(|e| anyhow::anyhow!("GCS object metadata decode failed: {e}"))?;
            Ok(ObjectAttrs::try_from(obj)?)
        })
    }

    fn new_reader(&self) -> StoreFuture<'_, Box<dyn ObjectReader>> {
        Box::pin(async move {
            let resp = self
                .inner
                .get_object(&self.bucket, &self.name, self.generation, true)
                .await?;
            let headers = resp.headers();
            // Decompressive transcoding serves bytes the checksum wasn't computed over.
            let transcoded = header_str(headers, "x-goog-stored-content-encoding") == "gzip";
            let expected_crc32c = if transcoded {
                None
            } else {
                header_crc32c(headers)
            };
            let reader: Box<dyn ObjectReader> = Box::new(GcsReader {
                attrs: reader_attrs(headers),
                response: resp,
                expected_crc32c,
                crc32c: 0,
            });
            Ok(reader)
        })
    }
}

/// Streams a media download, verifying CRC32-C at end of stream.
struct GcsReader {
    attrs: ReaderAttrs,
    response: reqwest::Response,
    expected_crc32c: Option<u32>,
    crc32c: u32,
}

impl ObjectReader for GcsReader {
    fn attrs(&self) -> &ReaderAttrs {
        &self.attrs
    }

    fn chunk(&mut self) -> StoreFuture<'_, Option<Bytes>> {
        Box::pin(async move {
            let chunk = self
                .response
                .chunk()
                .await
                .map_err(|e| anyhow::anyhow!("GCS download body read failed: {e}"))?;
            match chunk {
                Some(bytes) => {
                    self.crc32c = crc32c::crc32c_append(self.crc32c, &bytes);
                    Ok(Some(bytes))
                }
                None => {
                    if let Some(expected) = self.expected_crc32c {
                        if expected != self.crc32c {
                            warn!(expected, got = self.crc32c, "GCS download checksum mismatch");
                            return Err(StoreError::ChecksumMismatch {
                                expected,
                                got: self.crc32c,
                            });
                        }
                    }
                    Ok(None)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_json_to_attrs() {
        let json = r#"{
            "kind": "storage#object",
            "bucket": "bucket-name",
            "name": "object-key",
            "contentType": "text/plain",
            "contentLanguage": "ja-JP",
            "cacheControl": "public, max-age=60",
            "size": "27",
            "updated": "2020-04-15T00:56:00.123Z",
            "md5Hash": "C0bzBuktiFFeBtSKYtzDGQ==",
            "crc32c": "f3Yv4g==",
            "etag": "CPi68c7s4ugCEAM=",
            "generation": "1234567890",
            "metageneration": "5",
            "storageClass": "MULTI_REGIONAL",
            "metadata": {"foo": "bar"}
        }"#;
        let obj: GcsObject = serde_json::from_str(json).unwrap();
        let attrs = ObjectAttrs::try_from(obj).unwrap();

        assert_eq!(attrs.bucket, "bucket-name");
        assert_eq!(attrs.content_type, "text/plain");
        assert_eq!(attrs.size, 27);
        assert_eq!(hex::encode(&attrs.md5), "0b46f306e92d88515e06d48a62dcc319");
        assert_eq!(attrs.crc32c, 0x7f762fe2);
        assert_eq!(attrs.generation, 1234567890);
        assert_eq!(attrs.metageneration, 5);
        assert_eq!(attrs.storage_class, "MULTI_REGIONAL");
        assert_eq!(attrs.metadata.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(
            attrs.updated.unwrap().to_rfc3339(),
            "2020-04-15T00:56:00.123+00:00"
        );
    }

    #[test]
    fn test_composite_object_without_md5() {
        let json = r#"{"name": "composed", "crc32c": "AAAAAA==", "size": "0"}"#;
        let obj: GcsObject = serde_json::from_str(json).unwrap();
        let attrs = ObjectAttrs::try_from(obj).unwrap();
        assert!(attrs.md5.is_empty());
        assert_eq!(attrs.crc32c, 0);
        assert!(attrs.updated.is_none());
    }

    #[test]
    fn test_malformed_crc32c_is_rejected() {
        let json = r#"{"crc32c": "AAAA"}"#;
        let obj: GcsObject = serde_json::from_str(json).unwrap();
        assert!(ObjectAttrs::try_from(obj).is_err());
    }

    #[test]
    fn test_header_crc32c() {
        let mut headers = HeaderMap::new();
        headers.append("x-goog-hash", HeaderValue::from_static("md5=C0bzBuktiFFeBtSKYtzDGQ=="));
        headers.append("x-goog-hash", HeaderValue::from_static("crc32c=SZYC0g=="));
        assert_eq!(header_crc32c(&headers), Some(1234567890));

        let mut combined = HeaderMap::new();
        combined.insert(
            "x-goog-hash",
            HeaderValue::from_static("crc32c=AAAAAA==,md5=something"),
        );
        assert_eq!(header_crc32c(&combined), Some(0));

        let mut invalid = HeaderMap::new();
        invalid.insert("x-goog-hash", HeaderValue::from_static("crc32c=hello"));
        assert_eq!(header_crc32c(&invalid), None);
    }

    #[test]
    fn test_reader_attrs_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.insert("content-length", HeaderValue::from_static("27"));
        headers.insert(
            "last-modified",
            HeaderValue::from_static("Wed, 15 Apr 2020 00:56:00 GMT"),
        );
        headers.insert("x-goog-generation", HeaderValue::from_static("1234567890"));
        headers.insert("x-goog-metageneration", HeaderValue::from_static("5"));

        let attrs = reader_attrs(&headers);
        assert_eq!(attrs.content_type, "text/plain");
        assert_eq!(attrs.size, 27);
        assert_eq!(attrs.generation, 1234567890);
        assert_eq!(attrs.metageneration, 5);
        assert_eq!(attrs.last_modified.unwrap().timestamp(), 1586912160);
    }

    #[test]
    fn test_map_gcs_error() {
        let err = map_gcs_error(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            Bytes::from_static(br#"{"error": {"code": 404, "message": "No such object: b/o"}}"#),
        );
        assert!(matches!(err, StoreError::ObjectNotExist));

        // The object path names the bucket, but it's the object that's missing.
        let err = map_gcs_error(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            Bytes::from_static(
                br#"{"error": {"code": 404, "message": "No such object: my-bucket/key"}}"#,
            ),
        );
        assert!(matches!(err, StoreError::ObjectNotExist));

        let err = map_gcs_error(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            Bytes::from_static(
                br#"{"error": {"code": 404, "message": "The specified bucket does not exist."}}"#,
            ),
        );
        assert!(matches!(err, StoreError::BucketNotExist));

        let err = map_gcs_error(
            StatusCode::BAD_REQUEST,
            HeaderMap::new(),
            Bytes::from_static(b"\xffnope"),
        );
        match err {
            StoreError::Status(upstream) => {
                assert_eq!(upstream.status, StatusCode::BAD_REQUEST);
                assert_eq!(&upstream.body[..], b"\xffnope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_object_url_encoding() {
        let client = GcsClient::new(&GcsConfig {
            endpoint: "https://storage.googleapis.com/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            client.inner.object_url("bucket-name", "dir/file name.txt"),
            "https://storage.googleapis.com/storage/v1/b/bucket%2Dname/o/dir%2Ffile%20name%2Etxt"
        );
    }

    #[test]
    fn test_client_builds_with_streaming_timeouts() {
        let client = GcsClient::new(&GcsConfig {
            timeout_secs: 1,
            ..Default::default()
        });
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_anonymous_mode_sends_no_authorization() {
        let client = GcsClient::new(&GcsConfig {
            anonymous: true,
            ..Default::default()
        })
        .unwrap();
        let headers = client.inner.auth_headers().await.unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }
}
