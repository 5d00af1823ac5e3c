//! S3-compatible object store backend.
//!
//! Objects are read with byte-range GETs. When credentials are configured,
//! every request carries an AWS Signature Version 4 `Authorization` header
//! (unsigned payload hash of the empty body); otherwise requests go out
//! anonymously, which works for public buckets.

use std::fmt::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use hmac::digest::Output;
use hmac::{Hmac, Mac};
use reqwest::header::RANGE;
use reqwest::{Method, RequestBuilder, Url};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::trace;

use super::http::{build_client, check_status, object_length, range_header, ranged_body, transport};
use super::{check_bounds, BoxFuture, RangeError, RangeReader};

type HmacSha256 = Hmac<Sha256>;

/// Default region when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// SHA-256 of the empty request body.
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Access key pair for request signing.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN` from the environment.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: std::env::var("AWS_SESSION_TOKEN").ok(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where a bucket lives and how to address it.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...). Defaults to AWS for `region`.
    pub endpoint: Option<String>,
    /// `endpoint/bucket/key` instead of `bucket.endpoint/key`.
    pub path_style: bool,
    pub credentials: Option<Credentials>,
}

impl S3Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            path_style: false,
            credentials: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_path_style(mut self, path_style: bool) -> Self {
        self.path_style = path_style;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// URL of `key` in this bucket.
    pub fn object_url(&self, key: &str) -> Result<Url, RangeError> {
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region));
        let mut url = Url::parse(endpoint.trim_end_matches('/'))
            .map_err(|e| RangeError::Transport(format!("invalid endpoint {}: {}", endpoint, e)))?;

        let key = uri_encode(key.trim_start_matches('/'), false);
        if self.path_style {
            url.set_path(&format!("/{}/{}", uri_encode(&self.bucket, true), key));
        } else {
            let host = url
                .host_str()
                .ok_or_else(|| RangeError::Transport(format!("endpoint {} has no host", endpoint)))?;
            let host = format!("{}.{}", self.bucket, host);
            url.set_host(Some(&host))
                .map_err(|e| RangeError::Transport(format!("invalid bucket host {}: {}", host, e)))?;
            url.set_path(&format!("/{}", key));
        }
        Ok(url)
    }
}

/// Reads byte ranges from one object in an S3-compatible store.
pub struct S3Reader {
    client: reqwest::Client,
    config: Arc<S3Config>,
    key: String,
    url: Url,
    length: OnceCell<u64>,
}

impl S3Reader {
    pub fn new(config: S3Config, key: impl Into<String>, timeout: Duration) -> Result<Self, RangeError> {
        Self::with_client(build_client(timeout)?, Arc::new(config), key)
    }

    /// Creates a reader sharing an existing client and bucket config.
    pub fn with_client(
        client: reqwest::Client,
        config: Arc<S3Config>,
        key: impl Into<String>,
    ) -> Result<Self, RangeError> {
        let key = key.into();
        let url = config.object_url(&key)?;
        Ok(Self {
            client,
            config,
            key,
            url,
            length: OnceCell::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn request(&self, method: Method, range: Option<String>) -> Result<RequestBuilder, RangeError> {
        let mut builder = self.client.request(method.clone(), self.url.clone());
        let mut signed = Vec::new();
        if let Some(range) = range {
            builder = builder.header(RANGE, range.as_str());
            signed.push(("range", range));
        }
        if let Some(credentials) = &self.config.credentials {
            let headers = sign(
                credentials,
                &self.config.region,
                method.as_str(),
                &self.url,
                &signed,
                Utc::now(),
            )?;
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
        }
        Ok(builder)
    }

    async fn fetch_length(&self) -> Result<u64, RangeError> {
        let url = self.url.as_str();
        let response = self
            .request(Method::HEAD, None)?
            .send()
            .await
            .map_err(|e| transport(url, e))?;
        check_status(&response, url)?;
        object_length(&response)
            .ok_or_else(|| RangeError::Transport(format!("{}: no Content-Length on HEAD", url)))
    }
}

impl RangeReader for S3Reader {
    fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>> {
        Box::pin(async move {
            self.length
                .get_or_try_init(|| self.fetch_length())
                .await
                .copied()
        })
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Bytes, RangeError>> {
        Box::pin(async move {
            if let Some(&total) = self.length.get() {
                check_bounds(offset, length, total)?;
            }
            if length == 0 {
                return Ok(Bytes::new());
            }

            let url = self.url.as_str();
            trace!(url, offset, length, "S3 range request");
            let response = self
                .request(Method::GET, Some(range_header(offset, length)))?
                .send()
                .await
                .map_err(|e| transport(url, e))?;

            ranged_body(response, url, offset, length).await
        })
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.config.bucket, self.key)
    }
}

/// Computes SigV4 headers for a request with an empty body.
///
/// `headers` are additional headers to sign (lower-case names). Returns the
/// headers to attach: `x-amz-date`, `x-amz-content-sha256`, the optional
/// security token and `authorization`.
pub(crate) fn sign(
    credentials: &Credentials,
    region: &str,
    method: &str,
    url: &Url,
    headers: &[(&'static str, String)],
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>, RangeError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let host = match url.port() {
        Some(port) => format!("{}:{}", url.host_str().unwrap_or_default(), port),
        None => url.host_str().unwrap_or_default().to_string(),
    };

    let mut added: Vec<(&'static str, String)> = vec![
        ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
        ("x-amz-date", amz_date.clone()),
    ];
    if let Some(token) = &credentials.session_token {
        added.push(("x-amz-security-token", token.clone()));
    }

    let mut canonical: Vec<(&str, &str)> = vec![("host", host.as_str())];
    canonical.extend(headers.iter().map(|(n, v)| (*n, v.trim())));
    canonical.extend(added.iter().map(|(n, v)| (*n, v.as_str())));
    canonical.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = canonical
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = canonical
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        url.path(),
        canonical_query(url),
        canonical_headers,
        signed_headers,
        EMPTY_PAYLOAD_SHA256
    );

    let scope = format!("{}/{}/s3/aws4_request", date, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        format!("{:x}", Sha256::digest(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", credentials.secret_access_key);
    let k_date = hmac(secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, b"s3")?;
    let k_signing = hmac(&k_service, b"aws4_request")?;
    let signature = format!("{:x}", hmac(&k_signing, string_to_sign.as_bytes())?);

    added.push((
        "authorization",
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key_id, scope, signed_headers, signature
        ),
    ));
    Ok(added)
}

fn canonical_query(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Percent-encodes everything except unreserved characters, and `/` unless
/// `encode_slash` is set.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
    out
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Output<HmacSha256>, RangeError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| RangeError::Transport(format!("signing key rejected: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes())
}
