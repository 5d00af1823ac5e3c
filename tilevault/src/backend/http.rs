//! HTTP backend.
//!
//! One `Range: bytes=a-b` GET per read. Servers must honor range requests;
//! a `200 OK` carrying the whole object is only accepted for reads that
//! start at offset zero.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Response, StatusCode};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::{check_bounds, check_length, BoxFuture, RangeError, RangeReader};

/// Default request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Reads byte ranges from an object served over HTTP(S).
pub struct HttpReader {
    client: reqwest::Client,
    url: String,
    length: OnceCell<u64>,
}

impl HttpReader {
    /// Creates a reader with its own client.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RangeError> {
        Ok(Self::with_client(build_client(timeout)?, url))
    }

    /// Creates a reader sharing an existing client (connection pool).
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            length: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_length(&self) -> Result<u64, RangeError> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(|e| transport(&self.url, e))?;
        check_status(&response, &self.url)?;

        if let Some(length) = header_u64(&response, CONTENT_LENGTH) {
            return Ok(length);
        }

        debug!(url = %self.url, "HEAD carried no Content-Length, probing with a range request");
        let response = self
            .client
            .get(&self.url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await
            .map_err(|e| transport(&self.url, e))?;
        check_status(&response, &self.url)?;

        object_length(&response).ok_or_else(|| {
            RangeError::Transport(format!("{}: server did not report object length", self.url))
        })
    }
}

impl RangeReader for HttpReader {
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

            trace!(url = %self.url, offset, length, "Range request");
            let response = self
                .client
                .get(&self.url)
                .header(RANGE, range_header(offset, length))
                .send()
                .await
                .map_err(|e| transport(&self.url, e))?;

            ranged_body(response, &self.url, offset, length).await
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Builds a client with the given request timeout.
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, RangeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| RangeError::Transport(format!("Failed to create HTTP client: {}", e)))
}

/// `Range` header value for `length > 0` bytes at `offset`.
pub(crate) fn range_header(offset: u64, length: u64) -> String {
    format!("bytes={}-{}", offset, offset + length - 1)
}

pub(crate) fn transport(url: &str, e: reqwest::Error) -> RangeError {
    RangeError::Transport(format!("{}: {}", url, e))
}

/// Maps non-success statuses to errors.
pub(crate) fn check_status(response: &Response, url: &str) -> Result<(), RangeError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(RangeError::NotFound(url.to_string()));
    }
    if !status.is_success() {
        return Err(RangeError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(())
}

/// Total object length from a HEAD or ranged GET response.
pub(crate) fn object_length(response: &Response) -> Option<u64> {
    if response.status() == StatusCode::PARTIAL_CONTENT {
        return response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);
    }
    header_u64(response, CONTENT_LENGTH)
}

/// Validates a ranged GET response and returns exactly `length` bytes.
pub(crate) async fn ranged_body(
    response: Response,
    url: &str,
    offset: u64,
    length: u64,
) -> Result<Bytes, RangeError> {
    let status = response.status();
    let whole_object = || RangeError::Status {
        status: status.as_u16(),
        url: url.to_string(),
    };
    match status {
        StatusCode::PARTIAL_CONTENT => {}
        // A plain 200 is only usable when the object is exactly the range.
        StatusCode::OK if offset == 0 => {
            if response.content_length().is_some_and(|len| len != length) {
                return Err(whole_object());
            }
        }
        StatusCode::RANGE_NOT_SATISFIABLE => {
            let total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range_total)
                .unwrap_or(0);
            return Err(RangeError::OutOfBounds {
                offset,
                length,
                total,
            });
        }
        _ => {
            check_status(&response, url)?;
            // Success, but the server ignored the Range header.
            return Err(whole_object());
        }
    }

    let body = response.bytes().await.map_err(|e| transport(url, e))?;
    if status == StatusCode::OK && body.len() as u64 != length {
        return Err(whole_object());
    }
    check_length(offset, length, &body)?;
    Ok(body)
}

fn header_u64(response: &Response, name: reqwest::header::HeaderName) -> Option<u64> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Parses the complete length out of a `Content-Range` value such as
/// `bytes 0-0/1234` or `bytes */1234`.
pub(crate) fn parse_content_range_total(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (_, total) = rest.split_once('/')?;
    total.trim().parse().ok()
}
