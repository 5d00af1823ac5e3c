//! Random-access storage backends.
//!
//! Everything above this module reads archives through [`RangeReader`]:
//! "give me `length` bytes at `offset`" plus "how long is the object". Each
//! storage medium gets its own implementation, and the resolution core never
//! sees a concrete transport.
//!
//! # Implementations
//!
//! - [`FileReader`]: local file, seek + read on a blocking worker
//! - [`HttpReader`]: single-range HTTP GET per read
//! - [`S3Reader`]: byte-range GET against an S3-compatible object store
//! - [`MemoryReader`]: in-memory bytes
//! - [`RetryingReader`]: bounded retry of transient failures around any of the above
//!
//! Range reads are the only suspension points in the crate. They are
//! expensive (often a network round trip), so callers cache what they fetch.

mod file;
mod http;
mod memory;
mod retry;
mod s3;

pub use file::FileReader;
pub use http::{HttpReader, DEFAULT_TIMEOUT_SECS};
pub(crate) use http::build_client;
pub use memory::MemoryReader;
pub use retry::{RetryPolicy, RetryingReader, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS};
pub use s3::{Credentials, S3Config, S3Reader, DEFAULT_REGION};

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors from range reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The requested range extends past the end of the object.
    #[error("range {offset}+{length} exceeds object length {total}")]
    OutOfBounds { offset: u64, length: u64, total: u64 },

    /// The backend returned fewer bytes than requested.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    /// The object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Unexpected HTTP status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Connection, timeout, or I/O failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RangeError {
    /// Whether retrying the same read might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RangeError::Transport(_) | RangeError::ShortRead { .. } => true,
            RangeError::Status { status, .. } => *status == 429 || *status >= 500,
            RangeError::OutOfBounds { .. } | RangeError::NotFound(_) => false,
        }
    }
}

/// Random access to one immutable object.
///
/// # Contract
///
/// - `read_range` returns exactly `length` bytes or fails.
/// - `offset + length` must not exceed `total_length()`.
/// - The object never changes while a reader is alive, so implementations
///   may cache `total_length()` after the first successful query.
pub trait RangeReader: Send + Sync {
    /// Total size of the object in bytes.
    fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>>;

    /// Reads `length` bytes starting at `offset`.
    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Bytes, RangeError>>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Fails unless `[offset, offset + length)` lies within `total`.
pub(crate) fn check_bounds(offset: u64, length: u64, total: u64) -> Result<(), RangeError> {
    match offset.checked_add(length) {
        Some(end) if end <= total => Ok(()),
        _ => Err(RangeError::OutOfBounds {
            offset,
            length,
            total,
        }),
    }
}

/// Fails unless `data` is exactly `expected` bytes long.
pub(crate) fn check_length(offset: u64, expected: u64, data: &Bytes) -> Result<(), RangeError> {
    let actual = data.len() as u64;
    if actual != expected {
        return Err(RangeError::ShortRead {
            offset,
            expected,
            actual,
        });
    }
    Ok(())
}
