//! Error taxonomy for archive decoding and tile resolution.

use thiserror::Error;

use crate::backend::RangeError;
use crate::compression::{Compression, CompressionError};
use crate::coord::CoordError;

/// Result type for archive operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors that can occur while reading an archive.
///
/// Cloneable so a single failed load can be handed to every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// Header magic, version, or declared layout is invalid.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A directory block failed to decode or points outside its region.
    #[error("malformed directory: {0}")]
    MalformedDirectory(String),

    /// The metadata block is not valid JSON.
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    /// A block declares a compression this build cannot decode.
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(Compression),

    /// A block failed to decompress.
    #[error("corrupt {compression} payload: {reason}")]
    CorruptPayload {
        compression: Compression,
        reason: String,
    },

    /// The requested coordinate or tile id is outside the addressable range.
    #[error("coordinate out of range: {0}")]
    CoordinateOutOfRange(#[from] CoordError),

    /// The backend could not serve a byte range.
    #[error("range unavailable: {0}")]
    RangeUnavailable(#[from] RangeError),

    /// Directory traversal exceeded the configured depth.
    #[error("directory nesting for tile {tile_id} exceeds depth limit {max_depth}")]
    DirectoryTooDeep { tile_id: u64, max_depth: usize },
}

impl From<CompressionError> for ArchiveError {
    fn from(err: CompressionError) -> Self {
        match err {
            CompressionError::Unsupported(c) => ArchiveError::UnsupportedCompression(c),
            CompressionError::Corrupt {
                compression,
                reason,
            } => ArchiveError::CorruptPayload {
                compression,
                reason,
            },
        }
    }
}

impl ArchiveError {
    /// Whether the failure came from the storage transport rather than the archive contents.
    pub fn is_transient(&self) -> bool {
        matches!(self, ArchiveError::RangeUnavailable(e) if e.is_transient())
    }
}
