//! Errors surfaced by the tile service.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::backend::RangeError;

/// Errors from [`TileService`](super::TileService) operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// The archive id cannot name an archive (empty, or a path).
    #[error("invalid archive id {0:?}")]
    InvalidArchiveId(String),

    /// No archive exists under this id.
    #[error("archive not found: {0}")]
    ArchiveNotFound(String),

    /// The archive exists but could not be read or decoded.
    #[error("archive {archive_id}: {source}")]
    Archive {
        archive_id: String,
        source: ArchiveError,
    },

    /// The service or a locator is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    /// Wraps an archive error, mapping a missing object to `ArchiveNotFound`.
    pub fn archive(archive_id: &str, source: ArchiveError) -> Self {
        match source {
            ArchiveError::RangeUnavailable(RangeError::NotFound(_)) => {
                ServiceError::ArchiveNotFound(archive_id.to_string())
            }
            source => ServiceError::Archive {
                archive_id: archive_id.to_string(),
                source,
            },
        }
    }

    /// Whether a front end should answer "not found" rather than a server error.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::ArchiveNotFound(_) | ServiceError::InvalidArchiveId(_)
        )
    }
}
