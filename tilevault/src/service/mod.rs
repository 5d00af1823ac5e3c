//! Tile serving facade.
//!
//! [`TileService`] owns a bounded registry of [`ArchiveSession`]s keyed by
//! archive id and answers the requests an HTTP front end needs: tile bytes,
//! metadata, headers and TileJSON documents.
//!
//! # Session lifecycle
//!
//! Sessions are created on first reference, with creation single-flighted
//! per id. A session whose load failed stays failed; the service reports
//! the failure to every caller that was waiting on it, then drops the
//! session from the registry so the next request starts over with a fresh
//! one.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilevault::service::{LocalDirectoryLocator, ServiceConfig, TileService};
//!
//! let service = TileService::new(
//!     Arc::new(LocalDirectoryLocator::new("/srv/tiles")),
//!     ServiceConfig::default(),
//! );
//! if let Some(tile) = service.get_tile("zcta", 12, 1171, 1566).await? {
//!     println!("{} bytes, encoding {:?}", tile.data.len(), tile.content_encoding());
//! }
//! ```

mod error;
mod locator;

pub use error::ServiceError;
pub use locator::{
    validate_archive_id, ArchiveLocator, HttpLocator, LocalDirectoryLocator, S3Locator,
    DEFAULT_EXTENSION,
};

use std::sync::Arc;

use bytes::Bytes;
use moka::future::Cache;
use tracing::{debug, warn};

use crate::archive::{Header, Metadata, TileType};
use crate::backend::{RangeReader, RetryPolicy, RetryingReader};
use crate::compression::{decompress, Compression};
use crate::coord::TileCoord;
use crate::session::{ArchiveSession, SessionConfig, SessionState};
use crate::tilejson::TileJson;

/// Default number of open archive sessions.
pub const DEFAULT_MAX_SESSIONS: u64 = 64;

/// Tunables for a [`TileService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Maximum sessions held in the registry.
    pub max_sessions: u64,
    pub session: SessionConfig,
    /// Retry policy wrapped around every located reader.
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A tile payload as stored in the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub data: Bytes,
    /// Compression of `data`.
    pub compression: Compression,
    pub tile_type: TileType,
}

impl Tile {
    /// `Content-Encoding` value for `data`, if any.
    pub fn content_encoding(&self) -> Option<&'static str> {
        self.compression.content_encoding()
    }

    /// `Content-Type` value for the tile format.
    pub fn content_type(&self) -> &'static str {
        self.tile_type.content_type()
    }
}

/// Serves tiles and archive descriptions for many archives.
pub struct TileService {
    locator: Arc<dyn ArchiveLocator>,
    sessions: Cache<String, Arc<ArchiveSession>>,
    config: ServiceConfig,
}

impl TileService {
    pub fn new(locator: Arc<dyn ArchiveLocator>, config: ServiceConfig) -> Self {
        let sessions = Cache::builder().max_capacity(config.max_sessions).build();
        Self {
            locator,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Returns the stored tile at `z/x/y`, or `None` if the archive holds
    /// no such tile.
    ///
    /// The payload is returned exactly as stored; [`Tile::content_encoding`]
    /// tells the transport how to label it. Coordinates outside the grid or
    /// the archive's zoom range are reported as absent, not as errors.
    pub async fn get_tile(
        &self,
        archive_id: &str,
        z: u8,
        x: u32,
        y: u32,
    ) -> Result<Option<Tile>, ServiceError> {
        let session = self.ready_session(archive_id).await?;

        let coord = match TileCoord::new(z, x, y) {
            Ok(coord) => coord,
            Err(e) => {
                debug!(archive = archive_id, z, x, y, error = %e, "Invalid tile coordinate");
                return Ok(None);
            }
        };

        let archive = |e| ServiceError::archive(archive_id, e);
        let header = session.header().await.map_err(archive)?;
        let data = session.read_tile(coord).await.map_err(archive)?;

        Ok(data.map(|data| Tile {
            data,
            compression: header.tile_compression,
            tile_type: header.tile_type,
        }))
    }

    /// Like [`get_tile`](Self::get_tile), but with the payload decompressed.
    pub async fn get_tile_decoded(
        &self,
        archive_id: &str,
        z: u8,
        x: u32,
        y: u32,
    ) -> Result<Option<Tile>, ServiceError> {
        let Some(tile) = self.get_tile(archive_id, z, x, y).await? else {
            return Ok(None);
        };
        if tile.compression == Compression::None {
            return Ok(Some(tile));
        }
        let data = decompress(tile.compression, &tile.data)
            .map_err(|e| ServiceError::archive(archive_id, e.into()))?;
        Ok(Some(Tile {
            data: Bytes::from(data),
            compression: Compression::None,
            tile_type: tile.tile_type,
        }))
    }

    /// The archive's metadata document.
    pub async fn get_metadata(&self, archive_id: &str) -> Result<Arc<Metadata>, ServiceError> {
        let session = self.ready_session(archive_id).await?;
        session
            .metadata()
            .await
            .map_err(|e| ServiceError::archive(archive_id, e))
    }

    /// The archive's decoded header.
    pub async fn get_header(&self, archive_id: &str) -> Result<Header, ServiceError> {
        let session = self.ready_session(archive_id).await?;
        session
            .header()
            .await
            .cloned()
            .map_err(|e| ServiceError::archive(archive_id, e))
    }

    /// A TileJSON document whose `tiles` entry is `tile_url_template` with
    /// `{archive}` replaced by the archive id.
    pub async fn get_tilejson(
        &self,
        archive_id: &str,
        tile_url_template: &str,
    ) -> Result<TileJson, ServiceError> {
        let session = self.ready_session(archive_id).await?;
        let archive = |e| ServiceError::archive(archive_id, e);
        let header = session.header().await.map_err(archive)?;
        let metadata = session.metadata().await.map_err(archive)?;
        Ok(TileJson::build(archive_id, header, &metadata, tile_url_template))
    }

    /// Drops the session for `archive_id`, if any.
    pub async fn evict(&self, archive_id: &str) {
        self.sessions.invalidate(archive_id).await;
    }

    /// Number of sessions currently registered.
    pub async fn session_count(&self) -> u64 {
        self.sessions.run_pending_tasks().await;
        self.sessions.entry_count()
    }

    /// State of the registered session for `archive_id`, if any.
    pub async fn session_state(&self, archive_id: &str) -> Option<SessionState> {
        self.sessions.get(archive_id).await.map(|s| s.state())
    }

    /// Looks up or creates the session and waits for it to load.
    async fn ready_session(&self, archive_id: &str) -> Result<Arc<ArchiveSession>, ServiceError> {
        validate_archive_id(archive_id)?;

        let session = self
            .sessions
            .try_get_with(archive_id.to_string(), self.create_session(archive_id))
            .await
            .map_err(|e| ServiceError::clone(&e))?;

        match session.open().await {
            Ok(()) => Ok(session),
            Err(e) => {
                self.discard(archive_id, &session).await;
                Err(ServiceError::archive(archive_id, e))
            }
        }
    }

    async fn create_session(&self, archive_id: &str) -> Result<Arc<ArchiveSession>, ServiceError> {
        let reader = self.locator.locate(archive_id).await?;
        debug!(archive = archive_id, source = %reader.describe(), "Creating archive session");

        let reader: Arc<dyn RangeReader> = match self.config.retry {
            RetryPolicy::None => reader,
            ref policy => Arc::new(RetryingReader::new(reader, policy.clone())),
        };
        Ok(Arc::new(ArchiveSession::new(
            archive_id,
            reader,
            self.config.session,
        )))
    }

    /// Removes a failed session, unless it was already replaced.
    async fn discard(&self, archive_id: &str, failed: &Arc<ArchiveSession>) {
        if let Some(current) = self.sessions.get(archive_id).await {
            if Arc::ptr_eq(&current, failed) {
                warn!(archive = archive_id, "Evicting failed archive session");
                self.sessions.invalidate(archive_id).await;
            }
        }
    }
}
