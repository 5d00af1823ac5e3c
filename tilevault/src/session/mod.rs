//! Per-archive session: header, root directory, leaf cache and metadata.
//!
//! An [`ArchiveSession`] moves through
//!
//! ```text
//! Uninitialized -> Loading -> Ready
//!                          \-> Failed
//! ```
//!
//! Loading reads the object length, the header, and the root directory, in
//! that order. The outcome lives in a [`OnceCell`], so every caller that
//! arrives while the load is in flight awaits the same fetch and observes
//! the same result. A failed load is terminal for the session; the owner
//! discards it and builds a fresh one to retry.
//!
//! Once ready, the header and root directory are immutable and read without
//! locking. Leaf directories are fetched on demand and cached with per-key
//! single-flight, so concurrent lookups through the same leaf share one read.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use moka::future::Cache;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::archive::{
    ArchiveError, ArchiveResult, Directory, DirectoryResolver, Header, LeafSource, Metadata,
    TileRange, DEFAULT_MAX_DIRECTORY_DEPTH, HEADER_SIZE,
};
use crate::backend::{BoxFuture, RangeReader};
use crate::compression::decompress;
use crate::coord::{tile_id, TileCoord};

/// Default number of leaf directories cached per session.
pub const DEFAULT_LEAF_CACHE_CAPACITY: u64 = 4096;

/// Tunables for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum leaf directories held in the cache.
    pub leaf_cache_capacity: u64,
    /// Maximum directory levels visited per lookup, root included.
    pub max_directory_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            leaf_cache_capacity: DEFAULT_LEAF_CACHE_CAPACITY,
            max_directory_depth: DEFAULT_MAX_DIRECTORY_DEPTH,
        }
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State available once the session is ready.
struct Loaded {
    header: Header,
    root: Directory,
}

/// Clears the loading flag when the loader finishes or is cancelled.
struct LoadingGuard<'a>(&'a AtomicBool);

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One open archive.
pub struct ArchiveSession {
    name: String,
    reader: Arc<dyn RangeReader>,
    resolver: DirectoryResolver,
    loaded: OnceCell<Result<Loaded, ArchiveError>>,
    loading: AtomicBool,
    leaves: Cache<(u64, u32), Arc<Directory>>,
    metadata: OnceCell<Arc<Metadata>>,
}

impl ArchiveSession {
    /// Creates an uninitialized session. Nothing is read until first use.
    pub fn new(name: impl Into<String>, reader: Arc<dyn RangeReader>, config: SessionConfig) -> Self {
        Self {
            name: name.into(),
            reader,
            resolver: DirectoryResolver::new(config.max_directory_depth),
            loaded: OnceCell::new(),
            loading: AtomicBool::new(false),
            leaves: Cache::builder()
                .max_capacity(config.leaf_cache_capacity)
                .build(),
            metadata: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SessionState {
        match self.loaded.get() {
            Some(Ok(_)) => SessionState::Ready,
            Some(Err(_)) => SessionState::Failed,
            None if self.loading.load(Ordering::Acquire) => SessionState::Loading,
            None => SessionState::Uninitialized,
        }
    }

    /// Loads the session if needed and reports the outcome.
    pub async fn open(&self) -> ArchiveResult<()> {
        self.ready().await.map(|_| ())
    }

    /// The decoded header.
    pub async fn header(&self) -> ArchiveResult<&Header> {
        Ok(&self.ready().await?.header)
    }

    /// Number of entries in the root directory.
    pub async fn root_entries(&self) -> ArchiveResult<usize> {
        Ok(self.ready().await?.root.len())
    }

    /// The metadata document, decoded on first call and cached afterwards.
    ///
    /// A metadata failure is reported to the caller but does not fail the
    /// session; the next call tries again.
    pub async fn metadata(&self) -> ArchiveResult<Arc<Metadata>> {
        let loaded = self.ready().await?;
        self.metadata
            .get_or_try_init(|| self.fetch_metadata(&loaded.header))
            .await
            .cloned()
    }

    /// Locates a tile's bytes relative to the tile data region.
    ///
    /// Coordinates outside the header's zoom range resolve to `None`
    /// without touching any directory.
    pub async fn resolve(&self, coord: TileCoord) -> ArchiveResult<Option<TileRange>> {
        let loaded = self.ready().await?;
        if !loaded.header.covers_zoom(coord.zoom) {
            debug!(archive = %self.name, %coord, "Zoom outside archive range");
            return Ok(None);
        }
        self.resolver
            .resolve(&loaded.root, tile_id(&coord), self)
            .await
    }

    /// Reads a tile's stored bytes, still in the archive's tile compression.
    pub async fn read_tile(&self, coord: TileCoord) -> ArchiveResult<Option<Bytes>> {
        let Some(range) = self.resolve(coord).await? else {
            return Ok(None);
        };
        let region = self.ready().await?.header.tile_data;
        let length = u64::from(range.length);
        if !region.contains(range.offset, length) {
            return Err(ArchiveError::MalformedDirectory(format!(
                "tile {} at {}+{} lies outside the tile data region of {} bytes",
                coord, range.offset, length, region.length
            )));
        }
        let data = self.reader.read_range(region.offset + range.offset, length).await?;
        Ok(Some(data))
    }

    async fn ready(&self) -> ArchiveResult<&Loaded> {
        match self.loaded.get_or_init(|| self.load()).await {
            Ok(loaded) => Ok(loaded),
            Err(e) => Err(e.clone()),
        }
    }

    async fn load(&self) -> Result<Loaded, ArchiveError> {
        self.loading.store(true, Ordering::Release);
        let _guard = LoadingGuard(&self.loading);

        let result = self.fetch_header_and_root().await;
        match &result {
            Ok(loaded) => info!(
                archive = %self.name,
                source = %self.reader.describe(),
                min_zoom = loaded.header.min_zoom,
                max_zoom = loaded.header.max_zoom,
                tile_type = ?loaded.header.tile_type,
                root_entries = loaded.root.len(),
                "Archive session ready"
            ),
            Err(e) => warn!(
                archive = %self.name,
                source = %self.reader.describe(),
                error = %e,
                "Archive session failed"
            ),
        }
        result
    }

    async fn fetch_header_and_root(&self) -> Result<Loaded, ArchiveError> {
        let total = self.reader.total_length().await?;
        if total < HEADER_SIZE as u64 {
            return Err(ArchiveError::MalformedHeader(format!(
                "archive is {} bytes, shorter than the {}-byte header",
                total, HEADER_SIZE
            )));
        }

        debug!(archive = %self.name, total, "Reading header");
        let bytes = self.reader.read_range(0, HEADER_SIZE as u64).await?;
        let header = Header::decode(&bytes, total)?;

        let region = header.root_directory;
        debug!(archive = %self.name, offset = region.offset, length = region.length, "Reading root directory");
        let bytes = self.reader.read_range(region.offset, region.length).await?;
        let root = Directory::decode(&decompress(header.internal_compression, &bytes)?)?;

        Ok(Loaded { header, root })
    }

    async fn fetch_metadata(&self, header: &Header) -> ArchiveResult<Arc<Metadata>> {
        let region = header.metadata;
        if region.length == 0 {
            return Ok(Arc::new(Metadata::decode(&[])?));
        }
        debug!(archive = %self.name, offset = region.offset, length = region.length, "Reading metadata");
        let bytes = self.reader.read_range(region.offset, region.length).await?;
        let json = decompress(header.internal_compression, &bytes)?;
        Ok(Arc::new(Metadata::decode(&json)?))
    }

    async fn fetch_leaf(&self, offset: u64, length: u32) -> ArchiveResult<Arc<Directory>> {
        let loaded = self.ready().await?;
        let region = loaded.header.leaf_directories;
        if !region.contains(offset, u64::from(length)) {
            return Err(ArchiveError::MalformedDirectory(format!(
                "leaf directory at {}+{} lies outside the leaf region of {} bytes",
                offset, length, region.length
            )));
        }

        debug!(archive = %self.name, offset, length, "Fetching leaf directory");
        let bytes = self
            .reader
            .read_range(region.offset + offset, u64::from(length))
            .await?;
        let directory = Directory::decode(&decompress(loaded.header.internal_compression, &bytes)?)?;
        Ok(Arc::new(directory))
    }
}

impl LeafSource for ArchiveSession {
    fn leaf_directory(&self, offset: u64, length: u32) -> BoxFuture<'_, ArchiveResult<Arc<Directory>>> {
        Box::pin(async move {
            self.leaves
                .try_get_with((offset, length), self.fetch_leaf(offset, length))
                .await
                .map_err(|e| ArchiveError::clone(&e))
        })
    }
}

impl std::fmt::Debug for ArchiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveSession")
            .field("name", &self.name)
            .field("source", &self.reader.describe())
            .field("state", &self.state())
            .finish()
    }
}
