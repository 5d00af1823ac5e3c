//! TileVault - range-addressed tiled archive reader
//!
//! This library locates and serves individual map tiles out of single-file
//! tiled archives (PMTiles v3 layout) that live on local disk, behind an
//! HTTP server, or in an S3-compatible object store. Only the byte ranges
//! on a tile's lookup path are ever read.
//!
//! # Layers
//!
//! - [`coord`]: tile coordinates and the Hilbert-curve tile id
//! - [`compression`]: gzip / brotli / zstd block codecs
//! - [`archive`]: header, directory and metadata decoding plus resolution
//! - [`backend`]: random-access readers over each storage medium
//! - [`session`]: one open archive with single-flight loading and caches
//! - [`service`]: multi-archive facade answering tile and TileJSON requests
//! - [`tilejson`]: TileJSON document assembly
//! - [`config`] / [`logging`]: INI configuration and tracing setup

pub mod archive;
pub mod backend;
pub mod compression;
pub mod config;
pub mod coord;
pub mod logging;
pub mod service;
pub mod session;
pub mod tilejson;

pub use archive::{ArchiveError, Header, Metadata, TileType};
pub use backend::{RangeError, RangeReader};
pub use compression::Compression;
pub use coord::TileCoord;
pub use service::{ServiceConfig, ServiceError, Tile, TileService};
pub use session::{ArchiveSession, SessionConfig, SessionState};
pub use tilejson::TileJson;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
