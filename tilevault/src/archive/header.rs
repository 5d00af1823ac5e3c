//! Fixed-size archive header.
//!
//! The header occupies the first [`HEADER_SIZE`] bytes of every archive and
//! locates everything else: root directory, metadata, leaf directories and
//! tile data. Decoding is a pure function over the supplied bytes.

use bytes::Buf;

use super::error::{ArchiveError, ArchiveResult};
use crate::compression::Compression;
use crate::coord::MAX_ZOOM;

/// Size of the on-disk header in bytes.
pub const HEADER_SIZE: usize = 127;

/// Magic bytes at offset 0.
pub const MAGIC: &[u8; 7] = b"PMTiles";

/// The only format version this reader understands.
pub const FORMAT_VERSION: u8 = 3;

/// Tile payload type declared by the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileType {
    Unknown,
    Mvt,
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl TileType {
    /// Decodes the on-disk tile type byte. Unrecognised codes map to `Unknown`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => TileType::Mvt,
            2 => TileType::Png,
            3 => TileType::Jpeg,
            4 => TileType::Webp,
            5 => TileType::Avif,
            _ => TileType::Unknown,
        }
    }

    /// The on-disk tile type byte.
    pub fn code(&self) -> u8 {
        match self {
            TileType::Unknown => 0,
            TileType::Mvt => 1,
            TileType::Png => 2,
            TileType::Jpeg => 3,
            TileType::Webp => 4,
            TileType::Avif => 5,
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileType::Mvt => "application/vnd.mapbox-vector-tile",
            TileType::Png => "image/png",
            TileType::Jpeg => "image/jpeg",
            TileType::Webp => "image/webp",
            TileType::Avif => "image/avif",
            TileType::Unknown => "application/octet-stream",
        }
    }

    /// TileJSON `format` value, if the type has one.
    pub fn format(&self) -> Option<&'static str> {
        match self {
            TileType::Mvt => Some("pbf"),
            TileType::Png => Some("png"),
            TileType::Jpeg => Some("jpg"),
            TileType::Webp => Some("webp"),
            TileType::Avif => Some("avif"),
            TileType::Unknown => None,
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, TileType::Mvt)
    }
}

/// Geographic bounds in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Bounds {
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }
}

/// Default center of the archive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Center {
    pub lon: f64,
    pub lat: f64,
    pub zoom: u8,
}

/// A byte region inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: u64,
    pub length: u64,
}

impl Region {
    /// End offset, or `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Whether the sub-range `[offset, offset + length)` lies inside this region.
    pub fn contains(&self, offset: u64, length: u64) -> bool {
        offset
            .checked_add(length)
            .is_some_and(|end| end <= self.length)
    }
}

/// Decoded archive header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: u8,
    pub root_directory: Region,
    pub metadata: Region,
    pub leaf_directories: Region,
    pub tile_data: Region,
    pub addressed_tiles: u64,
    pub tile_entries: u64,
    pub tile_contents: u64,
    pub clustered: bool,
    /// Compression of directories and the metadata block.
    pub internal_compression: Compression,
    /// Compression of tile payloads.
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub bounds: Bounds,
    pub center: Center,
}

fn coordinate(e7: i32) -> f64 {
    f64::from(e7) / 10_000_000.0
}

impl Header {
    /// Decodes and validates a header.
    ///
    /// `archive_length` is the total size of the archive; every region the
    /// header declares must fit inside it.
    pub fn decode(bytes: &[u8], archive_length: u64) -> ArchiveResult<Header> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArchiveError::MalformedHeader(format!(
                "need {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(ArchiveError::MalformedHeader("bad magic".to_string()));
        }

        let mut buf = &bytes[MAGIC.len()..HEADER_SIZE];
        let version = buf.get_u8();
        if version != FORMAT_VERSION {
            return Err(ArchiveError::MalformedHeader(format!(
                "unsupported version {}",
                version
            )));
        }

        let region = |buf: &mut &[u8]| Region {
            offset: buf.get_u64_le(),
            length: buf.get_u64_le(),
        };
        let root_directory = region(&mut buf);
        let metadata = region(&mut buf);
        let leaf_directories = region(&mut buf);
        let tile_data = region(&mut buf);

        let addressed_tiles = buf.get_u64_le();
        let tile_entries = buf.get_u64_le();
        let tile_contents = buf.get_u64_le();
        let clustered = buf.get_u8() == 1;
        let internal_compression = Compression::from_code(buf.get_u8());
        let tile_compression = Compression::from_code(buf.get_u8());
        let tile_type = TileType::from_code(buf.get_u8());
        let min_zoom = buf.get_u8();
        let max_zoom = buf.get_u8();
        let bounds = Bounds {
            min_lon: coordinate(buf.get_i32_le()),
            min_lat: coordinate(buf.get_i32_le()),
            max_lon: coordinate(buf.get_i32_le()),
            max_lat: coordinate(buf.get_i32_le()),
        };
        let center_zoom = buf.get_u8();
        let center = Center {
            lon: coordinate(buf.get_i32_le()),
            lat: coordinate(buf.get_i32_le()),
            zoom: center_zoom,
        };

        if max_zoom > MAX_ZOOM || min_zoom > max_zoom {
            return Err(ArchiveError::MalformedHeader(format!(
                "invalid zoom range {}..={}",
                min_zoom, max_zoom
            )));
        }

        for (name, r) in [
            ("root directory", root_directory),
            ("metadata", metadata),
            ("leaf directories", leaf_directories),
            ("tile data", tile_data),
        ] {
            match r.end() {
                Some(end) if end <= archive_length => {}
                _ => {
                    return Err(ArchiveError::MalformedHeader(format!(
                        "{} region {}+{} exceeds archive length {}",
                        name, r.offset, r.length, archive_length
                    )))
                }
            }
        }

        if root_directory.length == 0 {
            return Err(ArchiveError::MalformedHeader(
                "empty root directory".to_string(),
            ));
        }

        Ok(Header {
            version,
            root_directory,
            metadata,
            leaf_directories,
            tile_data,
            addressed_tiles,
            tile_entries,
            tile_contents,
            clustered,
            internal_compression,
            tile_compression,
            tile_type,
            min_zoom,
            max_zoom,
            bounds,
            center,
        })
    }

    /// Whether `zoom` lies within the archive's declared zoom range.
    pub fn covers_zoom(&self, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
    }
}
