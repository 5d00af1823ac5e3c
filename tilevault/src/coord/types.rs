//! Tile coordinate types and errors.

use std::fmt;

use thiserror::Error;

/// Maximum zoom level addressable by the archive format.
pub const MAX_ZOOM: u8 = 30;

/// Minimum zoom level.
pub const MIN_ZOOM: u8 = 0;

/// Errors from tile coordinate validation and tile id conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    /// Zoom level above [`MAX_ZOOM`].
    #[error("zoom level {0} exceeds maximum {MAX_ZOOM}")]
    ZoomOutOfRange(u8),

    /// Column or row outside the `2^zoom` grid.
    #[error("tile {x}/{y} is outside the grid at zoom {zoom}")]
    CoordinateOutOfRange { zoom: u8, x: u32, y: u32 },

    /// Tile id beyond the last id of the deepest zoom level.
    #[error("tile id {0} is beyond the addressable range")]
    TileIdOutOfRange(u64),
}

/// A tile position in the XYZ scheme.
///
/// `x` is the column (west to east), `y` the row (north to south). Both are
/// in `0..2^zoom`; construct through [`TileCoord::new`] to enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Creates a validated tile coordinate.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::ZoomOutOfRange(zoom));
        }
        let side = 1u64 << zoom;
        if u64::from(x) >= side || u64::from(y) >= side {
            return Err(CoordError::CoordinateOutOfRange { zoom, x, y });
        }
        Ok(Self { zoom, x, y })
    }

    /// Number of tiles along one edge of the grid at this zoom level.
    pub fn grid_size(&self) -> u64 {
        1u64 << self.zoom
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
