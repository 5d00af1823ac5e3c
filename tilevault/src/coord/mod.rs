//! Tile coordinate conversion module
//!
//! Maps `(zoom, x, y)` tile coordinates onto the single ordered tile id used as
//! the directory search key, and back. Ids are laid out zoom band by zoom band:
//! every id at zoom `z` sorts after all ids of lower zooms, and inside a band
//! tiles follow the Hilbert curve so spatially close tiles get close ids.
//!
//! The bit rotation below must match archive producers exactly; the tests pin
//! it against known reference ids.

mod types;

pub use types::{CoordError, TileCoord, MAX_ZOOM, MIN_ZOOM};

/// First tile id of every zoom band, `sum(4^z')` for `z' < z`.
const fn band_starts() -> [u64; MAX_ZOOM as usize + 2] {
    let mut starts = [0u64; MAX_ZOOM as usize + 2];
    let mut z = 1;
    while z < starts.len() {
        starts[z] = starts[z - 1] + (1u64 << (2 * (z - 1)));
        z += 1;
    }
    starts
}

const BAND_STARTS: [u64; MAX_ZOOM as usize + 2] = band_starts();

/// One past the largest valid tile id.
pub const TILE_ID_LIMIT: u64 = BAND_STARTS[MAX_ZOOM as usize + 1];

#[inline]
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Returns the first tile id of the given zoom band.
#[inline]
pub fn zoom_band_start(zoom: u8) -> Result<u64, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::ZoomOutOfRange(zoom));
    }
    Ok(BAND_STARTS[zoom as usize])
}

/// Converts a validated tile coordinate into its tile id.
#[inline]
pub fn tile_id(coord: &TileCoord) -> u64 {
    let mut x = u64::from(coord.x);
    let mut y = u64::from(coord.y);
    let n = coord.grid_size();
    let mut d = 0u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from((x & s) > 0);
        let ry = u64::from((y & s) > 0);
        d += s * s * ((3 * rx) ^ ry);
        // Reflect across the whole grid; only bits below `s` are read next.
        rotate(n, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    BAND_STARTS[coord.zoom as usize] + d
}

/// Converts raw `(zoom, x, y)` into a tile id, validating the coordinate.
pub fn coord_to_tile_id(zoom: u8, x: u32, y: u32) -> Result<u64, CoordError> {
    TileCoord::new(zoom, x, y).map(|coord| tile_id(&coord))
}

/// Converts a tile id back into its coordinate.
pub fn tile_id_to_coord(id: u64) -> Result<TileCoord, CoordError> {
    if id >= TILE_ID_LIMIT {
        return Err(CoordError::TileIdOutOfRange(id));
    }

    // Highest band whose start is <= id.
    let zoom = BAND_STARTS.partition_point(|&start| start <= id) - 1;
    let pos = id - BAND_STARTS[zoom];
    let n = 1u64 << zoom;

    let mut x = 0u64;
    let mut y = 0u64;
    let mut t = pos;
    let mut s = 1u64;
    while s < n {
        let rx = 1 & (t >> 1);
        let ry = 1 & (t ^ rx);
        rotate(s, &mut x, &mut y, rx, ry);
        x += s * rx;
        y += s * ry;
        t >>= 2;
        s *= 2;
    }

    // x, y < 2^30 by construction
    Ok(TileCoord {
        zoom: zoom as u8,
        x: x as u32,
        y: y as u32,
    })
}
