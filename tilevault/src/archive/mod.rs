//! Archive format: header, directories, metadata and tile resolution.
//!
//! An archive is a single immutable object laid out as
//!
//! ```text
//! | header (127 B) | root directory | metadata | leaf directories | tile data |
//! ```
//!
//! Only the header and the directories on a tile's lookup path need to be
//! read to locate that tile's bytes.

mod directory;
mod error;
mod header;
mod metadata;
mod resolver;

pub use directory::{Directory, Entry, Lookup};
pub use error::{ArchiveError, ArchiveResult};
pub use header::{Bounds, Center, Header, Region, TileType, HEADER_SIZE, MAGIC, FORMAT_VERSION};
pub use metadata::Metadata;
pub use resolver::{DirectoryResolver, LeafSource, TileRange, DEFAULT_MAX_DIRECTORY_DEPTH};

#[cfg(test)]
pub(crate) mod fixture {
    //! Byte-level encoders for building test archives.

    use super::{Entry, TileType, HEADER_SIZE, MAGIC};
    use crate::compression::Compression;

    pub struct HeaderFields {
        pub root: (u64, u64),
        pub metadata: (u64, u64),
        pub leaves: (u64, u64),
        pub tiles: (u64, u64),
        pub internal: Compression,
        pub tile: Compression,
        pub tile_type: TileType,
        pub min_zoom: u8,
        pub max_zoom: u8,
    }

    pub fn entry(tile_id: u64, offset: u64, length: u32, run_length: u32) -> Entry {
        Entry {
            tile_id,
            offset,
            length,
            run_length,
        }
    }

    pub fn encode_header(fields: &HeaderFields) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(MAGIC);
        out.push(3);
        for (offset, length) in [fields.root, fields.metadata, fields.leaves, fields.tiles] {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&length.to_le_bytes());
        }
        for count in [0u64, 0, 0] {
            out.extend_from_slice(&count.to_le_bytes());
        }
        out.push(1);
        out.push(fields.internal.code());
        out.push(fields.tile.code());
        out.push(fields.tile_type.code());
        out.push(fields.min_zoom);
        out.push(fields.max_zoom);
        for e7 in [-1_800_000_000i32, -850_000_000, 1_800_000_000, 850_000_000] {
            out.extend_from_slice(&e7.to_le_bytes());
        }
        out.push(2);
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(out.len(), HEADER_SIZE);
        out
    }

    fn push_varint(out: &mut Vec<u8>, mut value: u64) {
        while value >= 0x80 {
            out.push((value as u8) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    pub fn encode_directory(entries: &[Entry]) -> Vec<u8> {
        let mut out = Vec::new();
        push_varint(&mut out, entries.len() as u64);
        let mut last = 0;
        for e in entries {
            push_varint(&mut out, e.tile_id - last);
            last = e.tile_id;
        }
        for e in entries {
            push_varint(&mut out, u64::from(e.run_length));
        }
        for e in entries {
            push_varint(&mut out, u64::from(e.length));
        }
        for (i, e) in entries.iter().enumerate() {
            let contiguous =
                i > 0 && e.offset == entries[i - 1].offset + u64::from(entries[i - 1].length);
            push_varint(&mut out, if contiguous { 0 } else { e.offset + 1 });
        }
        out
    }

    /// Uncompressed payload stored for `tile_id` in [`sample_archive`].
    pub fn sample_tile(tile_id: u64) -> Vec<u8> {
        format!("tile-{}", tile_id).into_bytes()
    }

    /// A gzip-directory archive spanning zooms 0..=2 with a metadata block.
    ///
    /// Ids 0..=4 (zooms 0 and 1) live in the root directory; the zoom-2 band
    /// (ids 5..=20) sits behind a single leaf pointer. Each tile payload is
    /// [`sample_tile`] compressed with `tile_compression`.
    pub fn sample_archive(tile_compression: Compression) -> Vec<u8> {
        let internal = Compression::Gzip;

        let mut tiles = Vec::new();
        let mut entries = Vec::new();
        for id in 0..=20u64 {
            let data = crate::compression::compress(tile_compression, &sample_tile(id)).unwrap();
            entries.push(entry(id, tiles.len() as u64, data.len() as u32, 1));
            tiles.extend_from_slice(&data);
        }

        let leaf = crate::compression::compress(internal, &encode_directory(&entries[5..])).unwrap();
        let mut root_entries = entries[..5].to_vec();
        root_entries.push(entry(5, 0, leaf.len() as u32, 0));
        let root = crate::compression::compress(internal, &encode_directory(&root_entries)).unwrap();
        let metadata = crate::compression::compress(
            internal,
            br#"{"name":"sample","vector_layers":[{"id":"cells"}]}"#,
        )
        .unwrap();

        let root_at = HEADER_SIZE as u64;
        let meta_at = root_at + root.len() as u64;
        let leaf_at = meta_at + metadata.len() as u64;
        let tiles_at = leaf_at + leaf.len() as u64;

        let mut out = encode_header(&HeaderFields {
            root: (root_at, root.len() as u64),
            metadata: (meta_at, metadata.len() as u64),
            leaves: (leaf_at, leaf.len() as u64),
            tiles: (tiles_at, tiles.len() as u64),
            internal,
            tile: tile_compression,
            tile_type: TileType::Mvt,
            min_zoom: 0,
            max_zoom: 2,
        });
        out.extend_from_slice(&root);
        out.extend_from_slice(&metadata);
        out.extend_from_slice(&leaf);
        out.extend_from_slice(&tiles);
        out
    }
}
