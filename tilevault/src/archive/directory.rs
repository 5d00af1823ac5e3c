//! Directory blocks.
//!
//! A directory is a list of entries sorted by tile id. Each entry either
//! addresses tile bytes (`run_length > 0`, covering `run_length` consecutive
//! ids that share one payload) or points at a nested leaf directory
//! (`run_length == 0`).
//!
//! On disk a directory is a sequence of unsigned LEB128 varints laid out
//! column-wise: count, tile id deltas, run lengths, lengths, offsets. An
//! encoded offset of zero for any entry after the first means "directly after
//! the previous entry"; otherwise the stored value is `offset + 1`.

use super::error::{ArchiveError, ArchiveResult};

/// One directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub tile_id: u64,
    /// Offset relative to the tile data region, or to the leaf directory
    /// region for leaf pointers.
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

impl Entry {
    pub fn is_leaf_pointer(&self) -> bool {
        self.run_length == 0
    }
}

/// Outcome of searching one directory for a tile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Tile bytes at `offset`/`length` in the tile data region.
    Tile { offset: u64, length: u32 },
    /// The id may be in the leaf directory at `offset`/`length`.
    Leaf { offset: u64, length: u32 },
    /// The id is not stored in the archive.
    Absent,
}

/// A decoded directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    entries: Vec<Entry>,
}

fn malformed(msg: impl Into<String>) -> ArchiveError {
    ArchiveError::MalformedDirectory(msg.into())
}

struct VarintReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self) -> ArchiveResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or_else(|| malformed("truncated varint"))?;
            self.pos += 1;
            if shift == 63 && byte > 1 {
                return Err(malformed("varint overflows u64"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(malformed("varint overflows u64"));
            }
        }
    }

    fn read_u32(&mut self, field: &str) -> ArchiveResult<u32> {
        let value = self.read()?;
        u32::try_from(value).map_err(|_| malformed(format!("{} {} exceeds u32", field, value)))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl Directory {
    /// Builds a directory from entries that are already sorted by tile id.
    pub fn from_entries(entries: Vec<Entry>) -> ArchiveResult<Self> {
        if entries.windows(2).any(|w| w[0].tile_id >= w[1].tile_id) {
            return Err(malformed("entries are not sorted by tile id"));
        }
        Ok(Self { entries })
    }

    /// Decodes an uncompressed directory block.
    pub fn decode(data: &[u8]) -> ArchiveResult<Self> {
        let mut reader = VarintReader::new(data);
        let count = reader.read()?;

        // Every entry needs at least four bytes (one per column).
        if count > (reader.remaining() / 4) as u64 {
            return Err(malformed(format!(
                "{} entries cannot fit in {} bytes",
                count,
                data.len()
            )));
        }
        let count = count as usize;

        let mut entries = vec![
            Entry {
                tile_id: 0,
                offset: 0,
                length: 0,
                run_length: 0,
            };
            count
        ];

        let mut last_id = 0u64;
        for (i, entry) in entries.iter_mut().enumerate() {
            let delta = reader.read()?;
            if i > 0 && delta == 0 {
                return Err(malformed("duplicate tile id"));
            }
            last_id = last_id
                .checked_add(delta)
                .ok_or_else(|| malformed("tile id overflow"))?;
            entry.tile_id = last_id;
        }
        for entry in entries.iter_mut() {
            entry.run_length = reader.read_u32("run length")?;
        }
        for entry in entries.iter_mut() {
            entry.length = reader.read_u32("length")?;
            if entry.length == 0 {
                return Err(malformed(format!(
                    "zero-length entry for tile id {}",
                    entry.tile_id
                )));
            }
        }
        for i in 0..count {
            let raw = reader.read()?;
            entries[i].offset = if raw == 0 && i > 0 {
                let prev = entries[i - 1];
                prev.offset
                    .checked_add(u64::from(prev.length))
                    .ok_or_else(|| malformed("offset overflow"))?
            } else {
                raw.checked_sub(1)
                    .ok_or_else(|| malformed("first entry has no offset"))?
            };
        }

        if reader.remaining() != 0 {
            return Err(malformed(format!(
                "{} trailing bytes after {} entries",
                reader.remaining(),
                count
            )));
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Searches this directory for `tile_id`.
    ///
    /// Finds the last entry whose id is `<= tile_id`. A leaf pointer is
    /// returned as-is; a tile entry only matches if `tile_id` falls inside
    /// its run.
    pub fn find(&self, tile_id: u64) -> Lookup {
        let idx = self.entries.partition_point(|e| e.tile_id <= tile_id);
        if idx == 0 {
            return Lookup::Absent;
        }
        let entry = &self.entries[idx - 1];
        if entry.is_leaf_pointer() {
            return Lookup::Leaf {
                offset: entry.offset,
                length: entry.length,
            };
        }
        if tile_id - entry.tile_id < u64::from(entry.run_length) {
            Lookup::Tile {
                offset: entry.offset,
                length: entry.length,
            }
        } else {
            Lookup::Absent
        }
    }
}
