//! Shared helpers for integration tests: an archive builder, a read-counting
//! backend and a fixed-map locator.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use tilevault::archive::HEADER_SIZE;
use tilevault::backend::{BoxFuture, RangeError, RangeReader};
use tilevault::compression::{compress, Compression};
use tilevault::coord::coord_to_tile_id;
use tilevault::service::{ArchiveLocator, ServiceError};
use tilevault::TileType;

// ============================================================================
// Archive builder
// ============================================================================

/// Absolute `(offset, length)` of each region in a built archive.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub root: (u64, u64),
    pub metadata: (u64, u64),
    pub leaves: (u64, u64),
    pub tiles: (u64, u64),
}

struct Entry {
    tile_id: u64,
    offset: u64,
    length: u32,
    run_length: u32,
}

/// Builds archives byte for byte.
pub struct ArchiveBuilder {
    tiles: BTreeMap<u64, Vec<u8>>,
    internal: Compression,
    tile_compression: Compression,
    tile_type: TileType,
    min_zoom: u8,
    max_zoom: u8,
    metadata: String,
    leaf_size: usize,
    nesting: usize,
    root_until: u64,
}

impl ArchiveBuilder {
    pub fn new(min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            tiles: BTreeMap::new(),
            internal: Compression::Gzip,
            tile_compression: Compression::None,
            tile_type: TileType::Mvt,
            min_zoom,
            max_zoom,
            metadata: r#"{"name":"fixture"}"#.to_string(),
            leaf_size: usize::MAX,
            nesting: 0,
            root_until: 0,
        }
    }

    /// Adds a tile; `data` is stored compressed with the tile compression.
    pub fn tile(mut self, z: u8, x: u32, y: u32, data: &[u8]) -> Self {
        let id = coord_to_tile_id(z, x, y).unwrap();
        self.tiles.insert(id, data.to_vec());
        self
    }

    /// Adds every tile of zooms `min..=max` with payload `"z/x/y"`.
    pub fn fill(mut self) -> Self {
        for z in self.min_zoom..=self.max_zoom {
            for x in 0..(1u32 << z) {
                for y in 0..(1u32 << z) {
                    self = self.tile(z, x, y, format!("{}/{}/{}", z, x, y).as_bytes());
                }
            }
        }
        self
    }

    pub fn internal_compression(mut self, compression: Compression) -> Self {
        self.internal = compression;
        self
    }

    pub fn tile_compression(mut self, compression: Compression) -> Self {
        self.tile_compression = compression;
        self
    }

    pub fn tile_type(mut self, tile_type: TileType) -> Self {
        self.tile_type = tile_type;
        self
    }

    pub fn metadata(mut self, json: &str) -> Self {
        self.metadata = json.to_string();
        self
    }

    /// Splits tile entries into leaf directories of `leaf_size` entries,
    /// `nesting` levels deep. Zero levels keeps everything in the root.
    pub fn leaves(mut self, leaf_size: usize, nesting: usize) -> Self {
        self.leaf_size = leaf_size;
        self.nesting = nesting;
        self
    }

    /// Keeps entries for ids below `tile_id` directly in the root; only the
    /// rest go into leaves.
    pub fn root_until(mut self, tile_id: u64) -> Self {
        self.root_until = tile_id;
        self
    }

    pub fn build(self) -> (Vec<u8>, Layout) {
        let mut tile_data = Vec::new();
        let mut level = Vec::new();
        for (&tile_id, payload) in &self.tiles {
            let stored = compress(self.tile_compression, payload).unwrap();
            level.push(Entry {
                tile_id,
                offset: tile_data.len() as u64,
                length: stored.len() as u32,
                run_length: 1,
            });
            tile_data.extend_from_slice(&stored);
        }

        let split = level.partition_point(|e| e.tile_id < self.root_until);
        let mut direct: Vec<Entry> = if self.nesting > 0 {
            level.drain(..split).collect()
        } else {
            Vec::new()
        };

        let mut leaf_data = Vec::new();
        for _ in 0..self.nesting {
            let mut pointers = Vec::new();
            for chunk in level.chunks(self.leaf_size) {
                let block = compress(self.internal, &encode_directory(chunk)).unwrap();
                pointers.push(Entry {
                    tile_id: chunk[0].tile_id,
                    offset: leaf_data.len() as u64,
                    length: block.len() as u32,
                    run_length: 0,
                });
                leaf_data.extend_from_slice(&block);
            }
            level = pointers;
        }
        direct.append(&mut level);
        let level = direct;

        let root = compress(self.internal, &encode_directory(&level)).unwrap();
        let metadata = compress(self.internal, self.metadata.as_bytes()).unwrap();

        let root_at = HEADER_SIZE as u64;
        let layout = Layout {
            root: (root_at, root.len() as u64),
            metadata: (root_at + root.len() as u64, metadata.len() as u64),
            leaves: (
                root_at + (root.len() + metadata.len()) as u64,
                leaf_data.len() as u64,
            ),
            tiles: (
                root_at + (root.len() + metadata.len() + leaf_data.len()) as u64,
                tile_data.len() as u64,
            ),
        };

        let mut out = self.encode_header(&layout);
        out.extend_from_slice(&root);
        out.extend_from_slice(&metadata);
        out.extend_from_slice(&leaf_data);
        out.extend_from_slice(&tile_data);
        (out, layout)
    }

    fn encode_header(&self, layout: &Layout) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(b"PMTiles");
        out.push(3);
        for (offset, length) in [layout.root, layout.metadata, layout.leaves, layout.tiles] {
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&length.to_le_bytes());
        }
        let count = self.tiles.len() as u64;
        for value in [count, count, count] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.push(1);
        out.push(self.internal.code());
        out.push(self.tile_compression.code());
        out.push(self.tile_type.code());
        out.push(self.min_zoom);
        out.push(self.max_zoom);
        for e7 in [-1_800_000_000i32, -850_511_287, 1_800_000_000, 850_511_287] {
            out.extend_from_slice(&e7.to_le_bytes());
        }
        out.push(self.min_zoom);
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(out.len(), HEADER_SIZE);
        out
    }
}

fn push_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn encode_directory(entries: &[Entry]) -> Vec<u8> {
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

// ============================================================================
// Counting backend
// ============================================================================

/// In-memory backend that records every read and can inject failures.
pub struct CountingReader {
    data: Bytes,
    delay: Duration,
    reads: Mutex<Vec<(u64, u64)>>,
    length_calls: AtomicUsize,
    failures: Mutex<HashMap<u64, usize>>,
}

impl CountingReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            delay: Duration::ZERO,
            reads: Mutex::new(Vec::new()),
            length_calls: AtomicUsize::new(0),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Delays every read, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fails the next `times` reads starting at `offset` with a transport error.
    pub fn fail_at(&self, offset: u64, times: usize) {
        self.failures.lock().insert(offset, times);
    }

    pub fn reads(&self) -> Vec<(u64, u64)> {
        self.reads.lock().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().len()
    }

    /// Reads that started at `offset`.
    pub fn reads_at(&self, offset: u64) -> usize {
        self.reads.lock().iter().filter(|(o, _)| *o == offset).count()
    }

    /// Reads that started inside `region`.
    pub fn reads_within(&self, region: (u64, u64)) -> usize {
        let (start, length) = region;
        self.reads
            .lock()
            .iter()
            .filter(|(o, _)| *o >= start && *o < start + length)
            .count()
    }

    pub fn length_calls(&self) -> usize {
        self.length_calls.load(Ordering::SeqCst)
    }
}

impl RangeReader for CountingReader {
    fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>> {
        self.length_calls.fetch_add(1, Ordering::SeqCst);
        let length = self.data.len() as u64;
        Box::pin(async move { Ok(length) })
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Bytes, RangeError>> {
        Box::pin(async move {
            self.reads.lock().push((offset, length));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            {
                let mut failures = self.failures.lock();
                if let Some(remaining) = failures.get_mut(&offset) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(RangeError::Transport("injected failure".to_string()));
                    }
                }
            }
            let end = offset + length;
            if end > self.data.len() as u64 {
                return Err(RangeError::OutOfBounds {
                    offset,
                    length,
                    total: self.data.len() as u64,
                });
            }
            Ok(self.data.slice(offset as usize..end as usize))
        })
    }

    fn describe(&self) -> String {
        "counting".to_string()
    }
}

// ============================================================================
// Locator
// ============================================================================

/// Serves a fixed set of readers by archive id.
#[derive(Default)]
pub struct StaticLocator {
    readers: HashMap<String, Arc<dyn RangeReader>>,
    pub located: AtomicUsize,
}

impl StaticLocator {
    pub fn with(mut self, archive_id: &str, reader: Arc<dyn RangeReader>) -> Self {
        self.readers.insert(archive_id.to_string(), reader);
        self
    }
}

impl ArchiveLocator for StaticLocator {
    fn locate<'a>(
        &'a self,
        archive_id: &'a str,
    ) -> BoxFuture<'a, Result<Arc<dyn RangeReader>, ServiceError>> {
        self.located.fetch_add(1, Ordering::SeqCst);
        let found = self.readers.get(archive_id).cloned();
        Box::pin(async move {
            found.ok_or_else(|| ServiceError::ArchiveNotFound(archive_id.to_string()))
        })
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
