//! Tile id resolution across root and leaf directories.

use std::sync::Arc;

use tracing::trace;

use super::directory::{Directory, Lookup};
use super::error::{ArchiveError, ArchiveResult};
use crate::backend::BoxFuture;

/// Default bound on directory levels visited per lookup, root included.
pub const DEFAULT_MAX_DIRECTORY_DEPTH: usize = 4;

/// Supplies leaf directories on demand.
///
/// Implementations fetch and decode the directory stored at `offset`/`length`
/// inside the leaf directory region, typically through a cache.
pub trait LeafSource: Send + Sync {
    fn leaf_directory(&self, offset: u64, length: u32)
        -> BoxFuture<'_, ArchiveResult<Arc<Directory>>>;
}

/// Location of a tile's bytes, relative to the tile data region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub offset: u64,
    pub length: u32,
}

/// Walks directories from the root until a tile entry or a miss.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryResolver {
    max_depth: usize,
}

impl Default for DirectoryResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIRECTORY_DEPTH)
    }
}

impl DirectoryResolver {
    /// Creates a resolver visiting at most `max_depth` directories per lookup.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolves `tile_id` starting at `root`.
    ///
    /// Returns `Ok(None)` when the archive holds no tile for the id. Fails
    /// with [`ArchiveError::DirectoryTooDeep`] when leaf pointers keep
    /// chaining past the depth limit, which also catches cycles.
    pub async fn resolve<S>(
        &self,
        root: &Directory,
        tile_id: u64,
        leaves: &S,
    ) -> ArchiveResult<Option<TileRange>>
    where
        S: LeafSource + ?Sized,
    {
        let mut current: Option<Arc<Directory>> = None;

        for depth in 0..self.max_depth {
            let dir = current.as_deref().unwrap_or(root);
            match dir.find(tile_id) {
                Lookup::Tile { offset, length } => {
                    trace!(tile_id, depth, offset, length, "Tile entry found");
                    return Ok(Some(TileRange { offset, length }));
                }
                Lookup::Absent => {
                    trace!(tile_id, depth, "Tile absent");
                    return Ok(None);
                }
                Lookup::Leaf { offset, length } => {
                    // Last level reached: the leaf could never be searched.
                    if depth + 1 == self.max_depth {
                        break;
                    }
                    trace!(tile_id, depth, offset, length, "Descending into leaf directory");
                    current = Some(leaves.leaf_directory(offset, length).await?);
                }
            }
        }

        Err(ArchiveError::DirectoryTooDeep {
            tile_id,
            max_depth: self.max_depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixture::entry;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Leaf directories keyed by offset, counting fetches.
    struct MapLeaves {
        dirs: HashMap<u64, Arc<Directory>>,
        fetches: AtomicUsize,
    }

    impl MapLeaves {
        fn new(dirs: Vec<(u64, Directory)>) -> Self {
            Self {
                dirs: dirs.into_iter().map(|(k, d)| (k, Arc::new(d))).collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl LeafSource for MapLeaves {
        fn leaf_directory(
            &self,
            offset: u64,
            _length: u32,
        ) -> BoxFuture<'_, ArchiveResult<Arc<Directory>>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let found = self.dirs.get(&offset).cloned();
            Box::pin(async move {
                found.ok_or_else(|| ArchiveError::MalformedDirectory("no leaf".to_string()))
            })
        }
    }

    fn root_with_leaf() -> Directory {
        Directory::from_entries(vec![entry(5, 0, 10, 3), entry(10, 500, 20, 0)]).unwrap()
    }

    fn leaf() -> Directory {
        Directory::from_entries(vec![entry(10, 100, 7, 1), entry(12, 107, 9, 2)]).unwrap()
    }

    #[tokio::test]
    async fn test_run_entry_hit() {
        let leaves = MapLeaves::new(vec![(500, leaf())]);
        let resolver = DirectoryResolver::default();

        let hit = resolver.resolve(&root_with_leaf(), 6, &leaves).await.unwrap();
        assert_eq!(hit, Some(TileRange { offset: 0, length: 10 }));
        assert_eq!(leaves.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gap_after_run_is_absent() {
        let leaves = MapLeaves::new(vec![(500, leaf())]);
        let resolver = DirectoryResolver::default();

        assert_eq!(resolver.resolve(&root_with_leaf(), 8, &leaves).await.unwrap(), None);
        assert_eq!(resolver.resolve(&root_with_leaf(), 2, &leaves).await.unwrap(), None);
        assert_eq!(leaves.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_leaf_pointer_recurses() {
        let leaves = MapLeaves::new(vec![(500, leaf())]);
        let resolver = DirectoryResolver::default();

        let hit = resolver.resolve(&root_with_leaf(), 10, &leaves).await.unwrap();
        assert_eq!(hit, Some(TileRange { offset: 100, length: 7 }));

        let hit = resolver.resolve(&root_with_leaf(), 13, &leaves).await.unwrap();
        assert_eq!(hit, Some(TileRange { offset: 107, length: 9 }));

        let miss = resolver.resolve(&root_with_leaf(), 11, &leaves).await.unwrap();
        assert_eq!(miss, None);

        assert_eq!(leaves.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_two_levels_of_leaves() {
        let mid = Directory::from_entries(vec![entry(10, 900, 30, 0)]).unwrap();
        let leaves = MapLeaves::new(vec![(500, mid), (900, leaf())]);
        let resolver = DirectoryResolver::new(3);

        let hit = resolver.resolve(&root_with_leaf(), 12, &leaves).await.unwrap();
        assert_eq!(hit, Some(TileRange { offset: 107, length: 9 }));
    }

    #[tokio::test]
    async fn test_cycle_hits_depth_limit() {
        // Leaf at 500 points back at itself.
        let cyclic = Directory::from_entries(vec![entry(10, 500, 20, 0)]).unwrap();
        let leaves = MapLeaves::new(vec![(500, cyclic)]);
        let resolver = DirectoryResolver::new(4);

        let err = resolver.resolve(&root_with_leaf(), 10, &leaves).await.unwrap_err();
        assert_eq!(
            err,
            ArchiveError::DirectoryTooDeep {
                tile_id: 10,
                max_depth: 4
            }
        );
        // Root plus three leaves searched; no fetch for a level never searched.
        assert_eq!(leaves.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_leaf_fetch_error_propagates() {
        let leaves = MapLeaves::new(vec![]);
        let resolver = DirectoryResolver::default();

        let err = resolver.resolve(&root_with_leaf(), 10, &leaves).await.unwrap_err();
        assert!(matches!(err, ArchiveError::MalformedDirectory(_)));
    }

    #[tokio::test]
    async fn test_single_level_limit_never_fetches() {
        let leaves = MapLeaves::new(vec![]);
        let resolver = DirectoryResolver::new(1);

        let err = resolver.resolve(&root_with_leaf(), 10, &leaves).await.unwrap_err();
        assert!(matches!(err, ArchiveError::DirectoryTooDeep { max_depth: 1, .. }));
        assert_eq!(leaves.fetches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_depth_floor_is_one() {
        assert_eq!(DirectoryResolver::new(0).max_depth(), 1);
    }
}
