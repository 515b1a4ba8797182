use lodestone_common::{ChunkKey, LodestoneError, Result};
use lodestone_light::{LightEngine, SharedVolume};
use lodestone_logger as logger;
use lodestone_nbt::Tree;
use lodestone_region::{chunk_file_path, parse_chunk_file_name, RegionManager, TreeFile};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::cache::ChunkCache;
pub use crate::cache::ChunkRef;
use crate::chunk::{Chunk, XDIM, YDIM, ZDIM};
use crate::filter::ChunkFilter;

const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Where serialized chunk trees live: region containers or loose files.
pub trait ChunkStore {
    fn has_chunk(&mut self, cx: i32, cz: i32) -> bool;
    fn read_tree(&mut self, cx: i32, cz: i32) -> Result<Option<Tree>>;
    fn write_tree(&mut self, cx: i32, cz: i32, tree: &Tree) -> Result<()>;
    fn delete_chunk(&mut self, cx: i32, cz: i32) -> Result<()>;
    fn chunk_keys(&mut self) -> Result<Vec<ChunkKey>>;
}

/// Chunks packed into region container files.
pub struct RegionChunkStore {
    regions: RegionManager,
}

impl RegionChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RegionChunkStore {
            regions: RegionManager::new(dir),
        }
    }

    pub fn regions(&mut self) -> &mut RegionManager {
        &mut self.regions
    }
}

impl ChunkStore for RegionChunkStore {
    fn has_chunk(&mut self, cx: i32, cz: i32) -> bool {
        self.regions.has_chunk(cx, cz)
    }

    fn read_tree(&mut self, cx: i32, cz: i32) -> Result<Option<Tree>> {
        self.regions.read_chunk(cx, cz)
    }

    fn write_tree(&mut self, cx: i32, cz: i32, tree: &Tree) -> Result<()> {
        self.regions.write_chunk(cx, cz, tree)
    }

    fn delete_chunk(&mut self, cx: i32, cz: i32) -> Result<()> {
        self.regions.delete_chunk(cx, cz)
    }

    fn chunk_keys(&mut self) -> Result<Vec<ChunkKey>> {
        let mut keys = Vec::new();
        for region_key in self.regions.list_regions()? {
            let Some(region) = self.regions.get_existing_region(region_key) else {
                continue;
            };
            for z in 0..32 {
                for x in 0..32 {
                    if region.has_chunk(x, z) {
                        keys.push(ChunkKey::new(
                            region_key.rx * 32 + x as i32,
                            region_key.rz * 32 + z as i32,
                        ));
                    }
                }
            }
        }
        Ok(keys)
    }
}

/// One gzip tree file per chunk under a base36 fanout directory.
pub struct TreeFileChunkStore {
    base: PathBuf,
}

impl TreeFileChunkStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        TreeFileChunkStore { base: base.into() }
    }

    fn file(&self, cx: i32, cz: i32) -> TreeFile {
        TreeFile::new(chunk_file_path(&self.base, cx, cz))
    }
}

impl ChunkStore for TreeFileChunkStore {
    fn has_chunk(&mut self, cx: i32, cz: i32) -> bool {
        self.file(cx, cz).exists()
    }

    fn read_tree(&mut self, cx: i32, cz: i32) -> Result<Option<Tree>> {
        let file = self.file(cx, cz);
        if !file.exists() {
            return Ok(None);
        }
        Ok(Some(file.read()?))
    }

    fn write_tree(&mut self, cx: i32, cz: i32, tree: &Tree) -> Result<()> {
        self.file(cx, cz).write(tree)
    }

    fn delete_chunk(&mut self, cx: i32, cz: i32) -> Result<()> {
        let file = self.file(cx, cz);
        if file.exists() {
            file.delete()?;
        }
        Ok(())
    }

    fn chunk_keys(&mut self) -> Result<Vec<ChunkKey>> {
        let mut keys = Vec::new();
        if !self.base.exists() {
            return Ok(keys);
        }
        for fanout_x in std::fs::read_dir(&self.base)? {
            let fanout_x = fanout_x?.path();
            if !fanout_x.is_dir() {
                continue;
            }
            for fanout_z in std::fs::read_dir(&fanout_x)? {
                let fanout_z = fanout_z?.path();
                if !fanout_z.is_dir() {
                    continue;
                }
                for entry in std::fs::read_dir(&fanout_z)? {
                    let entry = entry?;
                    if let Some((cx, cz)) = entry
                        .file_name()
                        .to_str()
                        .and_then(parse_chunk_file_name)
                    {
                        keys.push(ChunkKey::new(cx, cz));
                    }
                }
            }
        }
        Ok(keys)
    }
}

/// Loads, caches, saves and relights chunks over a backing store.
pub struct ChunkManager<S: ChunkStore> {
    store: S,
    cache: ChunkCache,
}

impl<S: ChunkStore> ChunkManager<S> {
    pub fn new(store: S) -> Self {
        Self::with_capacity(store, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(store: S, capacity: usize) -> Self {
        ChunkManager {
            store,
            cache: ChunkCache::new(capacity),
        }
    }

    pub fn store(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn has_chunk(&mut self, cx: i32, cz: i32) -> bool {
        self.cache.contains(ChunkKey::new(cx, cz)) || self.store.has_chunk(cx, cz)
    }

    /// The chunk at (cx, cz), from cache or decoded from the store. A
    /// malformed tree is an error for this direct load; enumeration
    /// paths catch and skip instead.
    pub fn get_chunk(&mut self, cx: i32, cz: i32) -> Result<Option<ChunkRef>> {
        let key = ChunkKey::new(cx, cz);
        if let Some(chunk) = self.cache.get(key) {
            return Ok(Some(chunk));
        }

        let Some(tree) = self.store.read_tree(cx, cz)? else {
            return Ok(None);
        };
        let chunk = Chunk::from_tree(tree)?;
        if chunk.x() != cx || chunk.z() != cz {
            return Err(LodestoneError::InvalidChunk(format!(
                "chunk at ({}, {}) claims to be ({}, {})",
                cx,
                cz,
                chunk.x(),
                chunk.z()
            )));
        }

        let chunk = Rc::new(RefCell::new(chunk));
        self.cache.insert(key, chunk.clone());
        Ok(Some(chunk))
    }

    /// A fresh empty chunk, replacing whatever the slot held.
    pub fn create_chunk(&mut self, cx: i32, cz: i32) -> ChunkRef {
        let chunk = Rc::new(RefCell::new(Chunk::new(cx, cz)));
        self.cache.insert(ChunkKey::new(cx, cz), chunk.clone());
        chunk
    }

    /// Writes one chunk if dirty; true when a write happened.
    pub fn save_chunk(&mut self, cx: i32, cz: i32) -> Result<bool> {
        let key = ChunkKey::new(cx, cz);
        let Some(chunk) = self.cache.get(key) else {
            return Ok(false);
        };
        if !chunk.borrow().is_dirty() {
            return Ok(false);
        }

        let tree = chunk.borrow().build_tree();
        self.store.write_tree(cx, cz, &tree)?;
        chunk.borrow_mut().mark_clean();
        Ok(true)
    }

    /// Writes every dirty cached chunk; returns how many were written.
    pub fn save(&mut self) -> Result<usize> {
        let mut written = 0;
        for key in self.cache.dirty_keys() {
            if self.save_chunk(key.cx, key.cz)? {
                written += 1;
            }
        }
        Ok(written)
    }

    pub fn delete_chunk(&mut self, cx: i32, cz: i32) -> Result<()> {
        self.cache.remove(ChunkKey::new(cx, cz));
        self.store.delete_chunk(cx, cz)
    }

    pub fn chunk_keys(&mut self) -> Result<Vec<ChunkKey>> {
        self.store.chunk_keys()
    }

    /// Keys passing the filter. Unreadable chunks are logged and
    /// skipped; one bad chunk never aborts the batch.
    pub fn filtered_keys(&mut self, filter: &ChunkFilter) -> Result<Vec<ChunkKey>> {
        let mut matched = Vec::new();
        for key in self.store.chunk_keys()? {
            if !filter.matches_coords(key) {
                continue;
            }
            if !filter.has_content_terms() {
                matched.push(key);
                continue;
            }

            match self.get_chunk(key.cx, key.cz) {
                Ok(Some(chunk)) => {
                    if filter.matches(key, &chunk.borrow()) {
                        matched.push(key);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    logger::warn(&format!(
                        "skipping unreadable chunk ({}, {}): {}",
                        key.cx, key.cz, err
                    ));
                }
            }
        }
        Ok(matched)
    }

    /// Full lighting rebuild for one chunk: height map, block light, sky
    /// light, then seam stitching against whatever neighbors are loaded.
    pub fn relight_chunk(&mut self, cx: i32, cz: i32) -> Result<bool> {
        let Some(chunk) = self.get_chunk(cx, cz)? else {
            return Ok(false);
        };
        chunk.borrow_mut().clear_light();

        let center: SharedVolume = chunk.clone();
        let mut engine = LightEngine::new(XDIM, YDIM, ZDIM);

        engine.rebuild_height_map(&center)?;

        let mut resolver = |dx: i32, dz: i32| -> Option<SharedVolume> {
            match self.get_chunk(cx + dx, cz + dz) {
                Ok(Some(neighbor)) => {
                    let volume: SharedVolume = neighbor;
                    Some(volume)
                }
                Ok(None) => None,
                Err(err) => {
                    logger::warn(&format!(
                        "treating unreadable neighbor ({}, {}) as unloaded: {}",
                        cx + dx,
                        cz + dz,
                        err
                    ));
                    None
                }
            }
        };

        engine.rebuild_block_light(&center, &mut resolver)?;
        engine.rebuild_sky_light(&center, &mut resolver)?;
        engine.stitch_block_light(&center, &mut resolver)?;
        engine.stitch_sky_light(&center, &mut resolver)?;
        Ok(true)
    }

    /// Incremental relight after one block changed.
    pub fn update_block(&mut self, cx: i32, cz: i32, x: usize, y: usize, z: usize) -> Result<bool> {
        let Some(chunk) = self.get_chunk(cx, cz)? else {
            return Ok(false);
        };

        let center: SharedVolume = chunk.clone();
        let mut engine = LightEngine::new(XDIM, YDIM, ZDIM);

        let mut resolver = |dx: i32, dz: i32| -> Option<SharedVolume> {
            match self.get_chunk(cx + dx, cz + dz) {
                Ok(Some(neighbor)) => {
                    let volume: SharedVolume = neighbor;
                    Some(volume)
                }
                _ => None,
            }
        };

        engine.update_block_light(&center, &mut resolver, x, y, z)?;
        engine.update_height_map(&center, &mut resolver, x, y, z)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use lodestone_light::LitVolume;

    fn region_manager(dir: &std::path::Path) -> ChunkManager<RegionChunkStore> {
        ChunkManager::new(RegionChunkStore::new(dir))
    }

    #[test]
    fn test_create_save_reload() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut manager = region_manager(dir.path());
            let chunk = manager.create_chunk(3, -2);
            chunk.borrow_mut().set_id(1, 64, 1, 4);
            assert_eq!(manager.save().unwrap(), 1);
            // A second save is a no-op: nothing is dirty.
            assert_eq!(manager.save().unwrap(), 0);
        }

        let mut manager = region_manager(dir.path());
        assert!(manager.has_chunk(3, -2));
        let chunk = manager.get_chunk(3, -2).unwrap().unwrap();
        assert_eq!(chunk.borrow().get_id(1, 64, 1), 4);
        assert!(!chunk.borrow().is_dirty());
    }

    #[test]
    fn test_get_missing_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = region_manager(dir.path());
        assert!(manager.get_chunk(9, 9).unwrap().is_none());
    }

    #[test]
    fn test_coordinate_mismatch_is_invalid_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = region_manager(dir.path());

        // Store a chunk claiming coordinates (0, 0) under key (5, 5).
        let tree = Chunk::new(0, 0).build_tree();
        manager.store().write_tree(5, 5, &tree).unwrap();

        assert_matches!(
            manager.get_chunk(5, 5),
            Err(LodestoneError::InvalidChunk(_))
        );
    }

    #[test]
    fn test_delete_chunk_clears_cache_and_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = region_manager(dir.path());
        manager.create_chunk(0, 0);
        manager.save().unwrap();

        manager.delete_chunk(0, 0).unwrap();
        assert!(!manager.has_chunk(0, 0));
        assert!(manager.get_chunk(0, 0).unwrap().is_none());
    }

    #[test]
    fn test_chunk_keys_across_regions() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = region_manager(dir.path());
        for (cx, cz) in [(0, 0), (31, 31), (32, 0), (-1, -1)] {
            manager.create_chunk(cx, cz);
        }
        manager.save().unwrap();

        let mut keys = manager.chunk_keys().unwrap();
        keys.sort_by_key(|k| (k.cx, k.cz));
        assert_eq!(
            keys,
            vec![
                ChunkKey::new(-1, -1),
                ChunkKey::new(0, 0),
                ChunkKey::new(31, 31),
                ChunkKey::new(32, 0),
            ]
        );
    }

    #[test]
    fn test_tree_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = ChunkManager::new(TreeFileChunkStore::new(dir.path()));

        let chunk = manager.create_chunk(-17, 80);
        chunk.borrow_mut().set_id(0, 0, 0, 7);
        manager.save().unwrap();

        let mut fresh = ChunkManager::new(TreeFileChunkStore::new(dir.path()));
        assert_eq!(fresh.chunk_keys().unwrap(), vec![ChunkKey::new(-17, 80)]);
        let reloaded = fresh.get_chunk(-17, 80).unwrap().unwrap();
        assert_eq!(reloaded.borrow().get_id(0, 0, 0), 7);
    }

    #[test]
    fn test_filtered_keys_skips_unreadable_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = region_manager(dir.path());

        let good = manager.create_chunk(0, 0);
        good.borrow_mut().set_id(0, 0, 0, 56);
        manager.create_chunk(1, 0);
        manager.save().unwrap();

        // Replace (1, 0) with a tree that is not a chunk.
        let mut root = lodestone_nbt::TagCompound::new();
        root.insert("garbage", lodestone_nbt::Tag::Int(1));
        manager
            .store()
            .write_tree(1, 0, &Tree::new(root))
            .unwrap();

        // Fresh manager so the cache holds nothing.
        let mut manager = region_manager(dir.path());
        let filter = ChunkFilter::new().include_id(56);
        let keys = manager.filtered_keys(&filter).unwrap();
        assert_eq!(keys, vec![ChunkKey::new(0, 0)]);
    }

    #[test]
    fn test_relight_chunk_lights_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = region_manager(dir.path());

        let chunk = manager.create_chunk(0, 0);
        chunk.borrow_mut().set_id(8, 20, 8, 89);

        assert!(manager.relight_chunk(0, 0).unwrap());

        let chunk = manager.get_chunk(0, 0).unwrap().unwrap();
        let vol = chunk.borrow();
        assert_eq!(vol.get_block_light(9, 20, 8), 14);
        // Open sky above the whole chunk.
        assert_eq!(vol.get_sky_light(8, 100, 8), 15);
    }
}
