use lodestone_common::{RegionKey, Result};
use lodestone_logger as logger;
use lodestone_nbt::Tree;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::name::{parse_file_name, region_file_name};
use crate::region_file::RegionFile;

/// Opens and caches the region files under one directory, and maps
/// absolute chunk coordinates onto (region, local slot) pairs.
pub struct RegionManager {
    dir: PathBuf,
    regions: HashMap<RegionKey, RegionFile>,
}

impl RegionManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RegionManager {
            dir: dir.into(),
            regions: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn region_path(&self, key: RegionKey) -> PathBuf {
        self.dir.join(region_file_name(&key))
    }

    /// Opens the region, creating the file (and the directory) if needed.
    pub fn get_region(&mut self, key: RegionKey) -> Result<&mut RegionFile> {
        if !self.regions.contains_key(&key) {
            std::fs::create_dir_all(&self.dir)?;
            let region = RegionFile::open(self.region_path(key))?;
            self.regions.insert(key, region);
        }
        Ok(self.regions.get_mut(&key).unwrap())
    }

    /// Opens the region only if its file exists. An unopenable file is
    /// reported and treated as absent, per the recoverable "no chunk"
    /// contract.
    pub fn get_existing_region(&mut self, key: RegionKey) -> Option<&mut RegionFile> {
        if !self.regions.contains_key(&key) {
            let path = self.region_path(key);
            if !path.exists() {
                return None;
            }
            match RegionFile::open(&path) {
                Ok(region) => {
                    self.regions.insert(key, region);
                }
                Err(err) => {
                    logger::warn(&format!(
                        "skipping unreadable region file {}: {}",
                        path.display(),
                        err
                    ));
                    return None;
                }
            }
        }
        self.regions.get_mut(&key)
    }

    pub fn has_chunk(&mut self, cx: i32, cz: i32) -> bool {
        let key = RegionKey::for_chunk(cx, cz);
        match self.get_existing_region(key) {
            Some(region) => region.has_chunk(local(cx), local(cz)),
            None => false,
        }
    }

    pub fn read_chunk(&mut self, cx: i32, cz: i32) -> Result<Option<Tree>> {
        let key = RegionKey::for_chunk(cx, cz);
        match self.get_existing_region(key) {
            Some(region) => region.read_chunk(local(cx), local(cz)),
            None => Ok(None),
        }
    }

    pub fn write_chunk(&mut self, cx: i32, cz: i32, tree: &Tree) -> Result<()> {
        let key = RegionKey::for_chunk(cx, cz);
        let region = self.get_region(key)?;
        region.write_chunk(local(cx), local(cz), tree)
    }

    pub fn delete_chunk(&mut self, cx: i32, cz: i32) -> Result<()> {
        let key = RegionKey::for_chunk(cx, cz);
        match self.get_existing_region(key) {
            Some(region) => region.delete_chunk(local(cx), local(cz)),
            None => Ok(()),
        }
    }

    /// Region keys present on disk, by filename pattern, sorted for
    /// deterministic enumeration.
    pub fn list_regions(&self) -> Result<Vec<RegionKey>> {
        let mut keys = Vec::new();
        if !self.dir.exists() {
            return Ok(keys);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(key) = parse_file_name(name) {
                    keys.push(key);
                }
            }
        }
        keys.sort_by_key(|k| (k.rx, k.rz));
        Ok(keys)
    }
}

/// Chunk coordinate within its region.
fn local(c: i32) -> usize {
    c.rem_euclid(32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_nbt::{Tag, TagCompound};

    fn tree(marker: i32) -> Tree {
        let mut root = TagCompound::new();
        root.insert("marker", Tag::Int(marker));
        Tree::new(root)
    }

    #[test]
    fn test_chunk_maps_to_region_and_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RegionManager::new(dir.path());

        assert!(!manager.has_chunk(40, -3));
        manager.write_chunk(40, -3, &tree(7)).unwrap();
        assert!(manager.has_chunk(40, -3));

        // Chunk (40, -3) lands in region (1, -1), slot (8, 29).
        assert!(dir.path().join("r.1.-1.mcr").exists());
        let read = manager.read_chunk(40, -3).unwrap().unwrap();
        assert_eq!(read.root()["marker"], Tag::Int(7));
    }

    #[test]
    fn test_missing_region_reads_as_no_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RegionManager::new(dir.path());
        assert_eq!(manager.read_chunk(0, 0).unwrap(), None);
        assert!(!manager.has_chunk(0, 0));
    }

    #[test]
    fn test_delete_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RegionManager::new(dir.path());
        manager.write_chunk(1, 1, &tree(1)).unwrap();
        manager.delete_chunk(1, 1).unwrap();
        assert!(!manager.has_chunk(1, 1));
    }

    #[test]
    fn test_list_regions() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RegionManager::new(dir.path());
        manager.write_chunk(0, 0, &tree(1)).unwrap();
        manager.write_chunk(-1, 64, &tree(2)).unwrap();
        std::fs::write(dir.path().join("not-a-region.txt"), b"x").unwrap();

        let keys = manager.list_regions().unwrap();
        assert_eq!(
            keys,
            vec![RegionKey::new(-1, 2), RegionKey::new(0, 0)]
        );
    }
}
