use lodestone_common::ChunkKey;
use std::collections::HashSet;

use crate::chunk::Chunk;

/// Coordinate and content predicate for chunk enumeration. The include
/// and exclude sides carry their own any/all mode.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    x_range: Option<(i32, i32)>,
    z_range: Option<(i32, i32)>,
    include_ids: HashSet<u8>,
    exclude_ids: HashSet<u8>,
    include_match_all: bool,
    exclude_match_all: bool,
}

impl ChunkFilter {
    pub fn new() -> Self {
        ChunkFilter::default()
    }

    /// Inclusive chunk-coordinate bounds.
    pub fn x_range(mut self, min: i32, max: i32) -> Self {
        self.x_range = Some((min, max));
        self
    }

    pub fn z_range(mut self, min: i32, max: i32) -> Self {
        self.z_range = Some((min, max));
        self
    }

    /// Chunk must contain this block id to pass.
    pub fn include_id(mut self, id: u8) -> Self {
        self.include_ids.insert(id);
        self
    }

    /// Chunk containing this block id is rejected.
    pub fn exclude_id(mut self, id: u8) -> Self {
        self.exclude_ids.insert(id);
        self
    }

    /// With multiple include ids, require all of them instead of any.
    pub fn include_match_all(mut self) -> Self {
        self.include_match_all = true;
        self
    }

    pub fn include_match_any(mut self) -> Self {
        self.include_match_all = false;
        self
    }

    /// With multiple exclude ids, reject only chunks containing all of
    /// them instead of any.
    pub fn exclude_match_all(mut self) -> Self {
        self.exclude_match_all = true;
        self
    }

    pub fn exclude_match_any(mut self) -> Self {
        self.exclude_match_all = false;
        self
    }

    /// Whether the filter needs chunk contents, or coordinates suffice.
    pub fn has_content_terms(&self) -> bool {
        !self.include_ids.is_empty() || !self.exclude_ids.is_empty()
    }

    pub fn matches_coords(&self, key: ChunkKey) -> bool {
        if let Some((min, max)) = self.x_range {
            if key.cx < min || key.cx > max {
                return false;
            }
        }
        if let Some((min, max)) = self.z_range {
            if key.cz < min || key.cz > max {
                return false;
            }
        }
        true
    }

    pub fn matches(&self, key: ChunkKey, chunk: &Chunk) -> bool {
        if !self.matches_coords(key) {
            return false;
        }

        if !self.include_ids.is_empty() {
            let found = self.count_matches(&self.include_ids, chunk);
            let required = if self.include_match_all {
                self.include_ids.len()
            } else {
                1
            };
            if found < required {
                return false;
            }
        }

        if !self.exclude_ids.is_empty() {
            let found = self.count_matches(&self.exclude_ids, chunk);
            let rejecting = if self.exclude_match_all {
                self.exclude_ids.len()
            } else {
                1
            };
            if found >= rejecting {
                return false;
            }
        }

        true
    }

    /// How many of the given ids appear in the chunk at least once.
    fn count_matches(&self, ids: &HashSet<u8>, chunk: &Chunk) -> usize {
        ids.iter().filter(|&&id| chunk.count_by_id(id) > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with(ids: &[u8]) -> Chunk {
        let mut chunk = Chunk::new(0, 0);
        for (i, &id) in ids.iter().enumerate() {
            chunk.set_id(i, 0, 0, id);
        }
        chunk
    }

    #[test]
    fn test_coordinate_bounds() {
        let filter = ChunkFilter::new().x_range(-2, 2).z_range(0, 10);
        assert!(filter.matches_coords(ChunkKey::new(0, 0)));
        assert!(filter.matches_coords(ChunkKey::new(-2, 10)));
        assert!(!filter.matches_coords(ChunkKey::new(3, 0)));
        assert!(!filter.matches_coords(ChunkKey::new(0, -1)));
    }

    #[test]
    fn test_include_any_vs_all() {
        let chunk = chunk_with(&[1]);
        let key = ChunkKey::new(0, 0);

        let any = ChunkFilter::new().include_id(1).include_id(56);
        assert!(any.matches(key, &chunk));

        let all = ChunkFilter::new()
            .include_id(1)
            .include_id(56)
            .include_match_all();
        assert!(!all.matches(key, &chunk));

        let both = chunk_with(&[1, 56]);
        let all = ChunkFilter::new()
            .include_id(1)
            .include_id(56)
            .include_match_all();
        assert!(all.matches(key, &both));
    }

    #[test]
    fn test_exclude_any_vs_all() {
        let chunk = chunk_with(&[1]);
        let key = ChunkKey::new(0, 0);

        let any = ChunkFilter::new().exclude_id(1).exclude_id(56);
        assert!(!any.matches(key, &chunk));

        // Match-all excludes only when every listed id is present.
        let all = ChunkFilter::new()
            .exclude_id(1)
            .exclude_id(56)
            .exclude_match_all();
        assert!(all.matches(key, &chunk));

        let both = chunk_with(&[1, 56]);
        assert!(!all.matches(key, &both));
    }

    #[test]
    fn test_include_and_exclude_modes_are_independent() {
        // The include side in match-all must not flip the exclude side.
        let filter = ChunkFilter::new()
            .include_id(1)
            .include_id(4)
            .include_match_all()
            .exclude_id(56)
            .exclude_id(57);

        let key = ChunkKey::new(0, 0);
        let chunk = chunk_with(&[1, 4, 56]);
        // Exclude stays match-any: one excluded id is enough to reject.
        assert!(!filter.matches(key, &chunk));

        let clean = chunk_with(&[1, 4]);
        assert!(filter.matches(key, &clean));
    }
}
