use serde::{Deserialize, Serialize};

/// A block coordinate local to a chunk, possibly reaching into one of the
/// eight surrounding chunks during relighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockKey {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        BlockKey { x, y, z }
    }
}

/// Absolute chunk coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkKey {
    pub fn new(cx: i32, cz: i32) -> Self {
        ChunkKey { cx, cz }
    }
}

/// Region coordinates; one region spans 32x32 chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionKey {
    pub rx: i32,
    pub rz: i32,
}

impl RegionKey {
    pub fn new(rx: i32, rz: i32) -> Self {
        RegionKey { rx, rz }
    }

    /// Region containing the given absolute chunk coordinates.
    pub fn for_chunk(cx: i32, cz: i32) -> Self {
        RegionKey {
            rx: cx >> 5,
            rz: cz >> 5,
        }
    }
}
