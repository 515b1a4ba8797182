pub mod cache;
pub mod chunk;
pub mod filter;
pub mod manager;

pub use cache::ChunkCache;
pub use chunk::{validate_level_tree, Chunk, XDIM, YDIM, ZDIM};
pub use filter::ChunkFilter;
pub use manager::{ChunkManager, ChunkRef, ChunkStore, RegionChunkStore, TreeFileChunkStore};
