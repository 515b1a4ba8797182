pub mod engine;
pub mod info;

pub use engine::{LightEngine, LitVolume, NeighborResolver, SharedVolume};
pub use info::{block_info, BlockInfo, MAX_LUMINANCE, MAX_OPACITY, MIN_LUMINANCE};
