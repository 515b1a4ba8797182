pub mod manager;
pub mod name;
pub mod region_file;
pub mod tree_file;

pub use manager::RegionManager;
pub use name::{parse_cubic_file_name, parse_file_name, region_file_name, CubicRegionKey};
pub use region_file::{ChunkDataWriter, RegionFile, COMPRESSION_GZIP, COMPRESSION_ZLIB, SECTOR_BYTES};
pub use tree_file::{chunk_file_path, parse_chunk_file_name, TreeFile};
