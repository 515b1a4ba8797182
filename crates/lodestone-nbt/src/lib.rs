pub mod schema;
pub mod tag;
pub mod tree;

pub use schema::{NullSink, SchemaNode, SchemaOptions, VerifySink};
pub use tag::{Tag, TagCompound, TagList, TagType};
pub use tree::Tree;
