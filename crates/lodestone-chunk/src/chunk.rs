use lodestone_common::{LodestoneError, NibbleArray, Result};
use lodestone_light::{block_info, BlockInfo, LitVolume};
use lodestone_nbt::{
    NullSink, SchemaNode, SchemaOptions, Tag, TagCompound, TagList, TagType, Tree,
};
use once_cell::sync::Lazy;

pub const XDIM: usize = 16;
pub const YDIM: usize = 128;
pub const ZDIM: usize = 16;

const BLOCK_COUNT: usize = XDIM * YDIM * ZDIM;
const COLUMN_COUNT: usize = XDIM * ZDIM;

/// Expected shape of a serialized chunk tree. The bookkeeping scalars are
/// synthesized when absent so old trees load; the block arrays are not
/// negotiable.
static LEVEL_SCHEMA: Lazy<SchemaNode> = Lazy::new(|| {
    SchemaNode::compound(
        "",
        vec![SchemaNode::compound(
            "Level",
            vec![
                SchemaNode::array("Blocks", BLOCK_COUNT),
                SchemaNode::array("Data", BLOCK_COUNT / 2),
                SchemaNode::array("SkyLight", BLOCK_COUNT / 2),
                SchemaNode::array("BlockLight", BLOCK_COUNT / 2),
                SchemaNode::array("HeightMap", COLUMN_COUNT),
                SchemaNode::list_opts(
                    "Entities",
                    TagType::Compound,
                    SchemaOptions::CREATE_ON_MISSING,
                ),
                SchemaNode::list_opts(
                    "TileEntities",
                    TagType::Compound,
                    SchemaOptions::CREATE_ON_MISSING,
                ),
                SchemaNode::scalar_opts(
                    "LastUpdate",
                    TagType::Long,
                    SchemaOptions::CREATE_ON_MISSING,
                ),
                SchemaNode::scalar("xPos", TagType::Int),
                SchemaNode::scalar("zPos", TagType::Int),
                SchemaNode::scalar_opts(
                    "TerrainPopulated",
                    TagType::Byte,
                    SchemaOptions::CREATE_ON_MISSING,
                ),
            ],
        )],
    )
});

/// Whether a tree looks like a chunk without materializing one.
pub fn validate_level_tree(tree: &Tree) -> bool {
    let mut tag = Tag::Compound(tree.root().clone());
    LEVEL_SCHEMA.verify(&mut tag, &mut NullSink)
}

/// A bounded 16x128x16 block volume. The decoded arrays are owned here;
/// the tag tree is only the serialized form, rebuilt by `build_tree`.
#[derive(Debug)]
pub struct Chunk {
    cx: i32,
    cz: i32,
    blocks: Vec<u8>,
    data: NibbleArray,
    block_light: NibbleArray,
    sky_light: NibbleArray,
    height_map: Vec<u8>,
    entities: TagList,
    tile_entities: TagList,
    last_update: i64,
    terrain_populated: bool,
    dirty: bool,
}

impl Chunk {
    /// An empty chunk at the given coordinates, dirty from the start.
    pub fn new(cx: i32, cz: i32) -> Self {
        Chunk {
            cx,
            cz,
            blocks: vec![0; BLOCK_COUNT],
            data: NibbleArray::new(BLOCK_COUNT),
            block_light: NibbleArray::new(BLOCK_COUNT),
            sky_light: NibbleArray::new(BLOCK_COUNT),
            height_map: vec![0; COLUMN_COUNT],
            entities: TagList::new(TagType::Compound),
            tile_entities: TagList::new(TagType::Compound),
            last_update: 0,
            terrain_populated: false,
            dirty: true,
        }
    }

    /// Materializes a chunk from its serialized tree, repairing missing
    /// bookkeeping tags and copying the arrays into chunk-owned buffers.
    pub fn from_tree(tree: Tree) -> Result<Self> {
        let mut root = Tag::Compound(tree.into_root());
        if !LEVEL_SCHEMA.verify(&mut root, &mut NullSink) {
            return Err(LodestoneError::InvalidChunk(
                "tree does not describe a chunk level".to_string(),
            ));
        }

        let level = root
            .as_compound()
            .and_then(|c| c.get("Level"))
            .and_then(Tag::as_compound)
            .expect("verified tree has a Level compound");

        let array = |name: &str| -> Vec<u8> {
            level[name]
                .as_byte_array()
                .expect("verified tree has the block arrays")
                .to_vec()
        };

        Ok(Chunk {
            cx: level["xPos"].to_int().unwrap_or(0),
            cz: level["zPos"].to_int().unwrap_or(0),
            blocks: array("Blocks"),
            data: NibbleArray::from_bytes(array("Data")),
            block_light: NibbleArray::from_bytes(array("BlockLight")),
            sky_light: NibbleArray::from_bytes(array("SkyLight")),
            height_map: array("HeightMap"),
            entities: level["Entities"].as_list().cloned().unwrap_or_else(|| TagList::new(TagType::Compound)),
            tile_entities: level["TileEntities"].as_list().cloned().unwrap_or_else(|| TagList::new(TagType::Compound)),
            last_update: level["LastUpdate"].to_long().unwrap_or(0),
            terrain_populated: level["TerrainPopulated"].to_long().unwrap_or(0) != 0,
            dirty: false,
        })
    }

    /// Re-serializes the owned arrays into a fresh tree.
    pub fn build_tree(&self) -> Tree {
        let mut level = TagCompound::new();
        level.insert("Blocks", Tag::ByteArray(self.blocks.clone()));
        level.insert("Data", Tag::ByteArray(self.data.as_bytes().to_vec()));
        level.insert("SkyLight", Tag::ByteArray(self.sky_light.as_bytes().to_vec()));
        level.insert(
            "BlockLight",
            Tag::ByteArray(self.block_light.as_bytes().to_vec()),
        );
        level.insert("HeightMap", Tag::ByteArray(self.height_map.clone()));
        level.insert("Entities", Tag::List(self.entities.clone()));
        level.insert("TileEntities", Tag::List(self.tile_entities.clone()));
        level.insert("LastUpdate", Tag::Long(self.last_update));
        level.insert("xPos", Tag::Int(self.cx));
        level.insert("zPos", Tag::Int(self.cz));
        level.insert(
            "TerrainPopulated",
            Tag::Byte(if self.terrain_populated { 1 } else { 0 }),
        );

        let mut root = TagCompound::new();
        root.insert("Level", Tag::Compound(level));
        Tree::new(root)
    }

    pub fn x(&self) -> i32 {
        self.cx
    }

    pub fn z(&self) -> i32 {
        self.cz
    }

    pub fn get_id(&self, x: usize, y: usize, z: usize) -> u8 {
        self.blocks[index(x, y, z)]
    }

    pub fn set_id(&mut self, x: usize, y: usize, z: usize, id: u8) {
        self.blocks[index(x, y, z)] = id;
        self.dirty = true;
    }

    pub fn get_data(&self, x: usize, y: usize, z: usize) -> u8 {
        self.data.get(index(x, y, z))
    }

    pub fn set_data(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.data.set(index(x, y, z), value);
        self.dirty = true;
    }

    /// Linear scan used by content filters.
    pub fn count_by_id(&self, id: u8) -> usize {
        self.blocks.iter().filter(|&&b| b == id).count()
    }

    pub fn entities(&self) -> &TagList {
        &self.entities
    }

    pub fn tile_entities(&self) -> &TagList {
        &self.tile_entities
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    pub fn set_last_update(&mut self, value: i64) {
        self.last_update = value;
        self.dirty = true;
    }

    pub fn is_terrain_populated(&self) -> bool {
        self.terrain_populated
    }

    pub fn set_terrain_populated(&mut self, value: bool) {
        self.terrain_populated = value;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Zeroes both light planes ahead of a full relight.
    pub fn clear_light(&mut self) {
        self.block_light.clear();
        self.sky_light.clear();
        self.dirty = true;
    }
}

impl LitVolume for Chunk {
    fn xdim(&self) -> usize {
        XDIM
    }

    fn ydim(&self) -> usize {
        YDIM
    }

    fn zdim(&self) -> usize {
        ZDIM
    }

    fn get_info(&self, x: usize, y: usize, z: usize) -> &'static BlockInfo {
        block_info(self.get_id(x, y, z) as u16)
    }

    fn get_block_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.block_light.get(index(x, y, z))
    }

    fn set_block_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.block_light.set(index(x, y, z), value);
        self.dirty = true;
    }

    fn get_sky_light(&self, x: usize, y: usize, z: usize) -> u8 {
        self.sky_light.get(index(x, y, z))
    }

    fn set_sky_light(&mut self, x: usize, y: usize, z: usize, value: u8) {
        self.sky_light.set(index(x, y, z), value);
        self.dirty = true;
    }

    fn get_height(&self, x: usize, z: usize) -> usize {
        self.height_map[column(x, z)] as usize
    }

    fn set_height(&mut self, x: usize, z: usize, height: usize) {
        self.height_map[column(x, z)] = height as u8;
        self.dirty = true;
    }
}

/// XZY layout, y fastest. Out-of-bounds coordinates are a caller contract
/// violation.
fn index(x: usize, y: usize, z: usize) -> usize {
    assert!(
        x < XDIM && y < YDIM && z < ZDIM,
        "block coordinate ({}, {}, {}) out of range",
        x,
        y,
        z
    );
    (x * ZDIM + z) * YDIM + y
}

fn column(x: usize, z: usize) -> usize {
    assert!(
        x < XDIM && z < ZDIM,
        "column coordinate ({}, {}) out of range",
        x,
        z
    );
    x + z * XDIM
}
