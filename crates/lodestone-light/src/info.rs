use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const MIN_LUMINANCE: u8 = 0;
pub const MAX_LUMINANCE: u8 = 15;
pub const MIN_OPACITY: u8 = 0;
pub const MAX_OPACITY: u8 = 15;

/// Static lighting properties of one block type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: u16,
    pub name: &'static str,
    /// Intrinsic light emission, 0..=15.
    pub luminance: u8,
    /// Attenuation applied to light passing through, 0..=15.
    pub opacity: u8,
    /// Whether light continues past this block at all.
    pub transmits_light: bool,
}

impl BlockInfo {
    /// Opaque, dark, non-transmitting until the builders say otherwise.
    const fn new(id: u16, name: &'static str) -> Self {
        BlockInfo {
            id,
            name,
            luminance: MIN_LUMINANCE,
            opacity: MAX_OPACITY,
            transmits_light: false,
        }
    }

    /// Full opacity also turns off transmission, anything lower turns it
    /// on; `transmission` overrides afterwards when needed.
    const fn opacity(mut self, opacity: u8) -> Self {
        self.opacity = opacity;
        self.transmits_light = opacity != MAX_OPACITY;
        self
    }

    const fn luminance(mut self, luminance: u8) -> Self {
        self.luminance = luminance;
        self
    }

    const fn transmission(mut self, transmits: bool) -> Self {
        self.transmits_light = transmits;
        self
    }

    /// Whether this block caps a sky column in the height map.
    pub fn obscures_light(&self) -> bool {
        self.opacity > MIN_OPACITY || !self.transmits_light
    }
}

static UNKNOWN: BlockInfo = BlockInfo::new(u16::MAX, "Unknown Block");

static REGISTRY: Lazy<HashMap<u16, BlockInfo>> = Lazy::new(|| {
    let table = [
        BlockInfo::new(0, "Air").opacity(0),
        BlockInfo::new(1, "Stone"),
        BlockInfo::new(2, "Grass"),
        BlockInfo::new(3, "Dirt"),
        BlockInfo::new(4, "Cobblestone"),
        BlockInfo::new(5, "Wooden Plank"),
        BlockInfo::new(6, "Sapling").opacity(0),
        BlockInfo::new(7, "Bedrock"),
        BlockInfo::new(8, "Water").opacity(3),
        BlockInfo::new(9, "Stationary Water").opacity(3),
        BlockInfo::new(10, "Lava")
            .opacity(0)
            .luminance(MAX_LUMINANCE)
            .transmission(false),
        BlockInfo::new(11, "Stationary Lava")
            .opacity(0)
            .luminance(MAX_LUMINANCE)
            .transmission(false),
        BlockInfo::new(12, "Sand"),
        BlockInfo::new(13, "Gravel"),
        BlockInfo::new(14, "Gold Ore"),
        BlockInfo::new(15, "Iron Ore"),
        BlockInfo::new(16, "Coal Ore"),
        BlockInfo::new(17, "Wood"),
        BlockInfo::new(18, "Leaves").opacity(1),
        BlockInfo::new(19, "Sponge"),
        BlockInfo::new(20, "Glass").opacity(0),
        BlockInfo::new(35, "Wool"),
        BlockInfo::new(37, "Yellow Flower").opacity(0),
        BlockInfo::new(38, "Red Rose").opacity(0),
        BlockInfo::new(39, "Brown Mushroom").opacity(0).luminance(1),
        BlockInfo::new(40, "Red Mushroom").opacity(0),
        BlockInfo::new(44, "Slab").opacity(0).transmission(false),
        BlockInfo::new(49, "Obsidian"),
        BlockInfo::new(50, "Torch").opacity(0).luminance(MAX_LUMINANCE - 1),
        BlockInfo::new(51, "Fire").opacity(0).luminance(MAX_LUMINANCE),
        BlockInfo::new(52, "Monster Spawner").opacity(0),
        BlockInfo::new(62, "Burning Furnace").luminance(MAX_LUMINANCE - 1),
        BlockInfo::new(65, "Ladder").opacity(0),
        BlockInfo::new(76, "Redstone Torch").opacity(0).luminance(7),
        BlockInfo::new(78, "Snow").opacity(0),
        BlockInfo::new(79, "Ice").opacity(3),
        BlockInfo::new(89, "Glowstone Block").luminance(MAX_LUMINANCE),
        BlockInfo::new(91, "Jack-O-Lantern").luminance(MAX_LUMINANCE),
    ];
    table.into_iter().map(|info| (info.id, info)).collect()
});

/// Lighting properties for a block id; unregistered ids read as opaque
/// and dark.
pub fn block_info(id: u16) -> &'static BlockInfo {
    REGISTRY.get(&id).unwrap_or(&UNKNOWN)
}
