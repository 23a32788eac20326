//! Block ids and the process-wide block registry
//!
//! The registry is populated once from the embedded block table and is
//! read-only afterwards. Ids the table does not define resolve to a sentinel
//! "unknown" block that is opaque, solid and breakable.

use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::constants::blocks;
use crate::error::{registry_full, WorldError, WorldResult};

const BLOCK_TABLE: &str = include_str!("../../data/blocks.toml");

static GLOBAL_REGISTRY: OnceLock<BlockRegistry> = OnceLock::new();

/// Unique identifier for a block type
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    bytemuck::Pod, bytemuck::Zeroable,
)]
#[repr(transparent)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(blocks::AIR);
    pub const STONE: BlockId = BlockId(blocks::STONE);
    pub const DIRT: BlockId = BlockId(blocks::DIRT);
    pub const GRASS: BlockId = BlockId(blocks::GRASS);
    pub const WOOD: BlockId = BlockId(blocks::WOOD);
    pub const SAND: BlockId = BlockId(blocks::SAND);
    pub const WATER: BlockId = BlockId(blocks::WATER);
    pub const LEAVES: BlockId = BlockId(blocks::LEAVES);
    pub const GLASS: BlockId = BlockId(blocks::GLASS);
    pub const COAL_ORE: BlockId = BlockId(blocks::COAL_ORE);
    pub const IRON_ORE: BlockId = BlockId(blocks::IRON_ORE);
    pub const GOLD_ORE: BlockId = BlockId(blocks::GOLD_ORE);
    pub const DIAMOND_ORE: BlockId = BlockId(blocks::DIAMOND_ORE);
    pub const BEDROCK: BlockId = BlockId(blocks::BEDROCK);
    pub const PLANKS: BlockId = BlockId(blocks::PLANKS);
    pub const COBBLESTONE: BlockId = BlockId(blocks::COBBLESTONE);
    pub const MOSSY_COBBLESTONE: BlockId = BlockId(blocks::MOSSY_COBBLESTONE);
    pub const GRAVEL: BlockId = BlockId(blocks::GRAVEL);
    pub const CLAY: BlockId = BlockId(blocks::CLAY);
    pub const TORCH: BlockId = BlockId(blocks::TORCH);
    pub const GLOWSTONE: BlockId = BlockId(blocks::GLOWSTONE);
    pub const LAVA: BlockId = BlockId(blocks::LAVA);
    pub const LOG: BlockId = BlockId(blocks::LOG);
    pub const SANDSTONE: BlockId = BlockId(blocks::SANDSTONE);
    pub const RED_SAND: BlockId = BlockId(blocks::RED_SAND);
    pub const RED_SANDSTONE: BlockId = BlockId(blocks::RED_SANDSTONE);
    pub const TALL_GRASS: BlockId = BlockId(blocks::TALL_GRASS);
    pub const FLOWER_RED: BlockId = BlockId(blocks::FLOWER_RED);
    pub const FLOWER_YELLOW: BlockId = BlockId(blocks::FLOWER_YELLOW);
    pub const CACTUS: BlockId = BlockId(blocks::CACTUS);
    pub const SNOW: BlockId = BlockId(blocks::SNOW);
    pub const ICE: BlockId = BlockId(blocks::ICE);
    pub const MUD: BlockId = BlockId(blocks::MUD);
    pub const FROZEN_GRASS: BlockId = BlockId(blocks::FROZEN_GRASS);
    pub const MUSHROOM_RED: BlockId = BlockId(blocks::MUSHROOM_RED);
    pub const MUSHROOM_BROWN: BlockId = BlockId(blocks::MUSHROOM_BROWN);
    pub const BRICK: BlockId = BlockId(blocks::BRICK);
    pub const SPRUCE_LOG: BlockId = BlockId(blocks::SPRUCE_LOG);
    pub const SPRUCE_LEAVES: BlockId = BlockId(blocks::SPRUCE_LEAVES);
    pub const DEAD_BUSH: BlockId = BlockId(blocks::DEAD_BUSH);
    pub const UNKNOWN: BlockId = BlockId(blocks::UNKNOWN);

    #[inline]
    pub fn is_air(self) -> bool {
        self == BlockId::AIR
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match BlockRegistry::global().lookup(*self) {
            Some(props) => write!(f, "{}", props.name),
            None => write!(f, "Block({})", self.0),
        }
    }
}

/// Collision volume of a block in unit-cube space
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionBounds {
    Full,
    Empty,
    /// Boxes as `[x0, y0, z0, x1, y1, z1]` inside the unit cube
    Boxes(Vec<[f32; 6]>),
}

/// One entry of a drop table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEntry {
    pub id: u16,
    pub count: u8,
}

/// Static properties of a block type
#[derive(Debug, Clone, PartialEq)]
pub struct BlockProperties {
    pub id: BlockId,
    pub name: String,
    pub solid: bool,
    /// 0 = transparent .. 15 = blocks all light
    pub opacity: u8,
    pub emission: u8,
    /// Negative hardness means unbreakable
    pub hardness: f32,
    pub collision: CollisionBounds,
    pub liquid: bool,
    pub replaceable: bool,
    pub flammable: bool,
    pub drops: Vec<DropEntry>,
}

impl BlockProperties {
    fn unknown() -> Self {
        Self {
            id: BlockId::UNKNOWN,
            name: "unknown".to_string(),
            solid: true,
            opacity: 15,
            emission: 0,
            hardness: 1.0,
            collision: CollisionBounds::Full,
            liquid: false,
            replaceable: false,
            flammable: false,
            drops: Vec::new(),
        }
    }

    pub fn is_breakable(&self) -> bool {
        self.hardness >= 0.0
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CollisionSpec {
    Named(String),
    Boxes { boxes: Vec<[f32; 6]> },
}

#[derive(Debug, Deserialize)]
struct BlockRecord {
    id: u16,
    name: String,
    #[serde(default = "default_true")]
    solid: bool,
    #[serde(default = "default_opacity")]
    opacity: u8,
    #[serde(default)]
    emission: u8,
    #[serde(default = "default_hardness")]
    hardness: f32,
    collision: Option<CollisionSpec>,
    #[serde(default)]
    liquid: bool,
    #[serde(default)]
    replaceable: bool,
    #[serde(default)]
    flammable: bool,
    /// Absent means the block drops itself
    drops: Option<Vec<DropEntry>>,
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> u8 {
    15
}

fn default_hardness() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct BlockTable {
    block: Vec<BlockRecord>,
}

impl BlockRecord {
    fn into_properties(self) -> WorldResult<BlockProperties> {
        let collision = match self.collision {
            None => CollisionBounds::Full,
            Some(CollisionSpec::Named(name)) => match name.as_str() {
                "full" => CollisionBounds::Full,
                "none" => CollisionBounds::Empty,
                other => {
                    return Err(WorldError::Config(crate::config::ConfigError::InvalidValue {
                        field: format!("block '{}' collision", self.name),
                        message: format!("unknown collision kind '{}'", other),
                    }))
                }
            },
            Some(CollisionSpec::Boxes { boxes }) => CollisionBounds::Boxes(boxes),
        };
        let drops = self.drops.unwrap_or_else(|| vec![DropEntry { id: self.id, count: 1 }]);

        Ok(BlockProperties {
            id: BlockId(self.id),
            name: self.name,
            solid: self.solid,
            opacity: self.opacity.min(15),
            emission: self.emission.min(15),
            hardness: self.hardness,
            collision,
            liquid: self.liquid,
            replaceable: self.replaceable,
            flammable: self.flammable,
            drops,
        })
    }
}

/// Registry of all block types, indexed by id
pub struct BlockRegistry {
    blocks: Vec<Option<BlockProperties>>,
    name_to_id: FxHashMap<String, BlockId>,
    unknown: BlockProperties,
}

impl BlockRegistry {
    /// Ids above this are reserved for the unknown sentinel
    pub const CAPACITY: usize = blocks::UNKNOWN as usize;

    pub fn empty() -> Self {
        Self {
            blocks: Vec::new(),
            name_to_id: FxHashMap::default(),
            unknown: BlockProperties::unknown(),
        }
    }

    /// Build a registry from a TOML block table
    pub fn from_toml_str(text: &str) -> WorldResult<Self> {
        let table: BlockTable = toml::from_str(text)
            .map_err(|e| WorldError::Config(crate::config::ConfigError::Parse(e)))?;
        let mut registry = Self::empty();
        for record in table.block {
            registry.register(record.into_properties()?)?;
        }
        log::debug!("[BlockRegistry] Loaded {} block types", registry.name_to_id.len());
        Ok(registry)
    }

    /// Registry built from the embedded table, created on first use
    pub fn global() -> &'static BlockRegistry {
        GLOBAL_REGISTRY.get_or_init(|| match Self::from_toml_str(BLOCK_TABLE) {
            Ok(registry) => registry,
            Err(e) => {
                log::error!("[BlockRegistry] Embedded block table is invalid: {}", e);
                Self::empty()
            }
        })
    }

    /// Add or replace a block type
    pub fn register(&mut self, props: BlockProperties) -> WorldResult<BlockId> {
        let index = props.id.0 as usize;
        if index >= Self::CAPACITY {
            return Err(registry_full("blocks", Self::CAPACITY));
        }
        if self.blocks.len() <= index {
            self.blocks.resize(index + 1, None);
        }
        let id = props.id;
        self.name_to_id.insert(props.name.clone(), id);
        self.blocks[index] = Some(props);
        Ok(id)
    }

    /// Properties for a known id
    pub fn lookup(&self, id: BlockId) -> Option<&BlockProperties> {
        self.blocks.get(id.0 as usize).and_then(|b| b.as_ref())
    }

    /// Properties for any id, falling back to the unknown sentinel
    #[inline]
    pub fn get(&self, id: BlockId) -> &BlockProperties {
        self.lookup(id).unwrap_or(&self.unknown)
    }

    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.name_to_id.get(name).copied()
    }

    #[inline]
    pub fn opacity(&self, id: BlockId) -> u8 {
        self.get(id).opacity
    }

    #[inline]
    pub fn emission(&self, id: BlockId) -> u8 {
        self.get(id).emission
    }

    #[inline]
    pub fn is_solid(&self, id: BlockId) -> bool {
        self.get(id).solid
    }

    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_id.is_empty()
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("blocks", &self.len())
            .field("capacity", &self.blocks.len())
            .finish()
    }
}
