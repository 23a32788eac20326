use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::biome::BiomeId;
use crate::world::BlockId;

/// Properties that define a biome's characteristics
#[derive(Debug, Clone)]
pub struct BiomeProperties {
    pub id: BiomeId,
    pub name: String,
    pub climate: BiomeClimate,
    /// Terrain base height relative to sea level
    pub base_offset: i32,
    /// Multiplier on the terrain noise amplitude
    pub height_variation: f32,
    /// Surface block (e.g., grass)
    pub surface_block: BlockId,
    /// Subsurface block (e.g., dirt)
    pub subsurface_block: BlockId,
    /// Replaces the surface block below sea level
    pub underwater_block: BlockId,
    /// Stone variant for this biome
    pub stone_block: BlockId,
    pub densities: BiomeDensities,
    /// Grows spruce instead of oak
    pub conifer: bool,
    /// Surface height above sea level where snow caps start
    pub snow_line: Option<i32>,
    pub palette: BiomePalette,
    pub spawns: Vec<SpawnEntry>,
}

/// Climate information for a biome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiomeClimate {
    /// Temperature (0.0 = freezing, 1.0+ = hot)
    pub temperature: f32,
    /// Humidity (0.0 = dry, 1.0 = wet)
    pub humidity: f32,
    /// Precipitation tendency used by weather
    pub downfall: f32,
    /// Whether water freezes in this biome
    pub freezes_water: bool,
}

impl BiomeClimate {
    /// Precipitation falls as snow
    pub fn is_cold(&self) -> bool {
        self.temperature < 0.15
    }

    /// No precipitation at all
    pub fn is_dry(&self) -> bool {
        self.downfall <= 0.05
    }
}

/// Per-column feature chances
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BiomeDensities {
    pub tree: f32,
    pub grass: f32,
    pub flower: f32,
    pub mushroom: f32,
    pub cactus: f32,
    pub dead_bush: f32,
    pub ore_multiplier: f32,
    pub structure_weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiomePalette {
    pub sky: Vec3,
    pub fog: Vec3,
    pub water: Vec3,
    pub grass: Vec3,
    pub foliage: Vec3,
}

/// Mob spawn categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobCategory {
    Passive,
    Hostile,
    Neutral,
    Water,
    Ambient,
}

/// One weighted entry of a spawn table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnEntry {
    pub category: MobCategory,
    pub mob: String,
    pub weight: u32,
    pub min_group: u32,
    pub max_group: u32,
}

impl BiomeProperties {
    /// Spawn entries of one category
    pub fn spawns_for(&self, category: MobCategory) -> impl Iterator<Item = &SpawnEntry> {
        self.spawns.iter().filter(move |s| s.category == category)
    }

    /// Sum of the weights of one category
    pub fn spawn_weight(&self, category: MobCategory) -> u32 {
        self.spawns_for(category).map(|s| s.weight).sum()
    }

    /// Surface block for a column whose top lies at `height`
    pub fn surface_for(&self, height: i32, sea_level: i32) -> BlockId {
        if height < sea_level {
            return self.underwater_block;
        }
        match self.snow_line {
            Some(line) if height >= sea_level + line => BlockId::SNOW,
            _ => self.surface_block,
        }
    }
}
