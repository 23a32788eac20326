//! Biome registry
//!
//! Biomes are data-driven: the table in `data/biomes.toml` supplies both the
//! per-biome properties and the ordered climate classification rules.

pub mod biome_properties;
pub mod registry;

pub use biome_properties::{
    BiomeClimate, BiomeDensities, BiomePalette, BiomeProperties, MobCategory, SpawnEntry,
};
pub use registry::{BiomeRegistry, ClassificationRule, ClimateSample};

use serde::{Deserialize, Serialize};

/// Compact biome identifier stored per chunk column
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    bytemuck::Pod, bytemuck::Zeroable,
)]
#[repr(transparent)]
pub struct BiomeId(pub u8);
