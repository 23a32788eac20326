use std::sync::OnceLock;

use glam::Vec3;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::biome::{
    BiomeClimate, BiomeDensities, BiomeId, BiomePalette, BiomeProperties, MobCategory, SpawnEntry,
};
use crate::config::ConfigError;
use crate::world::{BlockId, BlockRegistry};

const BIOME_TABLE: &str = include_str!("../../data/biomes.toml");

static GLOBAL_BIOMES: OnceLock<BiomeRegistry> = OnceLock::new();

/// Climate noise at one column, every channel normalised to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClimateSample {
    pub temperature: f32,
    pub humidity: f32,
    pub continentalness: f32,
    pub erosion: f32,
    pub weirdness: f32,
}

/// Inclusive ranges a sample must fall in; `None` matches everything
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClassificationRule {
    pub biome: String,
    pub temperature: Option<[f32; 2]>,
    pub humidity: Option<[f32; 2]>,
    pub continentalness: Option<[f32; 2]>,
    pub erosion: Option<[f32; 2]>,
    pub weirdness: Option<[f32; 2]>,
}

fn in_range(range: &Option<[f32; 2]>, value: f32) -> bool {
    match range {
        Some([lo, hi]) => value >= *lo && value <= *hi,
        None => true,
    }
}

impl ClassificationRule {
    pub fn matches(&self, sample: &ClimateSample) -> bool {
        in_range(&self.temperature, sample.temperature)
            && in_range(&self.humidity, sample.humidity)
            && in_range(&self.continentalness, sample.continentalness)
            && in_range(&self.erosion, sample.erosion)
            && in_range(&self.weirdness, sample.weirdness)
    }
}

#[derive(Debug, Deserialize)]
struct BiomeRecord {
    id: u8,
    name: String,
    temperature: f32,
    humidity: f32,
    downfall: f32,
    #[serde(default)]
    freezes_water: bool,
    base_offset: i32,
    height_variation: f32,
    surface: String,
    subsurface: String,
    underwater: String,
    stone: String,
    #[serde(default)]
    tree_chance: f32,
    #[serde(default)]
    grass_chance: f32,
    #[serde(default)]
    flower_chance: f32,
    #[serde(default)]
    mushroom_chance: f32,
    #[serde(default)]
    cactus_chance: f32,
    #[serde(default)]
    dead_bush_chance: f32,
    #[serde(default = "default_multiplier")]
    ore_multiplier: f32,
    #[serde(default = "default_multiplier")]
    structure_weight: f32,
    #[serde(default)]
    conifer: bool,
    snow_line: Option<i32>,
    sky_color: Vec3,
    fog_color: Vec3,
    water_color: Vec3,
    grass_color: Vec3,
    foliage_color: Vec3,
    #[serde(default)]
    spawns: Vec<SpawnEntry>,
}

fn default_multiplier() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct BiomeTable {
    fallback: String,
    #[serde(default)]
    rule: Vec<ClassificationRule>,
    biome: Vec<BiomeRecord>,
}

fn resolve_block(blocks: &BlockRegistry, biome: &str, name: &str) -> Result<BlockId, ConfigError> {
    blocks.id_by_name(name).ok_or_else(|| ConfigError::InvalidValue {
        field: format!("biome '{}'", biome),
        message: format!("unknown block '{}'", name),
    })
}

impl BiomeRecord {
    fn into_properties(self, blocks: &BlockRegistry) -> Result<BiomeProperties, ConfigError> {
        Ok(BiomeProperties {
            id: BiomeId(self.id),
            surface_block: resolve_block(blocks, &self.name, &self.surface)?,
            subsurface_block: resolve_block(blocks, &self.name, &self.subsurface)?,
            underwater_block: resolve_block(blocks, &self.name, &self.underwater)?,
            stone_block: resolve_block(blocks, &self.name, &self.stone)?,
            climate: BiomeClimate {
                temperature: self.temperature,
                humidity: self.humidity,
                downfall: self.downfall,
                freezes_water: self.freezes_water,
            },
            base_offset: self.base_offset,
            height_variation: self.height_variation,
            densities: BiomeDensities {
                tree: self.tree_chance,
                grass: self.grass_chance,
                flower: self.flower_chance,
                mushroom: self.mushroom_chance,
                cactus: self.cactus_chance,
                dead_bush: self.dead_bush_chance,
                ore_multiplier: self.ore_multiplier,
                structure_weight: self.structure_weight,
            },
            conifer: self.conifer,
            snow_line: self.snow_line,
            palette: BiomePalette {
                sky: self.sky_color,
                fog: self.fog_color,
                water: self.water_color,
                grass: self.grass_color,
                foliage: self.foliage_color,
            },
            spawns: self.spawns,
            name: self.name,
        })
    }
}

/// Read-only biome table plus classification rules
#[derive(Debug)]
pub struct BiomeRegistry {
    biomes: Vec<BiomeProperties>,
    by_id: FxHashMap<BiomeId, usize>,
    name_to_id: FxHashMap<String, BiomeId>,
    rules: Vec<(ClassificationRule, BiomeId)>,
    fallback: BiomeId,
}

impl BiomeRegistry {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: BiomeTable = toml::from_str(text)?;
        let blocks = BlockRegistry::global();

        let mut biomes = Vec::with_capacity(table.biome.len());
        let mut by_id = FxHashMap::default();
        let mut name_to_id = FxHashMap::default();
        for record in table.biome {
            let props = record.into_properties(blocks)?;
            if by_id.insert(props.id, biomes.len()).is_some() {
                return Err(ConfigError::InvalidValue {
                    field: "biome.id".to_string(),
                    message: format!("duplicate biome id {}", props.id.0),
                });
            }
            name_to_id.insert(props.name.clone(), props.id);
            biomes.push(props);
        }

        let lookup = |name: &str| {
            name_to_id.get(name).copied().ok_or_else(|| ConfigError::InvalidValue {
                field: "biome rule".to_string(),
                message: format!("unknown biome '{}'", name),
            })
        };
        let fallback = lookup(&table.fallback)?;
        let mut rules = Vec::with_capacity(table.rule.len());
        for rule in table.rule {
            let id = lookup(&rule.biome)?;
            rules.push((rule, id));
        }

        log::debug!(
            "[BiomeRegistry] Loaded {} biomes and {} classification rules",
            biomes.len(),
            rules.len()
        );
        Ok(Self {
            biomes,
            by_id,
            name_to_id,
            rules,
            fallback,
        })
    }

    /// Registry built from the embedded table, created on first use
    pub fn global() -> &'static BiomeRegistry {
        GLOBAL_BIOMES.get_or_init(|| match Self::from_toml_str(BIOME_TABLE) {
            Ok(registry) => registry,
            Err(e) => {
                log::error!("[BiomeRegistry] Embedded biome table is invalid: {}", e);
                Self::single_biome()
            }
        })
    }

    /// Minimal registry with a single plains biome
    fn single_biome() -> Self {
        let plains = BiomeProperties {
            id: BiomeId(0),
            name: "plains".to_string(),
            climate: BiomeClimate {
                temperature: 0.8,
                humidity: 0.4,
                downfall: 0.4,
                freezes_water: false,
            },
            base_offset: 4,
            height_variation: 0.35,
            surface_block: BlockId::GRASS,
            subsurface_block: BlockId::DIRT,
            underwater_block: BlockId::SAND,
            stone_block: BlockId::STONE,
            densities: BiomeDensities {
                ore_multiplier: 1.0,
                structure_weight: 1.0,
                ..BiomeDensities::default()
            },
            conifer: false,
            snow_line: None,
            palette: BiomePalette {
                sky: Vec3::new(0.47, 0.65, 1.0),
                fog: Vec3::new(0.75, 0.85, 1.0),
                water: Vec3::new(0.25, 0.46, 0.89),
                grass: Vec3::new(0.57, 0.74, 0.35),
                foliage: Vec3::new(0.47, 0.67, 0.19),
            },
            spawns: Vec::new(),
        };
        let mut by_id = FxHashMap::default();
        by_id.insert(plains.id, 0);
        let mut name_to_id = FxHashMap::default();
        name_to_id.insert(plains.name.clone(), plains.id);
        Self {
            biomes: vec![plains],
            by_id,
            name_to_id,
            rules: Vec::new(),
            fallback: BiomeId(0),
        }
    }

    /// First matching rule wins; the fallback biome makes this total
    pub fn classify(&self, sample: &ClimateSample) -> BiomeId {
        self.rules
            .iter()
            .find(|(rule, _)| rule.matches(sample))
            .map(|(_, id)| *id)
            .unwrap_or(self.fallback)
    }

    /// Properties of a biome; unknown ids resolve to the fallback biome
    pub fn get(&self, id: BiomeId) -> &BiomeProperties {
        let index = self
            .by_id
            .get(&id)
            .or_else(|| self.by_id.get(&self.fallback))
            .copied()
            .unwrap_or(0);
        &self.biomes[index]
    }

    pub fn by_name(&self, name: &str) -> Option<&BiomeProperties> {
        self.name_to_id.get(name).map(|id| self.get(*id))
    }

    pub fn fallback(&self) -> BiomeId {
        self.fallback
    }

    pub fn iter(&self) -> impl Iterator<Item = &BiomeProperties> {
        self.biomes.iter()
    }

    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }

    /// Spawn entries of a category for a biome, heaviest first
    pub fn spawn_candidates(&self, biome: BiomeId, category: MobCategory) -> Vec<&SpawnEntry> {
        let mut entries: Vec<&SpawnEntry> = self.get(biome).spawns_for(category).collect();
        entries.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.mob.cmp(&b.mob)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f32, h: f32, c: f32, e: f32, w: f32) -> ClimateSample {
        ClimateSample {
            temperature: t,
            humidity: h,
            continentalness: c,
            erosion: e,
            weirdness: w,
        }
    }

    #[test]
    fn test_embedded_table_loads() {
        let registry = BiomeRegistry::global();
        assert_eq!(registry.len(), 12);
        assert_eq!(registry.get(registry.fallback()).name, "plains");
        let desert = registry.by_name("desert").expect("desert should exist");
        assert_eq!(desert.surface_block, BlockId::SAND);
    }

    #[test]
    fn test_classify_rules_in_order() {
        let registry = BiomeRegistry::global();
        let name = |s: ClimateSample| registry.get(registry.classify(&s)).name.clone();
        assert_eq!(name(sample(0.5, 0.5, 0.1, 0.5, 0.5)), "ocean");
        assert_eq!(name(sample(0.9, 0.1, 0.6, 0.5, 0.2)), "desert");
        assert_eq!(name(sample(0.9, 0.1, 0.6, 0.5, 0.9)), "badlands");
        assert_eq!(name(sample(0.1, 0.5, 0.6, 0.5, 0.5)), "ice_plains");
        assert_eq!(name(sample(0.55, 0.2, 0.6, 0.5, 0.5)), "plains");
    }

    #[test]
    fn test_classify_is_total_and_stable() {
        let registry = BiomeRegistry::global();
        for i in 0..=10 {
            for j in 0..=10 {
                let s = sample(i as f32 / 10.0, j as f32 / 10.0, 0.7, 0.5, 0.5);
                let first = registry.classify(&s);
                assert_eq!(first, registry.classify(&s));
                assert_eq!(registry.get(first).id, first);
            }
        }
    }

    #[test]
    fn test_spawn_candidates_sorted() {
        let registry = BiomeRegistry::global();
        let plains = registry.by_name("plains").expect("plains should exist").id;
        let passive = registry.spawn_candidates(plains, MobCategory::Passive);
        assert_eq!(passive[0].mob, "sheep");
        assert!(passive.windows(2).all(|w| w[0].weight >= w[1].weight));
        assert!(registry.spawn_candidates(plains, MobCategory::Water).is_empty());
    }

    #[test]
    fn test_unknown_block_name_rejected() {
        let text = r#"
            fallback = "a"
            [[biome]]
            id = 0
            name = "a"
            temperature = 0.5
            humidity = 0.5
            downfall = 0.5
            base_offset = 0
            height_variation = 1.0
            surface = "no_such_block"
            subsurface = "dirt"
            underwater = "sand"
            stone = "stone"
            sky_color = [0.0, 0.0, 0.0]
            fog_color = [0.0, 0.0, 0.0]
            water_color = [0.0, 0.0, 0.0]
            grass_color = [0.0, 0.0, 0.0]
            foliage_color = [0.0, 0.0, 0.0]
        "#;
        assert!(BiomeRegistry::from_toml_str(text).is_err());
    }
}
