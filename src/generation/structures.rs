use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::biome::BiomeRegistry;
use crate::config::ConfigError;
use crate::constants::core::{CHUNK_SIZE, CHUNK_SIZE_I32};
use crate::generation::ClimateSampler;
use crate::noise::mix_seed;
use crate::world::{BlockId, BlockPos, Chunk, ChunkPos};

const STRUCTURE_TABLE: &str = include_str!("../../data/structures.toml");
const STRUCTURE_TAG: i64 = 0x7374_7275;

static GLOBAL_STRUCTURES: OnceLock<Vec<StructureDef>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Well,
    Ruin,
    Tower,
}

impl StructureKind {
    /// Horizontal extent of the template in blocks
    pub fn footprint(self) -> i32 {
        match self {
            StructureKind::Well => 5,
            StructureKind::Ruin => 7,
            StructureKind::Tower => 5,
        }
    }

    /// Upper bound on the template's height above its origin
    pub fn max_height(self) -> i32 {
        match self {
            StructureKind::Well => 5,
            StructureKind::Ruin => 4,
            StructureKind::Tower => 15,
        }
    }
}

/// One row of `data/structures.toml`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StructureDef {
    pub name: String,
    pub kind: StructureKind,
    /// Region edge length in chunks
    pub spacing: i32,
    pub chance: f32,
    pub biomes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StructureTable {
    structure: Vec<StructureDef>,
}

impl StructureDef {
    pub fn table_from_toml_str(text: &str) -> Result<Vec<StructureDef>, ConfigError> {
        let table: StructureTable = toml::from_str(text)?;
        for def in &table.structure {
            if def.spacing < 1 {
                return Err(ConfigError::InvalidValue {
                    field: format!("structure.{}.spacing", def.name),
                    message: "spacing must be at least one chunk".to_string(),
                });
            }
        }
        Ok(table.structure)
    }

    /// Definitions from the embedded table
    pub fn global() -> &'static [StructureDef] {
        GLOBAL_STRUCTURES.get_or_init(|| match Self::table_from_toml_str(STRUCTURE_TABLE) {
            Ok(defs) => defs,
            Err(e) => {
                log::error!("[StructureDef] Embedded structure table is invalid: {}", e);
                Vec::new()
            }
        })
    }
}

/// A placed structure; a pure function of the seed and its region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureInstance {
    pub kind: StructureKind,
    pub def_index: usize,
    /// Minimum corner in x and z; y is the surface the template stands on
    pub origin: BlockPos,
    pub variant_seed: u64,
}

impl StructureInstance {
    /// Whether the footprint overlaps the chunk's columns
    pub fn intersects(&self, pos: ChunkPos) -> bool {
        let size = self.kind.footprint();
        let (x0, z0) = (pos.min_block_x(), pos.min_block_z());
        self.origin.x < x0 + CHUNK_SIZE_I32
            && self.origin.x + size > x0
            && self.origin.z < z0 + CHUNK_SIZE_I32
            && self.origin.z + size > z0
    }

    /// Template cells in world coordinates, air cells included
    pub fn cells(&self) -> Vec<(BlockPos, BlockId)> {
        let mut rng = StdRng::seed_from_u64(self.variant_seed);
        let local = match self.kind {
            StructureKind::Well => well_template(),
            StructureKind::Ruin => ruin_template(&mut rng),
            StructureKind::Tower => tower_template(&mut rng),
        };
        local
            .into_iter()
            .map(|(dx, dy, dz, block)| (self.origin.offset(dx, dy, dz), block))
            .collect()
    }

    /// Write the cells that fall inside `chunk`; returns how many were written
    pub fn materialize(&self, chunk: &mut Chunk) -> usize {
        let pos = chunk.position();
        let height = chunk.height() as i32;
        let mut written = 0;
        for (cell, block) in self.cells() {
            if cell.chunk_pos() != pos || cell.y < 0 || cell.y >= height {
                continue;
            }
            let (lx, ly, lz) = cell.local();
            chunk.put_block(lx, ly, lz, block);
            written += 1;
        }
        written
    }
}

/// Decides where structures go.
///
/// Placement is keyed by `(structure type, cx / spacing, cz / spacing)` with
/// floor division, never by the chunk being generated, so both chunks of a
/// seam compute the same instance.
#[derive(Debug, Clone)]
pub struct StructurePlanner {
    seed: u64,
    defs: Vec<StructureDef>,
}

impl StructurePlanner {
    pub fn new(seed: u64) -> Self {
        Self::with_defs(seed, StructureDef::global().to_vec())
    }

    pub fn with_defs(seed: u64, defs: Vec<StructureDef>) -> Self {
        Self { seed, defs }
    }

    pub fn defs(&self) -> &[StructureDef] {
        &self.defs
    }

    /// Region holding a chunk for one structure type
    pub fn region_of(def: &StructureDef, pos: ChunkPos) -> (i32, i32) {
        (pos.x.div_euclid(def.spacing), pos.z.div_euclid(def.spacing))
    }

    /// The instance of `def_index` in a region, if one spawns there
    pub fn instance_in_region(
        &self,
        def_index: usize,
        region: (i32, i32),
        sampler: &ClimateSampler,
    ) -> Option<StructureInstance> {
        let def = self.defs.get(def_index)?;
        let mut rng = StdRng::seed_from_u64(mix_seed(
            self.seed,
            &[STRUCTURE_TAG, def_index as i64, region.0 as i64, region.1 as i64],
        ));

        let span = def.spacing * CHUNK_SIZE_I32;
        let ox = region.0 * span + rng.gen_range(0..span);
        let oz = region.1 * span + rng.gen_range(0..span);
        let roll: f32 = rng.gen();
        let variant_seed: u64 = rng.gen();

        let size = def.kind.footprint();
        let (cx, cz) = (ox + size / 2, oz + size / 2);
        let biome = BiomeRegistry::global().get(sampler.biome(cx, cz));
        if !def.biomes.iter().any(|name| *name == biome.name) {
            return None;
        }
        if roll >= def.chance * biome.densities.structure_weight {
            return None;
        }

        let base = sampler.column_height(cx, cz).height;
        if base < sampler.sea_level() || base + def.kind.max_height() >= sampler.world_height() {
            return None;
        }

        Some(StructureInstance {
            kind: def.kind,
            def_index,
            origin: BlockPos::new(ox, base, oz),
            variant_seed,
        })
    }

    /// Every instance whose footprint overlaps the chunk
    pub fn instances_near(&self, pos: ChunkPos, sampler: &ClimateSampler) -> Vec<StructureInstance> {
        let mut found = Vec::new();
        for def_index in 0..self.defs.len() {
            let def = &self.defs[def_index];
            // Footprints never exceed one chunk, so an overlapping origin lies
            // in this chunk or the one before it on each axis
            let mut regions = Vec::with_capacity(4);
            for (dx, dz) in [(-1, -1), (0, -1), (-1, 0), (0, 0)] {
                let region = Self::region_of(def, pos.offset(dx, dz));
                if !regions.contains(&region) {
                    regions.push(region);
                }
            }
            for region in regions {
                if let Some(instance) = self.instance_in_region(def_index, region, sampler) {
                    if instance.intersects(pos) {
                        found.push(instance);
                    }
                }
            }
        }
        found
    }
}

fn on_rim(x: i32, z: i32, size: i32) -> bool {
    x == 0 || z == 0 || x == size - 1 || z == size - 1
}

fn well_template() -> Vec<(i32, i32, i32, BlockId)> {
    let size = StructureKind::Well.footprint();
    let mut cells = Vec::new();
    for z in 0..size {
        for x in 0..size {
            let rim = on_rim(x, z, size);
            for dy in -2..=0 {
                let block = if rim { BlockId::COBBLESTONE } else { BlockId::WATER };
                cells.push((x, dy, z, block));
            }
            let corner = (x == 0 || x == size - 1) && (z == 0 || z == size - 1);
            for dy in 1..=3 {
                let block = if corner {
                    BlockId::PLANKS
                } else if rim && dy == 1 {
                    BlockId::COBBLESTONE
                } else {
                    BlockId::AIR
                };
                cells.push((x, dy, z, block));
            }
            cells.push((x, 4, z, BlockId::PLANKS));
        }
    }
    cells
}

fn ruin_template(rng: &mut StdRng) -> Vec<(i32, i32, i32, BlockId)> {
    let size = StructureKind::Ruin.footprint();
    let mut cells = Vec::new();
    for z in 0..size {
        for x in 0..size {
            let floor = if rng.gen_bool(0.4) {
                BlockId::MOSSY_COBBLESTONE
            } else {
                BlockId::COBBLESTONE
            };
            cells.push((x, 0, z, floor));
            let wall = if on_rim(x, z, size) { rng.gen_range(0..=3) } else { 0 };
            for dy in 1..=3 {
                let block = if dy <= wall {
                    if rng.gen_bool(0.3) {
                        BlockId::MOSSY_COBBLESTONE
                    } else {
                        BlockId::COBBLESTONE
                    }
                } else {
                    BlockId::AIR
                };
                cells.push((x, dy, z, block));
            }
        }
    }
    cells
}

fn tower_template(rng: &mut StdRng) -> Vec<(i32, i32, i32, BlockId)> {
    let size = StructureKind::Tower.footprint();
    let top = rng.gen_range(8..=12);
    let door = size / 2;
    let mut cells = Vec::new();
    for z in 0..size {
        for x in 0..size {
            cells.push((x, 0, z, BlockId::COBBLESTONE));
            let rim = on_rim(x, z, size);
            for dy in 1..=top {
                let doorway = z == 0 && x == door && dy <= 2;
                let block = if rim && !doorway { BlockId::BRICK } else { BlockId::AIR };
                cells.push((x, dy, z, block));
            }
            cells.push((x, top + 1, z, BlockId::PLANKS));
        }
    }
    cells.push((door, top + 2, door, BlockId::GLOWSTONE));
    cells
}

/// Structure pass: materialise every nearby instance into the chunk
pub(crate) fn place_structures(
    chunk: &mut Chunk,
    planner: &StructurePlanner,
    sampler: &ClimateSampler,
) -> usize {
    let pos = chunk.position();
    let mut placed = 0;
    for instance in planner.instances_near(pos, sampler) {
        if instance.materialize(chunk) > 0 {
            log::trace!(
                "[Structures] {:?} at {:?} written into chunk {:?}",
                instance.kind,
                instance.origin,
                pos
            );
            placed += 1;
        }
    }
    placed
}
