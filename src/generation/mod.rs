//! Procedural terrain generation
//!
//! A chunk is generated by running fixed passes in order:
//! biome, height, base terrain, caves, ores, surface decoration, structures.
//! Every pass is a pure function of the world seed and the chunk position,
//! so two generators with the same seed produce byte-identical chunks.

mod budget;
mod caves;
mod climate;
mod decoration;
mod ores;
mod structures;
mod terrain;

pub use budget::GenerationBudget;
pub use climate::ClimateSampler;
pub use ores::{OreClass, ORE_CLASSES};
pub use structures::{StructureDef, StructureInstance, StructureKind, StructurePlanner};
pub use terrain::TerrainGenerator;

use crate::biome::BiomeId;
use crate::world::{Chunk, ChunkPos};

/// Output of one generation run
#[derive(Debug, Clone)]
pub struct GeneratedChunk {
    pub chunk: Chunk,
    /// A pass ran out of noise budget and degraded
    pub budget_exhausted: bool,
    /// Columns whose height had to be clamped below the world top
    pub degenerate_columns: u32,
}

impl GeneratedChunk {
    pub fn new(chunk: Chunk) -> Self {
        Self {
            chunk,
            budget_exhausted: false,
            degenerate_columns: 0,
        }
    }
}

/// Source of freshly generated chunks
pub trait WorldGenerator: Send + Sync {
    /// Generate a chunk; total over every chunk coordinate
    fn generate_chunk(&self, pos: ChunkPos) -> GeneratedChunk;

    /// Surface height of a column before caves and decoration
    fn surface_height(&self, wx: i32, wz: i32) -> i32;

    /// Biome of a column
    fn biome_at(&self, wx: i32, wz: i32) -> BiomeId;

    /// Vertical chunk size
    fn world_height(&self) -> usize;
}
