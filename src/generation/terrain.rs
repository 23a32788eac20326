use crate::biome::{BiomeId, BiomeRegistry};
use crate::constants::core::CHUNK_SIZE;
use crate::generation::{
    caves, decoration, ores, structures, ClimateSampler, GeneratedChunk, GenerationBudget,
    StructurePlanner, WorldGenerator,
};
use crate::world::{BlockId, Chunk, ChunkPos};

/// Noise samples charged per column for the climate and height passes
const CLIMATE_SAMPLES_PER_COLUMN: usize = 5;
const HEIGHT_SAMPLES_PER_COLUMN: usize = 2;
/// Lattice points covering one chunk edge in the height blend
const LATTICE_EDGE: usize = CHUNK_SIZE / 4 + 1;

/// Deterministic chunk generator running the full pass pipeline
#[derive(Debug)]
pub struct TerrainGenerator {
    seed: u64,
    sampler: ClimateSampler,
    planner: StructurePlanner,
    budget: usize,
}

impl TerrainGenerator {
    pub fn new(seed: u64, world_height: usize, sea_level: i32, generation_budget: usize) -> Self {
        log::info!(
            "[TerrainGenerator] Seed {:#x}, height {}, sea level {}",
            seed,
            world_height,
            sea_level
        );
        Self {
            seed,
            sampler: ClimateSampler::new(seed, world_height, sea_level),
            planner: StructurePlanner::new(seed),
            budget: generation_budget,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn sampler(&self) -> &ClimateSampler {
        &self.sampler
    }

    pub fn planner(&self) -> &StructurePlanner {
        &self.planner
    }

    fn biome_pass(&self, chunk: &mut Chunk, budget: &mut GenerationBudget) {
        let pos = chunk.position();
        let fallback = BiomeRegistry::global().fallback();
        let affordable = budget.try_spend(CHUNK_SIZE * CHUNK_SIZE * CLIMATE_SAMPLES_PER_COLUMN);
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let biome = if affordable {
                    self.sampler
                        .biome(pos.min_block_x() + lx as i32, pos.min_block_z() + lz as i32)
                } else {
                    fallback
                };
                chunk.set_biome(lx, lz, biome);
            }
        }
    }

    /// Column heights for the chunk, with the number of clamped columns
    fn height_pass(&self, pos: ChunkPos, budget: &mut GenerationBudget) -> (Vec<i32>, u32) {
        let (x0, z0) = (pos.min_block_x(), pos.min_block_z());
        let mut heights = vec![0i32; CHUNK_SIZE * CHUNK_SIZE];
        let mut degenerate = 0;

        if !budget.try_spend(CHUNK_SIZE * CHUNK_SIZE * HEIGHT_SAMPLES_PER_COLUMN) {
            // Flat fallback at sea level keeps the chunk usable
            heights.fill(self.sampler.sea_level().clamp(1, self.sampler.world_height() - 2));
            return (heights, 0);
        }

        // Biome parameters on the 4-block lattice, computed once per chunk
        let mut lattice = [(0.0f32, 0.0f32); LATTICE_EDGE * LATTICE_EDGE];
        for iz in 0..LATTICE_EDGE {
            for ix in 0..LATTICE_EDGE {
                lattice[ix + iz * LATTICE_EDGE] = self
                    .sampler
                    .lattice_params(x0 + (ix * 4) as i32, z0 + (iz * 4) as i32);
            }
        }

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let (wx, wz) = (x0 + lx as i32, z0 + lz as i32);
                let (ix, iz) = (lx / 4, lz / 4);
                let corner = |dx: usize, dz: usize| lattice[(ix + dx) + (iz + dz) * LATTICE_EDGE];
                let (base, variation) = ClimateSampler::blend(
                    wx,
                    wz,
                    [corner(0, 0), corner(1, 0), corner(0, 1), corner(1, 1)],
                );
                let column = self.sampler.column_height_with(wx, wz, base, variation);
                if column.degenerate {
                    degenerate += 1;
                }
                heights[lx + lz * CHUNK_SIZE] = column.height;
            }
        }
        (heights, degenerate)
    }

    fn base_terrain_pass(&self, chunk: &mut Chunk, heights: &[i32]) {
        let biomes = BiomeRegistry::global();
        let sea_level = self.sampler.sea_level();
        let top = chunk.height() as i32 - 1;

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let props = biomes.get(chunk.get_biome(lx, lz));
                let h = heights[lx + lz * CHUNK_SIZE];
                let filler = if h < sea_level {
                    props.underwater_block
                } else {
                    props.subsurface_block
                };

                for y in 0..=h {
                    let block = if y == 0 {
                        BlockId::BEDROCK
                    } else if y == h {
                        props.surface_for(h, sea_level)
                    } else if y >= h - 3 {
                        filler
                    } else {
                        props.stone_block
                    };
                    chunk.put_block(lx, y as usize, lz, block);
                }
                for y in (h + 1)..=sea_level.min(top) {
                    chunk.put_block(lx, y as usize, lz, BlockId::WATER);
                }
            }
        }
    }

    /// Stone used by the ore pass: the most common stone block of the chunk
    fn dominant_stone(chunk: &Chunk) -> (BlockId, f32) {
        let biomes = BiomeRegistry::global();
        let centre = biomes.get(chunk.get_biome(CHUNK_SIZE / 2, CHUNK_SIZE / 2));
        (centre.stone_block, centre.densities.ore_multiplier)
    }
}

impl WorldGenerator for TerrainGenerator {
    fn generate_chunk(&self, pos: ChunkPos) -> GeneratedChunk {
        let mut chunk = Chunk::new(pos, self.sampler.world_height() as usize);
        let mut budget = GenerationBudget::new(self.budget);

        self.biome_pass(&mut chunk, &mut budget);
        let (heights, degenerate_columns) = self.height_pass(pos, &mut budget);
        self.base_terrain_pass(&mut chunk, &heights);
        caves::carve(&mut chunk, &self.sampler, &heights, &mut budget);
        let (stone, multiplier) = Self::dominant_stone(&chunk);
        ores::place_ores(&mut chunk, self.seed, stone, multiplier);
        decoration::decorate(&mut chunk, self.seed, &heights, self.sampler.sea_level());
        structures::place_structures(&mut chunk, &self.planner, &self.sampler);

        chunk.recompute_derived();

        if degenerate_columns > 0 {
            log::warn!(
                "[TerrainGenerator] Chunk {:?} clamped {} degenerate columns below the world top",
                pos,
                degenerate_columns
            );
        }
        if budget.is_exhausted() {
            log::warn!(
                "[TerrainGenerator] Chunk {:?} exceeded its noise budget; output degraded",
                pos
            );
        }

        GeneratedChunk {
            chunk,
            budget_exhausted: budget.is_exhausted(),
            degenerate_columns,
        }
    }

    fn surface_height(&self, wx: i32, wz: i32) -> i32 {
        self.sampler.column_height(wx, wz).height
    }

    fn biome_at(&self, wx: i32, wz: i32) -> BiomeId {
        self.sampler.biome(wx, wz)
    }

    fn world_height(&self) -> usize {
        self.sampler.world_height() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::generation::DEFAULT_GENERATION_BUDGET;

    fn generator(seed: u64) -> TerrainGenerator {
        TerrainGenerator::new(seed, 128, 63, DEFAULT_GENERATION_BUDGET)
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generator(1234).generate_chunk(ChunkPos::new(-3, 7));
        let b = generator(1234).generate_chunk(ChunkPos::new(-3, 7));
        assert_eq!(a.chunk.serialize(), b.chunk.serialize());
    }

    #[test]
    fn test_bedrock_floor_and_open_top() {
        let generated = generator(99).generate_chunk(ChunkPos::new(2, -1));
        let chunk = &generated.chunk;
        for lz in 0..16 {
            for lx in 0..16 {
                assert_eq!(chunk.get_block(lx, 0, lz), BlockId::BEDROCK);
                assert!(chunk.get_block(lx, 127, lz).is_air());
            }
        }
    }

    #[test]
    fn test_heights_match_surface_sampler() {
        let generator = generator(5);
        let pos = ChunkPos::new(1, 1);
        let budget = &mut GenerationBudget::new(DEFAULT_GENERATION_BUDGET);
        let (heights, _) = generator.height_pass(pos, budget);
        for (i, h) in heights.iter().enumerate() {
            let wx = pos.min_block_x() + (i % 16) as i32;
            let wz = pos.min_block_z() + (i / 16) as i32;
            assert_eq!(*h, generator.surface_height(wx, wz));
        }
    }

    #[test]
    fn test_starved_budget_degrades_without_failing() {
        let generator = TerrainGenerator::new(7, 128, 63, 10);
        let generated = generator.generate_chunk(ChunkPos::new(0, 0));
        assert!(generated.budget_exhausted);
        assert_eq!(generated.chunk.get_block(3, 0, 3), BlockId::BEDROCK);
    }

    #[test]
    fn test_neighbouring_chunks_share_structure_cells() {
        let generator = generator(0xC0FFEE);
        for cx in -6..6 {
            let pos = ChunkPos::new(cx, 3);
            for instance in generator.planner().instances_near(pos, generator.sampler()) {
                let owners: Vec<ChunkPos> = {
                    let mut owners: Vec<ChunkPos> =
                        instance.cells().iter().map(|(p, _)| p.chunk_pos()).collect();
                    owners.sort();
                    owners.dedup();
                    owners
                };
                let chunks: Vec<Chunk> =
                    owners.iter().map(|p| generator.generate_chunk(*p).chunk).collect();
                for (cell, block) in instance.cells() {
                    let Some(chunk) = chunks.iter().find(|c| c.position() == cell.chunk_pos()) else {
                        continue;
                    };
                    let (lx, ly, lz) = cell.local();
                    let found = chunk.get_block(lx as i32, ly as i32, lz as i32);
                    let overlapped = generator
                        .planner()
                        .instances_near(chunk.position(), generator.sampler())
                        .len()
                        > 1;
                    if !overlapped {
                        assert_eq!(found, block);
                    }
                }
            }
        }
    }
}
