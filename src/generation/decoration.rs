use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::biome::{BiomeProperties, BiomeRegistry};
use crate::constants::core::CHUNK_SIZE;
use crate::constants::generation::TREE_MARGIN;
use crate::noise::mix_seed;
use crate::world::{BlockId, Chunk};

const DECORATION_TAG: i64 = 0x6465_636f;

/// Multi-block feature as offsets from its base cell
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FeatureTemplate {
    pub cells: Vec<(i32, i32, i32, BlockId)>,
}

impl FeatureTemplate {
    /// Oak: straight trunk with a rounded canopy
    pub fn oak(rng: &mut StdRng) -> Self {
        let trunk: i32 = rng.gen_range(4..=6);
        let mut cells = Vec::new();
        for dy in (trunk - 2)..=(trunk + 1) {
            let radius: i32 = if dy >= trunk { 1 } else { 2 };
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    if radius == 2 && dx.abs() == 2 && dz.abs() == 2 {
                        continue;
                    }
                    if dx == 0 && dz == 0 && dy < trunk {
                        continue;
                    }
                    cells.push((dx, dy, dz, BlockId::LEAVES));
                }
            }
        }
        for dy in 0..trunk {
            cells.push((0, dy, 0, BlockId::LOG));
        }
        Self { cells }
    }

    /// Spruce: tall trunk with a stepped cone of needles
    pub fn spruce(rng: &mut StdRng) -> Self {
        let trunk: i32 = rng.gen_range(6..=8);
        let mut cells = Vec::new();
        for dy in 2..=(trunk + 1) {
            let from_top = trunk + 1 - dy;
            let radius: i32 = match from_top {
                0 | 1 => 0,
                n if n % 2 == 0 => 1,
                _ => 2,
            };
            for dz in -radius..=radius {
                for dx in -radius..=radius {
                    if radius == 2 && dx.abs() == 2 && dz.abs() == 2 {
                        continue;
                    }
                    if dx == 0 && dz == 0 && dy < trunk {
                        continue;
                    }
                    cells.push((dx, dy, dz, BlockId::SPRUCE_LEAVES));
                }
            }
        }
        for dy in 0..trunk {
            cells.push((0, dy, 0, BlockId::SPRUCE_LOG));
        }
        Self { cells }
    }

    pub fn cactus(rng: &mut StdRng) -> Self {
        let tall = rng.gen_range(1..=3);
        Self {
            cells: (0..tall).map(|dy| (0, dy, 0, BlockId::CACTUS)).collect(),
        }
    }

    /// Place if every cell is inside the chunk and currently air
    pub fn try_place(&self, chunk: &mut Chunk, base: (i32, i32, i32)) -> bool {
        let height = chunk.height() as i32;
        let fits = self.cells.iter().all(|&(dx, dy, dz, _)| {
            let (x, y, z) = (base.0 + dx, base.1 + dy, base.2 + dz);
            (0..CHUNK_SIZE as i32).contains(&x)
                && (0..CHUNK_SIZE as i32).contains(&z)
                && (0..height).contains(&y)
                && chunk.get_block(x, y, z).is_air()
        });
        if !fits {
            return false;
        }
        for &(dx, dy, dz, block) in &self.cells {
            chunk.put_block(
                (base.0 + dx) as usize,
                (base.1 + dy) as usize,
                (base.2 + dz) as usize,
                block,
            );
        }
        true
    }
}

fn supports_plants(block: BlockId) -> bool {
    matches!(
        block,
        BlockId::GRASS | BlockId::DIRT | BlockId::FROZEN_GRASS | BlockId::MUD
    )
}

/// Trees, ground cover and frozen water, one RNG per column
pub(crate) fn decorate(chunk: &mut Chunk, seed: u64, heights: &[i32], sea_level: i32) {
    let biomes = BiomeRegistry::global();
    let pos = chunk.position();
    let world_height = chunk.height() as i32;

    for lz in 0..CHUNK_SIZE {
        for lx in 0..CHUNK_SIZE {
            let props = biomes.get(chunk.get_biome(lx, lz));
            let h = heights[lx + lz * CHUNK_SIZE];
            let wx = pos.min_block_x() + lx as i32;
            let wz = pos.min_block_z() + lz as i32;
            let mut rng = StdRng::seed_from_u64(mix_seed(
                seed,
                &[DECORATION_TAG, wx as i64, wz as i64],
            ));

            if props.climate.freezes_water && h < sea_level && sea_level < world_height {
                let (x, z) = (lx as i32, lz as i32);
                if chunk.get_block(x, sea_level, z) == BlockId::WATER {
                    chunk.put_block(lx, sea_level as usize, lz, BlockId::ICE);
                }
            }

            if h + 1 >= world_height || h < sea_level {
                continue;
            }
            let ground = chunk.get_block(lx as i32, h, lz as i32);
            if !chunk.get_block(lx as i32, h + 1, lz as i32).is_air() {
                continue;
            }
            decorate_column(chunk, props, &mut rng, (lx, h, lz), ground);
        }
    }
}

fn decorate_column(
    chunk: &mut Chunk,
    props: &BiomeProperties,
    rng: &mut StdRng,
    (lx, h, lz): (usize, i32, usize),
    ground: BlockId,
) {
    let density = &props.densities;
    let base = (lx as i32, h + 1, lz as i32);
    let inside_margin = (TREE_MARGIN..CHUNK_SIZE - TREE_MARGIN).contains(&lx)
        && (TREE_MARGIN..CHUNK_SIZE - TREE_MARGIN).contains(&lz);
    let roll: f32 = rng.gen();

    if supports_plants(ground) || ground == BlockId::SNOW {
        if inside_margin && roll < density.tree {
            let template = if props.conifer {
                FeatureTemplate::spruce(rng)
            } else {
                FeatureTemplate::oak(rng)
            };
            if template.try_place(chunk, base) {
                chunk.put_block(lx, h as usize, lz, BlockId::DIRT);
            }
            return;
        }
        if ground == BlockId::SNOW {
            return;
        }
        let mut threshold = density.tree;
        for (chance, block) in [
            (density.grass, BlockId::TALL_GRASS),
            (density.flower, flower_for(rng)),
            (density.mushroom, mushroom_for(rng)),
        ] {
            threshold += chance;
            if roll < threshold {
                chunk.put_block(lx, base.1 as usize, lz, block);
                return;
            }
        }
    } else if matches!(ground, BlockId::SAND | BlockId::RED_SAND) {
        if roll < density.cactus {
            FeatureTemplate::cactus(rng).try_place(chunk, base);
        } else if roll < density.cactus + density.dead_bush {
            chunk.put_block(lx, base.1 as usize, lz, BlockId::DEAD_BUSH);
        }
    }
}

fn flower_for(rng: &mut StdRng) -> BlockId {
    if rng.gen_bool(0.5) {
        BlockId::FLOWER_RED
    } else {
        BlockId::FLOWER_YELLOW
    }
}

fn mushroom_for(rng: &mut StdRng) -> BlockId {
    if rng.gen_bool(0.5) {
        BlockId::MUSHROOM_RED
    } else {
        BlockId::MUSHROOM_BROWN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ChunkPos;

    #[test]
    fn test_oak_template_has_trunk_and_leaves() {
        let mut rng = StdRng::seed_from_u64(1);
        let oak = FeatureTemplate::oak(&mut rng);
        assert!(oak.cells.iter().any(|c| c.3 == BlockId::LOG && c.1 == 0));
        assert!(oak.cells.iter().any(|c| c.3 == BlockId::LEAVES));
    }

    #[test]
    fn test_canopies_skip_their_corners() {
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            for template in [FeatureTemplate::oak(&mut rng), FeatureTemplate::spruce(&mut rng)] {
                assert!(template.cells.iter().all(|c| c.0.abs() <= 2 && c.2.abs() <= 2));
                assert!(!template.cells.iter().any(|c| c.0.abs() == 2 && c.2.abs() == 2));
                let logs = template.cells.iter().filter(|c| c.0 == 0 && c.2 == 0 && c.1 >= 0).count();
                assert!(logs >= 4);
            }
        }
    }

    #[test]
    fn test_template_rejected_on_overlap() {
        let mut rng = StdRng::seed_from_u64(2);
        let oak = FeatureTemplate::oak(&mut rng);
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 64);
        chunk.put_block(8, 12, 8, BlockId::STONE);
        assert!(!oak.try_place(&mut chunk, (8, 10, 8)));
        assert!(chunk.get_block(8, 10, 8).is_air());

        assert!(oak.try_place(&mut chunk, (8, 30, 8)));
        assert_eq!(chunk.get_block(8, 30, 8), BlockId::LOG);
    }

    #[test]
    fn test_template_rejected_outside_chunk() {
        let mut rng = StdRng::seed_from_u64(3);
        let spruce = FeatureTemplate::spruce(&mut rng);
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 64);
        assert!(!spruce.try_place(&mut chunk, (0, 10, 8)));
    }
}
