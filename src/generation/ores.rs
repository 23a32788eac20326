use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::core::CHUNK_SIZE;
use crate::noise::mix_seed;
use crate::world::{BlockId, Chunk};

const ORE_TAG: i64 = 0x6f72_6576;

/// One ore type and how it is distributed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OreClass {
    pub block: BlockId,
    /// Average veins per chunk before the biome multiplier
    pub veins_per_chunk: u32,
    /// Largest vein radius in blocks
    pub max_radius: f32,
    pub min_y: i32,
    /// Upper bound as a fraction of the world height
    pub max_y_fraction: f32,
}

pub const ORE_CLASSES: [OreClass; 4] = [
    OreClass {
        block: BlockId::COAL_ORE,
        veins_per_chunk: 18,
        max_radius: 2.2,
        min_y: 5,
        max_y_fraction: 0.5,
    },
    OreClass {
        block: BlockId::IRON_ORE,
        veins_per_chunk: 10,
        max_radius: 1.8,
        min_y: 5,
        max_y_fraction: 0.25,
    },
    OreClass {
        block: BlockId::GOLD_ORE,
        veins_per_chunk: 3,
        max_radius: 1.6,
        min_y: 5,
        max_y_fraction: 0.125,
    },
    OreClass {
        block: BlockId::DIAMOND_ORE,
        veins_per_chunk: 1,
        max_radius: 1.4,
        min_y: 5,
        max_y_fraction: 0.0625,
    },
];

/// Scatter ore veins through stone.
///
/// Each ore class gets its own RNG keyed by `(seed, ore, cx, cz)`, so adding
/// an ore never shifts the others.
pub(crate) fn place_ores(chunk: &mut Chunk, seed: u64, stone: BlockId, multiplier: f32) {
    let pos = chunk.position();
    let height = chunk.height() as i32;

    for (index, ore) in ORE_CLASSES.iter().enumerate() {
        let mut rng = StdRng::seed_from_u64(mix_seed(
            seed,
            &[ORE_TAG, index as i64, pos.x as i64, pos.z as i64],
        ));
        let max_y = ((height as f32 * ore.max_y_fraction) as i32).min(height - 1);
        if max_y <= ore.min_y {
            continue;
        }

        let expected = ore.veins_per_chunk as f32 * multiplier;
        let mut veins = expected.floor() as u32;
        if rng.gen::<f32>() < expected.fract() {
            veins += 1;
        }

        for _ in 0..veins {
            let cx = rng.gen_range(0..CHUNK_SIZE as i32);
            let cy = rng.gen_range(ore.min_y..max_y);
            let cz = rng.gen_range(0..CHUNK_SIZE as i32);
            let radius = rng.gen_range(0.8..=ore.max_radius);
            carve_vein(chunk, (cx, cy, cz), radius, ore.block, stone);
        }
    }
}

fn carve_vein(chunk: &mut Chunk, center: (i32, i32, i32), radius: f32, ore: BlockId, stone: BlockId) {
    let r = radius.ceil() as i32;
    let r2 = radius * radius;
    for dz in -r..=r {
        for dy in -r..=r {
            for dx in -r..=r {
                if (dx * dx + dy * dy + dz * dz) as f32 > r2 {
                    continue;
                }
                let (x, y, z) = (center.0 + dx, center.1 + dy, center.2 + dz);
                let current = chunk.get_block(x, y, z);
                if current == BlockId::STONE || current == stone {
                    chunk.put_block(x as usize, y as usize, z as usize, ore);
                }
            }
        }
    }
}
