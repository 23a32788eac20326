use crate::constants::core::CHUNK_SIZE;
use crate::constants::generation::{CAVE_CELL_XZ, CAVE_CELL_Y};
use crate::generation::{ClimateSampler, GenerationBudget};
use crate::noise::{NoiseDomain, NoiseParams};
use crate::world::{BlockId, Chunk};

/// Ridged cave density above this is carved deep underground
const DEEP_THRESHOLD: f32 = 0.72;
/// Threshold reached at the surface; caves thin out towards it
const SURFACE_THRESHOLD: f32 = 0.9;
/// Depth over which the threshold rises
const SURFACE_FADE: f32 = 12.0;
/// Caves stop this far below sea level, leaving a solid shelf
const SEA_SHELF: i32 = 3;

/// Carve caves from a coarse 3D noise lattice interpolated per block.
///
/// Lattice points sit on world coordinates, so caves line up across chunk
/// seams. Water and bedrock are never replaced, and nothing at or above the
/// sea shelf is carved.
pub(crate) fn carve(
    chunk: &mut Chunk,
    sampler: &ClimateSampler,
    heights: &[i32],
    budget: &mut GenerationBudget,
) {
    let height = chunk.height();
    let nx = CHUNK_SIZE / CAVE_CELL_XZ + 1;
    let ny = height / CAVE_CELL_Y + 1;
    let nz = nx;
    let params = NoiseParams::new(0.035, 2).ridged();

    if !budget.try_spend(nx * ny * nz) {
        log::warn!(
            "[Caves::carve] Noise budget exhausted for chunk {:?}; skipping caves",
            chunk.position()
        );
        return;
    }

    let base_x = chunk.position().min_block_x();
    let base_z = chunk.position().min_block_z();
    let mut lattice = vec![0.0f32; nx * ny * nz];
    for iz in 0..nz {
        for iy in 0..ny {
            for ix in 0..nx {
                let wx = base_x + (ix * CAVE_CELL_XZ) as i32;
                let wy = (iy * CAVE_CELL_Y) as i32;
                let wz = base_z + (iz * CAVE_CELL_XZ) as i32;
                // Stretch vertically so tunnels run mostly horizontal
                lattice[ix + iy * nx + iz * nx * ny] = sampler.noise().sample(
                    NoiseDomain::Cave,
                    wx as f64,
                    wy as f64 * 1.8,
                    wz as f64,
                    &params,
                );
            }
        }
    }

    let at = |ix: usize, iy: usize, iz: usize| lattice[ix + iy * nx + iz * nx * ny];

    for lz in 0..CHUNK_SIZE {
        for lx in 0..CHUNK_SIZE {
            let column_top = heights[lx + lz * CHUNK_SIZE];
            let ceiling = column_top.min(sampler.sea_level() - SEA_SHELF);
            let (ix, fx) = (lx / CAVE_CELL_XZ, (lx % CAVE_CELL_XZ) as f32 / CAVE_CELL_XZ as f32);
            let (iz, fz) = (lz / CAVE_CELL_XZ, (lz % CAVE_CELL_XZ) as f32 / CAVE_CELL_XZ as f32);

            for ly in 1..=(ceiling.max(0) as usize).min(height - 1) {
                let iy = (ly / CAVE_CELL_Y).min(ny - 2);
                let fy = (ly - iy * CAVE_CELL_Y) as f32 / CAVE_CELL_Y as f32;

                let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
                let x00 = lerp(at(ix, iy, iz), at(ix + 1, iy, iz), fx);
                let x10 = lerp(at(ix, iy + 1, iz), at(ix + 1, iy + 1, iz), fx);
                let x01 = lerp(at(ix, iy, iz + 1), at(ix + 1, iy, iz + 1), fx);
                let x11 = lerp(at(ix, iy + 1, iz + 1), at(ix + 1, iy + 1, iz + 1), fx);
                let density = lerp(lerp(x00, x10, fy), lerp(x01, x11, fy), fz);

                let depth = (column_top - ly as i32) as f32;
                let rise = (1.0 - depth / SURFACE_FADE).clamp(0.0, 1.0);
                let threshold = DEEP_THRESHOLD + (SURFACE_THRESHOLD - DEEP_THRESHOLD) * rise;
                if density <= threshold {
                    continue;
                }

                let current = chunk.get_block(lx as i32, ly as i32, lz as i32);
                if current == BlockId::WATER || current == BlockId::BEDROCK || current.is_air() {
                    continue;
                }
                // Keep a skin under water so oceans do not drain into caves
                let above = chunk.get_block(lx as i32, ly as i32 + 1, lz as i32);
                if above == BlockId::WATER {
                    continue;
                }
                chunk.put_block(lx, ly, lz, BlockId::AIR);
            }
        }
    }
}
