//! Queries against the block grid.

use glam::{IVec3, Vec3};

use crate::error::{budget_exhausted, WorldResult};
use crate::physics::{Aabb, Ray};
use crate::world::{BlockId, BlockPos, BlockRegistry, Chunk, CollisionBounds};

/// Largest number of cells a single overlap query may visit
const MAX_OVERLAP_CELLS: i64 = 32_768;

/// Read-only access to block ids by world position
pub trait VoxelSource {
    fn block_at(&self, pos: BlockPos) -> BlockId;
}

impl<F> VoxelSource for F
where
    F: Fn(BlockPos) -> BlockId,
{
    fn block_at(&self, pos: BlockPos) -> BlockId {
        self(pos)
    }
}

/// A lone chunk; everything outside it is air
impl VoxelSource for Chunk {
    fn block_at(&self, pos: BlockPos) -> BlockId {
        if pos.chunk_pos() != self.position() {
            return BlockId::AIR;
        }
        let (lx, ly, lz) = pos.local();
        self.get_block(lx as i32, ly as i32, lz as i32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelHit {
    pub block: BlockPos,
    pub id: BlockId,
    pub point: Vec3,
    /// Face entered, opposite to the last step; zero when the ray starts inside
    pub normal: Vec3,
    pub distance: f32,
}

/// Upper bound on cell steps for a ray of length `distance`
pub fn max_voxel_steps(distance: f32) -> usize {
    (distance.max(0.0) * 3.0).ceil() as usize + 3
}

/// Grid traversal stepping one cell at a time along the axis with the smallest `t_max`.
///
/// Returns the first non-air cell within `ray.max_distance`.
pub fn voxel_raycast(source: &dyn VoxelSource, ray: &Ray) -> Option<VoxelHit> {
    if !ray.is_valid() {
        return None;
    }
    let origin = ray.origin;
    let dir = ray.direction;
    let mut cell = origin.floor().as_ivec3();

    let start = block_pos(cell);
    let id = source.block_at(start);
    if !id.is_air() {
        return Some(VoxelHit {
            block: start,
            id,
            point: origin,
            normal: Vec3::ZERO,
            distance: 0.0,
        });
    }

    let step = IVec3::new(step_of(dir.x), step_of(dir.y), step_of(dir.z));
    let mut t_max = Vec3::new(
        first_crossing(origin.x, dir.x, cell.x),
        first_crossing(origin.y, dir.y, cell.y),
        first_crossing(origin.z, dir.z, cell.z),
    );
    let t_delta = Vec3::new(delta_of(dir.x), delta_of(dir.y), delta_of(dir.z));

    for _ in 0..max_voxel_steps(ray.max_distance) {
        let axis = if t_max.x <= t_max.y && t_max.x <= t_max.z {
            0
        } else if t_max.y <= t_max.z {
            1
        } else {
            2
        };
        let t = t_max[axis];
        if t > ray.max_distance || !t.is_finite() {
            return None;
        }
        cell[axis] += step[axis];
        t_max[axis] += t_delta[axis];

        let pos = block_pos(cell);
        let id = source.block_at(pos);
        if !id.is_air() {
            let mut normal = Vec3::ZERO;
            normal[axis] = -step[axis] as f32;
            return Some(VoxelHit {
                block: pos,
                id,
                point: ray.at(t),
                normal,
                distance: t,
            });
        }
    }
    None
}

fn block_pos(cell: IVec3) -> BlockPos {
    BlockPos::new(cell.x, cell.y, cell.z)
}

fn step_of(d: f32) -> i32 {
    if d > 0.0 {
        1
    } else if d < 0.0 {
        -1
    } else {
        0
    }
}

fn delta_of(d: f32) -> f32 {
    if d == 0.0 {
        f32::INFINITY
    } else {
        (1.0 / d).abs()
    }
}

/// Ray parameter at which the first cell boundary on this axis is crossed
fn first_crossing(o: f32, d: f32, cell: i32) -> f32 {
    if d > 0.0 {
        (cell as f32 + 1.0 - o) / d
    } else if d < 0.0 {
        (o - cell as f32) / -d
    } else {
        f32::INFINITY
    }
}

/// Collision boxes of a block placed at `pos`
pub fn block_boxes(registry: &BlockRegistry, pos: BlockPos, id: BlockId) -> Vec<Aabb> {
    let props = registry.get(id);
    if !props.solid {
        return Vec::new();
    }
    let base = Vec3::new(pos.x as f32, pos.y as f32, pos.z as f32);
    match &props.collision {
        CollisionBounds::Full => vec![Aabb::new(base, base + Vec3::ONE)],
        CollisionBounds::Empty => Vec::new(),
        CollisionBounds::Boxes(boxes) => boxes
            .iter()
            .map(|b| Aabb::new(base + Vec3::new(b[0], b[1], b[2]), base + Vec3::new(b[3], b[4], b[5])))
            .collect(),
    }
}

/// Solid block boxes overlapping `bounds`
pub fn solid_blocks_in(
    source: &dyn VoxelSource,
    registry: &BlockRegistry,
    bounds: &Aabb,
) -> WorldResult<Vec<(BlockPos, BlockId, Aabb)>> {
    let lo = bounds.min.floor().as_ivec3();
    let hi = (bounds.max.ceil().as_ivec3() - IVec3::ONE).max(lo);
    let span = hi - lo + IVec3::ONE;
    if span.x as i64 * span.y as i64 * span.z as i64 > MAX_OVERLAP_CELLS {
        return Err(budget_exhausted("voxel overlap query"));
    }

    let mut found = Vec::new();
    for x in lo.x..=hi.x {
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                let pos = BlockPos::new(x, y, z);
                let id = source.block_at(pos);
                if id.is_air() {
                    continue;
                }
                for b in block_boxes(registry, pos, id) {
                    if b.intersects(bounds) {
                        found.push((pos, id, b));
                    }
                }
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_at(height: i32) -> impl Fn(BlockPos) -> BlockId {
        move |p: BlockPos| {
            if p.y <= height && p.y >= 0 {
                BlockId::STONE
            } else {
                BlockId::AIR
            }
        }
    }

    #[test]
    fn test_dda_hits_floor_top_face() {
        let source = floor_at(80);
        let ray = Ray::new(Vec3::new(0.5, 100.0, 0.5), Vec3::NEG_Y, 200.0).expect("ray");
        let hit = voxel_raycast(&source, &ray).expect("hit");
        assert_eq!(hit.block, BlockPos::new(0, 80, 0));
        assert_eq!(hit.normal, Vec3::Y);
        assert!((hit.point.y - 81.0).abs() < 1e-4);
    }

    #[test]
    fn test_dda_diagonal_and_negative_coords() {
        let source = |p: BlockPos| {
            if p == BlockPos::new(-3, 10, -3) {
                BlockId::GLASS
            } else {
                BlockId::AIR
            }
        };
        let ray = Ray::new(Vec3::new(0.5, 10.5, 0.5), Vec3::new(-1.0, 0.0, -1.0), 10.0).expect("ray");
        let hit = voxel_raycast(&source, &ray).expect("hit");
        assert_eq!(hit.block, BlockPos::new(-3, 10, -3));
        assert_eq!(hit.id, BlockId::GLASS);
    }

    #[test]
    fn test_dda_misses_beyond_reach() {
        let source = floor_at(10);
        let ray = Ray::new(Vec3::new(0.5, 100.0, 0.5), Vec3::NEG_Y, 50.0).expect("ray");
        assert!(voxel_raycast(&source, &ray).is_none());
        let sideways = Ray::new(Vec3::new(0.5, 100.0, 0.5), Vec3::X, 1.0e4).expect("ray");
        assert!(voxel_raycast(&source, &sideways).is_none());
    }

    #[test]
    fn test_solid_blocks_in_box() {
        let source = floor_at(4);
        let registry = BlockRegistry::global();
        let bounds = Aabb::new(Vec3::new(0.2, 4.5, 0.2), Vec3::new(0.8, 6.0, 0.8));
        let hits = solid_blocks_in(&source, registry, &bounds).expect("small query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, BlockPos::new(0, 4, 0));
        let huge = Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0));
        assert!(solid_blocks_in(&source, registry, &huge).is_err());
    }
}
