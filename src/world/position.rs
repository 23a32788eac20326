use serde::{Deserialize, Serialize};

use crate::constants::core::{CHUNK_MASK, CHUNK_SHIFT};

/// Position of a chunk column in the world (chunk coordinates).
///
/// Ordering is lexicographic on `(x, z)`; lighting relies on it to lock
/// neighbouring chunks in a consistent order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world column
    #[inline]
    pub fn from_world(wx: i32, wz: i32) -> Self {
        Self::new(wx >> CHUNK_SHIFT, wz >> CHUNK_SHIFT)
    }

    /// Chunk containing a floating point position
    pub fn from_world_f32(x: f32, z: f32) -> Self {
        Self::from_world(x.floor() as i32, z.floor() as i32)
    }

    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// World x of the chunk's first column
    #[inline]
    pub fn min_block_x(&self) -> i32 {
        self.x << CHUNK_SHIFT
    }

    #[inline]
    pub fn min_block_z(&self) -> i32 {
        self.z << CHUNK_SHIFT
    }

    /// Chebyshev (ring) distance in chunks
    pub fn chebyshev_distance(&self, other: ChunkPos) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dz = (self.z - other.z).unsigned_abs();
        dx.max(dz)
    }

    pub fn distance_squared_to(&self, other: ChunkPos) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dz * dz
    }

    /// The 8 surrounding chunks plus this one, in coordinate order
    pub fn neighborhood(&self) -> [ChunkPos; 9] {
        let mut out = [*self; 9];
        let mut i = 0;
        for dx in -1..=1 {
            for dz in -1..=1 {
                out[i] = self.offset(dx, dz);
                i += 1;
            }
        }
        out
    }
}

/// Position of a block in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Offsets of the six face neighbours
pub const FACE_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing a floating point position
    pub fn from_world_pos(pos: glam::Vec3) -> Self {
        Self::new(pos.x.floor() as i32, pos.y.floor() as i32, pos.z.floor() as i32)
    }

    #[inline]
    pub fn chunk_pos(&self) -> ChunkPos {
        ChunkPos::from_world(self.x, self.z)
    }

    /// Local `(lx, ly, lz)` inside the owning chunk
    #[inline]
    pub fn local(&self) -> (usize, usize, usize) {
        (
            (self.x & CHUNK_MASK) as usize,
            self.y as usize,
            (self.z & CHUNK_MASK) as usize,
        )
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn neighbors(&self) -> [BlockPos; 6] {
        FACE_OFFSETS.map(|(dx, dy, dz)| self.offset(dx, dy, dz))
    }

    /// Center of the block in world space
    pub fn center(&self) -> glam::Vec3 {
        glam::Vec3::new(self.x as f32 + 0.5, self.y as f32 + 0.5, self.z as f32 + 0.5)
    }
}
