use crate::constants::core::CHUNK_SIZE;
use crate::constants::light::MAX_LIGHT;
use crate::lighting::LightChannel;
use crate::world::{BlockId, BlockPos, Chunk, ChunkPos};

/// A chunk and its eight neighbours, borrowed mutably for one lighting job.
///
/// Positions are world coordinates. Cells in absent neighbours read as dark
/// and ignore writes; cells above the world read as open sky.
pub struct LightRegion<'a> {
    center: ChunkPos,
    height: usize,
    slots: [Option<&'a mut Chunk>; 9],
}

impl<'a> LightRegion<'a> {
    pub fn new(center: ChunkPos, height: usize) -> Self {
        Self {
            center,
            height,
            slots: Default::default(),
        }
    }

    /// Add a chunk; chunks outside the 3x3 neighbourhood are ignored
    pub fn insert(&mut self, chunk: &'a mut Chunk) -> bool {
        match self.slot_of(chunk.position()) {
            Some(slot) if chunk.height() == self.height => {
                self.slots[slot] = Some(chunk);
                true
            }
            _ => false,
        }
    }

    pub fn center(&self) -> ChunkPos {
        self.center
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains_chunk(&self, pos: ChunkPos) -> bool {
        self.slot_of(pos).map_or(false, |s| self.slots[s].is_some())
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.slot_of(pos).and_then(|s| self.slots[s].as_deref())
    }

    pub fn chunk_mut(&mut self, pos: ChunkPos) -> Option<&mut Chunk> {
        let slot = self.slot_of(pos)?;
        self.slots[slot].as_deref_mut()
    }

    fn slot_of(&self, pos: ChunkPos) -> Option<usize> {
        let dx = pos.x - self.center.x;
        let dz = pos.z - self.center.z;
        if dx.abs() > 1 || dz.abs() > 1 {
            return None;
        }
        Some(((dx + 1) + (dz + 1) * 3) as usize)
    }

    /// Slot and cell index of a world position, if it is stored here
    fn locate(&self, pos: BlockPos) -> Option<(usize, usize)> {
        if pos.y < 0 || pos.y >= self.height as i32 {
            return None;
        }
        let slot = self.slot_of(pos.chunk_pos())?;
        let chunk = self.slots[slot].as_deref()?;
        let (lx, ly, lz) = pos.local();
        Some((slot, chunk.index(lx, ly, lz)))
    }

    /// Whether the cell is inside a present chunk
    pub fn is_loaded(&self, pos: BlockPos) -> bool {
        self.locate(pos).is_some()
    }

    pub fn block(&self, pos: BlockPos) -> BlockId {
        match self.locate(pos) {
            Some((slot, index)) => self.slots[slot]
                .as_deref()
                .map_or(BlockId::AIR, |c| c.block_at_index(index)),
            None => BlockId::AIR,
        }
    }

    pub fn light(&self, pos: BlockPos, channel: LightChannel) -> u8 {
        if pos.y >= self.height as i32 {
            return match channel {
                LightChannel::Sky => MAX_LIGHT,
                LightChannel::Block => 0,
            };
        }
        match self.locate(pos) {
            Some((slot, index)) => self.slots[slot]
                .as_deref()
                .map_or(0, |c| c.light_at_index(index, channel)),
            None => 0,
        }
    }

    pub fn set_light(&mut self, pos: BlockPos, channel: LightChannel, level: u8) {
        if let Some((slot, index)) = self.locate(pos) {
            if let Some(chunk) = self.slots[slot].as_deref_mut() {
                chunk.set_light_at_index(index, channel, level);
            }
        }
    }

    /// `ly + 1` of the highest non-air block in a column, 0 when empty or absent
    pub fn column_top(&self, wx: i32, wz: i32) -> i32 {
        let pos = BlockPos::new(wx, 0, wz);
        let Some(chunk) = self.chunk(pos.chunk_pos()) else {
            return 0;
        };
        let (lx, _, lz) = pos.local();
        chunk.height_at(lx, lz).map_or(0, |y| y as i32 + 1)
    }

    /// World positions of every cell in the centre chunk's column
    pub(crate) fn center_column_origin(&self, lx: usize, lz: usize) -> (i32, i32) {
        (
            self.center.min_block_x() + lx as i32,
            self.center.min_block_z() + lz as i32,
        )
    }

    /// Present chunks sharing a face with the centre
    pub(crate) fn face_neighbors(&self) -> Vec<ChunkPos> {
        [(1, 0), (-1, 0), (0, 1), (0, -1)]
            .into_iter()
            .map(|(dx, dz)| self.center.offset(dx, dz))
            .filter(|p| self.contains_chunk(*p))
            .collect()
    }
}

/// Cells of `neighbor` that touch the centre chunk across their shared face
pub(crate) fn seam_cells(center: ChunkPos, neighbor: ChunkPos, height: usize) -> Vec<BlockPos> {
    let edge = CHUNK_SIZE as i32 - 1;
    let (nx, nz) = (neighbor.min_block_x(), neighbor.min_block_z());
    let mut cells = Vec::with_capacity(CHUNK_SIZE * height);
    for i in 0..CHUNK_SIZE as i32 {
        let (x, z) = match (neighbor.x - center.x, neighbor.z - center.z) {
            (1, 0) => (nx, nz + i),
            (-1, 0) => (nx + edge, nz + i),
            (0, 1) => (nx + i, nz),
            (0, -1) => (nx + i, nz + edge),
            _ => return Vec::new(),
        };
        for y in 0..height as i32 {
            cells.push(BlockPos::new(x, y, z));
        }
    }
    cells
}
