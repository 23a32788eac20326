use std::collections::BTreeSet;

use crate::biome::BiomeId;
use crate::constants::core::{CHUNK_SIZE, COLUMN_COUNT};
use crate::error::{out_of_bounds, WorldResult};
use crate::lighting::{LightChannel, LightLevel};
use crate::persistence::ChunkSerializer;
use crate::world::{BlockId, BlockPos, BlockRegistry, ChunkPos, NibbleArray};

/// A 16 x H x 16 column of blocks with light, biome and height data.
///
/// Cells are indexed `lx + ly * 16 + lz * 16 * H`.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    position: ChunkPos,
    height: usize,
    blocks: Vec<BlockId>,
    metadata: NibbleArray,
    sky_light: NibbleArray,
    block_light: NibbleArray,
    biomes: Vec<BiomeId>,
    /// Top non-air `ly + 1` per column; 0 for an empty column
    height_map: Vec<u16>,
    solid_count: u32,
    modified: bool,
    version: u64,
    /// Columns whose light must be recomputed
    pending_light: BTreeSet<u16>,
}

#[inline]
fn column_index(lx: usize, lz: usize) -> usize {
    lx + lz * CHUNK_SIZE
}

impl Chunk {
    /// An all-air chunk with no light
    pub fn new(position: ChunkPos, height: usize) -> Self {
        let volume = COLUMN_COUNT * height;
        Self {
            position,
            height,
            blocks: vec![BlockId::AIR; volume],
            metadata: NibbleArray::new(volume),
            sky_light: NibbleArray::new(volume),
            block_light: NibbleArray::new(volume),
            biomes: vec![BiomeId::default(); COLUMN_COUNT],
            height_map: vec![0; COLUMN_COUNT],
            solid_count: 0,
            modified: false,
            version: 0,
            pending_light: BTreeSet::new(),
        }
    }

    pub fn position(&self) -> ChunkPos {
        self.position
    }

    /// Vertical size H
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn volume(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn index(&self, lx: usize, ly: usize, lz: usize) -> usize {
        lx + ly * CHUNK_SIZE + lz * CHUNK_SIZE * self.height
    }

    #[inline]
    fn checked_index(&self, lx: i32, ly: i32, lz: i32) -> Option<usize> {
        if lx < 0 || lz < 0 || ly < 0 {
            return None;
        }
        let (lx, ly, lz) = (lx as usize, ly as usize, lz as usize);
        if lx >= CHUNK_SIZE || lz >= CHUNK_SIZE || ly >= self.height {
            return None;
        }
        Some(self.index(lx, ly, lz))
    }

    /// Block at local coordinates; air outside the chunk
    #[inline]
    pub fn get_block(&self, lx: i32, ly: i32, lz: i32) -> BlockId {
        match self.checked_index(lx, ly, lz) {
            Some(i) => self.blocks[i],
            None => BlockId::AIR,
        }
    }

    pub fn get_metadata(&self, lx: i32, ly: i32, lz: i32) -> u8 {
        match self.checked_index(lx, ly, lz) {
            Some(i) => self.metadata.get(i),
            None => 0,
        }
    }

    /// Write a block, returning the previous id.
    ///
    /// Updates the height map and solid count, marks the chunk modified,
    /// bumps the version and schedules the column for relighting.
    pub fn set_block(&mut self, lx: i32, ly: i32, lz: i32, id: BlockId) -> WorldResult<BlockId> {
        self.set_block_with_metadata(lx, ly, lz, id, 0)
    }

    pub fn set_block_with_metadata(
        &mut self,
        lx: i32,
        ly: i32,
        lz: i32,
        id: BlockId,
        metadata: u8,
    ) -> WorldResult<BlockId> {
        let index = self.checked_index(lx, ly, lz).ok_or_else(|| {
            out_of_bounds(
                self.position.min_block_x() + lx,
                ly,
                self.position.min_block_z() + lz,
            )
        })?;
        let (lx, ly, lz) = (lx as usize, ly as usize, lz as usize);
        let old = self.blocks[index];

        self.blocks[index] = id;
        self.metadata.set(index, metadata);
        if old.is_air() != id.is_air() {
            if id.is_air() {
                self.solid_count -= 1;
            } else {
                self.solid_count += 1;
            }
        }
        self.update_height(lx, ly, lz, id);

        self.modified = true;
        self.version += 1;
        self.pending_light.insert(column_index(lx, lz) as u16);
        Ok(old)
    }

    /// Raw write used by generation and loading; no bookkeeping
    #[inline]
    pub(crate) fn put_block(&mut self, lx: usize, ly: usize, lz: usize, id: BlockId) {
        let index = self.index(lx, ly, lz);
        self.blocks[index] = id;
    }

    fn update_height(&mut self, lx: usize, ly: usize, lz: usize, id: BlockId) {
        let col = column_index(lx, lz);
        let top = self.height_map[col] as usize;
        if !id.is_air() {
            if ly + 1 > top {
                self.height_map[col] = (ly + 1) as u16;
            }
        } else if ly + 1 == top {
            self.height_map[col] = self.scan_column_top(lx, lz, ly) as u16;
        }
    }

    /// `ly + 1` of the highest non-air block strictly below `below`
    fn scan_column_top(&self, lx: usize, lz: usize, below: usize) -> usize {
        (0..below)
            .rev()
            .find(|&y| !self.blocks[self.index(lx, y, lz)].is_air())
            .map_or(0, |y| y + 1)
    }

    /// Rebuild the height map and solid count from the block plane
    pub fn recompute_derived(&mut self) {
        self.solid_count = self.blocks.iter().filter(|b| !b.is_air()).count() as u32;
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let top = self.scan_column_top(lx, lz, self.height);
                self.height_map[column_index(lx, lz)] = top as u16;
            }
        }
    }

    /// Highest non-air `ly` of a column, `None` when the column is empty
    pub fn height_at(&self, lx: usize, lz: usize) -> Option<usize> {
        if lx >= CHUNK_SIZE || lz >= CHUNK_SIZE {
            return None;
        }
        match self.height_map[column_index(lx, lz)] {
            0 => None,
            top => Some(top as usize - 1),
        }
    }

    pub fn get_light(&self, lx: i32, ly: i32, lz: i32) -> LightLevel {
        match self.checked_index(lx, ly, lz) {
            Some(i) => LightLevel::new(self.sky_light.get(i), self.block_light.get(i)),
            // Above the world is open sky
            None if ly >= self.height as i32 => LightLevel::full_sky(),
            None => LightLevel::dark(),
        }
    }

    #[inline]
    pub(crate) fn light_at_index(&self, index: usize, channel: LightChannel) -> u8 {
        match channel {
            LightChannel::Sky => self.sky_light.get(index),
            LightChannel::Block => self.block_light.get(index),
        }
    }

    #[inline]
    pub(crate) fn set_light_at_index(&mut self, index: usize, channel: LightChannel, level: u8) {
        match channel {
            LightChannel::Sky => self.sky_light.set(index, level),
            LightChannel::Block => self.block_light.set(index, level),
        }
    }

    /// Set one light channel at local coordinates
    pub(crate) fn set_light(&mut self, lx: usize, ly: usize, lz: usize, channel: LightChannel, level: u8) {
        let index = self.index(lx, ly, lz);
        self.set_light_at_index(index, channel, level);
    }

    pub(crate) fn clear_light(&mut self, channel: LightChannel) {
        match channel {
            LightChannel::Sky => self.sky_light.fill(0),
            LightChannel::Block => self.block_light.fill(0),
        }
    }

    #[inline]
    pub(crate) fn block_at_index(&self, index: usize) -> BlockId {
        self.blocks[index]
    }

    pub fn get_biome(&self, lx: usize, lz: usize) -> BiomeId {
        if lx >= CHUNK_SIZE || lz >= CHUNK_SIZE {
            return BiomeId::default();
        }
        self.biomes[column_index(lx, lz)]
    }

    pub(crate) fn set_biome(&mut self, lx: usize, lz: usize, biome: BiomeId) {
        self.biomes[column_index(lx, lz)] = biome;
    }

    pub fn solid_count(&self) -> u32 {
        self.solid_count
    }

    pub fn is_empty(&self) -> bool {
        self.solid_count == 0
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn clear_modified(&mut self) {
        self.modified = false;
    }

    /// Force the next unload to save this chunk
    pub(crate) fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Columns (as `lx + lz * 16`) written since the last relight
    pub(crate) fn take_pending_light(&mut self) -> Vec<(usize, usize)> {
        let columns = std::mem::take(&mut self.pending_light);
        columns
            .into_iter()
            .map(|c| (c as usize % CHUNK_SIZE, c as usize / CHUNK_SIZE))
            .collect()
    }

    pub fn has_pending_light(&self) -> bool {
        !self.pending_light.is_empty()
    }

    /// World position of a local cell
    pub fn world_pos(&self, lx: usize, ly: usize, lz: usize) -> BlockPos {
        BlockPos::new(
            self.position.min_block_x() + lx as i32,
            ly as i32,
            self.position.min_block_z() + lz as i32,
        )
    }

    /// Fill a horizontal layer; used by tools and tests
    pub fn fill_layer(&mut self, ly: usize, id: BlockId) {
        if ly >= self.height {
            return;
        }
        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                self.put_block(lx, ly, lz, id);
            }
        }
        self.recompute_derived();
    }

    /// Highest emission present, for quick skips in lighting
    pub(crate) fn has_emitters(&self, registry: &BlockRegistry) -> bool {
        self.blocks.iter().any(|b| !b.is_air() && registry.emission(*b) > 0)
    }

    // Raw plane access for the serializer
    pub(crate) fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub(crate) fn metadata_plane(&self) -> &NibbleArray {
        &self.metadata
    }

    pub(crate) fn sky_plane(&self) -> &NibbleArray {
        &self.sky_light
    }

    pub(crate) fn block_light_plane(&self) -> &NibbleArray {
        &self.block_light
    }

    pub(crate) fn biome_plane(&self) -> &[BiomeId] {
        &self.biomes
    }

    pub(crate) fn height_plane(&self) -> &[u16] {
        &self.height_map
    }

    /// Assemble a chunk from decoded planes
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_planes(
        position: ChunkPos,
        height: usize,
        version: u64,
        blocks: Vec<BlockId>,
        metadata: NibbleArray,
        sky_light: NibbleArray,
        block_light: NibbleArray,
        biomes: Vec<BiomeId>,
    ) -> Self {
        let mut chunk = Self {
            position,
            height,
            blocks,
            metadata,
            sky_light,
            block_light,
            biomes,
            height_map: vec![0; COLUMN_COUNT],
            solid_count: 0,
            modified: false,
            version,
            pending_light: BTreeSet::new(),
        };
        chunk.recompute_derived();
        chunk
    }

    /// Encode to the chunk blob format
    pub fn serialize(&self) -> Vec<u8> {
        ChunkSerializer::serialize(self)
    }

    /// Decode a chunk blob; any validation failure is `CorruptChunk`
    pub fn deserialize(bytes: &[u8]) -> WorldResult<Chunk> {
        Ok(ChunkSerializer::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_reads_are_air() {
        let chunk = Chunk::new(ChunkPos::new(0, 0), 64);
        assert_eq!(chunk.get_block(-1, 0, 0), BlockId::AIR);
        assert_eq!(chunk.get_block(0, 64, 0), BlockId::AIR);
        assert_eq!(chunk.get_block(16, 0, 0), BlockId::AIR);
    }

    #[test]
    fn test_out_of_range_write_rejected() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 64);
        assert!(chunk.set_block(0, 64, 0, BlockId::STONE).is_err());
        assert!(chunk.set_block(0, -1, 0, BlockId::STONE).is_err());
        assert!(!chunk.is_modified());
        assert_eq!(chunk.version(), 0);
    }

    #[test]
    fn test_set_block_bookkeeping() {
        let mut chunk = Chunk::new(ChunkPos::new(2, -3), 64);
        let old = chunk.set_block(3, 10, 4, BlockId::STONE).expect("write should succeed");
        assert_eq!(old, BlockId::AIR);
        assert_eq!(chunk.get_block(3, 10, 4), BlockId::STONE);
        assert_eq!(chunk.solid_count(), 1);
        assert_eq!(chunk.height_at(3, 4), Some(10));
        assert!(chunk.is_modified());
        assert_eq!(chunk.version(), 1);
        assert!(chunk.has_pending_light());
    }

    #[test]
    fn test_height_map_tracks_removals() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 64);
        chunk.set_block(0, 5, 0, BlockId::DIRT).expect("write should succeed");
        chunk.set_block(0, 20, 0, BlockId::STONE).expect("write should succeed");
        assert_eq!(chunk.height_at(0, 0), Some(20));
        chunk.set_block(0, 20, 0, BlockId::AIR).expect("write should succeed");
        assert_eq!(chunk.height_at(0, 0), Some(5));
        chunk.set_block(0, 5, 0, BlockId::AIR).expect("write should succeed");
        assert_eq!(chunk.height_at(0, 0), None);
        assert_eq!(chunk.solid_count(), 0);
    }

    #[test]
    fn test_index_layout() {
        let chunk = Chunk::new(ChunkPos::new(0, 0), 32);
        assert_eq!(chunk.index(1, 0, 0), 1);
        assert_eq!(chunk.index(0, 1, 0), 16);
        assert_eq!(chunk.index(0, 0, 1), 16 * 32);
    }

    #[test]
    fn test_light_above_world_is_sky() {
        let chunk = Chunk::new(ChunkPos::new(0, 0), 32);
        assert_eq!(chunk.get_light(0, 40, 0).sky, 15);
        assert_eq!(chunk.get_light(0, -1, 0).sky, 0);
    }
}
