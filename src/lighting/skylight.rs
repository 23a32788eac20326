use crate::constants::core::CHUNK_SIZE;
use crate::constants::light::MAX_LIGHT;
use crate::lighting::{LightChannel, LightRegion};
use crate::world::{BlockPos, BlockRegistry};

/// Light a neighbour receives from a cell at `level`.
///
/// Full skylight falls straight down through fully transparent blocks
/// without loss; every other step costs the neighbour's opacity plus one.
#[inline]
pub fn attenuate(level: u8, opacity: u8, channel: LightChannel, downward: bool) -> u8 {
    if channel == LightChannel::Sky && downward && level == MAX_LIGHT && opacity == 0 {
        return MAX_LIGHT;
    }
    level.saturating_sub(opacity.saturating_add(1))
}

/// Top-down sky values of one column, indexed by y
pub fn column_sky(region: &LightRegion<'_>, registry: &BlockRegistry, wx: i32, wz: i32) -> Vec<u8> {
    let height = region.height();
    let top = region.column_top(wx, wz) as usize;
    let mut values = vec![MAX_LIGHT; height];
    let mut level = MAX_LIGHT;
    for y in (0..top.min(height)).rev() {
        let opacity = registry.opacity(region.block(BlockPos::new(wx, y as i32, wz)));
        level = attenuate(level, opacity, LightChannel::Sky, true);
        values[y] = level;
    }
    values
}

/// Write the column pass for every column of the region's centre chunk
pub fn seed_center_columns(region: &mut LightRegion<'_>, registry: &BlockRegistry) {
    for lz in 0..CHUNK_SIZE {
        for lx in 0..CHUNK_SIZE {
            let (wx, wz) = region.center_column_origin(lx, lz);
            let values = column_sky(region, registry, wx, wz);
            for (y, level) in values.into_iter().enumerate() {
                region.set_light(BlockPos::new(wx, y as i32, wz), LightChannel::Sky, level);
            }
        }
    }
}

/// Nothing but air lies between the cell and the sky
#[inline]
pub fn is_exposed(region: &LightRegion<'_>, pos: BlockPos) -> bool {
    pos.y >= region.column_top(pos.x, pos.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{BlockId, Chunk, ChunkPos};

    #[test]
    fn test_attenuation_rules() {
        assert_eq!(attenuate(15, 0, LightChannel::Sky, true), 15);
        assert_eq!(attenuate(15, 0, LightChannel::Sky, false), 14);
        assert_eq!(attenuate(15, 0, LightChannel::Block, true), 14);
        assert_eq!(attenuate(15, 2, LightChannel::Sky, true), 12);
        assert_eq!(attenuate(3, 15, LightChannel::Block, false), 0);
    }

    #[test]
    fn test_column_through_water_and_stone() {
        let registry = BlockRegistry::global();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0), 16);
        chunk.fill_layer(4, BlockId::STONE);
        chunk.fill_layer(5, BlockId::WATER);
        chunk.fill_layer(6, BlockId::WATER);
        let mut region = LightRegion::new(ChunkPos::new(0, 0), 16);
        region.insert(&mut chunk);

        let values = column_sky(&region, registry, 3, 3);
        assert_eq!(values[15], 15);
        assert_eq!(values[7], 15);
        assert_eq!(values[6], 12);
        assert_eq!(values[5], 9);
        assert_eq!(values[4], 0);
        assert_eq!(values[0], 0);
    }
}
