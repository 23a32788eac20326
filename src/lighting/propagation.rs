//! Flood-fill light propagation over a 3x3 chunk region.
//!
//! Additions run a breadth-first fill where each step costs the neighbour's
//! opacity plus one. Removals run the usual two-phase fill: cells lit by the
//! removed light are cleared and anything brighter around the cleared area
//! is re-queued so it can flow back in.

use std::collections::VecDeque;

use crate::constants::core::CHUNK_SIZE;
use crate::constants::light::MAX_LIGHT;
use crate::error::{budget_exhausted, WorldResult};
use crate::lighting::region::seam_cells;
use crate::lighting::skylight::{attenuate, column_sky, is_exposed, seed_center_columns};
use crate::lighting::{LightChannel, LightRegion};
use crate::world::{BlockId, BlockPos, BlockRegistry, FACE_OFFSETS};

/// Light propagation bounded by a work budget per job
#[derive(Debug, Clone, Copy)]
pub struct LightEngine {
    registry: &'static BlockRegistry,
    budget: usize,
}

/// Pending work for one channel
struct LightQueues {
    channel: LightChannel,
    add: VecDeque<BlockPos>,
    remove: VecDeque<(BlockPos, u8)>,
}

impl LightQueues {
    fn new(channel: LightChannel) -> Self {
        Self {
            channel,
            add: VecDeque::new(),
            remove: VecDeque::new(),
        }
    }
}

impl LightEngine {
    pub fn new(registry: &'static BlockRegistry, budget: usize) -> Self {
        Self { registry, budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Light a freshly loaded chunk from scratch.
    ///
    /// Runs the sky column pass, seeds emitters, pulls light in across the
    /// faces shared with present neighbours and lets the centre's light
    /// flow out into them. Returns the number of cells visited.
    pub fn light_chunk(&self, region: &mut LightRegion<'_>) -> WorldResult<usize> {
        let center = region.center();
        let height = region.height();
        if let Some(chunk) = region.chunk_mut(center) {
            chunk.clear_light(LightChannel::Sky);
            chunk.clear_light(LightChannel::Block);
        }
        seed_center_columns(region, self.registry);

        let mut sky = LightQueues::new(LightChannel::Sky);
        let mut block = LightQueues::new(LightChannel::Block);

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let (wx, wz) = region.center_column_origin(lx, lz);
                // Lit cells below a neighbouring column top can spread sideways
                let reach = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                    .iter()
                    .map(|(dx, dz)| region.column_top(wx + dx, wz + dz))
                    .max()
                    .unwrap_or(0)
                    .min(height as i32);
                for y in 0..reach {
                    let pos = BlockPos::new(wx, y, wz);
                    if region.light(pos, LightChannel::Sky) > 0 {
                        sky.add.push_back(pos);
                    }
                }
                for y in 0..height as i32 {
                    let pos = BlockPos::new(wx, y, wz);
                    let emission = self.emission(region.block(pos));
                    if emission > 0 {
                        region.set_light(pos, LightChannel::Block, emission);
                        block.add.push_back(pos);
                    }
                }
            }
        }

        for neighbor in region.face_neighbors() {
            for pos in seam_cells(center, neighbor, height) {
                if region.light(pos, LightChannel::Sky) > 0 {
                    sky.add.push_back(pos);
                }
                if region.light(pos, LightChannel::Block) > 0 {
                    block.add.push_back(pos);
                }
            }
        }

        let mut work = 0;
        self.run(region, &mut sky, &mut work)?;
        self.run(region, &mut block, &mut work)?;
        Ok(work)
    }

    /// Repair light after the block at `pos` changed from `old` to `new`
    pub fn update_block(
        &self,
        region: &mut LightRegion<'_>,
        pos: BlockPos,
        old: BlockId,
        new: BlockId,
    ) -> WorldResult<usize> {
        if !region.is_loaded(pos) {
            return Ok(0);
        }
        let mut work = 0;
        let mut sky = LightQueues::new(LightChannel::Sky);
        let mut block = LightQueues::new(LightChannel::Block);

        // Sky: compare the column pass before and after the change
        let column = column_sky(region, self.registry, pos.x, pos.z);
        for (y, &fresh) in column.iter().enumerate() {
            let cell = BlockPos::new(pos.x, y as i32, pos.z);
            let current = region.light(cell, LightChannel::Sky);
            if fresh < current {
                region.set_light(cell, LightChannel::Sky, 0);
                sky.remove.push_back((cell, current));
            } else if fresh > current {
                region.set_light(cell, LightChannel::Sky, fresh);
                sky.add.push_back(cell);
            }
        }
        self.refill_changed_cell(region, &mut sky, pos, new);

        // Block light: retract whatever the old cell held, then re-seed
        let held = region.light(pos, LightChannel::Block);
        if held > 0 {
            region.set_light(pos, LightChannel::Block, 0);
            block.remove.push_back((pos, held));
        }
        let emission = self.emission(new);
        if emission > 0 {
            region.set_light(pos, LightChannel::Block, emission);
            block.add.push_back(pos);
        } else {
            self.refill_changed_cell(region, &mut block, pos, new);
        }

        self.run(region, &mut sky, &mut work)?;
        self.run(region, &mut block, &mut work)?;
        log::trace!(
            "[LightEngine] Relit {:?} ({:?} -> {:?}) visiting {} cells",
            pos,
            old,
            new,
            work
        );
        Ok(work)
    }

    /// Queue the lit neighbours of a cell whose opacity may have dropped
    fn refill_changed_cell(
        &self,
        region: &LightRegion<'_>,
        queues: &mut LightQueues,
        pos: BlockPos,
        new: BlockId,
    ) {
        if self.opacity(new) >= MAX_LIGHT {
            return;
        }
        for neighbor in pos.neighbors() {
            if region.light(neighbor, queues.channel) > 0 && region.is_loaded(neighbor) {
                queues.add.push_back(neighbor);
            }
        }
        // The cell above the world top is implicit open sky
        if queues.channel == LightChannel::Sky && pos.y + 1 >= region.height() as i32 {
            queues.add.push_back(pos);
        }
    }

    fn run(
        &self,
        region: &mut LightRegion<'_>,
        queues: &mut LightQueues,
        work: &mut usize,
    ) -> WorldResult<()> {
        self.drain_removals(region, queues, work)?;
        self.drain_additions(region, queues, work)
    }

    fn spend(&self, work: &mut usize) -> WorldResult<()> {
        *work += 1;
        if *work > self.budget {
            return Err(budget_exhausted("light propagation"));
        }
        Ok(())
    }

    fn drain_removals(
        &self,
        region: &mut LightRegion<'_>,
        queues: &mut LightQueues,
        work: &mut usize,
    ) -> WorldResult<()> {
        let channel = queues.channel;
        while let Some((pos, level)) = queues.remove.pop_front() {
            self.spend(work)?;
            for (dx, dy, dz) in FACE_OFFSETS {
                let neighbor = pos.offset(dx, dy, dz);
                if !region.is_loaded(neighbor) {
                    continue;
                }
                let current = region.light(neighbor, channel);
                if current == 0 {
                    continue;
                }
                let fed_by_us = current < level
                    || (channel == LightChannel::Sky && dy < 0 && level == MAX_LIGHT && current == MAX_LIGHT);
                if !fed_by_us {
                    queues.add.push_back(neighbor);
                    continue;
                }
                region.set_light(neighbor, channel, 0);
                let source = self.source_level(region, neighbor, channel);
                if source > 0 {
                    region.set_light(neighbor, channel, source);
                    queues.add.push_back(neighbor);
                }
                queues.remove.push_back((neighbor, current));
            }
        }
        Ok(())
    }

    fn drain_additions(
        &self,
        region: &mut LightRegion<'_>,
        queues: &mut LightQueues,
        work: &mut usize,
    ) -> WorldResult<()> {
        let channel = queues.channel;
        while let Some(pos) = queues.add.pop_front() {
            self.spend(work)?;
            let level = region.light(pos, channel);
            if level <= 1 {
                continue;
            }
            for (dx, dy, dz) in FACE_OFFSETS {
                let neighbor = pos.offset(dx, dy, dz);
                if !region.is_loaded(neighbor) {
                    continue;
                }
                let opacity = self.opacity(region.block(neighbor));
                let candidate = attenuate(level, opacity, channel, dy < 0);
                if candidate > region.light(neighbor, channel) {
                    region.set_light(neighbor, channel, candidate);
                    queues.add.push_back(neighbor);
                }
            }
        }
        Ok(())
    }

    /// Light a cell produces on its own, ignoring its neighbours
    fn source_level(&self, region: &LightRegion<'_>, pos: BlockPos, channel: LightChannel) -> u8 {
        match channel {
            LightChannel::Sky if is_exposed(region, pos) => MAX_LIGHT,
            LightChannel::Sky => 0,
            LightChannel::Block => self.emission(region.block(pos)),
        }
    }

    #[inline]
    fn opacity(&self, id: BlockId) -> u8 {
        self.registry.opacity(id)
    }

    #[inline]
    fn emission(&self, id: BlockId) -> u8 {
        self.registry.emission(id)
    }
}
