use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::physics::broadphase::{finish_pairs, ordered, Broadphase, BroadphaseStats, Proxy};
use crate::physics::{Aabb, ShapeHandle};

/// Shapes covering more cells than this are kept in a separate list
const MAX_CELLS_PER_PROXY: usize = 512;

/// Cell coordinate in the spatial hash grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellCoord {
    x: i32,
    y: i32,
    z: i32,
}

impl CellCoord {
    fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    proxy: Proxy,
    cells: Vec<CellCoord>,
}

/// Uniform grid broadphase; each shape is bound to every cell its bounds overlap
pub struct SpatialHash {
    cell_size: f32,
    cells: FxHashMap<CellCoord, Vec<ShapeHandle>>,
    entries: FxHashMap<ShapeHandle, Entry>,
    oversized: Vec<ShapeHandle>,
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 { cell_size } else { 10.0 };
        Self {
            cell_size,
            cells: FxHashMap::default(),
            entries: FxHashMap::default(),
            oversized: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Convert world position to cell coordinate
    fn world_to_cell(&self, x: f32, y: f32, z: f32) -> CellCoord {
        CellCoord::new(
            (x / self.cell_size).floor() as i32,
            (y / self.cell_size).floor() as i32,
            (z / self.cell_size).floor() as i32,
        )
    }

    /// All cells an AABB overlaps, or `None` when there are too many
    fn overlapping_cells(&self, aabb: &Aabb) -> Option<Vec<CellCoord>> {
        let lo = self.world_to_cell(aabb.min.x, aabb.min.y, aabb.min.z);
        let hi = self.world_to_cell(aabb.max.x, aabb.max.y, aabb.max.z);
        let count = (hi.x - lo.x + 1) as i64 * (hi.y - lo.y + 1) as i64 * (hi.z - lo.z + 1) as i64;
        if count > MAX_CELLS_PER_PROXY as i64 {
            return None;
        }

        let mut cells = Vec::with_capacity(count as usize);
        for x in lo.x..=hi.x {
            for y in lo.y..=hi.y {
                for z in lo.z..=hi.z {
                    cells.push(CellCoord::new(x, y, z));
                }
            }
        }
        Some(cells)
    }

    fn bind(&mut self, handle: ShapeHandle, bounds: &Aabb) -> Vec<CellCoord> {
        match self.overlapping_cells(bounds) {
            Some(cells) => {
                for cell in &cells {
                    self.cells.entry(*cell).or_default().push(handle);
                }
                cells
            }
            None => {
                self.oversized.push(handle);
                Vec::new()
            }
        }
    }

    fn unbind(&mut self, handle: ShapeHandle, cells: &[CellCoord]) {
        if cells.is_empty() {
            self.oversized.retain(|h| *h != handle);
            return;
        }
        for cell in cells {
            if let Some(handles) = self.cells.get_mut(cell) {
                handles.retain(|h| *h != handle);
                if handles.is_empty() {
                    self.cells.remove(cell);
                }
            }
        }
    }
}

impl Broadphase for SpatialHash {
    fn name(&self) -> &'static str {
        "spatial_hash"
    }

    fn insert(&mut self, proxy: Proxy) {
        if self.entries.contains_key(&proxy.handle) {
            self.remove(proxy.handle);
        }
        let cells = self.bind(proxy.handle, &proxy.bounds);
        self.entries.insert(proxy.handle, Entry { proxy, cells });
    }

    fn update(&mut self, handle: ShapeHandle, bounds: Aabb) {
        let Some(entry) = self.entries.get(&handle) else {
            return;
        };
        let old_cells = entry.cells.clone();
        let was_oversized = old_cells.is_empty();
        let new_cells = self.overlapping_cells(&bounds);

        // Same cells: only the stored bounds change
        let unchanged = match &new_cells {
            Some(cells) => *cells == old_cells && !was_oversized,
            None => was_oversized,
        };
        if !unchanged {
            self.unbind(handle, &old_cells);
            let cells = self.bind(handle, &bounds);
            if let Some(entry) = self.entries.get_mut(&handle) {
                entry.cells = cells;
            }
        }
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.proxy.bounds = bounds;
        }
    }

    fn remove(&mut self, handle: ShapeHandle) {
        if let Some(entry) = self.entries.remove(&handle) {
            self.unbind(handle, &entry.cells);
        }
    }

    fn query(&self, bounds: &Aabb, mask: u32) -> Vec<ShapeHandle> {
        let matches = |h: &ShapeHandle| {
            self.entries
                .get(h)
                .map_or(false, |e| e.proxy.layers & mask != 0 && e.proxy.bounds.intersects(bounds))
        };

        let Some(cells) = self.overlapping_cells(bounds) else {
            // Region too large to walk cell by cell
            return self.entries.keys().copied().filter(|h| matches(h)).collect();
        };

        let mut seen = FxHashSet::default();
        let mut found = Vec::new();
        for handle in cells
            .iter()
            .filter_map(|c| self.cells.get(c))
            .flatten()
            .chain(self.oversized.iter())
        {
            if seen.insert(*handle) && matches(handle) {
                found.push(*handle);
            }
        }
        found
    }

    fn pairs(&self) -> Vec<(ShapeHandle, ShapeHandle)> {
        let entries = &self.entries;
        let admitted = |a: &ShapeHandle, b: &ShapeHandle| match (entries.get(a), entries.get(b)) {
            (Some(x), Some(y)) => x.proxy.admits(&y.proxy),
            _ => false,
        };

        let mut pairs: Vec<_> = self
            .cells
            .par_iter()
            .filter(|(_, handles)| handles.len() >= 2)
            .flat_map_iter(|(_, handles)| {
                let mut local = Vec::new();
                for (i, a) in handles.iter().enumerate() {
                    for b in &handles[i + 1..] {
                        if admitted(a, b) {
                            local.push(ordered(*a, *b));
                        }
                    }
                }
                local
            })
            .collect();

        for big in &self.oversized {
            for other in entries.keys() {
                if admitted(big, other) {
                    pairs.push(ordered(*big, *other));
                }
            }
        }
        finish_pairs(pairs)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> BroadphaseStats {
        BroadphaseStats {
            proxies: self.entries.len(),
            buckets: self.cells.len(),
            max_per_bucket: self.cells.values().map(Vec::len).max().unwrap_or(0),
        }
    }
}
