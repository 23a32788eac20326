use rustc_hash::FxHashMap;

use crate::physics::broadphase::{finish_pairs, ordered, Broadphase, BroadphaseStats, Proxy};
use crate::physics::{Aabb, ShapeHandle};

/// Sort-and-sweep along the X axis
pub struct SweepAndPrune {
    proxies: FxHashMap<ShapeHandle, Proxy>,
    /// `(min.x, handle)` kept sorted
    axis: Vec<(f32, ShapeHandle)>,
}

impl SweepAndPrune {
    pub fn new() -> Self {
        Self {
            proxies: FxHashMap::default(),
            axis: Vec::new(),
        }
    }

    fn insert_axis(&mut self, key: f32, handle: ShapeHandle) {
        let at = self.axis.partition_point(|(x, h)| (*x, *h) < (key, handle));
        self.axis.insert(at, (key, handle));
    }

    fn remove_axis(&mut self, key: f32, handle: ShapeHandle) {
        let at = self.axis.partition_point(|(x, h)| (*x, *h) < (key, handle));
        if self.axis.get(at).map_or(false, |(_, h)| *h == handle) {
            self.axis.remove(at);
        } else {
            self.axis.retain(|(_, h)| *h != handle);
        }
    }
}

impl Default for SweepAndPrune {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadphase for SweepAndPrune {
    fn name(&self) -> &'static str {
        "sweep_prune"
    }

    fn insert(&mut self, proxy: Proxy) {
        self.remove(proxy.handle);
        self.insert_axis(proxy.bounds.min.x, proxy.handle);
        self.proxies.insert(proxy.handle, proxy);
    }

    fn update(&mut self, handle: ShapeHandle, bounds: Aabb) {
        let Some(old) = self.proxies.get(&handle).map(|p| p.bounds.min.x) else {
            return;
        };
        if old != bounds.min.x {
            self.remove_axis(old, handle);
            self.insert_axis(bounds.min.x, handle);
        }
        if let Some(proxy) = self.proxies.get_mut(&handle) {
            proxy.bounds = bounds;
        }
    }

    fn remove(&mut self, handle: ShapeHandle) {
        if let Some(proxy) = self.proxies.remove(&handle) {
            self.remove_axis(proxy.bounds.min.x, handle);
        }
    }

    fn query(&self, bounds: &Aabb, mask: u32) -> Vec<ShapeHandle> {
        // Everything starting past the query's right edge is out
        let end = self.axis.partition_point(|(x, _)| *x <= bounds.max.x);
        self.axis[..end]
            .iter()
            .filter_map(|(_, h)| self.proxies.get(h))
            .filter(|p| p.layers & mask != 0 && p.bounds.intersects(bounds))
            .map(|p| p.handle)
            .collect()
    }

    fn pairs(&self) -> Vec<(ShapeHandle, ShapeHandle)> {
        let mut pairs = Vec::new();
        let mut active: Vec<&Proxy> = Vec::new();
        for (_, handle) in &self.axis {
            let Some(current) = self.proxies.get(handle) else {
                continue;
            };
            active.retain(|p| p.bounds.max.x >= current.bounds.min.x);
            for other in &active {
                if current.admits(other) {
                    pairs.push(ordered(current.handle, other.handle));
                }
            }
            active.push(current);
        }
        finish_pairs(pairs)
    }

    fn len(&self) -> usize {
        self.proxies.len()
    }

    fn stats(&self) -> BroadphaseStats {
        BroadphaseStats {
            proxies: self.proxies.len(),
            buckets: self.axis.len(),
            max_per_bucket: 1,
        }
    }
}
