//! Coarse AABB-overlap filtering.
//!
//! Every backend reports the same candidate pairs: bounds overlap, layer
//! masks intersect and at least one side is dynamic. Pairs come back as
//! `(lower, higher)` handles, sorted and unique.

use crate::config::BroadphaseKind;
use crate::physics::{Aabb, DynamicBvh, ShapeHandle, SpatialHash, SweepAndPrune};

/// What the broadphase knows about a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proxy {
    pub handle: ShapeHandle,
    pub bounds: Aabb,
    pub layers: u32,
    pub is_static: bool,
}

impl Proxy {
    /// Shared pair filter for all backends
    pub fn admits(&self, other: &Proxy) -> bool {
        self.handle != other.handle
            && !(self.is_static && other.is_static)
            && self.layers & other.layers != 0
            && self.bounds.intersects(&other.bounds)
    }
}

/// Broadphase statistics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BroadphaseStats {
    pub proxies: usize,
    /// Cells, axis entries or tree nodes depending on the backend
    pub buckets: usize,
    pub max_per_bucket: usize,
}

pub trait Broadphase: Send + Sync {
    fn name(&self) -> &'static str;

    fn insert(&mut self, proxy: Proxy);

    /// Rebind a shape to new bounds
    fn update(&mut self, handle: ShapeHandle, bounds: Aabb);

    fn remove(&mut self, handle: ShapeHandle);

    /// Handles whose bounds overlap `bounds` and share a layer with `mask`
    fn query(&self, bounds: &Aabb, mask: u32) -> Vec<ShapeHandle>;

    /// All candidate pairs
    fn pairs(&self) -> Vec<(ShapeHandle, ShapeHandle)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> BroadphaseStats;
}

/// Build the backend named in the configuration
pub fn create_broadphase(kind: BroadphaseKind, cell_size: f32) -> Box<dyn Broadphase> {
    match kind {
        BroadphaseKind::SpatialHash => Box::new(SpatialHash::new(cell_size)),
        BroadphaseKind::SweepPrune => Box::new(SweepAndPrune::new()),
        BroadphaseKind::DynamicBvh => Box::new(DynamicBvh::new()),
    }
}

/// Order a pair as `(lower, higher)`
pub(crate) fn ordered(a: ShapeHandle, b: ShapeHandle) -> (ShapeHandle, ShapeHandle) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

pub(crate) fn finish_pairs(mut pairs: Vec<(ShapeHandle, ShapeHandle)>) -> Vec<(ShapeHandle, ShapeHandle)> {
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}
