use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use crate::config::{BroadphaseKind, WorldConfig};
use crate::constants::physics::{DEFAULT_CELL_SIZE, DEFAULT_MAX_SHAPES, DEFAULT_SWEEP_SAMPLES};
use crate::error::{invalid_geometry, registry_full, ErrorCounters, ErrorKind, WorldResult};
use crate::physics::broadphase::{create_broadphase, Broadphase, BroadphaseStats, Proxy};
use crate::physics::narrowphase::collide;
use crate::physics::raycast::{ray_shape, Ray, RayHit};
use crate::physics::resolution::{combine_materials, is_trigger, resolve, Manifold, Participant, Response};
use crate::physics::sweep::{sweep_pair, SweepHit};
use crate::physics::voxel::{solid_blocks_in, VoxelSource};
use crate::physics::{Aabb, Body, BodyDesc, ResponsePolicy, Shape, ShapeHandle};
use crate::world::BlockRegistry;

/// Restitution and friction of block surfaces
const TERRAIN_MATERIAL: (f32, f32) = (0.0, 0.6);
/// Narrowphase evaluations allowed per sweep query
const DEFAULT_SWEEP_BUDGET: usize = 4096;

/// Collision core settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsSettings {
    pub broadphase: BroadphaseKind,
    pub cell_size: f32,
    pub max_shapes: usize,
    pub sweep_samples: u32,
    pub sweep_budget: usize,
}

impl Default for PhysicsSettings {
    fn default() -> Self {
        Self {
            broadphase: BroadphaseKind::default(),
            cell_size: DEFAULT_CELL_SIZE,
            max_shapes: DEFAULT_MAX_SHAPES,
            sweep_samples: DEFAULT_SWEEP_SAMPLES,
            sweep_budget: DEFAULT_SWEEP_BUDGET,
        }
    }
}

impl PhysicsSettings {
    pub fn from_config(config: &WorldConfig) -> Self {
        Self {
            broadphase: config.broadphase,
            cell_size: config.cell_size,
            max_shapes: config.max_shapes,
            sweep_samples: config.sweep_samples,
            sweep_budget: DEFAULT_SWEEP_BUDGET,
        }
    }
}

/// A trigger shape touched something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub trigger: ShapeHandle,
    pub other: ShapeHandle,
}

/// Shape hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeRayHit {
    pub handle: ShapeHandle,
    pub hit: RayHit,
}

/// What one collision step did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub manifolds: Vec<Manifold>,
    pub triggers: Vec<TriggerEvent>,
    /// Dynamic bodies moved by their velocity
    pub moved: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CollisionStats {
    pub shapes: usize,
    pub static_shapes: usize,
    pub candidate_pairs: usize,
    pub manifolds: usize,
    pub triggers: usize,
    pub narrowphase_tests: u64,
    pub broadphase: BroadphaseStats,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    body: Option<Body>,
}

struct CollisionState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    broadphase: Box<dyn Broadphase>,
    stats: CollisionStats,
}

impl CollisionState {
    fn get(&self, handle: ShapeHandle) -> Option<&Body> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.body.as_ref())
    }

    fn get_mut(&mut self, handle: ShapeHandle) -> Option<&mut Body> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.body.as_mut())
    }

    fn move_body(&mut self, handle: ShapeHandle, offset: Vec3) {
        if offset == Vec3::ZERO || !offset.is_finite() {
            return;
        }
        let Some(body) = self.get_mut(handle) else {
            return;
        };
        body.shape = body.shape.translated(offset);
        let bounds = body.shape.bounds();
        self.broadphase.update(handle, bounds);
    }

    fn handles(&self) -> impl Iterator<Item = (ShapeHandle, &Body)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.body.as_ref().map(|b| {
                (
                    ShapeHandle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    b,
                )
            })
        })
    }

    /// Narrowphase over every broadphase pair
    fn pair_manifolds(&mut self) -> Vec<Manifold> {
        let pairs = self.broadphase.pairs();
        self.stats.candidate_pairs = pairs.len();
        self.stats.narrowphase_tests += pairs.len() as u64;

        pairs
            .into_iter()
            .filter_map(|(a, b)| {
                let (body_a, body_b) = (self.get(a)?, self.get(b)?);
                let contact = collide(&body_a.shape, &body_b.shape)?;
                let (restitution, friction) = combine_materials(
                    (body_a.restitution, body_b.restitution),
                    (body_a.friction, body_b.friction),
                );
                Some(Manifold {
                    a,
                    b,
                    normal: contact.normal,
                    depth: contact.depth,
                    point: contact.point,
                    restitution,
                    friction,
                })
            })
            .collect()
    }

    /// Contacts between dynamic bodies on the terrain layer and solid blocks
    fn terrain_manifolds(&mut self, terrain: &dyn VoxelSource, counters: &ErrorCounters) -> Vec<Manifold> {
        let registry = BlockRegistry::global();
        let mut manifolds = Vec::new();
        let mut tests = 0u64;
        for (handle, body) in self.handles() {
            if body.is_static() || body.layers & crate::physics::layers::TERRAIN == 0 {
                continue;
            }
            let blocks = match solid_blocks_in(terrain, registry, &body.shape.bounds()) {
                Ok(blocks) => blocks,
                Err(e) => {
                    log::warn!("[CollisionWorld] Terrain query for {:?} skipped: {}", handle, e);
                    counters.record(e.kind());
                    continue;
                }
            };
            for (_, _, block) in blocks {
                tests += 1;
                let Some(contact) = collide(&body.shape, &Shape::Aabb(block)) else {
                    continue;
                };
                let (restitution, friction) = combine_materials(
                    (body.restitution, TERRAIN_MATERIAL.0),
                    (body.friction, TERRAIN_MATERIAL.1),
                );
                manifolds.push(Manifold {
                    a: handle,
                    b: ShapeHandle::TERRAIN,
                    normal: contact.normal,
                    depth: contact.depth,
                    point: contact.point,
                    restitution,
                    friction,
                });
            }
        }
        self.stats.narrowphase_tests += tests;
        manifolds
    }

    /// Earliest sweep hit against the candidates accepted by `accept`
    #[allow(clippy::too_many_arguments)]
    fn earliest_hit(
        &self,
        shape: &Shape,
        displacement: Vec3,
        mask: u32,
        exclude: Option<ShapeHandle>,
        settings: &PhysicsSettings,
        counters: &ErrorCounters,
        accept: impl Fn(&Body) -> bool,
    ) -> Option<SweepHit> {
        let swept = shape.bounds().swept(displacement);
        let mut candidates = self.broadphase.query(&swept, mask);
        candidates.sort_unstable();

        let mut best: Option<SweepHit> = None;
        let mut spent = 0usize;
        for handle in candidates {
            if Some(handle) == exclude {
                continue;
            }
            if spent >= settings.sweep_budget {
                log::warn!("[CollisionWorld] Sweep budget of {} evaluations exhausted", settings.sweep_budget);
                counters.record(ErrorKind::BudgetExhausted);
                break;
            }
            let Some(target) = self.get(handle).filter(|t| accept(*t)) else {
                continue;
            };
            let result = sweep_pair(shape, displacement, &target.shape, settings.sweep_samples);
            spent += result.evaluations;
            if let Some((fraction, normal, point)) = result.hit {
                if best.map_or(true, |b| fraction < b.fraction) {
                    best = Some(SweepHit {
                        handle,
                        fraction,
                        normal,
                        point,
                    });
                }
            }
        }
        best
    }

    /// Clamp a solid body's move to its first static blocker.
    ///
    /// The velocity loses its component into the blocker, or reflects it
    /// for bouncing bodies.
    fn swept_offset(
        &mut self,
        handle: ShapeHandle,
        offset: Vec3,
        settings: &PhysicsSettings,
        counters: &ErrorCounters,
    ) -> Vec3 {
        let Some(body) = self.get(handle).copied() else {
            return offset;
        };
        if !body.policy.is_solid() {
            return offset;
        }
        let hit = self.earliest_hit(&body.shape, offset, body.layers, Some(handle), settings, counters, |t| {
            t.is_static() && t.policy.is_solid()
        });
        let Some(hit) = hit else {
            return offset;
        };
        // Sliding along a surface is not blocked by it
        if offset.dot(hit.normal) >= 0.0 {
            return offset;
        }
        if let Some(body) = self.get_mut(handle) {
            let into = body.velocity.dot(hit.normal);
            if into < 0.0 {
                let keep = if body.policy == ResponsePolicy::Bounce { 1.0 + body.restitution } else { 1.0 };
                body.velocity -= hit.normal * into * keep;
            }
        }
        log::trace!("[CollisionWorld] {:?} stopped by {:?} at {:.3}", handle, hit.handle, hit.fraction);
        offset * hit.fraction
    }

    fn participant(&self, handle: ShapeHandle) -> Option<Participant> {
        if handle.is_terrain() {
            return Some(Participant::terrain());
        }
        self.get(handle).map(|b| Participant {
            policy: b.policy,
            inv_mass: b.inv_mass,
            velocity: b.velocity,
        })
    }

    fn apply(&mut self, handle: ShapeHandle, response: Response) {
        if handle.is_terrain() {
            return;
        }
        if let Some(body) = self.get_mut(handle) {
            if !body.is_static() {
                body.velocity = response.velocity;
            }
        }
        self.move_body(handle, response.translation);
    }
}

/// Shape registry, broadphase and contact pipeline behind one reader-writer lock
pub struct CollisionWorld {
    state: RwLock<CollisionState>,
    settings: PhysicsSettings,
    counters: Arc<ErrorCounters>,
}

impl CollisionWorld {
    pub fn new(settings: PhysicsSettings, counters: Arc<ErrorCounters>) -> Self {
        log::info!(
            "[CollisionWorld] {:?} broadphase, cell size {}, up to {} shapes",
            settings.broadphase,
            settings.cell_size,
            settings.max_shapes
        );
        Self {
            state: RwLock::new(CollisionState {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
                broadphase: create_broadphase(settings.broadphase, settings.cell_size),
                stats: CollisionStats::default(),
            }),
            settings,
            counters,
        }
    }

    pub fn settings(&self) -> &PhysicsSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.state.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a shape; refuses once `max_shapes` are live
    pub fn register(&self, desc: BodyDesc) -> WorldResult<ShapeHandle> {
        desc.shape.validate().map_err(|e| self.counters.note(e))?;
        if !desc.velocity.is_finite() {
            return Err(self.counters.note(invalid_geometry("non-finite velocity")));
        }

        let mut state = self.state.write();
        if state.live >= self.settings.max_shapes {
            log::warn!("[CollisionWorld] Shape registry full ({} shapes)", self.settings.max_shapes);
            return Err(self.counters.note(registry_full("shapes", self.settings.max_shapes)));
        }

        let body = Body::from_desc(&desc);
        let handle = match state.free.pop() {
            Some(index) => {
                let slot = &mut state.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.body = Some(body);
                ShapeHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                state.slots.push(Slot {
                    generation: 0,
                    body: Some(body),
                });
                ShapeHandle {
                    index: (state.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        state.live += 1;
        state.broadphase.insert(Proxy {
            handle,
            bounds: body.shape.bounds(),
            layers: body.layers,
            is_static: body.is_static(),
        });
        log::debug!("[CollisionWorld] Registered {:?} as {:?}", body.shape.kind(), handle);
        Ok(handle)
    }

    pub fn unregister(&self, handle: ShapeHandle) -> Option<Body> {
        let mut state = self.state.write();
        let slot = state
            .slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)?;
        let body = slot.body.take()?;
        state.free.push(handle.index);
        state.live -= 1;
        state.broadphase.remove(handle);
        Some(body)
    }

    pub fn body(&self, handle: ShapeHandle) -> Option<Body> {
        self.state.read().get(handle).copied()
    }

    pub fn contains(&self, handle: ShapeHandle) -> bool {
        self.state.read().get(handle).is_some()
    }

    /// Replace the geometry of a dynamic shape
    pub fn set_shape(&self, handle: ShapeHandle, shape: Shape) -> WorldResult<()> {
        shape.validate().map_err(|e| self.counters.note(e))?;
        let mut state = self.state.write();
        let body = state
            .get_mut(handle)
            .ok_or_else(|| invalid_geometry(format!("unknown shape {:?}", handle)))?;
        if body.is_static() {
            return Err(invalid_geometry(format!("{:?} is static", handle)));
        }
        body.shape = shape;
        state.broadphase.update(handle, shape.bounds());
        Ok(())
    }

    pub fn translate(&self, handle: ShapeHandle, offset: Vec3) -> WorldResult<()> {
        if !offset.is_finite() {
            return Err(self.counters.note(invalid_geometry("non-finite translation")));
        }
        let shape = self
            .body(handle)
            .map(|b| b.shape.translated(offset))
            .ok_or_else(|| invalid_geometry(format!("unknown shape {:?}", handle)))?;
        self.set_shape(handle, shape)
    }

    pub fn set_velocity(&self, handle: ShapeHandle, velocity: Vec3) -> WorldResult<()> {
        if !velocity.is_finite() {
            return Err(self.counters.note(invalid_geometry("non-finite velocity")));
        }
        let mut state = self.state.write();
        match state.get_mut(handle) {
            Some(body) if !body.is_static() => {
                body.velocity = velocity;
                Ok(())
            }
            Some(_) => Err(invalid_geometry(format!("{:?} is static", handle))),
            None => Err(invalid_geometry(format!("unknown shape {:?}", handle))),
        }
    }

    /// Shapes on `mask` that overlap `region`
    pub fn query_aabb(&self, region: &Aabb, mask: u32) -> WorldResult<Vec<ShapeHandle>> {
        if !region.is_valid() {
            return Err(self.counters.note(invalid_geometry("malformed query box")));
        }
        let probe = Shape::Aabb(*region);
        let state = self.state.read();
        let mut found: Vec<_> = state
            .broadphase
            .query(region, mask)
            .into_iter()
            .filter(|h| state.get(*h).map_or(false, |b| collide(&probe, &b.shape).is_some()))
            .collect();
        found.sort_unstable();
        Ok(found)
    }

    /// Nearest shape on `mask` along the ray
    pub fn raycast(&self, ray: &Ray, mask: u32) -> WorldResult<Option<ShapeRayHit>> {
        if !ray.is_valid() {
            return Err(self.counters.note(invalid_geometry("malformed ray")));
        }
        let state = self.state.read();
        let hit = state
            .broadphase
            .query(&ray.bounds(), mask)
            .into_iter()
            .filter_map(|handle| {
                let body = state.get(handle)?;
                ray_shape(ray, &body.shape).map(|hit| ShapeRayHit { handle, hit })
            })
            .min_by(|x, y| x.hit.distance.total_cmp(&y.hit.distance).then(x.handle.cmp(&y.handle)));
        Ok(hit)
    }

    /// Sweep a registered shape along `displacement` against everything sharing its layers
    pub fn sweep(&self, handle: ShapeHandle, displacement: Vec3) -> WorldResult<Option<SweepHit>> {
        let body = self
            .body(handle)
            .ok_or_else(|| invalid_geometry(format!("unknown shape {:?}", handle)))?;
        self.sweep_shape(&body.shape, displacement, body.layers, Some(handle))
    }

    /// Earliest hit of `shape` moving along `displacement`.
    ///
    /// Over the evaluation budget the earliest hit found so far is returned
    /// and a budget event is counted.
    pub fn sweep_shape(
        &self,
        shape: &Shape,
        displacement: Vec3,
        mask: u32,
        exclude: Option<ShapeHandle>,
    ) -> WorldResult<Option<SweepHit>> {
        shape.validate().map_err(|e| self.counters.note(e))?;
        if !displacement.is_finite() {
            return Err(self.counters.note(invalid_geometry("non-finite displacement")));
        }

        let state = self.state.read();
        Ok(state.earliest_hit(shape, displacement, mask, exclude, &self.settings, &self.counters, |_| true))
    }

    /// Candidate pairs from the broadphase
    pub fn candidate_pairs(&self) -> Vec<(ShapeHandle, ShapeHandle)> {
        self.state.read().broadphase.pairs()
    }

    /// Contacts between registered shapes, without resolving them
    pub fn contacts(&self) -> Vec<Manifold> {
        self.state.write().pair_manifolds()
    }

    /// Move dynamic bodies by their velocity, detect contacts and resolve them
    pub fn step(&self, dt: f32, terrain: Option<&dyn VoxelSource>) -> WorldResult<StepReport> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(self.counters.note(invalid_geometry("non-finite time step")));
        }
        let mut state = self.state.write();

        let moving: Vec<(ShapeHandle, Vec3)> = state
            .handles()
            .filter(|(_, b)| !b.is_static() && b.velocity != Vec3::ZERO)
            .map(|(h, b)| (h, b.velocity * dt))
            .collect();
        for (handle, offset) in &moving {
            let offset = state.swept_offset(*handle, *offset, &self.settings, &self.counters);
            state.move_body(*handle, offset);
        }

        let mut manifolds = state.pair_manifolds();
        if let Some(terrain) = terrain {
            manifolds.extend(state.terrain_manifolds(terrain, &self.counters));
        }

        let mut triggers = Vec::new();
        for m in &manifolds {
            let (Some(a), Some(b)) = (state.participant(m.a), state.participant(m.b)) else {
                continue;
            };
            if is_trigger(a.policy, b.policy) {
                let (trigger, other) = if a.policy == ResponsePolicy::Trigger { (m.a, m.b) } else { (m.b, m.a) };
                triggers.push(TriggerEvent { trigger, other });
                continue;
            }
            let (ra, rb) = resolve(m, a, b);
            state.apply(m.a, ra);
            state.apply(m.b, rb);
        }

        state.stats.manifolds = manifolds.len();
        state.stats.triggers = triggers.len();
        if !triggers.is_empty() {
            log::debug!("[CollisionWorld] {} trigger contacts", triggers.len());
        }
        Ok(StepReport {
            manifolds,
            triggers,
            moved: moving.len(),
        })
    }

    pub fn stats(&self) -> CollisionStats {
        let state = self.state.read();
        CollisionStats {
            shapes: state.live,
            static_shapes: state.handles().filter(|(_, b)| b.is_static()).count(),
            broadphase: state.broadphase.stats(),
            ..state.stats
        }
    }
}
