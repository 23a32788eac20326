use std::sync::Arc;

use glam::Vec3;

use crate::biome::{BiomeId, BiomeRegistry, MobCategory, SpawnEntry};
use crate::config::WorldConfig;
use crate::error::{invalid_geometry, ErrorCounters, ErrorCounts, ErrorKind, WorldResult};
use crate::events::{ChunkNotice, EventBus, EventStats, ListenerId, WorldEvent};
use crate::generation::{TerrainGenerator, WorldGenerator};
use crate::lighting::LightLevel;
use crate::persistence::{ChunkStore, FileChunkStore, MemoryChunkStore};
use crate::physics::{
    layers, solid_blocks_in, voxel_raycast, Aabb, BodyDesc, CollisionStats, CollisionWorld, PhysicsSettings, Ray,
    ResponsePolicy, Shape, ShapeHandle, ShapeRayHit, TriggerEvent, VoxelHit, VoxelSource,
};
use crate::time::{DayClock, DayPhase, TimeSpeed};
use crate::weather::{fog_color, precipitation_at, sky_color, visibility, Precipitation, WeatherKind, WeatherState, WeatherSystem};
use crate::world::chunk_manager::{ChunkManager, ChunkManagerStats, StreamingReport, StreamingSettings};
use crate::world::{BlockId, BlockPos, ChunkPos};

/// Nearest thing a world raycast touched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorldRayHit {
    Block(VoxelHit),
    Shape(ShapeRayHit),
}

impl WorldRayHit {
    pub fn distance(&self) -> f32 {
        match self {
            WorldRayHit::Block(hit) => hit.distance,
            WorldRayHit::Shape(hit) => hit.hit.distance,
        }
    }

    pub fn point(&self) -> Vec3 {
        match self {
            WorldRayHit::Block(hit) => hit.point,
            WorldRayHit::Shape(hit) => hit.hit.point,
        }
    }

    pub fn normal(&self) -> Vec3 {
        match self {
            WorldRayHit::Block(hit) => hit.normal,
            WorldRayHit::Shape(hit) => hit.hit.normal,
        }
    }
}

/// Sky and fog as seen from the observer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Atmosphere {
    pub sky_color: Vec3,
    pub fog_color: Vec3,
    pub visibility: f32,
    pub daylight: f32,
    pub precipitation: Precipitation,
}

/// What one `tick` did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub streaming: StreamingReport,
    pub contacts: usize,
    pub triggers: Vec<TriggerEvent>,
    pub events_dispatched: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldStats {
    pub chunks: ChunkManagerStats,
    pub collision: CollisionStats,
    pub events: EventStats,
    pub errors: ErrorCounts,
}

/// The world runtime: chunk streaming, lighting, time, weather and collision
/// behind one owner. Everything collaborators see goes through here.
pub struct World {
    config: WorldConfig,
    seed: u64,
    counters: Arc<ErrorCounters>,
    chunks: ChunkManager,
    collision: CollisionWorld,
    clock: DayClock,
    weather: WeatherSystem,
    events: EventBus,
    observer: Vec3,
    ticks: u64,
}

impl World {
    /// Build a world with the terrain generator and the configured store
    pub fn new(config: WorldConfig) -> WorldResult<Self> {
        config.validate()?;
        let seed = config.seed_value();
        let generator = Arc::new(TerrainGenerator::new(
            seed,
            config.world_height as usize,
            config.sea_level as i32,
            config.generation_budget,
        ));
        let store: Arc<dyn ChunkStore> = match &config.save_dir {
            Some(dir) => Arc::new(FileChunkStore::new(dir)?),
            None => Arc::new(MemoryChunkStore::new()),
        };
        Self::with_parts(config, generator, store)
    }

    /// Build a world around a caller-supplied generator and store
    pub fn with_parts(
        config: WorldConfig,
        generator: Arc<dyn WorldGenerator>,
        store: Arc<dyn ChunkStore>,
    ) -> WorldResult<Self> {
        config.validate()?;
        let seed = config.seed_value();
        let counters = Arc::new(ErrorCounters::new());
        let chunks = ChunkManager::new(
            StreamingSettings::from_config(&config),
            generator,
            store,
            Arc::clone(&counters),
        )?;
        let collision = CollisionWorld::new(PhysicsSettings::from_config(&config), Arc::clone(&counters));
        let clock = DayClock::new(
            config.day_length_ticks,
            config.start_tick,
            TimeSpeed::from_multiplier(config.time_speed),
        );

        log::info!(
            "[World] Seed {:#x}, height {}, broadphase {:?}",
            seed,
            chunks.world_height(),
            config.broadphase
        );
        Ok(Self {
            seed,
            counters,
            chunks,
            collision,
            clock,
            weather: WeatherSystem::new(seed),
            events: EventBus::new(),
            observer: Vec3::ZERO,
            ticks: 0,
            config,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn height(&self) -> usize {
        self.chunks.world_height()
    }

    pub fn chunks(&self) -> &ChunkManager {
        &self.chunks
    }

    pub fn collision(&self) -> &CollisionWorld {
        &self.collision
    }

    // ---- Blocks ----

    /// Block at a position; air when out of range or not loaded yet
    pub fn get_block(&self, pos: BlockPos) -> BlockId {
        self.chunks.get_block(pos)
    }

    /// Write a block and notify block listeners before returning
    pub fn set_block(&mut self, pos: BlockPos, id: BlockId, metadata: u8) -> WorldResult<BlockId> {
        let old = match self.chunks.set_block(pos, id, metadata) {
            Ok(old) => old,
            Err(err) => {
                log::warn!("[World] Ignoring write of {:?} at {:?}: {}", id, pos, err);
                return Err(err);
            }
        };
        if old != id {
            self.events.deliver(WorldEvent::BlockChanged { pos, old, new: id });
        }
        Ok(old)
    }

    /// Light at a position with the current daylight applied
    pub fn light_at(&self, pos: BlockPos) -> u8 {
        self.raw_light_at(pos).effective(self.clock.daylight())
    }

    /// Stored light; dark for absent chunks, open sky above the world
    pub fn raw_light_at(&self, pos: BlockPos) -> LightLevel {
        if pos.y >= self.height() as i32 {
            return LightLevel::full_sky();
        }
        self.chunks.light_at(pos).unwrap_or_else(LightLevel::dark)
    }

    pub fn biome_at(&self, wx: i32, wz: i32) -> BiomeId {
        self.chunks.biome_at(wx, wz)
    }

    /// Spawn table of the biome under a column
    pub fn spawn_candidates(&self, wx: i32, wz: i32, category: MobCategory) -> Vec<&'static SpawnEntry> {
        BiomeRegistry::global().spawn_candidates(self.biome_at(wx, wz), category)
    }

    // ---- Queries ----

    /// Nearest of the block grid and the registered shapes.
    ///
    /// The block grid takes part when `mask` includes the terrain layer and
    /// only resident chunks are tested.
    pub fn raycast(&self, ray: &Ray, mask: u32) -> WorldResult<Option<WorldRayHit>> {
        if !ray.is_valid() {
            return Err(self.counters.note(invalid_geometry("ray is not finite or not normalised")));
        }
        let block = if mask & layers::TERRAIN != 0 {
            voxel_raycast(&self.chunks, ray).map(WorldRayHit::Block)
        } else {
            None
        };
        let shape = self.collision.raycast(ray, mask)?.map(WorldRayHit::Shape);
        Ok(match (block, shape) {
            (Some(b), Some(s)) => Some(if s.distance() < b.distance() { s } else { b }),
            (b, s) => b.or(s),
        })
    }

    /// Shapes overlapping a box
    pub fn query_aabb(&self, region: &Aabb, mask: u32) -> WorldResult<Vec<ShapeHandle>> {
        self.collision.query_aabb(region, mask)
    }

    /// Solid block boxes overlapping a box, resident chunks only
    pub fn blocks_in(&self, region: &Aabb) -> WorldResult<Vec<(BlockPos, BlockId, Aabb)>> {
        if !region.is_finite() {
            return Err(self.counters.note(invalid_geometry("query box is not finite")));
        }
        solid_blocks_in(&self.chunks, crate::world::BlockRegistry::global(), region)
            .map_err(|e| self.counters.note(e))
    }

    // ---- Entities ----

    /// Register a dynamic shape that collides with entities and terrain
    pub fn spawn_entity(&self, shape: impl Into<Shape>, policy: ResponsePolicy) -> WorldResult<ShapeHandle> {
        let desc = BodyDesc::dynamic(shape)
            .with_policy(policy)
            .with_layers(layers::DEFAULT | layers::ENTITY | layers::TERRAIN);
        self.spawn_body(desc)
    }

    pub fn spawn_body(&self, desc: BodyDesc) -> WorldResult<ShapeHandle> {
        self.collision.register(desc)
    }

    /// Returns whether the handle was live
    pub fn despawn_entity(&self, handle: ShapeHandle) -> bool {
        self.collision.unregister(handle).is_some()
    }

    // ---- Listeners ----

    pub fn register_block_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(BlockPos, BlockId, BlockId) + Send + 'static,
    {
        self.events.on_block_change(Box::new(listener))
    }

    pub fn register_weather_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(WeatherKind, WeatherKind) + Send + 'static,
    {
        self.events.on_weather_change(Box::new(listener))
    }

    pub fn register_chunk_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(ChunkNotice) + Send + 'static,
    {
        self.events.on_chunk(Box::new(listener))
    }

    pub fn register_time_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(DayPhase, DayPhase) + Send + 'static,
    {
        self.events.on_time_phase(Box::new(listener))
    }

    pub fn register_trigger_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(TriggerEvent) + Send + 'static,
    {
        self.events.on_trigger(Box::new(listener))
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove(id)
    }

    /// Run `callback` on the world thread once the chunk is ready
    pub fn when_chunk_ready<F>(&self, pos: ChunkPos, callback: F)
    where
        F: FnOnce(ChunkPos) + Send + 'static,
    {
        self.chunks.when_ready(pos, callback);
    }

    // ---- Simulation ----

    /// Advance streaming, then time and weather, then collision, then deliver events
    pub fn tick(&mut self, dt: f32, observer: Vec3) -> WorldResult<TickReport> {
        if !dt.is_finite() || dt < 0.0 || !observer.is_finite() {
            return Err(self.counters.note(invalid_geometry("tick called with non-finite input")));
        }
        self.ticks += 1;
        self.observer = observer;

        let streaming = self.chunks.update(observer);
        for pos in &streaming.ready {
            self.events.push(WorldEvent::ChunkReady(*pos));
        }
        for pos in &streaming.unloaded {
            self.events.push(WorldEvent::ChunkUnloaded(*pos));
        }

        if let Some(change) = self.clock.advance(dt) {
            log::debug!("[World] Day phase {:?} -> {:?}", change.old, change.new);
            self.events.push(WorldEvent::TimePhase(change));
        }
        let biome = self.biome_at(observer.x.floor() as i32, observer.z.floor() as i32);
        let climate = &BiomeRegistry::global().get(biome).climate;
        if let Some(change) = self.weather.update(dt, climate) {
            self.events.push(WorldEvent::WeatherChanged(change));
        }

        let step = match self.collision.step(dt, Some(&self.chunks as &dyn VoxelSource)) {
            Ok(step) => step,
            Err(err) => {
                log::warn!("[World] Collision step skipped: {}", err);
                Default::default()
            }
        };
        for trigger in &step.triggers {
            self.events.push(WorldEvent::Trigger(*trigger));
        }

        let events_dispatched = self.events.dispatch();
        Ok(TickReport {
            tick: self.ticks,
            streaming,
            contacts: step.manifolds.len(),
            triggers: step.triggers,
            events_dispatched,
        })
    }

    // ---- Time and weather ----

    pub fn time(&self) -> &DayClock {
        &self.clock
    }

    /// Jump the clock; a phase change is reported on the next tick's dispatch
    pub fn set_time(&mut self, tick: u64) {
        let before = self.clock.phase();
        self.clock.set_tick(tick);
        let after = self.clock.phase();
        if before != after {
            self.events.push(WorldEvent::TimePhase(crate::time::PhaseChange {
                old: before,
                new: after,
                tick,
            }));
        }
    }

    pub fn weather(&self) -> &WeatherState {
        self.weather.state()
    }

    pub fn force_weather(&mut self, kind: WeatherKind) {
        if let Some(change) = self.weather.force(kind) {
            self.events.push(WorldEvent::WeatherChanged(change));
        }
    }

    /// Sky, fog and precipitation at the last observer position
    pub fn atmosphere(&self) -> Atmosphere {
        let biome = BiomeRegistry::global().get(self.biome_at(self.observer.x.floor() as i32, self.observer.z.floor() as i32));
        let state = self.weather.state();
        let daylight = self.clock.daylight();
        Atmosphere {
            sky_color: sky_color(state, daylight, &biome.palette),
            fog_color: fog_color(state, daylight, &biome.palette),
            visibility: visibility(state),
            daylight,
            precipitation: precipitation_at(state, &biome.climate, self.observer.y.floor() as i32, biome.snow_line),
        }
    }

    // ---- Housekeeping ----

    pub fn error_counts(&self) -> ErrorCounts {
        self.counters.snapshot()
    }

    /// Count an error raised outside the world's own calls
    pub fn record_error(&self, kind: ErrorKind) {
        self.counters.record(kind);
    }

    /// Write every modified chunk to the store
    pub fn flush(&self) -> WorldResult<usize> {
        self.chunks.flush_saves()
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            chunks: self.chunks.stats(),
            collision: self.collision.stats(),
            events: self.events.stats(),
            errors: self.counters.snapshot(),
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        if let Err(err) = self.chunks.flush_saves() {
            log::error!("[World] Chunks lost on shutdown: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoadMode;
    use crate::physics::Sphere;
    use std::sync::Mutex;

    fn small_config() -> WorldConfig {
        WorldConfig {
            load_distance: 1,
            unload_distance: 3,
            simulation_distance: 1,
            world_height: 128,
            sea_level: 63,
            load_mode: LoadMode::Inline,
            max_loads_per_tick: 64,
            ..WorldConfig::default()
        }
        .with_seed(0xC0FFEE)
    }

    #[test]
    fn test_tick_loads_and_reports_chunks() {
        let mut world = World::new(small_config()).expect("world");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        world.register_chunk_listener(move |notice| sink.lock().expect("lock").push(notice));

        let report = world.tick(0.05, Vec3::new(8.0, 90.0, 8.0)).expect("tick");
        assert_eq!(report.streaming.ready.len(), 9);
        assert_eq!(seen.lock().expect("lock").len(), 9);
        assert!(world.chunks().is_ready(ChunkPos::new(0, 0)));
    }

    #[test]
    fn test_block_listener_sees_writes_in_order() {
        let mut world = World::new(small_config()).expect("world");
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        world.register_block_listener(move |pos, old, new| sink.lock().expect("lock").push((pos, old, new)));

        let pos = BlockPos::new(2, 127, 2);
        world.set_block(pos, BlockId::STONE, 0).expect("write");
        world.set_block(pos, BlockId::GLASS, 0).expect("write");
        // Same id again is not a change
        world.set_block(pos, BlockId::GLASS, 0).expect("write");
        assert_eq!(
            *log.lock().expect("lock"),
            vec![(pos, BlockId::AIR, BlockId::STONE), (pos, BlockId::STONE, BlockId::GLASS)]
        );
        assert!(world.set_block(BlockPos::new(0, -1, 0), BlockId::STONE, 0).is_err());
        assert_eq!(world.error_counts().out_of_bounds, 1);
    }

    #[test]
    fn test_raycast_prefers_nearest() {
        let mut world = World::new(small_config()).expect("world");
        world.tick(0.05, Vec3::new(8.0, 100.0, 8.0)).expect("tick");
        let ball = world
            .spawn_entity(Sphere::new(Vec3::new(8.5, 126.0, 8.5), 0.5), ResponsePolicy::Block)
            .expect("spawn");

        let ray = Ray::new(Vec3::new(8.5, 127.9, 8.5), Vec3::NEG_Y, 200.0).expect("ray");
        let hit = world.raycast(&ray, layers::ALL).expect("valid").expect("hit");
        assert!(matches!(hit, WorldRayHit::Shape(s) if s.handle == ball));

        assert!(world.despawn_entity(ball));
        let hit = world.raycast(&ray, layers::ALL).expect("valid").expect("hit");
        assert!(matches!(hit, WorldRayHit::Block(_)));
    }

    #[test]
    fn test_forced_weather_reaches_listener() {
        let mut world = World::new(small_config()).expect("world");
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = changes.clone();
        world.register_weather_listener(move |old, new| sink.lock().expect("lock").push((old, new)));
        world.force_weather(WeatherKind::Fog);
        world.tick(0.05, Vec3::ZERO).expect("tick");
        assert_eq!(*changes.lock().expect("lock"), vec![(WeatherKind::Clear, WeatherKind::Fog)]);
        assert!(world.atmosphere().visibility < 200.0);
    }

    #[test]
    fn test_non_finite_tick_is_rejected() {
        let mut world = World::new(small_config()).expect("world");
        assert!(world.tick(f32::NAN, Vec3::ZERO).is_err());
        assert_eq!(world.error_counts().invalid_geometry, 1);
    }
}
