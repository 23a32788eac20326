//! Chunk streaming around an observer.
//!
//! The live map holds every resident chunk behind its own lock. Loads are
//! queued by priority and resolved from the compressed cache, then the
//! persistent store, then the generator. Freshly produced chunks are lit
//! against their neighbours on the world thread and only then inserted as
//! `Ready`, so a reader never sees a half-built chunk.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use glam::Vec3;
use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::biome::BiomeId;
use crate::config::{LoadMode, WorldConfig};
use crate::error::{out_of_bounds, ErrorCounters, ErrorKind, WorldError, WorldResult};
use crate::generation::WorldGenerator;
use crate::lighting::{LightEngine, LightLevel, LightRegion};
use crate::persistence::{encode_blob, ChunkSerializer, ChunkStore};
use crate::physics::VoxelSource;
use crate::thread_pool::{JobKind, PoolStats, WorkerPool, WorkerPoolConfig};
use crate::world::chunk_cache::ChunkCache;
use crate::world::chunk_state::{ChunkState, LoadPriority};
use crate::world::{BlockId, BlockPos, BlockRegistry, Chunk, ChunkPos};

/// How long `flush_saves` waits for a single outstanding save
const SAVE_WAIT: Duration = Duration::from_secs(10);

/// Callback run on the world thread once a chunk is ready
pub type ReadyCallback = Box<dyn FnOnce(ChunkPos) + Send>;

/// Streaming limits taken from the world configuration
#[derive(Debug, Clone)]
pub struct StreamingSettings {
    pub load_distance: u32,
    pub unload_distance: u32,
    pub simulation_distance: u32,
    pub max_loaded_chunks: usize,
    pub max_loads_per_tick: usize,
    pub max_unloads_per_tick: usize,
    pub cache_capacity: usize,
    pub load_mode: LoadMode,
    pub worker_threads: usize,
    pub light_budget: usize,
}

impl StreamingSettings {
    pub fn from_config(config: &WorldConfig) -> Self {
        Self {
            load_distance: config.load_distance,
            unload_distance: config.unload_distance,
            simulation_distance: config.simulation_distance,
            max_loaded_chunks: config.max_loaded_chunks,
            max_loads_per_tick: config.max_loads_per_tick,
            max_unloads_per_tick: config.max_unloads_per_tick,
            cache_capacity: config.cache_capacity,
            load_mode: config.load_mode,
            worker_threads: config.worker_threads,
            light_budget: config.light_budget,
        }
    }

    /// Bound on queued loads before the lowest priorities are dropped
    fn queue_capacity(&self) -> usize {
        self.max_loaded_chunks.max(64) * 2
    }
}

/// Where a chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Cache,
    Store,
    Generated,
}

/// A resident chunk and its lifecycle state
#[derive(Debug, Clone)]
pub struct ChunkEntry {
    pub state: ChunkState,
    pub chunk: Arc<RwLock<Chunk>>,
}

/// What one `update` call changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamingReport {
    /// Chunks that became ready, in insertion order
    pub ready: Vec<ChunkPos>,
    pub unloaded: Vec<ChunkPos>,
    pub loads_started: usize,
    pub unloads_started: usize,
}

/// Counters exposed by `ChunkManager::stats`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkManagerStats {
    pub resident: usize,
    pub pending: usize,
    pub queued_loads: usize,
    pub queued_unloads: usize,
    pub cached: usize,
    pub cache_bytes: usize,
    pub cache_hit_rate: f32,
    pub loaded_from_cache: u64,
    pub loaded_from_store: u64,
    pub generated: u64,
    pub saves: u64,
    pub unloads: u64,
    pub dropped_requests: u64,
    pub pool: Option<PoolStats>,
}

#[derive(Debug, Default)]
struct ManagerCounters {
    loaded_from_cache: u64,
    loaded_from_store: u64,
    generated: u64,
    saves: u64,
    unloads: u64,
    dropped_requests: u64,
}

/// Result of offering a request to a full or open load queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    Queued,
    /// Queued after dropping this lower-ranked request
    Displaced(ChunkPos),
    Refused,
}

/// Pending load requests ordered by priority, then distance
#[derive(Debug, Default)]
struct LoadQueue {
    order: BTreeSet<(LoadPriority, u32, ChunkPos)>,
    index: FxHashMap<ChunkPos, (LoadPriority, u32)>,
    capacity: usize,
}

impl LoadQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Queue or upgrade a request. When full the lowest entry makes room,
    /// unless the new request is itself the lowest.
    fn push(&mut self, pos: ChunkPos, priority: LoadPriority, distance: u32) -> PushOutcome {
        let key = (priority, distance);
        if let Some(&existing) = self.index.get(&pos) {
            if existing > key {
                self.order.remove(&(existing.0, existing.1, pos));
                self.order.insert((priority, distance, pos));
                self.index.insert(pos, key);
            }
            return PushOutcome::Queued;
        }

        let mut outcome = PushOutcome::Queued;
        if self.index.len() >= self.capacity {
            match self.order.last().copied() {
                Some(last) if (priority, distance, pos) < last => {
                    self.order.remove(&last);
                    self.index.remove(&last.2);
                    outcome = PushOutcome::Displaced(last.2);
                }
                _ => return PushOutcome::Refused,
            }
        }
        self.order.insert((priority, distance, pos));
        self.index.insert(pos, key);
        outcome
    }

    fn pop(&mut self) -> Option<(ChunkPos, LoadPriority)> {
        let (priority, _, pos) = self.order.pop_first()?;
        self.index.remove(&pos);
        Some((pos, priority))
    }

    fn remove(&mut self, pos: ChunkPos) {
        if let Some((priority, distance)) = self.index.remove(&pos) {
            self.order.remove(&(priority, distance, pos));
        }
    }

    fn drain(&mut self) -> Vec<(ChunkPos, LoadPriority)> {
        self.index.clear();
        std::mem::take(&mut self.order)
            .into_iter()
            .map(|(priority, _, pos)| (pos, priority))
            .collect()
    }
}

/// Results sent back from workers
enum JobOutcome {
    Loaded {
        pos: ChunkPos,
        chunk: Box<Chunk>,
        source: LoadSource,
    },
    Saved {
        pos: ChunkPos,
        version: u64,
        payload: WorldResult<Vec<u8>>,
    },
}

/// Shared pieces a load job needs off the world thread
#[derive(Clone)]
struct Producer {
    generator: Arc<dyn WorldGenerator>,
    store: Arc<dyn ChunkStore>,
    counters: Arc<ErrorCounters>,
    height: usize,
}

impl Producer {
    /// Cached blob, then the persistent store, then the generator
    fn produce(&self, pos: ChunkPos, cached: Option<Vec<u8>>) -> (Chunk, LoadSource) {
        if let Some(blob) = cached {
            match ChunkSerializer::deserialize(&blob) {
                Ok(chunk) if chunk.position() == pos && chunk.height() == self.height => {
                    return (chunk, LoadSource::Cache);
                }
                Ok(_) => self.counters.record(ErrorKind::CorruptChunk),
                Err(e) => {
                    let err = self.counters.note(WorldError::from(e));
                    log::warn!("[ChunkManager] Dropping cached blob for {:?}: {}", pos, err);
                }
            }
        }

        let mut corrupt = false;
        match self.store.load_chunk(pos) {
            Ok(Some(chunk)) if chunk.height() == self.height => return (chunk, LoadSource::Store),
            Ok(Some(chunk)) => {
                corrupt = true;
                self.counters.record(ErrorKind::CorruptChunk);
                log::warn!(
                    "[ChunkManager] Stored chunk {:?} has height {} (expected {}); regenerating",
                    pos,
                    chunk.height(),
                    self.height
                );
            }
            Ok(None) => {}
            Err(e) => {
                corrupt = true;
                let err = self.counters.note(WorldError::from(e));
                log::warn!("[ChunkManager] Failed to load {:?}: {}; regenerating", pos, err);
            }
        }

        let generated = self.generator.generate_chunk(pos);
        if generated.budget_exhausted {
            self.counters.record(ErrorKind::BudgetExhausted);
        }
        let mut chunk = generated.chunk;
        if corrupt {
            // The next save replaces the bad blob
            chunk.mark_modified();
        }
        (chunk, LoadSource::Generated)
    }
}

/// Serialize a chunk under a short read lock, then write it out unlocked
fn write_chunk(store: &dyn ChunkStore, chunk: &RwLock<Chunk>) -> (u64, WorldResult<Vec<u8>>) {
    let (pos, version, payload) = {
        let guard = chunk.read();
        (guard.position(), guard.version(), ChunkSerializer::serialize(&guard))
    };
    let result = encode_blob(&payload)
        .and_then(|blob| store.write(pos, &blob))
        .map(|_| payload)
        .map_err(WorldError::from);
    (version, result)
}

/// Authoritative map of resident chunks and the streaming queues around it
pub struct ChunkManager {
    settings: StreamingSettings,
    height: usize,
    chunks: RwLock<FxHashMap<ChunkPos, ChunkEntry>>,
    /// States of chunks that are known but not resident
    pending: Mutex<FxHashMap<ChunkPos, ChunkState>>,
    load_queue: Mutex<LoadQueue>,
    unload_queue: Mutex<VecDeque<ChunkPos>>,
    /// Versions of saves that have been started but not finished
    saves_in_flight: Mutex<FxHashMap<ChunkPos, u64>>,
    cache: Mutex<ChunkCache>,
    callbacks: Mutex<FxHashMap<ChunkPos, Vec<ReadyCallback>>>,
    ready_events: Mutex<Vec<ChunkPos>>,
    unload_events: Mutex<Vec<ChunkPos>>,
    observer: Mutex<Option<ChunkPos>>,
    wanted: RwLock<FxHashSet<ChunkPos>>,
    producer: Producer,
    light: LightEngine,
    pool: Option<WorkerPool>,
    results_tx: Sender<JobOutcome>,
    results_rx: Receiver<JobOutcome>,
    counters: Arc<ErrorCounters>,
    tallies: Mutex<ManagerCounters>,
}

impl ChunkManager {
    pub fn new(
        settings: StreamingSettings,
        generator: Arc<dyn WorldGenerator>,
        store: Arc<dyn ChunkStore>,
        counters: Arc<ErrorCounters>,
    ) -> WorldResult<Self> {
        let pool = match settings.load_mode {
            LoadMode::Workers => Some(WorkerPool::new(WorkerPoolConfig {
                threads: settings.worker_threads,
                ..WorkerPoolConfig::default()
            })?),
            LoadMode::Inline => None,
        };
        let height = generator.world_height();
        let (results_tx, results_rx) = unbounded();
        log::info!(
            "[ChunkManager] Load distance {}, unload distance {}, {:?} loads",
            settings.load_distance,
            settings.unload_distance,
            settings.load_mode
        );

        Ok(Self {
            height,
            chunks: RwLock::new(FxHashMap::default()),
            pending: Mutex::new(FxHashMap::default()),
            load_queue: Mutex::new(LoadQueue::new(settings.queue_capacity())),
            unload_queue: Mutex::new(VecDeque::new()),
            saves_in_flight: Mutex::new(FxHashMap::default()),
            cache: Mutex::new(ChunkCache::new(settings.cache_capacity)),
            callbacks: Mutex::new(FxHashMap::default()),
            ready_events: Mutex::new(Vec::new()),
            unload_events: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            wanted: RwLock::new(FxHashSet::default()),
            producer: Producer {
                generator,
                store,
                counters: Arc::clone(&counters),
                height,
            },
            light: LightEngine::new(BlockRegistry::global(), settings.light_budget),
            pool,
            results_tx,
            results_rx,
            counters,
            tallies: Mutex::new(ManagerCounters::default()),
            settings,
        })
    }

    pub fn settings(&self) -> &StreamingSettings {
        &self.settings
    }

    pub fn world_height(&self) -> usize {
        self.height
    }

    pub fn generator(&self) -> &Arc<dyn WorldGenerator> {
        &self.producer.generator
    }

    // ---- Queries ----

    pub fn state(&self, pos: ChunkPos) -> ChunkState {
        if let Some(entry) = self.chunks.read().get(&pos) {
            return entry.state;
        }
        self.pending.lock().get(&pos).copied().unwrap_or_default()
    }

    pub fn is_ready(&self, pos: ChunkPos) -> bool {
        self.chunks.read().get(&pos).map_or(false, |e| e.state.is_resident())
    }

    /// Shared handle to a resident chunk
    pub fn chunk(&self, pos: ChunkPos) -> Option<Arc<RwLock<Chunk>>> {
        self.chunks.read().get(&pos).map(|e| Arc::clone(&e.chunk))
    }

    pub fn loaded_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Resident chunk positions in coordinate order
    pub fn loaded_positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.chunks.read().keys().copied().collect();
        positions.sort_unstable();
        positions
    }

    /// Whether `pos` lies inside the load radius; true before the first update
    pub fn within_load_radius(&self, pos: ChunkPos) -> bool {
        self.observer
            .lock()
            .map_or(true, |o| o.chebyshev_distance(pos) <= self.settings.load_distance)
    }

    /// Block at a world position.
    ///
    /// Absent chunks read as air; they are requested only inside the load
    /// radius.
    pub fn get_block(&self, pos: BlockPos) -> BlockId {
        match self.try_get_block(pos) {
            Ok(id) => id,
            Err(WorldError::ChunkNotLoaded { .. }) => {
                self.counters.record(ErrorKind::ChunkNotLoaded);
                let cp = pos.chunk_pos();
                if self.within_load_radius(cp) {
                    self.request_load(cp, LoadPriority::Normal);
                }
                BlockId::AIR
            }
            Err(err) => {
                self.counters.record(err.kind());
                BlockId::AIR
            }
        }
    }

    /// Block at a world position with explicit failures and no side effects
    pub fn try_get_block(&self, pos: BlockPos) -> WorldResult<BlockId> {
        if pos.y < 0 || pos.y >= self.height as i32 {
            return Err(out_of_bounds(pos.x, pos.y, pos.z));
        }
        let cp = pos.chunk_pos();
        let chunk = self.chunk(cp).ok_or(WorldError::ChunkNotLoaded { cx: cp.x, cz: cp.z })?;
        let (lx, ly, lz) = pos.local();
        let id = chunk.read().get_block(lx as i32, ly as i32, lz as i32);
        Ok(id)
    }

    /// Block at a world position without requesting a load
    pub fn peek_block(&self, pos: BlockPos) -> BlockId {
        self.try_get_block(pos).unwrap_or(BlockId::AIR)
    }

    /// Stored light; `None` when the chunk is not resident
    pub fn light_at(&self, pos: BlockPos) -> Option<LightLevel> {
        let chunk = self.chunk(pos.chunk_pos())?;
        let (lx, _, lz) = pos.local();
        let level = chunk.read().get_light(lx as i32, pos.y, lz as i32);
        Some(level)
    }

    /// Biome of a column, from the resident chunk or the generator
    pub fn biome_at(&self, wx: i32, wz: i32) -> BiomeId {
        let pos = BlockPos::new(wx, 0, wz);
        match self.chunk(pos.chunk_pos()) {
            Some(chunk) => {
                let (lx, _, lz) = pos.local();
                let biome = chunk.read().get_biome(lx, lz);
                biome
            }
            None => self.producer.generator.biome_at(wx, wz),
        }
    }

    /// Highest non-air `y` of a resident column
    pub fn height_at(&self, wx: i32, wz: i32) -> Option<i32> {
        let pos = BlockPos::new(wx, 0, wz);
        let chunk = self.chunk(pos.chunk_pos())?;
        let (lx, _, lz) = pos.local();
        let top = chunk.read().height_at(lx, lz);
        top.map(|y| y as i32)
    }

    // ---- Writes ----

    /// Write a block, loading its chunk synchronously if needed.
    ///
    /// Relights the affected cells before returning and returns the
    /// previous id.
    pub fn set_block(&self, pos: BlockPos, id: BlockId, metadata: u8) -> WorldResult<BlockId> {
        if pos.y < 0 || pos.y >= self.height as i32 {
            return Err(self.counters.note(out_of_bounds(pos.x, pos.y, pos.z)));
        }
        let cp = pos.chunk_pos();
        if !self.is_ready(cp) {
            self.load_now(cp);
        }

        // Chunk and neighbour locks, taken in coordinate order
        let handles: Vec<(ChunkPos, Arc<RwLock<Chunk>>)> = {
            let chunks = self.chunks.read();
            cp.neighborhood()
                .iter()
                .filter_map(|p| chunks.get(p).map(|e| (*p, Arc::clone(&e.chunk))))
                .collect()
        };
        let mut guards: Vec<_> = handles.iter().map(|(p, c)| (*p, c.write())).collect();
        let center = guards
            .iter()
            .position(|(p, _)| *p == cp)
            .ok_or(WorldError::ChunkNotLoaded { cx: cp.x, cz: cp.z })?;

        let (lx, ly, lz) = pos.local();
        let old = guards[center]
            .1
            .set_block_with_metadata(lx as i32, ly as i32, lz as i32, id, metadata)?;
        guards[center].1.take_pending_light();

        if old != id {
            let mut region = LightRegion::new(cp, self.height);
            for (_, guard) in guards.iter_mut() {
                region.insert(&mut **guard);
            }
            if let Err(err) = self.light.update_block(&mut region, pos, old, id) {
                let err = self.counters.note(err);
                log::warn!("[ChunkManager] Relighting {:?} stopped early: {}", pos, err);
            }
        }
        Ok(old)
    }

    // ---- Requests ----

    /// Queue a load unless the chunk is resident or already pending
    pub fn request_load(&self, pos: ChunkPos, priority: LoadPriority) {
        if self.chunks.read().contains_key(&pos) {
            return;
        }
        let distance = self.observer.lock().map_or(0, |o| o.chebyshev_distance(pos));
        let mut pending = self.pending.lock();
        if pending.get(&pos).map_or(false, |s| s.is_pending() && *s != ChunkState::QueuedLoad) {
            return;
        }
        self.enqueue_locked(&mut pending, pos, priority, distance);
    }

    fn enqueue_locked(
        &self,
        pending: &mut FxHashMap<ChunkPos, ChunkState>,
        pos: ChunkPos,
        priority: LoadPriority,
        distance: u32,
    ) {
        match self.load_queue.lock().push(pos, priority, distance) {
            PushOutcome::Queued => {
                pending.insert(pos, ChunkState::QueuedLoad);
            }
            PushOutcome::Displaced(dropped) => {
                pending.insert(pos, ChunkState::QueuedLoad);
                pending.remove(&dropped);
                self.tallies.lock().dropped_requests += 1;
                log::debug!("[ChunkManager] Load queue full; dropped {:?}", dropped);
            }
            PushOutcome::Refused => {
                self.tallies.lock().dropped_requests += 1;
                log::debug!("[ChunkManager] Load queue full; refused {:?}", pos);
            }
        }
    }

    /// Run `callback` once the chunk is ready; immediately if it already is
    pub fn when_ready<F>(&self, pos: ChunkPos, callback: F)
    where
        F: FnOnce(ChunkPos) + Send + 'static,
    {
        if self.is_ready(pos) {
            callback(pos);
            return;
        }
        self.callbacks.lock().entry(pos).or_default().push(Box::new(callback));
        self.request_load(pos, LoadPriority::High);
    }

    // ---- Per-tick streaming ----

    /// Advance streaming around the observer
    pub fn update(&self, observer: Vec3) -> StreamingReport {
        let mut report = StreamingReport::default();
        if !observer.is_finite() {
            self.counters.record(ErrorKind::InvalidGeometry);
            log::warn!("[ChunkManager] Ignoring non-finite observer {:?}", observer);
            return report;
        }
        let center = ChunkPos::from_world_f32(observer.x, observer.z);
        let moved = {
            let mut last = self.observer.lock();
            let moved = *last != Some(center);
            *last = Some(center);
            moved
        };
        if moved {
            self.recompute_wanted(center);
            self.reprioritize(center);
        }

        self.enqueue_wanted(center);
        self.enqueue_unwanted(center);
        self.poll_results();
        report.loads_started = self.drain_loads(center);
        report.unloads_started = self.drain_unloads(center);
        self.poll_results();

        report.ready = std::mem::take(&mut *self.ready_events.lock());
        report.unloaded = std::mem::take(&mut *self.unload_events.lock());
        self.fire_callbacks(&report.ready);

        if !report.ready.is_empty() || !report.unloaded.is_empty() {
            log::debug!(
                "[ChunkManager] {} ready, {} unloaded, {} resident",
                report.ready.len(),
                report.unloaded.len(),
                self.loaded_count()
            );
        }
        report
    }

    fn recompute_wanted(&self, center: ChunkPos) {
        let r = self.settings.load_distance as i32;
        let mut wanted = FxHashSet::default();
        for dx in -r..=r {
            for dz in -r..=r {
                wanted.insert(center.offset(dx, dz));
            }
        }
        *self.wanted.write() = wanted;
    }

    /// Re-rank queued loads for the new observer column and cancel those out of range
    fn reprioritize(&self, center: ChunkPos) {
        let mut pending = self.pending.lock();
        let queued = self.load_queue.lock().drain();
        for (pos, old) in queued {
            let distance = center.chebyshev_distance(pos);
            if distance > self.settings.load_distance && !self.callbacks.lock().contains_key(&pos) {
                pending.remove(&pos);
                continue;
            }
            let priority = if distance <= self.settings.load_distance {
                LoadPriority::for_distance(distance, self.settings.simulation_distance)
            } else {
                old
            };
            self.enqueue_locked(&mut pending, pos, priority, distance);
        }
    }

    fn enqueue_wanted(&self, center: ChunkPos) {
        let missing: Vec<ChunkPos> = {
            let chunks = self.chunks.read();
            self.wanted.read().iter().filter(|p| !chunks.contains_key(p)).copied().collect()
        };
        if missing.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        for pos in missing {
            if pending.get(&pos).map_or(false, |s| s.is_pending()) {
                continue;
            }
            let distance = center.chebyshev_distance(pos);
            let priority = LoadPriority::for_distance(distance, self.settings.simulation_distance);
            self.enqueue_locked(&mut pending, pos, priority, distance);
        }
    }

    fn enqueue_unwanted(&self, center: ChunkPos) {
        let mut unload = self.unload_queue.lock();
        let mut chunks = self.chunks.write();

        let mut queued = 0;
        for (pos, entry) in chunks.iter_mut() {
            if entry.state == ChunkState::Ready && center.chebyshev_distance(*pos) > self.settings.unload_distance {
                entry.state = ChunkState::QueuedUnload;
                unload.push_back(*pos);
                queued += 1;
            }
        }

        // Above the soft ceiling, evict the farthest chunks outside the load radius first
        let excess = chunks.len().saturating_sub(self.settings.max_loaded_chunks);
        if excess > queued {
            let mut candidates: Vec<(u32, ChunkPos)> = chunks
                .iter()
                .filter(|(p, e)| {
                    e.state == ChunkState::Ready && center.chebyshev_distance(**p) > self.settings.load_distance
                })
                .map(|(p, _)| (center.chebyshev_distance(*p), *p))
                .collect();
            candidates.sort_unstable_by(|a, b| b.cmp(a));
            for (_, pos) in candidates.into_iter().take(excess - queued) {
                if let Some(entry) = chunks.get_mut(&pos) {
                    entry.state = ChunkState::QueuedUnload;
                    unload.push_front(pos);
                }
            }
            if chunks.len() - unload.len().min(chunks.len()) > self.settings.max_loaded_chunks {
                log::warn!(
                    "[ChunkManager] {} chunks resident with a ceiling of {}",
                    chunks.len(),
                    self.settings.max_loaded_chunks
                );
            }
        }
    }

    fn drain_loads(&self, center: ChunkPos) -> usize {
        let mut started = 0;
        while started < self.settings.max_loads_per_tick {
            let Some((pos, _priority)) = self.load_queue.lock().pop() else {
                break;
            };
            if self.chunks.read().contains_key(&pos) {
                self.pending.lock().remove(&pos);
                continue;
            }
            if center.chebyshev_distance(pos) > self.settings.load_distance
                && !self.callbacks.lock().contains_key(&pos)
            {
                self.pending.lock().remove(&pos);
                continue;
            }
            self.start_load(pos);
            started += 1;
        }
        started
    }

    fn start_load(&self, pos: ChunkPos) {
        let cached = self.cache.lock().take(pos);
        match &self.pool {
            None => {
                self.pending.lock().insert(pos, ChunkState::Loading);
                let (chunk, source) = self.producer.produce(pos, cached);
                self.install(chunk, source);
            }
            Some(pool) => {
                let kind = if cached.is_some() || self.producer.store.contains(pos) {
                    JobKind::Load
                } else {
                    JobKind::Generate
                };
                let state = match kind {
                    JobKind::Generate => ChunkState::Generating,
                    _ => ChunkState::Loading,
                };
                self.pending.lock().insert(pos, state);
                let producer = self.producer.clone();
                let tx = self.results_tx.clone();
                pool.spawn(kind, move || {
                    let (chunk, source) = producer.produce(pos, cached);
                    let _ = tx.send(JobOutcome::Loaded {
                        pos,
                        chunk: Box::new(chunk),
                        source,
                    });
                });
            }
        }
    }

    /// Produce and install a chunk on the calling thread
    fn load_now(&self, pos: ChunkPos) {
        self.load_queue.lock().remove(pos);
        self.pending.lock().insert(pos, ChunkState::Loading);
        let cached = self.cache.lock().take(pos);
        let (chunk, source) = self.producer.produce(pos, cached);
        self.install(chunk, source);
    }

    /// Light a produced chunk against its neighbours and make it `Ready`
    fn install(&self, mut chunk: Chunk, source: LoadSource) {
        let pos = chunk.position();
        if self.chunks.read().contains_key(&pos) {
            // Beaten by a synchronous load
            return;
        }
        self.pending.lock().insert(pos, ChunkState::Lighting);

        if source == LoadSource::Generated || chunk.has_pending_light() {
            chunk.take_pending_light();
            let neighbours: Vec<Arc<RwLock<Chunk>>> = {
                let chunks = self.chunks.read();
                pos.neighborhood()
                    .iter()
                    .filter(|p| **p != pos)
                    .filter_map(|p| chunks.get(p).map(|e| Arc::clone(&e.chunk)))
                    .collect()
            };
            let mut guards: Vec<_> = neighbours.iter().map(|c| c.write()).collect();
            let mut region = LightRegion::new(pos, self.height);
            region.insert(&mut chunk);
            for guard in guards.iter_mut() {
                region.insert(&mut **guard);
            }
            if let Err(err) = self.light.light_chunk(&mut region) {
                let err = self.counters.note(err);
                log::warn!("[ChunkManager] Lighting {:?} stopped early: {}", pos, err);
            }
        }

        {
            let mut tallies = self.tallies.lock();
            match source {
                LoadSource::Cache => tallies.loaded_from_cache += 1,
                LoadSource::Store => tallies.loaded_from_store += 1,
                LoadSource::Generated => tallies.generated += 1,
            }
        }

        let mut chunks = self.chunks.write();
        chunks.insert(
            pos,
            ChunkEntry {
                state: ChunkState::Ready,
                chunk: Arc::new(RwLock::new(chunk)),
            },
        );
        self.pending.lock().remove(&pos);
        drop(chunks);
        self.ready_events.lock().push(pos);
        log::trace!("[ChunkManager] {:?} ready from {:?}", pos, source);
    }

    fn drain_unloads(&self, center: ChunkPos) -> usize {
        let excess = self.loaded_count().saturating_sub(self.settings.max_loaded_chunks);
        let allowance = self.settings.max_unloads_per_tick + excess;
        let mut started = 0;

        while started < allowance {
            let Some(pos) = self.unload_queue.lock().pop_front() else {
                break;
            };
            let Some(entry) = self.chunks.read().get(&pos).cloned() else {
                continue;
            };
            if entry.state != ChunkState::QueuedUnload {
                continue;
            }
            let over_ceiling = self.loaded_count() > self.settings.max_loaded_chunks;
            let distance = center.chebyshev_distance(pos);
            if distance <= self.settings.load_distance
                || (distance <= self.settings.unload_distance && !over_ceiling)
            {
                // Wanted again
                self.set_state(pos, ChunkState::Ready);
                continue;
            }
            started += 1;

            if entry.chunk.read().is_modified() {
                self.set_state(pos, ChunkState::Saving);
                self.start_save(pos, &entry.chunk);
            } else {
                let payload = ChunkSerializer::serialize(&entry.chunk.read());
                self.remove_resident(pos, Some(payload));
            }
        }
        started
    }

    fn set_state(&self, pos: ChunkPos, state: ChunkState) {
        if let Some(entry) = self.chunks.write().get_mut(&pos) {
            entry.state = state;
        }
    }

    fn remove_resident(&self, pos: ChunkPos, payload: Option<Vec<u8>>) {
        if self.chunks.write().remove(&pos).is_none() {
            return;
        }
        if let Some(payload) = payload {
            self.cache.lock().insert(pos, payload);
        }
        self.tallies.lock().unloads += 1;
        self.unload_events.lock().push(pos);
    }

    /// Start a save unless one is already running for this chunk
    fn start_save(&self, pos: ChunkPos, chunk: &Arc<RwLock<Chunk>>) {
        let version = chunk.read().version();
        {
            let mut in_flight = self.saves_in_flight.lock();
            if in_flight.contains_key(&pos) {
                return;
            }
            in_flight.insert(pos, version);
        }
        match &self.pool {
            None => {
                let (version, payload) = write_chunk(self.producer.store.as_ref(), chunk);
                self.finish_save(pos, version, payload);
            }
            Some(pool) => {
                let store = Arc::clone(&self.producer.store);
                let chunk = Arc::clone(chunk);
                let tx = self.results_tx.clone();
                pool.spawn(JobKind::Save, move || {
                    let (version, payload) = write_chunk(store.as_ref(), &chunk);
                    let _ = tx.send(JobOutcome::Saved { pos, version, payload });
                });
            }
        }
    }

    fn finish_save(&self, pos: ChunkPos, version: u64, payload: WorldResult<Vec<u8>>) {
        self.saves_in_flight.lock().remove(&pos);
        let Some(entry) = self.chunks.read().get(&pos).cloned() else {
            return;
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => {
                let err = self.counters.note(err);
                log::warn!("[ChunkManager] Saving {:?} failed: {}; keeping it resident", pos, err);
                if entry.state == ChunkState::Saving {
                    self.set_state(pos, ChunkState::Ready);
                }
                return;
            }
        };
        self.tallies.lock().saves += 1;

        let current = {
            let mut chunk = entry.chunk.write();
            if chunk.version() == version {
                chunk.clear_modified();
            }
            chunk.version()
        };
        if current != version {
            // Written to while saving
            log::debug!("[ChunkManager] {:?} changed during save; saving again", pos);
            if entry.state == ChunkState::Saving {
                self.start_save(pos, &entry.chunk);
            }
            return;
        }
        if entry.state == ChunkState::Saving {
            self.remove_resident(pos, Some(payload));
        }
    }

    /// Install finished worker jobs
    fn poll_results(&self) {
        while let Ok(outcome) = self.results_rx.try_recv() {
            self.handle_outcome(outcome);
        }
    }

    fn handle_outcome(&self, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Loaded { pos, chunk, source } => {
                let wanted = self.pending.lock().get(&pos).map_or(false, |s| s.is_pending());
                if wanted {
                    self.install(*chunk, source);
                } else {
                    log::trace!("[ChunkManager] Discarding cancelled load of {:?}", pos);
                }
            }
            JobOutcome::Saved { pos, version, payload } => self.finish_save(pos, version, payload),
        }
    }

    fn fire_callbacks(&self, ready: &[ChunkPos]) {
        for pos in ready {
            let waiting = self.callbacks.lock().remove(pos);
            for callback in waiting.into_iter().flatten() {
                callback(*pos);
            }
        }
    }

    /// Loads currently running on workers
    pub fn loads_in_flight(&self) -> usize {
        self.pending
            .lock()
            .values()
            .filter(|s| matches!(s, ChunkState::Loading | ChunkState::Generating))
            .count()
    }

    /// Save every modified resident chunk and wait for outstanding saves.
    ///
    /// Returns the number of chunks written.
    pub fn flush_saves(&self) -> WorldResult<usize> {
        let dirty: Vec<(ChunkPos, Arc<RwLock<Chunk>>)> = self
            .chunks
            .read()
            .iter()
            .filter(|(_, e)| e.chunk.read().is_modified())
            .map(|(p, e)| (*p, Arc::clone(&e.chunk)))
            .collect();

        let mut first_error = None;
        let mut written = 0;
        for (pos, chunk) in &dirty {
            if self.saves_in_flight.lock().contains_key(pos) {
                continue;
            }
            let (version, payload) = write_chunk(self.producer.store.as_ref(), chunk);
            match payload {
                Ok(payload) => {
                    written += 1;
                    self.saves_in_flight.lock().insert(*pos, version);
                    self.finish_save(*pos, version, Ok(payload));
                }
                Err(err) => {
                    let err = self.counters.note(err);
                    log::error!("[ChunkManager] Flushing {:?} failed: {}", pos, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        while !self.saves_in_flight.lock().is_empty() {
            match self.results_rx.recv_timeout(SAVE_WAIT) {
                Ok(outcome) => {
                    if matches!(outcome, JobOutcome::Saved { .. }) {
                        written += 1;
                    }
                    self.handle_outcome(outcome);
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::error!(
                        "[ChunkManager] Gave up waiting for {} saves",
                        self.saves_in_flight.lock().len()
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log::info!("[ChunkManager] Flushed {} chunks", written);
        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }

    pub fn stats(&self) -> ChunkManagerStats {
        let tallies = self.tallies.lock();
        let cache = self.cache.lock();
        ChunkManagerStats {
            resident: self.loaded_count(),
            pending: self.pending.lock().values().filter(|s| s.is_pending()).count(),
            queued_loads: self.load_queue.lock().len(),
            queued_unloads: self.unload_queue.lock().len(),
            cached: cache.len(),
            cache_bytes: cache.bytes(),
            cache_hit_rate: cache.hit_rate(),
            loaded_from_cache: tallies.loaded_from_cache,
            loaded_from_store: tallies.loaded_from_store,
            generated: tallies.generated,
            saves: tallies.saves,
            unloads: tallies.unloads,
            dropped_requests: tallies.dropped_requests,
            pool: self.pool.as_ref().map(|p| p.stats()),
        }
    }
}

/// Resident blocks only; nothing is requested
impl VoxelSource for ChunkManager {
    fn block_at(&self, pos: BlockPos) -> BlockId {
        self.peek_block(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GeneratedChunk;
    use crate::persistence::MemoryChunkStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Stone up to y = 9, air above
    struct FlatGenerator {
        calls: AtomicUsize,
    }

    impl WorldGenerator for FlatGenerator {
        fn generate_chunk(&self, pos: ChunkPos) -> GeneratedChunk {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut chunk = Chunk::new(pos, 32);
            for y in 0..10 {
                chunk.fill_layer(y, BlockId::STONE);
            }
            GeneratedChunk::new(chunk)
        }

        fn surface_height(&self, _wx: i32, _wz: i32) -> i32 {
            9
        }

        fn biome_at(&self, _wx: i32, _wz: i32) -> BiomeId {
            BiomeId::default()
        }

        fn world_height(&self) -> usize {
            32
        }
    }

    fn settings(mode: LoadMode, load_distance: u32) -> StreamingSettings {
        StreamingSettings {
            load_distance,
            unload_distance: load_distance + 2,
            simulation_distance: load_distance.min(2),
            max_loaded_chunks: 1024,
            max_loads_per_tick: 1024,
            max_unloads_per_tick: 1024,
            cache_capacity: 16,
            load_mode: mode,
            worker_threads: 2,
            light_budget: 2_000_000,
        }
    }

    fn manager(mode: LoadMode, load_distance: u32) -> (ChunkManager, Arc<FlatGenerator>, Arc<MemoryChunkStore>) {
        let generator = Arc::new(FlatGenerator {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryChunkStore::new());
        let manager = ChunkManager::new(
            settings(mode, load_distance),
            generator.clone(),
            store.clone(),
            Arc::new(ErrorCounters::new()),
        )
        .expect("manager");
        (manager, generator, store)
    }

    #[test]
    fn test_inline_update_loads_wanted_square() {
        let (manager, _, _) = manager(LoadMode::Inline, 2);
        let report = manager.update(Vec3::new(0.0, 20.0, 0.0));
        assert_eq!(report.ready.len(), 25);
        // The observer column goes first
        assert_eq!(report.ready[0], ChunkPos::new(0, 0));
        assert_eq!(manager.loaded_count(), 25);

        let again = manager.update(Vec3::new(0.0, 20.0, 0.0));
        assert_eq!(again.loads_started, 0);
        assert_eq!(again.unloads_started, 0);
    }

    #[test]
    fn test_read_of_absent_chunk_is_air_and_requests_load() {
        let (manager, _, _) = manager(LoadMode::Inline, 1);
        let pos = BlockPos::new(5, 3, 5);
        assert_eq!(manager.get_block(pos), BlockId::AIR);
        assert_eq!(manager.state(pos.chunk_pos()), ChunkState::QueuedLoad);
        manager.update(Vec3::new(0.5, 20.0, 0.5));
        assert_eq!(manager.get_block(pos), BlockId::STONE);
    }

    #[test]
    fn test_read_outside_load_radius_loads_nothing() {
        let (manager, _, _) = manager(LoadMode::Inline, 2);
        let observer = Vec3::new(8.0, 20.0, 8.0);
        manager.update(observer);
        assert_eq!(manager.loaded_count(), 25);

        // Chunk (4, 0) sits between the load and unload distances
        let far = BlockPos::new(65, 0, 1);
        assert_eq!(manager.get_block(far), BlockId::AIR);
        assert_eq!(manager.counters.snapshot().chunk_not_loaded, 1);
        assert_eq!(manager.state(far.chunk_pos()), ChunkState::Empty);

        for _ in 0..10 {
            manager.update(observer);
        }
        assert_eq!(manager.loaded_count(), 25);
        assert!(!manager.is_ready(far.chunk_pos()));
    }

    #[test]
    fn test_queued_loads_outside_new_radius_are_cancelled() {
        let (manager, _, _) = manager(LoadMode::Inline, 1);
        // No observer yet, so the read is queued
        manager.get_block(BlockPos::new(3 * 16, 0, 0));
        assert_eq!(manager.state(ChunkPos::new(3, 0)), ChunkState::QueuedLoad);

        manager.update(Vec3::new(8.0, 20.0, 8.0));
        assert!(!manager.is_ready(ChunkPos::new(3, 0)));
        assert_eq!(manager.state(ChunkPos::new(3, 0)), ChunkState::Empty);
        assert_eq!(manager.loaded_count(), 9);
    }

    #[test]
    fn test_write_loads_synchronously_and_relights() {
        let (manager, _, _) = manager(LoadMode::Inline, 1);
        let pos = BlockPos::new(40, 20, 40);
        let old = manager.set_block(pos, BlockId::GLOWSTONE, 0).expect("write");
        assert_eq!(old, BlockId::AIR);
        assert!(manager.is_ready(pos.chunk_pos()));
        assert_eq!(manager.get_block(pos), BlockId::GLOWSTONE);
        let light = manager.light_at(pos.offset(1, 0, 0)).expect("resident");
        assert!(light.block >= 13);
        assert!(manager.set_block(BlockPos::new(0, 32, 0), BlockId::STONE, 0).is_err());
    }

    #[test]
    fn test_modified_chunk_is_saved_before_unload() {
        let (manager, generator, store) = manager(LoadMode::Inline, 1);
        manager.update(Vec3::ZERO);
        manager.set_block(BlockPos::new(3, 15, 3), BlockId::PLANKS, 0).expect("write");

        let report = manager.update(Vec3::new(16.0 * 20.0, 20.0, 0.0));
        assert!(report.unloaded.contains(&ChunkPos::new(0, 0)));
        assert!(store.contains(ChunkPos::new(0, 0)));
        let generated = generator.calls.load(Ordering::Relaxed);

        manager.update(Vec3::ZERO);
        assert_eq!(manager.get_block(BlockPos::new(3, 15, 3)), BlockId::PLANKS);
        // Everything came back from the cache or the store
        assert_eq!(generator.calls.load(Ordering::Relaxed), generated);
        assert!(manager.stats().loaded_from_cache + manager.stats().loaded_from_store >= 9);
    }

    #[test]
    fn test_corrupt_stored_blob_is_regenerated_and_replaced() {
        let (manager, generator, store) = manager(LoadMode::Inline, 0);
        let pos = ChunkPos::new(0, 0);
        store.write(pos, b"definitely not a chunk").expect("write");
        assert!(store.load_chunk(pos).is_err());

        manager.update(Vec3::new(8.0, 20.0, 8.0));
        assert!(manager.is_ready(pos));
        assert_eq!(generator.calls.load(Ordering::Relaxed), 1);
        assert_eq!(manager.counters.snapshot().corrupt_chunk, 1);
        assert_eq!(manager.get_block(BlockPos::new(4, 5, 4)), BlockId::STONE);
        let chunk = manager.chunk(pos).expect("resident");
        assert!(chunk.read().is_modified());

        // Unloading writes a good blob over the bad one
        manager.update(Vec3::new(16.0 * 10.0, 20.0, 8.0));
        assert!(!manager.is_ready(pos));
        let restored = store.load_chunk(pos).expect("decodes").expect("present");
        assert_eq!(restored.get_block(4, 5, 4), BlockId::STONE);
    }

    #[test]
    fn test_write_during_save_saves_again() {
        let (manager, _, store) = manager(LoadMode::Inline, 0);
        manager.update(Vec3::new(8.0, 20.0, 8.0));
        let pos = ChunkPos::new(0, 0);
        manager.set_block(BlockPos::new(2, 12, 2), BlockId::PLANKS, 0).expect("write");

        // A save starts and the chunk is written to before it finishes
        let chunk = manager.chunk(pos).expect("resident");
        let (version, payload) = write_chunk(store.as_ref(), &chunk);
        manager.saves_in_flight.lock().insert(pos, version);
        manager.set_state(pos, ChunkState::Saving);
        manager.set_block(BlockPos::new(3, 12, 3), BlockId::BRICK, 0).expect("write");
        assert!(chunk.read().version() > version);

        manager.finish_save(pos, version, payload);
        assert_eq!(manager.stats().saves, 2);
        assert!(!chunk.read().is_modified());
        assert!(!manager.is_ready(pos));
        assert!(manager.saves_in_flight.lock().is_empty());

        let stored = store.load_chunk(pos).expect("decodes").expect("present");
        assert_eq!(stored.get_block(2, 12, 2), BlockId::PLANKS);
        assert_eq!(stored.get_block(3, 12, 3), BlockId::BRICK);
    }

    #[test]
    fn test_ceiling_evicts_chunks_outside_load_radius() {
        let generator = Arc::new(FlatGenerator {
            calls: AtomicUsize::new(0),
        });
        let manager = ChunkManager::new(
            StreamingSettings {
                max_loaded_chunks: 9,
                ..settings(LoadMode::Inline, 1)
            },
            generator,
            Arc::new(MemoryChunkStore::new()),
            Arc::new(ErrorCounters::new()),
        )
        .expect("manager");

        manager.update(Vec3::new(8.0, 20.0, 8.0));
        assert_eq!(manager.loaded_count(), 9);

        // Two columns east; the old chunks are still inside the unload distance
        let observer = Vec3::new(2.0 * 16.0 + 8.0, 20.0, 8.0);
        manager.update(observer);
        assert_eq!(manager.loaded_count(), 15);

        manager.update(observer);
        let mut expected = Vec::new();
        for cx in 1..=3 {
            for cz in -1..=1 {
                expected.push(ChunkPos::new(cx, cz));
            }
        }
        expected.sort_unstable();
        assert_eq!(manager.loaded_positions(), expected);
    }

    #[test]
    fn test_when_ready_fires_after_load() {
        let (manager, _, _) = manager(LoadMode::Inline, 1);
        let fired = Arc::new(AtomicUsize::new(0));
        let seen = fired.clone();
        manager.when_ready(ChunkPos::new(0, 1), move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        manager.update(Vec3::ZERO);
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        let seen = fired.clone();
        manager.when_ready(ChunkPos::new(0, 1), move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(fired.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_worker_mode_converges() {
        let (manager, _, _) = manager(LoadMode::Workers, 2);
        let deadline = Instant::now() + Duration::from_secs(20);
        while manager.loaded_count() < 25 && Instant::now() < deadline {
            manager.update(Vec3::ZERO);
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(manager.loaded_count(), 25);
        assert_eq!(manager.loads_in_flight(), 0);
    }

    #[test]
    fn test_load_queue_drops_lowest_when_full() {
        let mut queue = LoadQueue::new(2);
        assert_eq!(queue.push(ChunkPos::new(5, 5), LoadPriority::Low, 5), PushOutcome::Queued);
        assert_eq!(queue.push(ChunkPos::new(1, 0), LoadPriority::High, 1), PushOutcome::Queued);
        assert_eq!(
            queue.push(ChunkPos::new(0, 0), LoadPriority::Critical, 0),
            PushOutcome::Displaced(ChunkPos::new(5, 5))
        );
        assert_eq!(queue.push(ChunkPos::new(9, 9), LoadPriority::Low, 9), PushOutcome::Refused);
        // Upgrading a queued request never displaces anything
        assert_eq!(queue.push(ChunkPos::new(1, 0), LoadPriority::Critical, 1), PushOutcome::Queued);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some((ChunkPos::new(0, 0), LoadPriority::Critical)));
    }

    #[test]
    fn test_flush_saves_writes_dirty_chunks() {
        let (manager, _, store) = manager(LoadMode::Workers, 1);
        manager.set_block(BlockPos::new(1, 12, 1), BlockId::BRICK, 0).expect("write");
        assert_eq!(manager.flush_saves().expect("flush"), 1);
        assert!(store.contains(ChunkPos::new(0, 0)));
        let chunk = manager.chunk(ChunkPos::new(0, 0)).expect("resident");
        assert!(!chunk.read().is_modified());
        assert_eq!(manager.flush_saves().expect("flush"), 0);
    }
}
