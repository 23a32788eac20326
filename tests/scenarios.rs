// End-to-end world scenarios with literal values.

use std::sync::Arc;

use glam::Vec3;

use blockworld::biome::{BiomeId, BiomeRegistry};
use blockworld::config::LoadMode;
use blockworld::constants::generation::DEFAULT_GENERATION_BUDGET;
use blockworld::generation::{GeneratedChunk, TerrainGenerator, WorldGenerator};
use blockworld::lighting::{LightEngine, LightRegion};
use blockworld::persistence::MemoryChunkStore;
use blockworld::physics::{layers, Aabb, BodyDesc, Ray};
use blockworld::time::{daylight_at, DayClock, DayPhase, TimeSpeed};
use blockworld::{BlockId, BlockRegistry, Chunk, ChunkPos, World, WorldConfig, WorldRayHit};

const SEED: i64 = 0xC0FFEE;
const HEIGHT: usize = 128;
const SEA_LEVEL: i32 = 63;

/// Stone up to `top - 1` with the biome's surface block at `top`
struct FlatGenerator {
    top: i32,
}

impl WorldGenerator for FlatGenerator {
    fn generate_chunk(&self, pos: ChunkPos) -> GeneratedChunk {
        let mut chunk = Chunk::new(pos, HEIGHT);
        let surface = BiomeRegistry::global().get(BiomeId::default()).surface_block;
        for y in 0..self.top as usize {
            chunk.fill_layer(y, BlockId::STONE);
        }
        chunk.fill_layer(self.top as usize, surface);
        GeneratedChunk::new(chunk)
    }

    fn surface_height(&self, _wx: i32, _wz: i32) -> i32 {
        self.top
    }

    fn biome_at(&self, _wx: i32, _wz: i32) -> BiomeId {
        BiomeId::default()
    }

    fn world_height(&self) -> usize {
        HEIGHT
    }
}

fn inline_config(load_distance: u32) -> WorldConfig {
    WorldConfig {
        load_distance,
        unload_distance: load_distance + 2,
        simulation_distance: load_distance.min(4),
        world_height: HEIGHT as u32,
        sea_level: SEA_LEVEL as u32,
        load_mode: LoadMode::Inline,
        max_loads_per_tick: 1024,
        max_loaded_chunks: 1024,
        ..WorldConfig::default()
    }
    .with_seed(SEED)
}

fn flat_world(load_distance: u32, top: i32) -> World {
    World::with_parts(
        inline_config(load_distance),
        Arc::new(FlatGenerator { top }),
        Arc::new(MemoryChunkStore::new()),
    )
    .expect("valid config")
}

#[test]
fn e1_generated_chunk_has_ground_and_open_sky() {
    let generator = TerrainGenerator::new(SEED as u64, HEIGHT, SEA_LEVEL, DEFAULT_GENERATION_BUDGET);
    let chunk = generator.generate_chunk(ChunkPos::new(0, 0)).chunk;

    assert!(!chunk.get_block(8, SEA_LEVEL - 1, 8).is_air());
    assert!(chunk.get_block(8, HEIGHT as i32 - 1, 8).is_air());

    let bytes = chunk.serialize();
    assert!(!bytes.is_empty());
    let restored = Chunk::deserialize(&bytes).expect("blob decodes");
    assert_eq!(restored.serialize(), bytes);
    for ly in 0..HEIGHT as i32 {
        for lz in 0..16 {
            for lx in 0..16 {
                assert_eq!(restored.get_block(lx, ly, lz), chunk.get_block(lx, ly, lz));
            }
        }
    }
}

#[test]
fn e2_emitter_falls_off_one_level_per_block() {
    let mut chunk = Chunk::new(ChunkPos::new(0, 0), HEIGHT);
    chunk.set_block(0, 64, 0, BlockId::TORCH).expect("in range");
    assert_eq!(BlockRegistry::global().emission(BlockId::TORCH), 14);
    {
        let mut region = LightRegion::new(ChunkPos::new(0, 0), HEIGHT);
        region.insert(&mut chunk);
        LightEngine::new(BlockRegistry::global(), 1 << 20)
            .light_chunk(&mut region)
            .expect("within budget");
    }
    assert_eq!(chunk.get_light(14, 64, 0).block, 0);
    assert_eq!(chunk.get_light(13, 64, 0).block, 1);
    assert_eq!(chunk.get_light(1, 64, 0).block, 13);
}

#[test]
fn e3_swept_box_stops_at_static_box() {
    let world = flat_world(1, 10);
    let wall = world
        .spawn_body(BodyDesc::fixed(Aabb::new(Vec3::ZERO, Vec3::ONE)))
        .expect("wall");
    let velocity = Vec3::new(-10.0, 0.0, 0.0);
    let mover = world
        .spawn_body(
            BodyDesc::dynamic(Aabb::new(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0))).with_velocity(velocity),
        )
        .expect("mover");

    // Sweep one second of travel so the fraction reads as seconds
    let horizon = 1.0;
    let hit = world
        .collision()
        .sweep(mover, velocity * horizon)
        .expect("valid sweep")
        .expect("hit");
    assert_eq!(hit.handle, wall);
    assert_eq!(hit.normal, Vec3::X);
    let time_of_impact = hit.fraction * horizon;
    assert!((time_of_impact - 0.2).abs() < 1e-3, "impact after {} s", time_of_impact);

    // A single 0.1 s tick covers only half the gap
    let tick = world
        .collision()
        .sweep(mover, velocity * 0.1)
        .expect("valid sweep");
    assert!(tick.is_none());
}

#[test]
fn e4_one_tick_loads_the_whole_square() {
    let mut world = flat_world(8, 40);
    world.tick(0.05, Vec3::new(0.0, 70.0, 0.0)).expect("tick");

    let mut expected = Vec::new();
    for cx in -8..=8 {
        for cz in -8..=8 {
            expected.push(ChunkPos::new(cx, cz));
        }
    }
    expected.sort();
    assert_eq!(world.chunks().loaded_positions(), expected);
}

#[test]
fn e5_phases_and_daylight_curve() {
    let mut clock = DayClock::new(24_000, 0, TimeSpeed::Normal);
    clock.advance_ticks(6_000);
    assert_eq!(clock.phase(), DayPhase::Day);

    let mut clock = DayClock::new(24_000, 0, TimeSpeed::Normal);
    clock.advance_ticks(18_000);
    assert_eq!(clock.phase(), DayPhase::Night);

    let samples = 200;
    let curve = |from: f32, to: f32| -> Vec<f32> {
        (0..=samples)
            .map(|i| daylight_at(from + (to - from) * i as f32 / samples as f32 * 0.999))
            .collect()
    };
    let rising = curve(DayPhase::Dawn.start_fraction(), DayPhase::Day.start_fraction());
    assert!(rising.windows(2).all(|w| w[1] >= w[0]));
    assert!(rising.last() > rising.first());

    let falling = curve(DayPhase::Dusk.start_fraction(), DayPhase::Midnight.start_fraction());
    assert!(falling.windows(2).all(|w| w[1] <= w[0]));
    assert!(falling.last() < falling.first());
}

#[test]
fn e6_ray_down_hits_column_top() {
    let mut world = flat_world(1, 80);
    world.tick(0.05, Vec3::new(0.5, 100.0, 0.5)).expect("tick");

    let ray = Ray::new(Vec3::new(0.5, 100.0, 0.5), Vec3::NEG_Y, 200.0).expect("ray");
    let Some(WorldRayHit::Block(hit)) = world.raycast(&ray, layers::TERRAIN).expect("valid") else {
        panic!("ray should hit terrain");
    };
    let surface = BiomeRegistry::global().get(world.biome_at(0, 0)).surface_block;
    assert_eq!(hit.block.y, 80);
    assert_eq!(hit.normal, Vec3::Y);
    assert_eq!(hit.id, surface);
    assert!((hit.distance - 19.0).abs() < 1e-4);
}
