// Invariants that hold for every world, checked over sampled inputs.

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use glam::{Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use blockworld::biome::BiomeId;
use blockworld::config::LoadMode;
use blockworld::constants::generation::DEFAULT_GENERATION_BUDGET;
use blockworld::generation::{GeneratedChunk, TerrainGenerator, WorldGenerator};
use blockworld::lighting::{LightEngine, LightRegion};
use blockworld::persistence::MemoryChunkStore;
use blockworld::physics::voxel::max_voxel_steps;
use blockworld::physics::{collide, voxel_raycast, Capsule, Obb, Ray, Shape, Sphere, VoxelSource};
use blockworld::{Aabb, BlockId, BlockPos, BlockRegistry, Chunk, ChunkPos, World, WorldConfig};

const HEIGHT: usize = 128;

struct FlatGenerator;

impl WorldGenerator for FlatGenerator {
    fn generate_chunk(&self, pos: ChunkPos) -> GeneratedChunk {
        let mut chunk = Chunk::new(pos, HEIGHT);
        for y in 0..20 {
            chunk.fill_layer(y, BlockId::STONE);
        }
        chunk.fill_layer(20, BlockId::GRASS);
        GeneratedChunk::new(chunk)
    }

    fn surface_height(&self, _wx: i32, _wz: i32) -> i32 {
        20
    }

    fn biome_at(&self, _wx: i32, _wz: i32) -> BiomeId {
        BiomeId::default()
    }

    fn world_height(&self) -> usize {
        HEIGHT
    }
}

fn config(load_mode: LoadMode) -> WorldConfig {
    WorldConfig {
        load_distance: 2,
        unload_distance: 4,
        simulation_distance: 1,
        world_height: HEIGHT as u32,
        sea_level: 63,
        load_mode,
        max_loads_per_tick: 64,
        max_unloads_per_tick: 64,
        worker_threads: 2,
        ..WorldConfig::default()
    }
    .with_seed(42)
}

fn flat_world(config: WorldConfig) -> World {
    World::with_parts(config, Arc::new(FlatGenerator), Arc::new(MemoryChunkStore::new())).expect("valid config")
}

fn terrain(seed: u64) -> TerrainGenerator {
    TerrainGenerator::new(seed, HEIGHT, 63, DEFAULT_GENERATION_BUDGET)
}

#[test]
fn address_round_trip() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut samples: Vec<(i32, i32, i32)> = vec![(0, 0, 0), (-1, 0, -1), (15, 127, 16), (-16, 5, -17)];
    for _ in 0..2_000 {
        samples.push((
            rng.gen_range(-1_000_000..1_000_000),
            rng.gen_range(0..HEIGHT as i32),
            rng.gen_range(-1_000_000..1_000_000),
        ));
    }
    for (wx, wy, wz) in samples {
        let pos = BlockPos::new(wx, wy, wz);
        let chunk = pos.chunk_pos();
        let (lx, ly, lz) = pos.local();
        assert!(lx < 16 && lz < 16);
        assert_eq!(chunk.x, wx >> 4);
        assert_eq!(chunk.z, wz >> 4);
        let back = BlockPos::new(
            chunk.min_block_x() + lx as i32,
            ly as i32,
            chunk.min_block_z() + lz as i32,
        );
        assert_eq!(back, pos);
    }
}

#[test]
fn generation_is_byte_identical_across_runs() {
    for (x, z) in [(0, 0), (-5, 3), (17, -40), (1000, 1000)] {
        let pos = ChunkPos::new(x, z);
        let a = terrain(0xC0FFEE).generate_chunk(pos).chunk.serialize();
        let b = terrain(0xC0FFEE).generate_chunk(pos).chunk.serialize();
        assert_eq!(a, b, "chunk {:?}", pos);
    }
}

#[test]
fn structures_agree_across_chunk_seams() {
    let first = terrain(0xC0FFEE);
    let second = terrain(0xC0FFEE);
    for cx in -8..8 {
        for cz in -2..2 {
            let pos = ChunkPos::new(cx, cz);
            for instance in first.planner().instances_near(pos, first.sampler()) {
                let cells = instance.cells();
                let mut owners: Vec<ChunkPos> = cells.iter().map(|(p, _)| p.chunk_pos()).collect();
                owners.sort();
                owners.dedup();
                if owners.len() < 2 {
                    continue;
                }

                // Each side written alone, then together, must agree cell for cell
                let mut written = 0;
                for owner in &owners {
                    let mut chunk = Chunk::new(*owner, HEIGHT);
                    written += instance.materialize(&mut chunk);
                    for (cell, block) in cells.iter().filter(|(p, _)| p.chunk_pos() == *owner) {
                        let (lx, ly, lz) = cell.local();
                        assert_eq!(chunk.get_block(lx as i32, ly as i32, lz as i32), *block);
                    }

                    let a = first.generate_chunk(*owner).chunk;
                    let b = second.generate_chunk(*owner).chunk;
                    for (cell, _) in cells.iter().filter(|(p, _)| p.chunk_pos() == *owner) {
                        let (lx, ly, lz) = cell.local();
                        let (lx, ly, lz) = (lx as i32, ly as i32, lz as i32);
                        assert_eq!(a.get_block(lx, ly, lz), b.get_block(lx, ly, lz));
                    }
                }
                assert_eq!(written, cells.len());
            }
        }
    }
}

#[test]
fn never_loaded_positions_read_as_air() {
    let world = flat_world(config(LoadMode::Workers));
    let mut rng = StdRng::seed_from_u64(4);
    for _ in 0..200 {
        let pos = BlockPos::new(
            rng.gen_range(-100_000..100_000),
            rng.gen_range(0..20),
            rng.gen_range(-100_000..100_000),
        );
        assert_eq!(world.get_block(pos), BlockId::AIR);
    }
    assert!(world.error_counts().chunk_not_loaded > 0);
}

#[test]
fn height_map_tracks_every_write() {
    let blocks = [BlockId::AIR, BlockId::STONE, BlockId::GLASS, BlockId::AIR, BlockId::WATER];
    let mut rng = StdRng::seed_from_u64(5);
    let mut chunk = terrain(9).generate_chunk(ChunkPos::new(2, 2)).chunk;
    for round in 0..4_000 {
        let (lx, ly, lz) = (rng.gen_range(0..16), rng.gen_range(0..HEIGHT as i32), rng.gen_range(0..16));
        let id = blocks[rng.gen_range(0..blocks.len())];
        chunk.set_block(lx, ly, lz, id).expect("in range");

        if round % 500 == 0 || round == 3_999 {
            for z in 0..16 {
                for x in 0..16 {
                    let expected = (0..HEIGHT as i32).rev().find(|y| !chunk.get_block(x, *y, z).is_air());
                    assert_eq!(chunk.height_at(x as usize, z as usize), expected.map(|y| y as usize));
                }
            }
        }
    }
}

#[test]
fn settled_light_never_drops_faster_than_opacity() {
    let registry = BlockRegistry::global();
    let mut chunk = terrain(77).generate_chunk(ChunkPos::new(0, 0)).chunk;
    chunk.set_block(8, 100, 8, BlockId::GLOWSTONE).expect("in range");
    chunk.set_block(3, 40, 3, BlockId::TORCH).expect("in range");
    {
        let mut region = LightRegion::new(ChunkPos::new(0, 0), HEIGHT);
        region.insert(&mut chunk);
        LightEngine::new(registry, 1 << 22).light_chunk(&mut region).expect("within budget");
    }

    let offsets = [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)];
    for y in 0..HEIGHT as i32 {
        for z in 0..16 {
            for x in 0..16 {
                let here = chunk.get_light(x, y, z);
                let allowance = registry.opacity(chunk.get_block(x, y, z)) as i32 + 1;
                for (dx, dy, dz) in offsets {
                    let (nx, ny, nz) = (x + dx, y + dy, z + dz);
                    if !(0..16).contains(&nx) || !(0..16).contains(&nz) || !(0..HEIGHT as i32).contains(&ny) {
                        continue;
                    }
                    let there = chunk.get_light(nx, ny, nz);
                    assert!(here.sky as i32 >= there.sky as i32 - allowance, "sky at {:?}", (x, y, z));
                    assert!(here.block as i32 >= there.block as i32 - allowance, "block at {:?}", (x, y, z));
                }
            }
        }
    }
}

fn random_shape(rng: &mut StdRng) -> Shape {
    let center = Vec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));
    let size = Vec3::new(rng.gen_range(0.2..1.5), rng.gen_range(0.2..1.5), rng.gen_range(0.2..1.5));
    match rng.gen_range(0..4) {
        0 => Aabb::from_center_half_extents(center, size).into(),
        1 => Sphere::new(center, size.x).into(),
        2 => Capsule::new(center, center + size, rng.gen_range(0.1..0.8)).into(),
        _ => {
            let axis = Vec3::new(rng.gen_range(-1.0..1.0), 1.0, rng.gen_range(-1.0..1.0)).normalize();
            Obb::new(center, size, Quat::from_axis_angle(axis, rng.gen_range(0.0..3.0))).into()
        }
    }
}

#[test]
fn collision_is_symmetric() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut hits = 0;
    for _ in 0..5_000 {
        let a = random_shape(&mut rng);
        let b = random_shape(&mut rng);
        let ab = collide(&a, &b);
        let ba = collide(&b, &a);
        assert_eq!(ab.is_some(), ba.is_some(), "{:?} vs {:?}", a, b);
        if let (Some(ab), Some(ba)) = (ab, ba) {
            hits += 1;
            assert!((ab.normal + ba.normal).length() < 1e-5, "{:?} vs {:?}", ab, ba);
            assert!((ab.depth - ba.depth).abs() < 1e-5);
        }
    }
    assert!(hits > 0);
}

#[test]
fn raycast_visits_a_bounded_number_of_cells() {
    let visited = Cell::new(0usize);
    let empty = |_: BlockPos| {
        visited.set(visited.get() + 1);
        BlockId::AIR
    };
    let mut rng = StdRng::seed_from_u64(8);
    for _ in 0..500 {
        let origin = Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(0.0..128.0), rng.gen_range(-50.0..50.0));
        let direction = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        let reach = rng.gen_range(0.0..300.0);
        let Ok(ray) = Ray::new(origin, direction, reach) else {
            continue;
        };
        visited.set(0);
        assert!(voxel_raycast(&empty as &dyn VoxelSource, &ray).is_none());
        assert!(visited.get() <= max_voxel_steps(reach) + 1, "{} cells for reach {}", visited.get(), reach);
    }
}

#[test]
fn streaming_converges_for_a_still_observer() {
    let mut world = flat_world(config(LoadMode::Workers));
    let observer = Vec3::new(20.0, 40.0, -20.0);
    let center = ChunkPos::from_world_f32(observer.x, observer.z);
    let mut wanted = Vec::new();
    for dx in -2..=2 {
        for dz in -2..=2 {
            wanted.push(center.offset(dx, dz));
        }
    }
    wanted.sort();

    let mut converged = false;
    for _ in 0..2_000 {
        world.tick(0.05, observer).expect("tick");
        if world.chunks().loaded_positions() == wanted && world.chunks().loads_in_flight() == 0 {
            converged = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(converged, "loaded {:?}", world.chunks().loaded_positions());

    for _ in 0..5 {
        let report = world.tick(0.05, observer).expect("tick");
        assert_eq!(report.streaming.loads_started, 0);
        assert_eq!(report.streaming.unloads_started, 0);
        assert!(report.streaming.ready.is_empty());
        assert!(report.streaming.unloaded.is_empty());
    }
    assert_eq!(world.chunks().loaded_positions(), wanted);
}

#[test]
fn saved_chunk_reloads_unchanged() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = WorldConfig {
        save_dir: Some(dir.path().to_path_buf()),
        cache_capacity: 0,
        ..config(LoadMode::Inline)
    };
    let mut world = World::new(config).expect("world");
    let home = Vec3::new(8.0, 90.0, 8.0);
    world.tick(0.05, home).expect("tick");
    world.set_block(BlockPos::new(4, 90, 4), BlockId::GLOWSTONE, 0).expect("write");
    world.set_block(BlockPos::new(5, 10, 5), BlockId::AIR, 0).expect("write");

    let snapshot = |world: &World| -> Vec<(BlockId, u8, u8, u8)> {
        let handle = world.chunks().chunk(ChunkPos::new(0, 0)).expect("resident");
        let chunk = handle.read();
        let mut cells = Vec::with_capacity(16 * 16 * HEIGHT);
        for y in 0..HEIGHT as i32 {
            for z in 0..16 {
                for x in 0..16 {
                    let light = chunk.get_light(x, y, z);
                    cells.push((chunk.get_block(x, y, z), chunk.get_metadata(x, y, z), light.sky, light.block));
                }
            }
        }
        cells
    };
    let before = snapshot(&world);

    world.tick(0.05, Vec3::new(8.0 + 16.0 * 40.0, 90.0, 8.0)).expect("tick away");
    assert!(!world.chunks().is_ready(ChunkPos::new(0, 0)));
    world.tick(0.05, home).expect("tick back");
    assert!(world.chunks().is_ready(ChunkPos::new(0, 0)));
    assert!(world.stats().chunks.loaded_from_store > 0);

    assert!(before == snapshot(&world), "reloaded chunk differs");
}
