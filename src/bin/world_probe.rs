//! Headless world probe
//!
//! Builds a world from an optional TOML config, walks an observer along +X
//! for a number of ticks and prints streaming, lighting and collision stats.
//!
//! Usage: world_probe [config.toml] [ticks]

use anyhow::{Context, Result};
use glam::Vec3;

use blockworld::physics::{layers, Ray, ResponsePolicy, Sphere};
use blockworld::{World, WorldConfig, WorldRayHit};

const DT: f32 = 0.05;
const WALK_SPEED: f32 = 8.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => WorldConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => WorldConfig::default(),
    };
    let ticks: u32 = match args.next() {
        Some(n) => n.parse().context("tick count must be a number")?,
        None => 200,
    };

    println!("Blockworld probe");
    println!("================");
    println!("seed {:#x}, height {}", config.seed_value(), config.world_height);

    let mut world = World::new(config).context("building world")?;
    world.register_chunk_listener(|notice| log::trace!("{:?}", notice));
    world.register_weather_listener(|old, new| println!("weather {:?} -> {:?}", old, new));
    world.register_time_listener(|old, new| println!("phase {:?} -> {:?}", old, new));

    let probe = world.spawn_entity(Sphere::new(Vec3::new(8.0, 200.0, 8.0), 0.4), ResponsePolicy::Slide)?;

    let mut observer = Vec3::new(8.0, 80.0, 8.0);
    for tick in 0..ticks {
        let report = world.tick(DT, observer)?;
        if tick % 20 == 0 {
            println!(
                "tick {:>4}: ready {:>3}, unloaded {:>3}, contacts {}",
                report.tick,
                report.streaming.ready.len(),
                report.streaming.unloaded.len(),
                report.contacts
            );
        }
        observer.x += WALK_SPEED * DT;
    }

    let ray = Ray::new(observer + Vec3::Y * 100.0, Vec3::NEG_Y, 256.0)?;
    match world.raycast(&ray, layers::TERRAIN)? {
        Some(WorldRayHit::Block(hit)) => {
            println!("ground under observer: {:?} at {:?}", hit.id, hit.block);
            println!("light above ground: {}", world.light_at(hit.block.offset(0, 1, 0)));
        }
        Some(WorldRayHit::Shape(hit)) => println!("shape {:?} under observer", hit.handle),
        None => println!("no ground under observer yet"),
    }

    world.despawn_entity(probe);
    let saved = world.flush()?;
    let stats = world.stats();
    println!("saved {} chunks", saved);
    println!("chunks: {:#?}", stats.chunks);
    println!("collision: {:#?}", stats.collision);
    println!("errors: {:?}", stats.errors);
    println!("atmosphere: {:?}", world.atmosphere());
    Ok(())
}
