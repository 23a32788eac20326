//! Blockworld
//!
//! Runtime for an infinite block world: seeded noise and biomes, chunk
//! generation and streaming, persistent chunk storage, light propagation,
//! a day/night clock with weather, and a collision core for entities.
//!
//! [`World`] is the entry point. Everything runs on the thread that calls
//! [`World::tick`], except chunk load and save jobs, which run on a worker
//! pool and hand their results back on the next tick.

pub mod biome;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod generation;
pub mod lighting;
pub mod noise;
pub mod persistence;
pub mod physics;
pub mod thread_pool;
pub mod time;
pub mod weather;
pub mod world;

pub use biome::{BiomeId, BiomeRegistry};
pub use config::{BroadphaseKind, ConfigError, LoadMode, SeedSpec, WorldConfig};
pub use error::{ErrorCounts, ErrorKind, WorldError, WorldResult};
pub use events::{ChunkNotice, ListenerId, WorldEvent};
pub use lighting::LightLevel;
pub use physics::{layers, Aabb, BodyDesc, Capsule, Obb, Ray, ResponsePolicy, Shape, ShapeHandle, Sphere};
pub use time::DayPhase;
pub use weather::{Precipitation, WeatherKind};
pub use world::{BlockId, BlockPos, BlockRegistry, Chunk, ChunkPos, TickReport, World, WorldRayHit};
