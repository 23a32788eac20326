//! World module
//!
//! Block ids and positions, chunk storage, chunk streaming and the `World`
//! runtime that ties the subsystems together.
//!
//! # Architecture Overview
//!
//! - **Data**: `BlockId`, `BlockPos`, `ChunkPos`, `NibbleArray` and `Chunk`
//! - **Streaming**: `ChunkManager` moves chunks through `ChunkState` using the
//!   worker pool, the blob cache and the persistent store
//! - **Runtime**: `World` owns streaming, lighting, time, weather and collision
//!   and delivers `WorldEvent`s to listeners

pub mod block;
pub mod chunk;
pub mod chunk_cache;
pub mod chunk_manager;
pub mod chunk_state;
pub mod nibble;
pub mod position;
pub mod world;

pub use block::{BlockId, BlockProperties, BlockRegistry, CollisionBounds, DropEntry};
pub use chunk::Chunk;
pub use chunk_cache::ChunkCache;
pub use chunk_manager::{
    ChunkManager, ChunkManagerStats, LoadSource, StreamingReport, StreamingSettings,
};
pub use chunk_state::{ChunkState, LoadPriority};
pub use nibble::NibbleArray;
pub use position::{BlockPos, ChunkPos, FACE_OFFSETS};
pub use world::{Atmosphere, TickReport, World, WorldRayHit, WorldStats};
