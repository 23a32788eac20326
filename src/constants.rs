// Blockworld Constants - SINGLE SOURCE OF TRUTH
//
// Every numeric constant shared between subsystems lives here. Per-world
// tunables belong in `WorldConfig` instead.

/// Chunk geometry
pub mod core {
    /// Horizontal chunk edge in blocks
    pub const CHUNK_SIZE: usize = 16;
    pub const CHUNK_SIZE_I32: i32 = 16;
    /// `wx >> CHUNK_SHIFT` yields the chunk coordinate
    pub const CHUNK_SHIFT: i32 = 4;
    /// `wx & CHUNK_MASK` yields the local coordinate
    pub const CHUNK_MASK: i32 = 15;
    /// Cells in one horizontal layer of a chunk
    pub const COLUMN_COUNT: usize = CHUNK_SIZE * CHUNK_SIZE;

    pub const DEFAULT_WORLD_HEIGHT: u32 = 256;
    pub const MAX_WORLD_HEIGHT: u32 = 4096;
    pub const DEFAULT_SEA_LEVEL: u32 = 63;
}

/// Block ID constants (raw u16 values)
pub mod blocks {
    pub const AIR: u16 = 0;
    pub const STONE: u16 = 1;
    pub const DIRT: u16 = 2;
    pub const GRASS: u16 = 3;
    pub const WOOD: u16 = 4;
    pub const SAND: u16 = 5;
    pub const WATER: u16 = 6;
    pub const LEAVES: u16 = 7;
    pub const GLASS: u16 = 8;
    pub const COAL_ORE: u16 = 9;
    pub const IRON_ORE: u16 = 10;
    pub const GOLD_ORE: u16 = 11;
    pub const DIAMOND_ORE: u16 = 12;
    pub const BEDROCK: u16 = 13;
    pub const PLANKS: u16 = 14;
    pub const COBBLESTONE: u16 = 15;
    pub const MOSSY_COBBLESTONE: u16 = 16;
    pub const GRAVEL: u16 = 17;
    pub const CLAY: u16 = 18;
    pub const TORCH: u16 = 19;
    pub const GLOWSTONE: u16 = 20;
    pub const LAVA: u16 = 21;
    pub const LOG: u16 = 22;
    pub const SANDSTONE: u16 = 23;
    pub const RED_SAND: u16 = 24;
    pub const RED_SANDSTONE: u16 = 25;
    pub const TALL_GRASS: u16 = 26;
    pub const FLOWER_RED: u16 = 27;
    pub const FLOWER_YELLOW: u16 = 28;
    pub const CACTUS: u16 = 29;
    pub const SNOW: u16 = 30;
    pub const ICE: u16 = 31;
    pub const MUD: u16 = 32;
    pub const FROZEN_GRASS: u16 = 33;
    pub const MUSHROOM_RED: u16 = 34;
    pub const MUSHROOM_BROWN: u16 = 35;
    pub const BRICK: u16 = 36;
    pub const SPRUCE_LOG: u16 = 37;
    pub const SPRUCE_LEAVES: u16 = 38;
    pub const DEAD_BUSH: u16 = 39;

    /// Sentinel returned by the registry for ids it does not know
    pub const UNKNOWN: u16 = u16::MAX;
}

/// Light levels
pub mod light {
    pub const MAX_LIGHT: u8 = 15;
    pub const MIN_LIGHT: u8 = 0;
    /// Opacity at or above this value stops light entirely
    pub const FULLY_OPAQUE: u8 = 15;
    /// Default BFS work budget (node visits) per lighting job
    pub const DEFAULT_LIGHT_BUDGET: usize = 2_000_000;
}

/// Day/night clock
pub mod time {
    pub const TICKS_PER_SECOND: u32 = 20;
    pub const DEFAULT_DAY_LENGTH: u64 = 24_000;
    /// Darkest daylight factor reached at midnight
    pub const MIN_DAYLIGHT: f32 = 0.2;
    /// Daylight factor at the end of dusk
    pub const DUSK_DAYLIGHT: f32 = 0.35;

    // Phase boundaries as fractions of the day
    pub const DAWN_END: f32 = 1.0 / 12.0;
    pub const DAY_END: f32 = 5.0 / 12.0;
    pub const DUSK_END: f32 = 0.5;
    pub const NIGHT_END: f32 = 5.0 / 6.0;
}

/// Chunk streaming
pub mod streaming {
    pub const DEFAULT_LOAD_DISTANCE: u32 = 8;
    pub const DEFAULT_UNLOAD_DISTANCE: u32 = 10;
    pub const DEFAULT_SIMULATION_DISTANCE: u32 = 4;
    pub const DEFAULT_MAX_LOADED_CHUNKS: usize = 1024;
    pub const DEFAULT_MAX_LOADS_PER_TICK: usize = 8;
    pub const DEFAULT_MAX_UNLOADS_PER_TICK: usize = 8;
    pub const DEFAULT_CACHE_CAPACITY: usize = 256;
    /// Minimum gap between load and unload radii
    pub const HYSTERESIS: u32 = 2;
}

/// Terrain generation
pub mod generation {
    /// Noise samples allowed per chunk before passes degrade
    pub const DEFAULT_GENERATION_BUDGET: usize = 200_000;
    /// Cave lattice spacing (horizontal, vertical)
    pub const CAVE_CELL_XZ: usize = 4;
    pub const CAVE_CELL_Y: usize = 8;
    /// Weight of the smooth terrain octaves against ridged noise
    pub const TERRAIN_ALPHA: f32 = 0.7;
    pub const TREE_MARGIN: usize = 2;
}

/// Collision core
pub mod physics {
    pub const DEFAULT_CELL_SIZE: f32 = 10.0;
    pub const DEFAULT_MAX_SHAPES: usize = 65_536;
    pub const DEFAULT_SWEEP_SAMPLES: u32 = 10;
    /// Bisection steps after the first overlapping sweep sample
    pub const SWEEP_REFINE_STEPS: u32 = 12;
    pub const CONTACT_EPSILON: f32 = 1e-5;
    /// Fraction of penetration removed per resolution step
    pub const CORRECTION_PERCENT: f32 = 0.8;
    /// Largest positional correction applied in a single tick
    pub const MAX_CORRECTION: f32 = 0.5;
    /// Margin added around BVH leaves
    pub const BVH_FAT_MARGIN: f32 = 0.2;
}

/// Persistent store blob
pub mod persistence {
    pub const STORE_MAGIC: [u8; 4] = *b"VXCB";
    pub const STORE_VERSION: u32 = 1;
    pub const CHUNK_MAGIC: [u8; 4] = *b"VXCK";
    pub const CHUNK_FORMAT_VERSION: u16 = 1;
}
