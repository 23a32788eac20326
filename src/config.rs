//! World configuration
//!
//! `WorldConfig` is read from TOML and validated once at startup. Invalid
//! configuration is the only fatal error class in the runtime.

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::constants::{core, generation, light, physics, streaming, time};

/// Fatal configuration problems
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// World seed as written in the config: an integer or any string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    Number(i64),
    Text(String),
}

impl Default for SeedSpec {
    fn default() -> Self {
        SeedSpec::Number(0)
    }
}

impl SeedSpec {
    /// Resolve to the 64-bit master seed
    pub fn resolve(&self) -> u64 {
        match self {
            SeedSpec::Number(n) => *n as u64,
            SeedSpec::Text(text) => match text.trim().parse::<i64>() {
                Ok(n) => n as u64,
                Err(_) => {
                    let mut hasher = FxHasher::default();
                    hasher.write(text.as_bytes());
                    hasher.finish()
                }
            },
        }
    }
}

/// Broadphase backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadphaseKind {
    #[default]
    SpatialHash,
    SweepPrune,
    DynamicBvh,
}

/// Where chunk load jobs execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Jobs run on the worker pool and are polled each tick
    #[default]
    Workers,
    /// Jobs run on the thread calling `tick`
    Inline,
}

/// Runtime configuration for a world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Chebyshev radius (in chunks) that is kept loaded
    pub load_distance: u32,
    /// Chunks beyond this radius are unloaded
    pub unload_distance: u32,
    pub simulation_distance: u32,
    /// Soft ceiling on resident chunks
    pub max_loaded_chunks: usize,
    pub worker_threads: usize,
    pub world_height: u32,
    pub sea_level: u32,
    pub day_length_ticks: u64,
    pub broadphase: BroadphaseKind,
    pub cell_size: f32,
    pub seed: SeedSpec,

    pub max_loads_per_tick: usize,
    pub max_unloads_per_tick: usize,
    /// Compressed chunk blobs kept in memory after unload
    pub cache_capacity: usize,
    pub load_mode: LoadMode,
    /// Directory for chunk blobs; `None` keeps saves in memory
    pub save_dir: Option<PathBuf>,
    pub max_shapes: usize,
    pub sweep_samples: u32,
    pub light_budget: usize,
    pub generation_budget: usize,
    /// Multiplier on the day clock
    pub time_speed: f32,
    pub start_tick: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            load_distance: streaming::DEFAULT_LOAD_DISTANCE,
            unload_distance: streaming::DEFAULT_UNLOAD_DISTANCE,
            simulation_distance: streaming::DEFAULT_SIMULATION_DISTANCE,
            max_loaded_chunks: streaming::DEFAULT_MAX_LOADED_CHUNKS,
            worker_threads: num_cpus::get().saturating_sub(1).clamp(1, 4),
            world_height: core::DEFAULT_WORLD_HEIGHT,
            sea_level: core::DEFAULT_SEA_LEVEL,
            day_length_ticks: time::DEFAULT_DAY_LENGTH,
            broadphase: BroadphaseKind::default(),
            cell_size: physics::DEFAULT_CELL_SIZE,
            seed: SeedSpec::default(),
            max_loads_per_tick: streaming::DEFAULT_MAX_LOADS_PER_TICK,
            max_unloads_per_tick: streaming::DEFAULT_MAX_UNLOADS_PER_TICK,
            cache_capacity: streaming::DEFAULT_CACHE_CAPACITY,
            load_mode: LoadMode::default(),
            save_dir: None,
            max_shapes: physics::DEFAULT_MAX_SHAPES,
            sweep_samples: physics::DEFAULT_SWEEP_SAMPLES,
            light_budget: light::DEFAULT_LIGHT_BUDGET,
            generation_budget: generation::DEFAULT_GENERATION_BUDGET,
            time_speed: 1.0,
            start_tick: 0,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: WorldConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = SeedSpec::Number(seed);
        self
    }

    pub fn seed_value(&self) -> u64 {
        self.seed.resolve()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_distance == 0 {
            return Err(invalid("load_distance", "must be at least 1"));
        }
        if self.unload_distance < self.load_distance + streaming::HYSTERESIS {
            return Err(invalid(
                "unload_distance",
                format!(
                    "must be >= load_distance + {} (got {} with load_distance {})",
                    streaming::HYSTERESIS,
                    self.unload_distance,
                    self.load_distance
                ),
            ));
        }
        if self.simulation_distance > self.load_distance {
            return Err(invalid("simulation_distance", "must be <= load_distance"));
        }
        if self.worker_threads == 0 {
            return Err(invalid("worker_threads", "must be at least 1"));
        }
        if self.world_height == 0
            || self.world_height % 16 != 0
            || self.world_height > core::MAX_WORLD_HEIGHT
        {
            return Err(invalid(
                "world_height",
                format!(
                    "must be a positive multiple of 16 up to {}",
                    core::MAX_WORLD_HEIGHT
                ),
            ));
        }
        if self.sea_level < 1 || self.sea_level > self.world_height - 2 {
            return Err(invalid("sea_level", "must lie in [1, world_height - 2]"));
        }
        if self.day_length_ticks == 0 {
            return Err(invalid("day_length_ticks", "must be positive"));
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            return Err(invalid("cell_size", "must be a positive finite number"));
        }
        if self.max_loaded_chunks == 0 {
            return Err(invalid("max_loaded_chunks", "must be positive"));
        }
        if self.max_loads_per_tick == 0 || self.max_unloads_per_tick == 0 {
            return Err(invalid("max_loads_per_tick", "per-tick limits must be positive"));
        }
        if self.sweep_samples == 0 {
            return Err(invalid("sweep_samples", "must be at least 1"));
        }
        if !(self.time_speed.is_finite() && self.time_speed >= 0.0) {
            return Err(invalid("time_speed", "must be a finite non-negative number"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        WorldConfig::default()
            .validate()
            .expect("default config should validate");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = WorldConfig::from_toml_str(
            r#"
            load_distance = 4
            unload_distance = 6
            simulation_distance = 2
            broadphase = "sweep_prune"
            load_mode = "inline"
            seed = "hello world"
            "#,
        )
        .expect("config should parse");
        assert_eq!(config.load_distance, 4);
        assert_eq!(config.broadphase, BroadphaseKind::SweepPrune);
        assert_eq!(config.load_mode, LoadMode::Inline);
        assert_eq!(config.world_height, core::DEFAULT_WORLD_HEIGHT);
        assert_eq!(config.seed_value(), SeedSpec::Text("hello world".into()).resolve());
    }

    #[test]
    fn test_numeric_string_seed_matches_number() {
        assert_eq!(SeedSpec::Text("42".into()).resolve(), SeedSpec::Number(42).resolve());
        assert_ne!(SeedSpec::Text("abc".into()).resolve(), SeedSpec::Text("abd".into()).resolve());
    }

    #[test]
    fn test_hysteresis_enforced() {
        let config = WorldConfig {
            load_distance: 8,
            unload_distance: 9,
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_world_height_must_be_multiple_of_16() {
        let config = WorldConfig {
            world_height: 100,
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
