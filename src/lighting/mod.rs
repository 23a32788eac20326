//! Sky and block light.
//!
//! Light is stored per cell in two nibble planes. Sky light is stored at full
//! strength and scaled by the day clock's daylight factor only when read.

pub mod light_map;
pub mod propagation;
pub mod region;
pub mod skylight;

pub use light_map::{LightChannel, LightLevel};
pub use propagation::LightEngine;
pub use region::LightRegion;
pub use skylight::attenuate;

pub use crate::constants::light::{MAX_LIGHT as MAX_LIGHT_LEVEL, MIN_LIGHT as MIN_LIGHT_LEVEL};
