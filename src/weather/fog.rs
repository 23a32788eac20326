//! Pure functions deriving what the sky looks like from weather, time and biome.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::biome::{BiomeClimate, BiomePalette};
use crate::weather::{WeatherKind, WeatherState};

/// Night sky colour blended in as daylight fades
const NIGHT_SKY: Vec3 = Vec3::new(0.02, 0.02, 0.08);
/// Overcast grey blended in by precipitation
const STORM_GREY: Vec3 = Vec3::new(0.35, 0.37, 0.42);
/// Clear-weather view distance in blocks
const CLEAR_VISIBILITY: f32 = 512.0;

/// Fog density levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FogDensity {
    None,
    Light,
    Medium,
    Heavy,
}

/// Fog configuration derived from the current weather
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FogSettings {
    pub density: FogDensity,
    pub color: Vec3,
    pub start_distance: f32,
    pub end_distance: f32,
}

impl FogSettings {
    pub fn for_weather(state: &WeatherState, color: Vec3) -> Self {
        let density = match (state.kind, state.intensity) {
            (WeatherKind::Fog, i) if i > 0.6 => FogDensity::Heavy,
            (WeatherKind::Fog, _) | (WeatherKind::Thunder, _) => FogDensity::Medium,
            (WeatherKind::Rain, _) | (WeatherKind::Snow, _) => FogDensity::Light,
            (WeatherKind::Clear, _) => FogDensity::None,
        };
        let end = visibility(state);
        Self {
            density,
            color,
            start_distance: end * 0.25,
            end_distance: end,
        }
    }

    /// Linear fog factor at a distance
    pub fn factor(&self, distance: f32) -> f32 {
        if self.density == FogDensity::None {
            return 0.0;
        }
        ((distance - self.start_distance) / (self.end_distance - self.start_distance)).clamp(0.0, 1.0)
    }
}

/// What falls from the sky at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precipitation {
    None,
    Rain,
    Snow,
}

/// How far one can see, in blocks
pub fn visibility(state: &WeatherState) -> f32 {
    let i = state.intensity.clamp(0.0, 1.0);
    let loss = match state.kind {
        WeatherKind::Clear => 0.0,
        WeatherKind::Rain => 0.3 + 0.3 * i,
        WeatherKind::Snow => 0.4 + 0.3 * i,
        WeatherKind::Thunder => 0.6 + 0.2 * i,
        WeatherKind::Fog => 0.7 + 0.25 * i,
    };
    CLEAR_VISIBILITY * (1.0 - loss)
}

/// Sky colour from the biome palette, dimmed by night and greyed by weather
pub fn sky_color(state: &WeatherState, daylight: f32, palette: &BiomePalette) -> Vec3 {
    let overcast = match state.kind {
        WeatherKind::Clear => 0.0,
        WeatherKind::Fog => 0.5,
        _ => 0.4 + 0.5 * state.intensity.clamp(0.0, 1.0),
    };
    let day = palette.sky.lerp(STORM_GREY, overcast);
    NIGHT_SKY.lerp(day, daylight.clamp(0.0, 1.0))
}

/// Fog colour follows the palette fog tint the same way the sky does
pub fn fog_color(state: &WeatherState, daylight: f32, palette: &BiomePalette) -> Vec3 {
    let washed = if state.kind == WeatherKind::Clear {
        palette.fog
    } else {
        palette.fog.lerp(STORM_GREY, 0.5)
    };
    (NIGHT_SKY * 2.0).lerp(washed, daylight.clamp(0.0, 1.0))
}

/// Precipitation at a height given the local climate.
///
/// Rain turns to snow in cold biomes and above `snow_height`.
pub fn precipitation_at(
    state: &WeatherState,
    climate: &BiomeClimate,
    y: i32,
    snow_height: Option<i32>,
) -> Precipitation {
    if !state.kind.is_precipitating() || climate.is_dry() {
        return Precipitation::None;
    }
    let above_snow_line = snow_height.map_or(false, |h| y >= h);
    if state.kind == WeatherKind::Snow || climate.is_cold() || above_snow_line {
        Precipitation::Snow
    } else {
        Precipitation::Rain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(kind: WeatherKind, intensity: f32) -> WeatherState {
        WeatherState {
            kind,
            intensity,
            ..WeatherState::default()
        }
    }

    fn temperate() -> BiomeClimate {
        BiomeClimate {
            temperature: 0.8,
            humidity: 0.4,
            downfall: 0.4,
            freezes_water: false,
        }
    }

    #[test]
    fn test_visibility_ordering() {
        let clear = visibility(&state(WeatherKind::Clear, 0.0));
        let rain = visibility(&state(WeatherKind::Rain, 0.5));
        let fog = visibility(&state(WeatherKind::Fog, 1.0));
        assert!(clear > rain && rain > fog);
    }

    #[test]
    fn test_precipitation_turns_to_snow_high_up() {
        let rain = state(WeatherKind::Rain, 0.5);
        assert_eq!(precipitation_at(&rain, &temperate(), 70, Some(120)), Precipitation::Rain);
        assert_eq!(precipitation_at(&rain, &temperate(), 130, Some(120)), Precipitation::Snow);
        assert_eq!(
            precipitation_at(&state(WeatherKind::Clear, 0.0), &temperate(), 70, None),
            Precipitation::None
        );
    }

    #[test]
    fn test_fog_settings_follow_weather() {
        let heavy = FogSettings::for_weather(&state(WeatherKind::Fog, 0.9), Vec3::ONE);
        assert_eq!(heavy.density, FogDensity::Heavy);
        assert!(heavy.factor(10.0) < heavy.factor(200.0));
        let clear = FogSettings::for_weather(&state(WeatherKind::Clear, 0.0), Vec3::ONE);
        assert_eq!(clear.factor(1000.0), 0.0);
    }

    #[test]
    fn test_sky_darkens_at_night() {
        let palette = BiomePalette {
            sky: Vec3::new(0.5, 0.7, 1.0),
            fog: Vec3::ONE,
            water: Vec3::ZERO,
            grass: Vec3::ZERO,
            foliage: Vec3::ZERO,
        };
        let clear = state(WeatherKind::Clear, 0.0);
        let noon = sky_color(&clear, 1.0, &palette);
        let night = sky_color(&clear, 0.2, &palette);
        assert!(noon.length() > night.length());
        assert!((noon - palette.sky).length() < 1e-5);
    }
}
