use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::biome::BiomeClimate;

/// Weather states of the finite state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherKind {
    Clear,
    Rain,
    Thunder,
    Snow,
    Fog,
}

impl WeatherKind {
    pub const ALL: [WeatherKind; 5] = [
        WeatherKind::Clear,
        WeatherKind::Rain,
        WeatherKind::Thunder,
        WeatherKind::Snow,
        WeatherKind::Fog,
    ];

    /// How long a state lasts once entered, in seconds
    pub fn duration_range(self) -> (f32, f32) {
        match self {
            WeatherKind::Clear => (300.0, 900.0),
            WeatherKind::Rain => (120.0, 480.0),
            WeatherKind::Thunder => (60.0, 240.0),
            WeatherKind::Snow => (180.0, 600.0),
            WeatherKind::Fog => (90.0, 300.0),
        }
    }

    pub fn is_precipitating(self) -> bool {
        matches!(self, WeatherKind::Rain | WeatherKind::Thunder | WeatherKind::Snow)
    }
}

/// Current weather
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherState {
    pub kind: WeatherKind,
    /// Strength of the current state in [0, 1]
    pub intensity: f32,
    pub remaining_seconds: f32,
    pub wind: Vec3,
}

impl Default for WeatherState {
    fn default() -> Self {
        Self {
            kind: WeatherKind::Clear,
            intensity: 0.0,
            remaining_seconds: WeatherKind::Clear.duration_range().0,
            wind: Vec3::ZERO,
        }
    }
}

/// Weather transition reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherChange {
    pub old: WeatherKind,
    pub new: WeatherKind,
}

/// Relative odds of each next state, given the current one and the local climate.
///
/// Dry climates never precipitate, cold climates snow instead of rain and
/// humid ones rain more often. Staying in the same state is discouraged.
pub fn transition_weights(current: WeatherKind, climate: &BiomeClimate) -> [(WeatherKind, f32); 5] {
    let wet = climate.downfall.clamp(0.0, 1.0);
    let humid = climate.humidity.clamp(0.0, 1.0);
    let (rain, snow) = if climate.is_dry() {
        (0.0, 0.0)
    } else if climate.is_cold() {
        (0.0, 0.5 + wet)
    } else {
        (0.4 + wet, 0.0)
    };
    let thunder = if climate.is_dry() || climate.is_cold() { 0.0 } else { 0.2 * wet };
    let fog = 0.1 + 0.3 * humid;

    let mut weights = [
        (WeatherKind::Clear, 1.5),
        (WeatherKind::Rain, rain),
        (WeatherKind::Thunder, thunder),
        (WeatherKind::Snow, snow),
        (WeatherKind::Fog, fog),
    ];
    for (kind, weight) in weights.iter_mut() {
        if *kind == current && *kind != WeatherKind::Clear {
            *weight *= 0.25;
        }
    }
    // Storms come out of rain, not out of a clear sky
    if current == WeatherKind::Clear {
        weights[2].1 *= 0.25;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn climate(temperature: f32, humidity: f32, downfall: f32) -> BiomeClimate {
        BiomeClimate {
            temperature,
            humidity,
            downfall,
            freezes_water: temperature < 0.15,
        }
    }

    #[test]
    fn test_desert_never_rains() {
        let weights = transition_weights(WeatherKind::Clear, &climate(2.0, 0.0, 0.0));
        for (kind, weight) in weights {
            if kind.is_precipitating() {
                assert_eq!(weight, 0.0);
            }
        }
    }

    #[test]
    fn test_cold_climate_snows() {
        let weights = transition_weights(WeatherKind::Clear, &climate(0.0, 0.5, 0.5));
        assert_eq!(weights[1].1, 0.0);
        assert!(weights[3].1 > 0.0);
    }
}
