//! Weather state machine.
//!
//! Each state runs for a sampled duration; when it ends the next state is
//! drawn from a transition table biased by the climate under the observer.

pub mod fog;
pub mod weather_data;
pub mod wind;

pub use fog::{fog_color, precipitation_at, sky_color, visibility, FogDensity, FogSettings, Precipitation};
pub use weather_data::{transition_weights, WeatherChange, WeatherKind, WeatherState};
pub use wind::{WindDirection, WindStrength, WindSystem};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::biome::BiomeClimate;
use crate::noise::mix_seed;

const WEATHER_TAG: i64 = 0x7765_6174;

/// Timer-driven weather FSM with its own deterministic RNG
#[derive(Debug, Clone)]
pub struct WeatherSystem {
    state: WeatherState,
    wind: WindSystem,
    rng: StdRng,
}

impl WeatherSystem {
    pub fn new(seed: u64) -> Self {
        Self {
            state: WeatherState::default(),
            wind: WindSystem::new(),
            rng: StdRng::seed_from_u64(mix_seed(seed, &[WEATHER_TAG])),
        }
    }

    pub fn state(&self) -> &WeatherState {
        &self.state
    }

    pub fn kind(&self) -> WeatherKind {
        self.state.kind
    }

    /// Advance timers; returns the transition if the state changed
    pub fn update(&mut self, dt: f32, climate: &BiomeClimate) -> Option<WeatherChange> {
        if !dt.is_finite() || dt <= 0.0 {
            return None;
        }
        self.wind.update(dt);
        self.state.wind = self.wind.velocity();
        self.state.remaining_seconds -= dt;
        if self.state.remaining_seconds > 0.0 {
            return None;
        }

        let next = self.sample_next(climate);
        self.enter(next)
    }

    /// Switch immediately, bypassing the transition table
    pub fn force(&mut self, kind: WeatherKind) -> Option<WeatherChange> {
        log::info!("[WeatherSystem] Forcing weather to {:?}", kind);
        self.enter(kind)
    }

    fn sample_next(&mut self, climate: &BiomeClimate) -> WeatherKind {
        let weights = transition_weights(self.state.kind, climate);
        let total: f32 = weights.iter().map(|(_, w)| *w).sum();
        if total <= 0.0 {
            return WeatherKind::Clear;
        }
        let mut roll = self.rng.gen::<f32>() * total;
        for (kind, weight) in weights {
            if roll < weight {
                return kind;
            }
            roll -= weight;
        }
        WeatherKind::Clear
    }

    fn enter(&mut self, kind: WeatherKind) -> Option<WeatherChange> {
        let old = self.state.kind;
        let (min, max) = kind.duration_range();
        self.state.kind = kind;
        self.state.remaining_seconds = self.rng.gen_range(min..=max);
        self.state.intensity = match kind {
            WeatherKind::Clear => 0.0,
            _ => self.rng.gen_range(0.3..=1.0),
        };
        self.wind.retarget(kind, self.state.intensity, &mut self.rng);

        if old == kind {
            return None;
        }
        log::debug!(
            "[WeatherSystem] {:?} -> {:?} (intensity {:.2}, {:.0}s)",
            old,
            kind,
            self.state.intensity,
            self.state.remaining_seconds
        );
        Some(WeatherChange { old, new: kind })
    }
}
