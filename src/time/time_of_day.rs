use serde::{Deserialize, Serialize};

use crate::constants::time::{DAWN_END, DAY_END, DUSK_DAYLIGHT, DUSK_END, MIN_DAYLIGHT, NIGHT_END};

/// Phases of the day, in the order they occur from tick 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DayPhase {
    Dawn,
    Day,
    Dusk,
    Night,
    Midnight,
}

impl DayPhase {
    /// Phase at a fraction of the day in `[0, 1)`
    pub fn at_fraction(fraction: f32) -> Self {
        match fraction {
            f if f < DAWN_END => DayPhase::Dawn,
            f if f < DAY_END => DayPhase::Day,
            f if f < DUSK_END => DayPhase::Dusk,
            f if f < NIGHT_END => DayPhase::Night,
            _ => DayPhase::Midnight,
        }
    }

    /// Fraction of the day at which the phase begins
    pub fn start_fraction(self) -> f32 {
        match self {
            DayPhase::Dawn => 0.0,
            DayPhase::Day => DAWN_END,
            DayPhase::Dusk => DAY_END,
            DayPhase::Night => DUSK_END,
            DayPhase::Midnight => NIGHT_END,
        }
    }

    pub fn next(self) -> Self {
        match self {
            DayPhase::Dawn => DayPhase::Day,
            DayPhase::Day => DayPhase::Dusk,
            DayPhase::Dusk => DayPhase::Night,
            DayPhase::Night => DayPhase::Midnight,
            DayPhase::Midnight => DayPhase::Dawn,
        }
    }

    pub fn is_dark(self) -> bool {
        matches!(self, DayPhase::Night | DayPhase::Midnight)
    }
}

/// Daylight factor at a fraction of the day.
///
/// Rises through dawn, holds at 1 during the day, falls through dusk and
/// the night and stays at its floor until the next dawn.
pub fn daylight_at(fraction: f32) -> f32 {
    let f = fraction.rem_euclid(1.0);
    let progress = |start: f32, end: f32| ((f - start) / (end - start)).clamp(0.0, 1.0);
    match DayPhase::at_fraction(f) {
        DayPhase::Dawn => MIN_DAYLIGHT + (1.0 - MIN_DAYLIGHT) * progress(0.0, DAWN_END),
        DayPhase::Day => 1.0,
        DayPhase::Dusk => 1.0 - (1.0 - DUSK_DAYLIGHT) * progress(DAY_END, DUSK_END),
        DayPhase::Night => DUSK_DAYLIGHT - (DUSK_DAYLIGHT - MIN_DAYLIGHT) * progress(DUSK_END, NIGHT_END),
        DayPhase::Midnight => MIN_DAYLIGHT,
    }
}

/// Time speed multiplier presets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeSpeed {
    Paused,
    Normal,
    /// Ten times normal speed
    Fast,
    /// A hundred times normal speed
    VeryFast,
    Custom(f32),
}

impl TimeSpeed {
    /// Get the multiplier value
    pub fn multiplier(&self) -> f32 {
        match self {
            TimeSpeed::Paused => 0.0,
            TimeSpeed::Normal => 1.0,
            TimeSpeed::Fast => 10.0,
            TimeSpeed::VeryFast => 100.0,
            TimeSpeed::Custom(m) => m.max(0.0),
        }
    }

    pub fn from_multiplier(multiplier: f32) -> Self {
        match multiplier {
            m if m <= 0.0 => TimeSpeed::Paused,
            m if m == 1.0 => TimeSpeed::Normal,
            m if m == 10.0 => TimeSpeed::Fast,
            m if m == 100.0 => TimeSpeed::VeryFast,
            m => TimeSpeed::Custom(m),
        }
    }
}

impl Default for TimeSpeed {
    fn default() -> Self {
        TimeSpeed::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(DayPhase::at_fraction(0.0), DayPhase::Dawn);
        assert_eq!(DayPhase::at_fraction(0.25), DayPhase::Day);
        assert_eq!(DayPhase::at_fraction(0.45), DayPhase::Dusk);
        assert_eq!(DayPhase::at_fraction(0.75), DayPhase::Night);
        assert_eq!(DayPhase::at_fraction(0.9), DayPhase::Midnight);
        for phase in [DayPhase::Dawn, DayPhase::Day, DayPhase::Dusk, DayPhase::Night, DayPhase::Midnight] {
            assert_eq!(DayPhase::at_fraction(phase.start_fraction()), phase);
        }
    }

    #[test]
    fn test_daylight_shape() {
        assert!((daylight_at(0.0) - MIN_DAYLIGHT).abs() < 1e-6);
        assert_eq!(daylight_at(0.3), 1.0);
        assert!((daylight_at(DUSK_END) - DUSK_DAYLIGHT).abs() < 1e-6);
        assert!((daylight_at(0.95) - MIN_DAYLIGHT).abs() < 1e-6);
    }

    #[test]
    fn test_speed_presets() {
        assert_eq!(TimeSpeed::from_multiplier(0.0), TimeSpeed::Paused);
        assert_eq!(TimeSpeed::from_multiplier(1.0), TimeSpeed::Normal);
        assert_eq!(TimeSpeed::from_multiplier(2.5).multiplier(), 2.5);
        assert_eq!(TimeSpeed::Custom(-3.0).multiplier(), 0.0);
    }
}
