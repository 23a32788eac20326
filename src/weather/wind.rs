use glam::Vec3;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::weather::WeatherKind;

/// Wind direction (compass directions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// Wind strength categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindStrength {
    Calm,
    Light,
    Moderate,
    Strong,
    Gale,
}

impl WindDirection {
    /// Convert from angle in degrees (0 = North, 90 = East)
    pub fn from_angle(angle: f32) -> Self {
        match angle.rem_euclid(360.0) {
            a if a < 22.5 || a >= 337.5 => WindDirection::North,
            a if a < 67.5 => WindDirection::NorthEast,
            a if a < 112.5 => WindDirection::East,
            a if a < 157.5 => WindDirection::SouthEast,
            a if a < 202.5 => WindDirection::South,
            a if a < 247.5 => WindDirection::SouthWest,
            a if a < 292.5 => WindDirection::West,
            _ => WindDirection::NorthWest,
        }
    }
}

impl WindStrength {
    /// Create from wind speed in blocks per second
    pub fn from_speed(speed: f32) -> Self {
        match speed {
            s if s < 0.5 => WindStrength::Calm,
            s if s < 5.0 => WindStrength::Light,
            s if s < 10.0 => WindStrength::Moderate,
            s if s < 20.0 => WindStrength::Strong,
            _ => WindStrength::Gale,
        }
    }
}

/// Horizontal wind that eases towards a target picked per weather state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindSystem {
    current: Vec3,
    target: Vec3,
    /// Fraction of the gap closed per second
    transition_speed: f32,
}

impl WindSystem {
    pub fn new() -> Self {
        Self {
            current: Vec3::ZERO,
            target: Vec3::ZERO,
            transition_speed: 0.5,
        }
    }

    /// Pick a new target; storms blow harder than clear skies
    pub fn retarget(&mut self, kind: WeatherKind, intensity: f32, rng: &mut StdRng) {
        let (min, max) = match kind {
            WeatherKind::Clear | WeatherKind::Fog => (0.0, 4.0),
            WeatherKind::Rain | WeatherKind::Snow => (3.0, 10.0),
            WeatherKind::Thunder => (10.0, 25.0),
        };
        let speed = min + (max - min) * intensity.clamp(0.0, 1.0);
        // Let the direction drift rather than jump
        let heading = self.heading_degrees() + rng.gen_range(-60.0..=60.0);
        let radians = heading.to_radians();
        self.target = Vec3::new(radians.sin(), 0.0, -radians.cos()) * speed;
    }

    pub fn update(&mut self, dt: f32) {
        let diff = self.target - self.current;
        self.current += diff * (self.transition_speed * dt).clamp(0.0, 1.0);
    }

    pub fn velocity(&self) -> Vec3 {
        self.current
    }

    fn heading_degrees(&self) -> f32 {
        let v = if self.target.length_squared() > 0.0 {
            self.target
        } else {
            self.current
        };
        v.x.atan2(-v.z).to_degrees()
    }

    pub fn direction(&self) -> WindDirection {
        WindDirection::from_angle(self.current.x.atan2(-self.current.z).to_degrees())
    }

    pub fn strength(&self) -> WindStrength {
        WindStrength::from_speed(self.current.length())
    }
}

impl Default for WindSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_wind_direction() {
        assert_eq!(WindDirection::from_angle(0.0), WindDirection::North);
        assert_eq!(WindDirection::from_angle(90.0), WindDirection::East);
        assert_eq!(WindDirection::from_angle(-90.0), WindDirection::West);
    }

    #[test]
    fn test_wind_strength() {
        assert_eq!(WindStrength::from_speed(0.1), WindStrength::Calm);
        assert_eq!(WindStrength::from_speed(7.0), WindStrength::Moderate);
        assert_eq!(WindStrength::from_speed(25.0), WindStrength::Gale);
    }

    #[test]
    fn test_wind_eases_towards_target() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut wind = WindSystem::new();
        wind.retarget(WeatherKind::Thunder, 1.0, &mut rng);
        wind.update(1.0);
        let halfway = wind.velocity().length();
        assert!((halfway - 12.5).abs() < 1e-3);
        for _ in 0..50 {
            wind.update(1.0);
        }
        assert_eq!(wind.strength(), WindStrength::Gale);
    }
}
