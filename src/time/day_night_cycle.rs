use serde::{Deserialize, Serialize};

use crate::constants::time::TICKS_PER_SECOND;
use crate::time::{daylight_at, DayPhase, TimeSpeed};

/// Phase transition reported by [`DayClock::advance`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub old: DayPhase,
    pub new: DayPhase,
    pub tick: u64,
}

/// Day/night clock driven by a monotonically increasing tick counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayClock {
    tick: u64,
    day_length: u64,
    speed: TimeSpeed,
    /// Fractional ticks carried between updates
    carry: f64,
}

impl DayClock {
    pub fn new(day_length: u64, start_tick: u64, speed: TimeSpeed) -> Self {
        Self {
            tick: start_tick,
            day_length: day_length.max(1),
            speed,
            carry: 0.0,
        }
    }

    /// Advance by wall-clock seconds scaled by the speed multiplier
    pub fn advance(&mut self, dt: f32) -> Option<PhaseChange> {
        if !dt.is_finite() || dt <= 0.0 {
            return None;
        }
        let exact = dt as f64 * TICKS_PER_SECOND as f64 * self.speed.multiplier() as f64 + self.carry;
        let whole = exact.floor();
        self.carry = exact - whole;
        self.advance_ticks(whole as u64)
    }

    /// Advance by whole ticks; reports the phase now in effect if it changed
    pub fn advance_ticks(&mut self, ticks: u64) -> Option<PhaseChange> {
        if ticks == 0 {
            return None;
        }
        let old = self.phase();
        self.tick = self.tick.saturating_add(ticks);
        let new = self.phase();
        (old != new || ticks >= self.day_length).then_some(PhaseChange {
            old,
            new,
            tick: self.tick,
        })
    }

    /// Total ticks elapsed
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
        self.carry = 0.0;
    }

    pub fn day_length(&self) -> u64 {
        self.day_length
    }

    /// Position within the current day, in `[0, day_length)`
    pub fn day_time(&self) -> u64 {
        self.tick % self.day_length
    }

    pub fn day_count(&self) -> u64 {
        self.tick / self.day_length
    }

    pub fn fraction(&self) -> f32 {
        self.day_time() as f32 / self.day_length as f32
    }

    pub fn phase(&self) -> DayPhase {
        DayPhase::at_fraction(self.fraction())
    }

    /// Factor applied to stored sky light when it is read
    pub fn daylight(&self) -> f32 {
        daylight_at(self.fraction())
    }

    /// Sun angle in radians; 0 at the start of dawn, PI at the end of dusk
    pub fn sun_angle(&self) -> f32 {
        self.fraction() * std::f32::consts::TAU
    }

    pub fn speed(&self) -> TimeSpeed {
        self.speed
    }

    pub fn set_speed(&mut self, speed: TimeSpeed) {
        self.speed = speed;
    }

    /// Jump forward to the start of the next phase
    pub fn skip_to_next_phase(&mut self) -> Option<PhaseChange> {
        let next = self.phase().next();
        let target = (next.start_fraction() * self.day_length as f32).round() as u64;
        let now = self.day_time();
        let delta = if target > now {
            target - now
        } else {
            self.day_length - now + target
        };
        self.advance_ticks(delta)
    }
}

impl Default for DayClock {
    fn default() -> Self {
        Self::new(crate::constants::time::DEFAULT_DAY_LENGTH, 0, TimeSpeed::Normal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_by_tick() {
        let mut clock = DayClock::new(24_000, 0, TimeSpeed::Normal);
        clock.advance_ticks(6_000);
        assert_eq!(clock.phase(), DayPhase::Day);
        clock.advance_ticks(12_000);
        assert_eq!(clock.phase(), DayPhase::Night);
        clock.advance_ticks(6_000);
        assert_eq!(clock.day_time(), 0);
        assert_eq!(clock.day_count(), 1);
    }

    #[test]
    fn test_advance_reports_phase_changes() {
        let mut clock = DayClock::new(24_000, 1_990, TimeSpeed::Normal);
        let change = clock.advance(1.0).expect("crossing into day");
        assert_eq!(change.old, DayPhase::Dawn);
        assert_eq!(change.new, DayPhase::Day);
        assert!(clock.advance(1.0).is_none());
    }

    #[test]
    fn test_fractional_ticks_carry() {
        let mut clock = DayClock::new(24_000, 0, TimeSpeed::Normal);
        // 1.25 ticks per call
        for _ in 0..8 {
            clock.advance(0.0625);
        }
        assert_eq!(clock.tick(), 10);
    }

    #[test]
    fn test_paused_clock_does_not_move() {
        let mut clock = DayClock::new(24_000, 500, TimeSpeed::Paused);
        clock.advance(100.0);
        assert_eq!(clock.tick(), 500);
    }

    #[test]
    fn test_daylight_monotonic_over_dawn_and_dusk() {
        let mut clock = DayClock::new(24_000, 0, TimeSpeed::Normal);
        let mut last = clock.daylight();
        while clock.day_time() < 10_000 {
            clock.advance_ticks(100);
            assert!(clock.daylight() >= last);
            last = clock.daylight();
        }
        while clock.day_time() < 20_000 {
            clock.advance_ticks(100);
            assert!(clock.daylight() <= last);
            last = clock.daylight();
        }
    }

    #[test]
    fn test_skip_to_next_phase() {
        let mut clock = DayClock::new(24_000, 21_000, TimeSpeed::Normal);
        clock.skip_to_next_phase();
        assert_eq!(clock.day_time(), 0);
        assert_eq!(clock.phase(), DayPhase::Dawn);
    }
}
