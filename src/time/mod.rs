//! World time: a tick counter folded into a repeating day.

pub mod day_night_cycle;
pub mod time_of_day;

pub use day_night_cycle::{DayClock, PhaseChange};
pub use time_of_day::{daylight_at, DayPhase, TimeSpeed};
