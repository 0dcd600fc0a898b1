//! Daily reload window and cadence rules used by the reload scheduler.

use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use thiserror::Error;

use crate::{AutoloadWindow, JitterRange};

/// A window shorter than this is stretched from its start.
pub const MIN_WINDOW_SPAN_MINUTES: u32 = 8 * 60;
/// Delay before rechecking when the clock is outside the window.
pub const OUTSIDE_WINDOW_RETRY: Duration = Duration::from_secs(15 * 60);

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("invalid time of day {0:?}, expected HH:MM")]
    InvalidTime(String),
}

/// Parses `"HH:MM"` into minutes past midnight.
pub fn parse_hhmm(value: &str) -> Result<u32, WindowError> {
    let invalid = || WindowError::InvalidTime(value.to_string());
    let (hours, minutes) = value.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadWindow {
    start: u32,
    end: u32,
}

impl ReloadWindow {
    /// Builds a window spanning at least `MIN_WINDOW_SPAN_MINUTES`, possibly across midnight.
    pub fn new(start: u32, end: u32) -> Self {
        let start = start % MINUTES_PER_DAY;
        let end = end % MINUTES_PER_DAY;
        let span = (end + MINUTES_PER_DAY - start) % MINUTES_PER_DAY;
        let end = if span < MIN_WINDOW_SPAN_MINUTES {
            (start + MIN_WINDOW_SPAN_MINUTES) % MINUTES_PER_DAY
        } else {
            end
        };
        Self { start, end }
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Ok(Self::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }

    pub fn from_settings(window: &AutoloadWindow) -> Result<Self, WindowError> {
        Self::parse(&window.hour_start, &window.hour_end)
    }

    pub fn start_minutes(&self) -> u32 {
        self.start
    }

    pub fn end_minutes(&self) -> u32 {
        self.end
    }

    /// Start inclusive, end exclusive.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let now = time.hour() * 60 + time.minute();
        if self.start < self.end {
            (self.start..self.end).contains(&now)
        } else {
            now >= self.start || now < self.end
        }
    }
}

impl Default for ReloadWindow {
    fn default() -> Self {
        Self::new(3 * 60, 17 * 60)
    }
}

/// Jitter bounds in ascending order, each at least one minute.
pub fn jitter_bounds(range: JitterRange) -> (Duration, Duration) {
    let low = range.min.min(range.max).max(1);
    let high = range.min.max(range.max).max(low);
    (
        Duration::from_secs(low * 60),
        Duration::from_secs(high * 60),
    )
}

/// Why reload checks were suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Login, verification or anti-automation page.
    Challenge,
    /// Known decoy page pattern.
    Decoy,
}

impl PauseReason {
    pub fn cooldown(self) -> Duration {
        match self {
            PauseReason::Challenge => Duration::from_secs(60 * 60),
            PauseReason::Decoy => Duration::from_secs(24 * 60 * 60),
        }
    }
}
