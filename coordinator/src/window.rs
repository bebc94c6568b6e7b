//! Maintenance window evaluation
//!
//! A window is a pair of `HH:MM:SS` wall-clock bounds compared against the current UTC time
//! of day. Bounds are held as seconds since midnight; the zero-padded string form only exists
//! at the edges (config files, queue attributes, logs), where numeric and lexicographic order
//! agree. Membership is strict on both ends and windows that cross midnight are rejected.
//!
//! Two windows are configured, one for daylight-saving time and one for standard time. The
//! configured time zone decides which one applies at a given instant.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::{OffsetComponents, Tz};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("'{0}' is not a zero-padded HH:MM:SS time of day")]
    InvalidTimeOfDay(String),

    #[error("window {start}-{end} must end after it starts (windows crossing midnight are not supported)")]
    EmptyOrWrapping { start: TimeOfDay, end: TimeOfDay },

    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),
}

/// Wall-clock time of day with one-second resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        if hour < 24 && minute < 60 && second < 60 {
            Some(Self(hour * 3600 + minute * 60 + second))
        } else {
            None
        }
    }

    /// UTC time of day of an instant (sub-second precision is dropped)
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self(instant.num_seconds_from_midnight() % SECONDS_PER_DAY)
    }

    pub fn seconds_from_midnight(&self) -> u32 {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WindowError::InvalidTimeOfDay(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 8 || bytes[2] != b':' || bytes[5] != b':' {
            return Err(invalid());
        }

        let field = |range: std::ops::Range<usize>| -> Result<u32, WindowError> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u32>().map_err(|_| invalid())
        };

        let (hour, minute, second) = (field(0..2)?, field(3..5)?, field(6..8)?);
        Self::from_hms(hour, minute, second).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = WindowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

/// A same-day maintenance window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow", into = "RawWindow")]
pub struct MaintenanceWindow {
    start: TimeOfDay,
    end: TimeOfDay,
}

#[derive(Serialize, Deserialize)]
struct RawWindow {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl TryFrom<RawWindow> for MaintenanceWindow {
    type Error = WindowError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl From<MaintenanceWindow> for RawWindow {
    fn from(window: MaintenanceWindow) -> Self {
        RawWindow {
            start: window.start,
            end: window.end,
        }
    }
}

impl MaintenanceWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, WindowError> {
        if end <= start {
            return Err(WindowError::EmptyOrWrapping { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from its two `HH:MM:SS` bounds
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Self::new(start.parse()?, end.parse()?)
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    /// Strictly inside: the bounds themselves are outside the window.
    pub fn contains(&self, time: TimeOfDay) -> bool {
        self.start < time && time < self.end
    }

    /// Whether the UTC time of day of `instant` is inside the window
    pub fn is_open_at(&self, instant: DateTime<Utc>) -> bool {
        self.contains(TimeOfDay::of(instant))
    }
}

impl fmt::Display for MaintenanceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Whether `zone` observes daylight saving at `instant`
pub fn is_dst(zone: Tz, instant: DateTime<Utc>) -> bool {
    instant.with_timezone(&zone).offset().dst_offset() != Duration::zero()
}

pub fn parse_time_zone(name: &str) -> Result<Tz, WindowError> {
    name.parse::<Tz>()
        .map_err(|_| WindowError::UnknownTimeZone(name.to_string()))
}

/// The DST and standard-time windows for one time zone
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSchedule {
    pub time_zone: Tz,
    pub dst: MaintenanceWindow,
    pub standard: MaintenanceWindow,
}

impl WindowSchedule {
    pub fn new(time_zone: Tz, dst: MaintenanceWindow, standard: MaintenanceWindow) -> Self {
        Self {
            time_zone,
            dst,
            standard,
        }
    }

    /// The window that applies at `instant`
    pub fn resolve(&self, instant: DateTime<Utc>) -> MaintenanceWindow {
        if is_dst(self.time_zone, instant) {
            self.dst
        } else {
            self.standard
        }
    }
}
