use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("invalid time '{0}' (expected HH:mm)")]
    Malformed(String),
    #[error("start time {start} must be before end time {end}")]
    Inverted { start: TimeOfDay, end: TimeOfDay },
}

/// Wall-clock time with minute granularity, stored as minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const LAST_MINUTE: TimeOfDay = TimeOfDay(MINUTES_PER_DAY - 1);

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Some(Self((hour * 60 + minute) as u16))
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        if minutes >= u32::from(MINUTES_PER_DAY) {
            return None;
        }
        Some(Self(minutes as u16))
    }

    /// Converts a wall-clock time, dropping seconds.
    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    /// Adds minutes, saturating at 23:59.
    pub fn saturating_add_minutes(self, minutes: u32) -> Self {
        let total = self.minutes().saturating_add(minutes);
        Self::from_minutes(total).unwrap_or(Self::LAST_MINUTE)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TimeError::Malformed(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(malformed());
        }
        let digits_ok = bytes[..2]
            .iter()
            .chain(&bytes[3..])
            .all(|b| b.is_ascii_digit());
        if !digits_ok {
            return Err(malformed());
        }
        let hour: u32 = s[..2].parse().map_err(|_| malformed())?;
        let minute: u32 = s[3..].parse().map_err(|_| malformed())?;
        Self::from_hm(hour, minute).ok_or_else(malformed)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open `[start, end)` range within a single day. `start < end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct TimeInterval {
    #[serde(rename = "startTime")]
    start: TimeOfDay,
    #[serde(rename = "endTime")]
    end: TimeOfDay,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInterval {
    start_time: TimeOfDay,
    end_time: TimeOfDay,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = TimeError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::new(raw.start_time, raw.end_time)
    }
}

impl TimeInterval {
    /// The 08:00–18:00 window free slots are computed over unless configured otherwise.
    pub const DEFAULT_WINDOW: TimeInterval = TimeInterval {
        start: TimeOfDay(8 * 60),
        end: TimeOfDay(18 * 60),
    };

    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Result<Self, TimeError> {
        if start >= end {
            return Err(TimeError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        Self::new(start.trim().parse()?, end.trim().parse()?)
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end.minutes() - self.start.minutes()
    }

    /// True when `other` lies entirely within this interval.
    pub fn contains(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub fn contains_instant(&self, at: TimeOfDay) -> bool {
        self.start <= at && at < self.end
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}–{}", self.start, self.end)
    }
}
