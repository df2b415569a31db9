//! Daily active windows.

use chrono::{NaiveTime, Timelike};
use std::fmt;

use crate::config::ConfigError;

const TIME_FORMAT: &str = "%H:%M";

/// A same-day `[start, end)` range at minute resolution. Parsed once, immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    start_hour: u32,
    start_minute: u32,
    end_hour: u32,
    end_minute: u32,
}

fn parse_hm(index: usize, field: &'static str, value: &str) -> Result<(u32, u32), ConfigError> {
    let time = NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).map_err(|source| {
        ConfigError::InvalidTime { index, field, value: value.to_string(), source }
    })?;
    Ok((time.hour(), time.minute()))
}

impl ActiveWindow {
    /// Parse `"HH:MM"` bounds of window number `index`. The start must be
    /// strictly before the end; windows never span midnight.
    pub fn parse(index: usize, start: &str, end: &str) -> Result<Self, ConfigError> {
        let (start_hour, start_minute) = parse_hm(index, "start", start)?;
        let (end_hour, end_minute) = parse_hm(index, "end", end)?;
        if (start_hour, start_minute) >= (end_hour, end_minute) {
            return Err(ConfigError::EmptyWindow {
                index,
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start_hour, start_minute, end_hour, end_minute })
    }

    pub fn start(&self) -> (u32, u32) {
        (self.start_hour, self.start_minute)
    }

    pub fn end(&self) -> (u32, u32) {
        (self.end_hour, self.end_minute)
    }

    /// `now ≥ start`, compared on hour and minute.
    pub fn has_started(&self, now: NaiveTime) -> bool {
        (now.hour(), now.minute()) >= self.start()
    }

    /// `now ≥ end`, compared on hour and minute.
    pub fn has_ended(&self, now: NaiveTime) -> bool {
        (now.hour(), now.minute()) >= self.end()
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        self.has_started(now) && !self.has_ended(now)
    }
}

impl fmt::Display for ActiveWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start_hour, self.start_minute, self.end_hour, self.end_minute
        )
    }
}
