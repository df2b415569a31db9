//! Wall-clock abstraction used by the period scheduler.
//!
//! The scheduler reasons in local time-of-day (hour, minute, second); the
//! clock is injected so the window state machine can be driven in tests.

use chrono::{Local, NaiveTime, Timelike};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of the current local time-of-day.
pub trait WallClock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> NaiveTime;
}

/// Clock backed by the system's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Manually driven clock for tests; clones share the same reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<NaiveTime>>,
}

impl ManualClock {
    /// Start the clock at `hour:minute:second`. Out-of-range values fall back to midnight.
    pub fn at(hour: u32, minute: u32, second: u32) -> Self {
        let time = NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN);
        Self { now: Arc::new(Mutex::new(time)) }
    }

    pub fn set(&self, time: NaiveTime) {
        if let Ok(mut now) = self.now.lock() {
            *now = time;
        }
    }

    /// Advance by whole seconds, wrapping at midnight.
    pub fn advance_secs(&self, secs: i64) {
        if let Ok(mut now) = self.now.lock() {
            *now += chrono::Duration::seconds(secs);
        }
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> NaiveTime {
        self.now.lock().map(|t| *t).unwrap_or(NaiveTime::MIN)
    }
}

/// Seconds left until the next minute boundary; zero when already on it.
pub(crate) fn secs_until_minute(now: NaiveTime) -> u32 {
    match now.second() {
        0 => 0,
        s => 60 - s,
    }
}

/// Time until the next minute boundary strictly after `now`.
///
/// A full minute when `now` sits exactly on a boundary, so a tick that
/// finished within its own second does not fire twice.
pub(crate) fn until_next_minute(now: NaiveTime) -> Duration {
    let nanos = u64::from(now.nanosecond() % 1_000_000_000);
    Duration::from_secs(u64::from(60 - now.second()))
        .saturating_sub(Duration::from_nanos(nanos))
}
