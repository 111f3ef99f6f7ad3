//! The synthetic clock.
//!
//! Once per interval the current local time is broken into seven variables
//! and written through the store, whose change detection means rules only
//! fire when a component actually moves on.
//!
//! | variable | range |
//! |----------|-------|
//! | `time:second` | 0–59 |
//! | `time:minute` | 0–59 |
//! | `time:hour` | 0–23 |
//! | `date:day` | 1–31 |
//! | `date:month` | 1–12 |
//! | `date:year` | e.g. 2024 |
//! | `date:weekday` | 0 (Sunday) – 6 (Saturday) |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::var::VarStore;

pub const CLOCK_VARIABLES: [&str; 7] = [
    "time:second",
    "time:minute",
    "time:hour",
    "date:day",
    "date:month",
    "date:year",
    "date:weekday",
];

/// Whether `name` is written by the clock and therefore read-only from
/// outside.
pub fn is_clock_variable(name: &str) -> bool {
    CLOCK_VARIABLES.contains(&name)
}

/// The clock variables for `now`, in [`CLOCK_VARIABLES`] order.
pub fn readings<Tz: TimeZone>(now: &DateTime<Tz>) -> [(&'static str, i64); 7] {
    [
        ("time:second", i64::from(now.second())),
        ("time:minute", i64::from(now.minute())),
        ("time:hour", i64::from(now.hour())),
        ("date:day", i64::from(now.day())),
        ("date:month", i64::from(now.month())),
        ("date:year", i64::from(now.year())),
        ("date:weekday", i64::from(now.weekday().num_days_from_sunday())),
    ]
}

pub struct Clock {
    store: Arc<VarStore>,
    interval: Duration,
}

impl Clock {
    pub fn new(store: Arc<VarStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Tick forever.
    pub async fn run(self) {
        debug!(interval_ms = self.interval.as_millis() as u64, "clock started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.tick(&Local::now()).await;
        }
    }

    /// Write the readings for `now`.  Failures are logged and the remaining
    /// variables are still written.
    pub async fn tick<Tz: TimeZone>(&self, now: &DateTime<Tz>) {
        for (name, value) in readings(now) {
            if let Err(e) = self.store.set(name, value.into()).await {
                warn!(var = name, error = %e, "clock update failed");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
