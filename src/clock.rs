//! Monotonic wall-clock timestamps.
//!
//! `updatedAt` must strictly advance on every mutation. Two mutations in
//! the same clock tick, or a wall clock stepping backwards, would otherwise
//! produce equal or regressing stamps.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after `floor`, e.g. the newest timestamp found in a hydrated document.
    #[must_use]
    pub fn starting_after(floor: Option<DateTime<Utc>>) -> Self {
        Self { last: floor }
    }

    /// Raise the floor so every later stamp comes after `stamp`.
    pub fn observe(&mut self, stamp: DateTime<Utc>) {
        if self.last.is_none_or(|last| stamp > last) {
            self.last = Some(stamp);
        }
    }

    /// Next stamp: wall-clock now, or one tick past the previous stamp if now is not later.
    pub fn now(&mut self) -> DateTime<Utc> {
        let wall = Utc::now();
        let stamp = match self.last {
            Some(last) if wall <= last => last + Duration::microseconds(1),
            _ => wall,
        };
        self.last = Some(stamp);
        stamp
    }
}
