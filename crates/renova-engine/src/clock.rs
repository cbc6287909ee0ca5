//! Injectable wall-clock source.
//!
//! Every engine entry point reads the current instant exactly once,
//! through this trait, and threads it into the pure computations. Tests
//! pin the instant with [`FixedClock`].

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// A source of the current UTC instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The process wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests.
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock pinned at `instant`.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut guard) = self.instant.write() {
            *guard = instant;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
            .read()
            .map(|guard| *guard)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn fixed_clock_is_settable() {
        let start = Utc
            .with_ymd_and_hms(2024, 6, 15, 0, 0, 0)
            .single()
            .expect("valid test instant");
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        let later = Utc
            .with_ymd_and_hms(2024, 7, 1, 0, 0, 0)
            .single()
            .expect("valid test instant");
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
