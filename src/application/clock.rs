//! Wall-clock capability injected into repositories and engines.

use std::sync::atomic::{AtomicI64, Ordering};

use time::{Duration, OffsetDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// Current time truncated to whole seconds, the resolution of every index.
    fn unix_now(&self) -> i64 {
        self.now().unix_timestamp()
    }

    fn now_truncated(&self) -> OffsetDateTime {
        let now = self.now();
        now - Duration::nanoseconds(now.nanosecond().into())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    seconds: AtomicI64,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            seconds: AtomicI64::new(start.unix_timestamp()),
        }
    }

    pub fn at_unix(seconds: i64) -> Self {
        Self {
            seconds: AtomicI64::new(seconds),
        }
    }

    pub fn set(&self, at: OffsetDateTime) {
        self.seconds.store(at.unix_timestamp(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.seconds.fetch_add(by.whole_seconds(), Ordering::SeqCst);
    }

    pub fn rewind(&self, by: Duration) {
        self.seconds.fetch_sub(by.whole_seconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        let seconds = self.seconds.load(Ordering::SeqCst);
        OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    fn unix_now(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::at_unix(1_000);
        assert_eq!(clock.unix_now(), 1_000);

        clock.advance(Duration::minutes(2));
        assert_eq!(clock.unix_now(), 1_120);

        clock.rewind(Duration::seconds(20));
        assert_eq!(clock.now().unix_timestamp(), 1_100);
    }
}
