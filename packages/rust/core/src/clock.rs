//! Time source for enrichment.
//!
//! [`SystemClock`] never hands out the same millisecond twice, so two records
//! enriched back-to-back with the same id still get distinct `(id, timestamp)`
//! keys. [`FixedClock`] makes enrichment reproducible in tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Millisecond clock read once per enriched record.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock with a monotonic tiebreaker.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// Clock that returns a set value until told otherwise.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: i64) {
        self.millis.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_strictly_increasing() {
        let clock = SystemClock::new();
        let mut prev = clock.now_millis();
        for _ in 0..10_000 {
            let next = clock.now_millis();
            assert!(next > prev, "{next} should be greater than {prev}");
            prev = next;
        }
    }

    #[test]
    fn system_clock_tracks_wall_time() {
        let before = Utc::now().timestamp_millis();
        let reading = SystemClock::new().now_millis();
        assert!(reading >= before);
        assert!(reading - before < 60_000);
    }

    #[test]
    fn fixed_clock_only_moves_when_told() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        assert_eq!(clock.now_millis(), 1_000);
        clock.advance(5);
        assert_eq!(clock.now_millis(), 1_005);
        clock.set(42);
        assert_eq!(clock.now_millis(), 42);
    }
}
