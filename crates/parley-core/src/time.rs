//! Clock effect interface.
//!
//! Every `now` in the system flows through [`Clock`], so the ledger and the
//! token mint are deterministic under test. [`SystemClock`] is the
//! production handler; [`ManualClock`] is the controllable one.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_unixtime(&self) -> i64;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_unixtime(&self) -> i64 {
        (**self).now_unixtime()
    }
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unixtime(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            // Pre-epoch system clocks only occur on badly misconfigured
            // hosts; saturate rather than panic.
            Err(_) => 0,
        }
    }
}

/// A clock tests can freeze and advance.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_unixtime: i64) -> Self {
        Self {
            now: AtomicI64::new(now_unixtime),
        }
    }

    pub fn set(&self, now_unixtime: i64) {
        self.now.store(now_unixtime, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unixtime(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now_unixtime(), 1000);
        clock.advance(60);
        assert_eq!(clock.now_unixtime(), 1060);
        clock.set(5);
        assert_eq!(clock.now_unixtime(), 5);
    }

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now_unixtime() > 1_577_836_800);
    }
}
