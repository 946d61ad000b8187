//! Engine time: a seconds-based timestamp and the clock abstraction.
//!
//! Every timer predicate in this crate takes `now` explicitly, so the core
//! never reads wall-clock time on its own. The runtime injects a
//! [`SystemClock`]; tests drive a [`ManualClock`].

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// Seconds on the engine clock. Plain `f64` arithmetic with spans in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0.0);

    pub fn secs(self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier`. Negative when `earlier` is in the future.
    pub fn since(self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

impl std::ops::Add<f64> for Timestamp {
    type Output = Timestamp;

    fn add(self, secs: f64) -> Timestamp {
        Timestamp(self.0 + secs)
    }
}

impl std::ops::Sub<f64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, secs: f64) -> Timestamp {
        Timestamp(self.0 - secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Source of the current engine time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Monotonic clock anchored at construction time.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_secs_f64())
    }
}

/// Settable clock for deterministic tests.
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, secs: f64) {
        let mut guard = self.now.lock().unwrap();
        *guard = *guard + secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Timestamp(10.0));
        assert_eq!(clock.now().secs(), 10.0);
        clock.advance(2.5);
        assert_eq!(clock.now().secs(), 12.5);
        clock.set(Timestamp(1.0));
        assert_eq!(clock.now().secs(), 1.0);
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp(5.0);
        assert_eq!((t + 1.5).secs(), 6.5);
        assert_eq!((t - 5.0).secs(), 0.0);
        assert_eq!(Timestamp(8.0).since(t), 3.0);
    }
}
