//! Millisecond clock of the stack.
//!
//! Every protocol timer (retransmission deadlines, delayed acknowledgements, arp retries,
//! `TIME-WAIT`) is an [`Instant`] plus a [`Duration`]. Layers never read a clock themselves, the
//! current instant is handed to them, so tests drive time by hand with `Instant::from_millis`.
//!
//! [`Instant`]: struct.Instant.html
//! [`Duration`]: https://doc.rust-lang.org/core/time/struct.Duration.html
use core::{fmt, ops};
use std::sync::OnceLock;
use std::time;

pub use core::time::Duration;

/// A point in time, in milliseconds after an arbitrary origin.
///
/// The origin of [`Instant::now`] is the first time the process read the clock. Values before
/// the origin are negative.
///
/// [`Instant::now`]: #method.now
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    /// Milliseconds since the origin.
    pub millis: i64,
}

/// The monotonic reading that `Instant::now` counts from.
static ORIGIN: OnceLock<time::Instant> = OnceLock::new();

impl Instant {
    /// An instant at `millis` milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// An instant at `secs` whole seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// Read the monotonic clock of the system.
    ///
    /// Stepping the wall clock does not move this reading.
    pub fn now() -> Instant {
        let origin = *ORIGIN.get_or_init(time::Instant::now);
        Instant::from_monotonic(origin, time::Instant::now())
    }

    /// Convert a reading of the monotonic clock relative to `origin`.
    pub fn from_monotonic(origin: time::Instant, reading: time::Instant) -> Instant {
        match reading.checked_duration_since(origin) {
            Some(after) => Instant::from_millis(after.as_millis() as i64),
            None => Instant::from_millis(-(origin.duration_since(reading).as_millis() as i64)),
        }
    }

    /// The milliseconds within the current second.
    pub fn millis(&self) -> i64 {
        self.millis % 1000
    }

    /// The whole seconds since the origin.
    pub fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// All milliseconds since the origin.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }

    /// The time passed since an earlier instant, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: Instant) -> Duration {
        Duration::from_millis((self.millis - earlier.millis).max(0) as u64)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.as_millis() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.millis += rhs.as_millis() as i64;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis - rhs.as_millis() as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.millis - rhs.millis).abs() as u64)
    }
}
