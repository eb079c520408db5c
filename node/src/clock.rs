//! Monotonic microsecond clock shared by the engine and the
//! application attached to it.

use {once_cell::sync::Lazy, std::time::Instant};

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Microseconds since a process-wide epoch. Monotonic: tolerant of
/// wall-clock skew and immune to the second-boundary wraparound that
/// plagues time-of-day microsecond fields. Ping timestamps and the
/// RTTs computed from them both come from here.
pub fn now_micros() -> u64 {
  EPOCH.elapsed().as_micros() as u64
}
