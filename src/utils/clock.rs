//! Process-wide monotonic clock anchor and verbose-debugging flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use lazy_static::lazy_static;

lazy_static! {
    /// Anchor instant taken the first time anyone asks for the time.
    static ref CLOCK_ANCHOR: Instant = Instant::now();
}

/// Process-wide flag gating verbose per-operation logging. Set once from
/// configuration at daemon startup, read everywhere.
static DEBUG_MODE: AtomicBool = AtomicBool::new(false);

/// Returns microseconds elapsed since the process clock anchor. Strictly
/// non-decreasing within a process.
pub fn monotonic_time() -> u64 {
    CLOCK_ANCHOR.elapsed().as_micros() as u64
}

/// Sets the process-wide verbose-debugging flag. Intended to be called once
/// during daemon initialization, before any replicator is created.
pub fn set_debug_mode(on: bool) {
    DEBUG_MODE.store(on, Ordering::SeqCst);
}

/// Reads the process-wide verbose-debugging flag.
#[inline]
pub fn debug_mode() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

#[cfg(test)]
mod clock_tests {
    use super::*;

    #[test]
    fn monotone_readings() {
        let a = monotonic_time();
        let b = monotonic_time();
        assert!(b >= a);
    }
}
