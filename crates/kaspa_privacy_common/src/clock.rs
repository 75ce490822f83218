//! A small seam over wall-clock time so monitors and their tests can agree on
//! "now" without sleeping, mirroring the teacher's `common::now_ms` free
//! function but made injectable via a trait so tests can fast-forward.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// The real wall clock, used by the daemon binary and by default in engine
/// constructors.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the unix epoch")
            .as_millis() as u64
    }
}

/// A clock tests can move forward deterministically, e.g. to assert that the
/// intermediate payout delay (spec.md §4.2) has elapsed without sleeping.
#[derive(Debug, Default)]
pub struct TestClock(AtomicU64);

impl TestClock {
    pub fn new(start_ms: u64) -> Self { TestClock(AtomicU64::new(start_ms)) }

    pub fn advance_ms(&self, delta_ms: u64) { self.0.fetch_add(delta_ms, Ordering::SeqCst); }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 { self.0.load(Ordering::SeqCst) }
}
