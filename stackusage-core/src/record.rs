//! The per-thread data model (spec section 3).

use std::time::{Instant, SystemTime};

/// Whether a record describes the process's main thread or a spawned child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadKind {
    Main,
    Child,
}

/// Which way the stack grows on this architecture/ABI, determined at
/// runtime by [`crate::fingerprint::probe_growth_direction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowthDirection {
    Up,
    Down,
}

/// One observed thread, from registration through finalization.
///
/// Addresses are stored as `usize`, never as live pointers: a stack address
/// belonging to another thread must never be dereferenced from outside that
/// thread (see [`crate::fingerprint`]).
#[derive(Debug, Clone)]
pub struct ThreadRecord {
    pub id: u64,
    pub kind: ThreadKind,
    pub handle: libc::pthread_t,
    pub os_tid: i32,
    pub stack_low: usize,
    pub stack_high: usize,
    pub guard_size: usize,
    pub requested_size: usize,
    pub actual_size: usize,
    pub peak_usage: usize,
    pub growth_direction: GrowthDirection,
    pub entry_fn: usize,
    pub name: String,
    pub started_at: Instant,
    pub started_wall: SystemTime,
    pub stopped_at: Option<Instant>,
    pub finalized: bool,
}

impl ThreadRecord {
    /// Whole-second duration between registration and finalization.
    ///
    /// Returns 0 for a thread that has not yet finalized.
    pub fn duration_secs(&self) -> u64 {
        match self.stopped_at {
            Some(stop) => stop.saturating_duration_since(self.started_at).as_secs(),
            None => 0,
        }
    }

    /// `floor(peak_usage * 100 / requested_size)`, 0 if `requested_size` is 0.
    pub fn usage_percent(&self) -> u64 {
        usage_percent(self.peak_usage, self.requested_size)
    }
}

/// Pure percent calculation, split out so it can be unit tested without any
/// of the process-global machinery.
pub fn usage_percent(peak_usage: usize, requested_size: usize) -> u64 {
    if requested_size == 0 {
        0
    } else {
        (peak_usage as u128 * 100 / requested_size as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_zero_requested_is_zero() {
        assert_eq!(usage_percent(12345, 0), 0);
    }

    #[test]
    fn percent_floors() {
        // 150 / 200 = 75%, but 199/200 should floor to 99%, not round to 100%.
        assert_eq!(usage_percent(150, 200), 75);
        assert_eq!(usage_percent(199, 200), 99);
    }

    #[test]
    fn percent_full_usage() {
        assert_eq!(usage_percent(8192, 8192), 100);
    }
}
