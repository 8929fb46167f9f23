//! The process-wide thread registry (spec section 4.2).
//!
//! Grounded on the `OnceLock<Mutex<Vec<_>>>` thread-registry pattern used for
//! exactly this kind of cross-thread bookkeeping in the wider retrieved
//! example pack (`peeps::threads`); adapted here to carry full
//! [`ThreadRecord`]s instead of just names, and to assign dense ids.
//!
//! Public API surface is exactly the three operations spec.md §4.2 names:
//! [`register`], [`lookup_by_handle`], [`for_each`]. [`mutate_by_handle`] is
//! a crate-internal addition backing finalization's scan-and-update, which
//! needs more than `lookup_by_handle`'s read-only contract provides.

use std::sync::{Mutex, MutexGuard, OnceLock};

use crate::record::ThreadRecord;

static REGISTRY: OnceLock<Mutex<Vec<ThreadRecord>>> = OnceLock::new();

fn registry() -> &'static Mutex<Vec<ThreadRecord>> {
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

fn lock() -> MutexGuard<'static, Vec<ThreadRecord>> {
    registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Appends `record` to the tail, assigning it `id = len` before insertion.
///
/// Holds the registry mutex for the whole operation, per spec invariant.
pub fn register(mut record: ThreadRecord) -> u64 {
    let mut guard = lock();
    let id = guard.len() as u64;
    record.id = id;
    guard.push(record);
    id
}

/// Pthread-handle equality, routed through `pthread_equal` rather than `==`
/// to stay correct on platforms where `pthread_t` is not a plain integer.
fn handles_equal(a: libc::pthread_t, b: libc::pthread_t) -> bool {
    unsafe { libc::pthread_equal(a, b) != 0 }
}

/// Linear scan for the first record whose handle matches `handle`; first
/// match wins. Read-only — clones the match out from under the lock.
pub fn lookup_by_handle(handle: libc::pthread_t) -> Option<ThreadRecord> {
    lock().iter().find(|r| handles_equal(r.handle, handle)).cloned()
}

/// Runs `mutate` on the first record whose handle matches `handle`, under
/// the registry lock, returning whatever `mutate` returns.
///
/// Not one of the spec's three named registry operations — an internal
/// primitive backing finalization, which needs to find *and* update a
/// record atomically with respect to concurrent registrations and report
/// emission. [`lookup_by_handle`] can't serve that role since it only
/// returns a clone.
pub(crate) fn mutate_by_handle<R>(
    handle: libc::pthread_t,
    mutate: impl FnOnce(&mut ThreadRecord) -> R,
) -> Option<R> {
    let mut guard = lock();
    guard
        .iter_mut()
        .find(|r| handles_equal(r.handle, handle))
        .map(mutate)
}

/// Walks all records head-to-tail, holding the lock for the whole traversal.
///
/// `visitor` must not call back into the registry — doing so would deadlock
/// since the mutex is not reentrant.
pub fn for_each(mut visitor: impl FnMut(&ThreadRecord)) {
    let guard = lock();
    for record in guard.iter() {
        visitor(record);
    }
}

/// Clones every record under the lock, then releases it.
///
/// Used by the report emitter so slow sink I/O never holds the registry
/// lock (see spec's Open Question on this, resolved in SPEC_FULL.md).
pub fn snapshot() -> Vec<ThreadRecord> {
    let mut out = Vec::new();
    for_each(|record| out.push(record.clone()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{GrowthDirection, ThreadKind};
    use std::time::{Instant, SystemTime};

    fn dummy(handle: libc::pthread_t) -> ThreadRecord {
        ThreadRecord {
            id: 0,
            kind: ThreadKind::Child,
            handle,
            os_tid: 0,
            stack_low: 0,
            stack_high: 0,
            guard_size: 0,
            requested_size: 0,
            actual_size: 0,
            peak_usage: 0,
            growth_direction: GrowthDirection::Down,
            entry_fn: 0,
            name: String::new(),
            started_at: Instant::now(),
            started_wall: SystemTime::now(),
            stopped_at: None,
            finalized: false,
        }
    }

    #[test]
    fn ids_are_dense_and_increasing() {
        // Each test process shares the global registry, so assert on the
        // *delta* rather than absolute ids.
        let before = lock().len() as u64;
        let id1 = register(dummy(1));
        let id2 = register(dummy(2));
        assert_eq!(id1, before);
        assert_eq!(id2, before + 1);
    }

    #[test]
    fn lookup_finds_first_match() {
        let handle = 0xdead_beef as libc::pthread_t;
        register(dummy(handle));
        let found = lookup_by_handle(handle);
        assert!(found.is_some());
    }

    #[test]
    fn lookup_misses_unknown_handle() {
        let handle = 0xfeed_face as libc::pthread_t;
        assert!(lookup_by_handle(handle).is_none());
    }

    #[test]
    fn mutate_by_handle_updates_matched_record() {
        let handle = 0x1234_5678 as libc::pthread_t;
        register(dummy(handle));
        let updated = mutate_by_handle(handle, |r| {
            r.os_tid = 42;
            r.os_tid
        });
        assert_eq!(updated, Some(42));
        assert_eq!(lookup_by_handle(handle).unwrap().os_tid, 42);
    }

    #[test]
    fn for_each_visits_every_record() {
        let before = lock().len();
        register(dummy(0x1111 as libc::pthread_t));
        register(dummy(0x2222 as libc::pthread_t));
        let mut count = 0;
        for_each(|_| count += 1);
        assert_eq!(count, before + 2);
    }
}
