//! Keyed timer table.
//!
//! Each [`TimerId`] maps to at most one pending timer. An entry is reserved
//! before its task is spawned, so a timer that fires immediately still finds
//! itself in the table.

use box_office_core::effect::TimerId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;

struct TimerEntry {
    generation: u64,
    handle: Option<AbortHandle>,
}

#[derive(Default)]
pub(crate) struct TimerTable {
    entries: Mutex<HashMap<TimerId, TimerEntry>>,
    generations: AtomicU64,
}

impl TimerTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<TimerId, TimerEntry>> {
        // Entries stay consistent even if a holder panicked mid-update.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve `id` for `generation`, aborting any timer already pending
    /// under it. Returns `true` if one was replaced.
    pub(crate) fn reserve(&self, id: TimerId, generation: u64) -> bool {
        let previous = self.lock().insert(
            id,
            TimerEntry {
                generation,
                handle: None,
            },
        );
        previous.is_some_and(|entry| {
            if let Some(handle) = entry.handle {
                handle.abort();
            }
            true
        })
    }

    /// Attach the spawned task to its reservation.
    pub(crate) fn attach(&self, id: TimerId, generation: u64, handle: AbortHandle) {
        if let Some(entry) = self.lock().get_mut(&id) {
            if entry.generation == generation {
                entry.handle = Some(handle);
            }
        }
    }

    /// Called by a timer task when its sleep elapses. Returns `true` if the
    /// timer is still current and its action should be delivered.
    pub(crate) fn complete(&self, id: TimerId, generation: u64) -> bool {
        let mut entries = self.lock();
        match entries.get(&id) {
            Some(entry) if entry.generation == generation => {
                entries.remove(&id);
                true
            },
            _ => false,
        }
    }

    /// Abort the pending timer for `id`. Returns `true` if one was pending.
    pub(crate) fn cancel(&self, id: TimerId) -> bool {
        self.lock().remove(&id).is_some_and(|entry| {
            if let Some(handle) = entry.handle {
                handle.abort();
            }
            true
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLUSH: TimerId = TimerId::new("sync.flush");

    #[test]
    fn stale_generation_does_not_complete() {
        let table = TimerTable::default();
        let first = table.next_generation();
        assert!(!table.reserve(FLUSH, first));

        let second = table.next_generation();
        assert!(table.reserve(FLUSH, second));

        assert!(!table.complete(FLUSH, first));
        assert!(table.complete(FLUSH, second));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn cancel_removes_reservation() {
        let table = TimerTable::default();
        let generation = table.next_generation();
        table.reserve(FLUSH, generation);

        assert!(table.cancel(FLUSH));
        assert!(!table.cancel(FLUSH));
        assert!(!table.complete(FLUSH, generation));
    }
}
