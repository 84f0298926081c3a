//! Buffering of optimistic status writes destined for the booking service.
//!
//! Writes are keyed by seat, last write wins. The batcher never talks to the
//! service itself: it tells the reducer which timer to (re)schedule and hands
//! out [`FlushBatch`]es, and the reducer turns those into effects.
//!
//! Triggers:
//! - every write restarts the debounce timer, until the buffer reaches the
//!   batch threshold; from then on a grace timer runs that later writes do
//!   not push back
//! - [`SyncBatcher::drain`] flushes everything at teardown
//!
//! At most one flush is in flight. Writes made meanwhile form the next
//! generation, scheduled by the same rules once the flight resolves.

use crate::types::{SeatId, SeatStatus};
use std::collections::BTreeMap;

/// A buffered write: the status to persist and the status before the first
/// buffered change (used for rollback)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSyncEntry {
    /// Status to persist
    pub desired: SeatStatus,
    /// Status to restore if the write fails
    pub previous: SeatStatus,
}

/// Timer the reducer should (re)schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTimer {
    /// Quiet-period timer, restarted by every write
    Debounce {
        /// Token the timer action must carry
        token: u64,
    },
    /// Short timer forced by a full buffer
    Grace {
        /// Token the timer action must carry
        token: u64,
    },
}

impl FlushTimer {
    /// Token the timer action must carry
    #[must_use]
    pub const fn token(self) -> u64 {
        match self {
            Self::Debounce { token } | Self::Grace { token } => token,
        }
    }
}

/// One flush: a remote call per status group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushBatch {
    /// Generation the groups belong to
    pub generation: u64,
    /// Seats grouped by the status to persist, in status order
    pub groups: Vec<(SeatStatus, Vec<SeatId>)>,
}

impl FlushBatch {
    /// Total seats in the batch
    #[must_use]
    pub fn seat_count(&self) -> usize {
        self.groups.iter().map(|(_, seats)| seats.len()).sum()
    }
}

/// A seat to restore after a failed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollback {
    /// Seat to restore
    pub seat: SeatId,
    /// Status the failed write tried to persist
    pub expected: SeatStatus,
    /// Status to restore
    pub restore: SeatStatus,
}

/// What happens after a flight resolves
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NextFlush {
    /// Nothing is buffered, or other groups are still in flight
    #[default]
    Idle,
    /// Schedule this timer for the buffered writes
    Schedule(FlushTimer),
    /// Flush immediately (teardown was requested mid-flight)
    Now(FlushBatch),
}

/// Outcome of one group's remote call
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolution {
    /// Seats to restore in the registry
    pub rollbacks: Vec<Rollback>,
    /// Follow-up for the next generation
    pub next: NextFlush,
}

#[derive(Debug, Clone)]
struct InFlight {
    generation: u64,
    groups: BTreeMap<SeatStatus, BTreeMap<SeatId, PendingSyncEntry>>,
}

/// Write buffer with debounce, grace and single-flight rules
#[derive(Debug, Clone)]
pub struct SyncBatcher {
    threshold: usize,
    buffer: BTreeMap<SeatId, PendingSyncEntry>,
    in_flight: Option<InFlight>,
    timer: Option<FlushTimer>,
    next_token: u64,
    next_generation: u64,
    drain_on_resolve: bool,
}

impl SyncBatcher {
    /// Create a batcher that switches to the grace timer at `threshold`
    /// buffered writes
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self {
            threshold,
            buffer: BTreeMap::new(),
            in_flight: None,
            timer: None,
            next_token: 0,
            next_generation: 0,
            drain_on_resolve: false,
        }
    }

    /// Buffer a write of `desired` for `seat`, whose status before the change
    /// was `previous`.
    ///
    /// Returns the timer to schedule, if it changes.
    pub fn queue(&mut self, seat: SeatId, previous: SeatStatus, desired: SeatStatus) -> Option<FlushTimer> {
        self.buffer
            .entry(seat)
            .and_modify(|entry| entry.desired = desired)
            .or_insert(PendingSyncEntry { desired, previous });

        if self.in_flight.is_some() {
            return None;
        }
        self.arm()
    }

    fn arm(&mut self) -> Option<FlushTimer> {
        if matches!(self.timer, Some(FlushTimer::Grace { .. })) {
            return None;
        }
        self.next_token += 1;
        let token = self.next_token;
        let timer = if self.buffer.len() >= self.threshold {
            FlushTimer::Grace { token }
        } else {
            FlushTimer::Debounce { token }
        };
        self.timer = Some(timer);
        Some(timer)
    }

    /// A flush timer fired. Stale tokens are ignored.
    pub fn timer_fired(&mut self, token: u64) -> Option<FlushBatch> {
        if self.timer.map(FlushTimer::token) != Some(token) {
            tracing::trace!(token, "Ignoring stale flush timer");
            return None;
        }
        self.timer = None;
        if self.in_flight.is_some() {
            return None;
        }
        self.take()
    }

    fn take(&mut self) -> Option<FlushBatch> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut groups: BTreeMap<SeatStatus, BTreeMap<SeatId, PendingSyncEntry>> = BTreeMap::new();
        for (seat, entry) in std::mem::take(&mut self.buffer) {
            groups.entry(entry.desired).or_default().insert(seat, entry);
        }

        self.next_generation += 1;
        let batch = FlushBatch {
            generation: self.next_generation,
            groups: groups
                .iter()
                .map(|(status, seats)| (*status, seats.keys().cloned().collect()))
                .collect(),
        };
        self.in_flight = Some(InFlight {
            generation: self.next_generation,
            groups,
        });
        Some(batch)
    }

    /// Record the outcome of the call for `status` in flight `generation`.
    ///
    /// On failure every seat of the group is rolled back, except seats that
    /// were written again since; their buffered entry inherits the
    /// pre-flight status instead.
    pub fn resolve(&mut self, generation: u64, status: SeatStatus, succeeded: bool) -> Resolution {
        let Some(flight) = self
            .in_flight
            .as_mut()
            .filter(|flight| flight.generation == generation)
        else {
            tracing::debug!(generation, "Ignoring result for a flush no longer in flight");
            return Resolution::default();
        };

        let group = flight.groups.remove(&status).unwrap_or_default();
        let flight_done = flight.groups.is_empty();

        let mut rollbacks = Vec::new();
        if !succeeded {
            for (seat, entry) in group {
                if let Some(newer) = self.buffer.get_mut(&seat) {
                    newer.previous = entry.previous;
                } else {
                    rollbacks.push(Rollback {
                        seat,
                        expected: entry.desired,
                        restore: entry.previous,
                    });
                }
            }
        }

        if !flight_done {
            return Resolution {
                rollbacks,
                next: NextFlush::Idle,
            };
        }

        self.in_flight = None;
        let next = if self.buffer.is_empty() {
            self.drain_on_resolve = false;
            NextFlush::Idle
        } else if self.drain_on_resolve {
            self.drain_on_resolve = false;
            self.take().map_or(NextFlush::Idle, NextFlush::Now)
        } else {
            self.arm().map_or(NextFlush::Idle, NextFlush::Schedule)
        };
        Resolution { rollbacks, next }
    }

    /// Flush everything now, regardless of timers.
    ///
    /// While a flight is in progress the buffer is flushed as soon as it
    /// resolves instead.
    pub fn drain(&mut self) -> Option<FlushBatch> {
        self.timer = None;
        if self.in_flight.is_some() {
            self.drain_on_resolve = !self.buffer.is_empty();
            return None;
        }
        self.take()
    }

    /// Forget the timer; buffered writes stay for the next trigger
    pub fn cancel_timer(&mut self) {
        self.timer = None;
    }

    /// Drop buffered and in-flight writes for `seats` (persisted another way)
    pub fn drop_seats<'a, I>(&mut self, seats: I)
    where
        I: IntoIterator<Item = &'a SeatId>,
    {
        for seat in seats {
            self.buffer.remove(seat);
            if let Some(flight) = self.in_flight.as_mut() {
                for group in flight.groups.values_mut() {
                    group.remove(seat);
                }
            }
        }
    }

    /// Whether `seat` has a buffered or in-flight write
    #[must_use]
    pub fn is_pending(&self, seat: &SeatId) -> bool {
        self.buffer.contains_key(seat)
            || self
                .in_flight
                .as_ref()
                .is_some_and(|flight| flight.groups.values().any(|group| group.contains_key(seat)))
    }

    /// Buffered write for `seat`
    #[must_use]
    pub fn pending(&self, seat: &SeatId) -> Option<&PendingSyncEntry> {
        self.buffer.get(seat)
    }

    /// Buffered writes
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a flush is in flight
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The timer currently expected to fire
    #[must_use]
    pub const fn timer(&self) -> Option<FlushTimer> {
        self.timer
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::SeatStatus::{Available, BmsBooked, Selected};
    use proptest::prelude::*;

    fn seat(n: u16) -> SeatId {
        SeatId::new("SC-A", n)
    }

    #[test]
    fn writes_restart_debounce_until_threshold() {
        let mut batcher = SyncBatcher::new(3);

        let first = batcher.queue(seat(1), Available, Selected).unwrap();
        let second = batcher.queue(seat(2), Available, Selected).unwrap();
        assert!(matches!(first, FlushTimer::Debounce { .. }));
        assert!(matches!(second, FlushTimer::Debounce { .. }));
        assert_ne!(first.token(), second.token());

        let grace = batcher.queue(seat(3), Available, Selected).unwrap();
        assert!(matches!(grace, FlushTimer::Grace { .. }));
        // Later writes do not push the grace flush out.
        assert_eq!(batcher.queue(seat(4), Available, Selected), None);

        assert_eq!(batcher.timer_fired(first.token()), None);
        let batch = batcher.timer_fired(grace.token()).unwrap();
        assert_eq!(batch.seat_count(), 4);
    }

    #[test]
    fn last_write_wins_and_keeps_first_previous() {
        let mut batcher = SyncBatcher::new(20);
        batcher.queue(seat(1), Available, BmsBooked);
        let timer = batcher.queue(seat(1), BmsBooked, Available).unwrap();

        assert_eq!(
            batcher.pending(&seat(1)),
            Some(&PendingSyncEntry {
                desired: Available,
                previous: Available,
            })
        );
        let batch = batcher.timer_fired(timer.token()).unwrap();
        assert_eq!(batch.groups, vec![(Available, vec![seat(1)])]);
    }

    #[test]
    fn flush_groups_by_status() {
        let mut batcher = SyncBatcher::new(20);
        batcher.queue(seat(1), Available, Selected);
        batcher.queue(seat(2), Available, BmsBooked);
        let timer = batcher.queue(seat(3), Available, Selected).unwrap();

        let batch = batcher.timer_fired(timer.token()).unwrap();
        assert_eq!(
            batch.groups,
            vec![
                (Selected, vec![seat(1), seat(3)]),
                (BmsBooked, vec![seat(2)]),
            ]
        );
        assert!(batcher.in_flight());
        assert!(batcher.is_pending(&seat(2)));
    }

    #[test]
    fn failed_group_rolls_back_unless_rewritten() {
        let mut batcher = SyncBatcher::new(20);
        batcher.queue(seat(1), Available, Selected);
        let timer = batcher.queue(seat(2), Available, Selected).unwrap();
        let batch = batcher.timer_fired(timer.token()).unwrap();

        // Written again while the flight is out: no new timer yet.
        assert_eq!(batcher.queue(seat(2), Selected, Available), None);

        let resolution = batcher.resolve(batch.generation, Selected, false);
        assert_eq!(
            resolution.rollbacks,
            vec![Rollback {
                seat: seat(1),
                expected: Selected,
                restore: Available,
            }]
        );
        assert_eq!(batcher.pending(&seat(2)).unwrap().previous, Available);
        assert!(matches!(resolution.next, NextFlush::Schedule(FlushTimer::Debounce { .. })));
        assert!(!batcher.in_flight());
    }

    #[test]
    fn flight_resolves_after_every_group() {
        let mut batcher = SyncBatcher::new(20);
        batcher.queue(seat(1), Available, Selected);
        let timer = batcher.queue(seat(2), Available, BmsBooked).unwrap();
        let batch = batcher.timer_fired(timer.token()).unwrap();

        assert_eq!(batcher.resolve(batch.generation, Selected, true), Resolution::default());
        assert!(batcher.in_flight());
        assert_eq!(batcher.resolve(batch.generation, BmsBooked, true), Resolution::default());
        assert!(!batcher.in_flight());
        assert!(batcher.is_empty());
        assert_eq!(batcher.resolve(batch.generation, Selected, false), Resolution::default());
    }

    #[test]
    fn cancelling_the_timer_keeps_the_buffer() {
        let mut batcher = SyncBatcher::new(20);
        let timer = batcher.queue(seat(1), Available, Selected).unwrap();
        batcher.cancel_timer();

        assert_eq!(batcher.timer_fired(timer.token()), None);
        assert_eq!(batcher.len(), 1);
        assert_eq!(batcher.drain().unwrap().seat_count(), 1);
    }

    #[test]
    fn drain_mid_flight_flushes_on_resolve() {
        let mut batcher = SyncBatcher::new(20);
        let timer = batcher.queue(seat(1), Available, Selected).unwrap();
        let batch = batcher.timer_fired(timer.token()).unwrap();
        batcher.queue(seat(2), Available, Selected);

        assert_eq!(batcher.drain(), None);
        let resolution = batcher.resolve(batch.generation, Selected, true);
        match resolution.next {
            NextFlush::Now(next) => assert_eq!(next.groups, vec![(Selected, vec![seat(2)])]),
            other => panic!("expected an immediate flush, got {other:?}"),
        }
    }

    #[test]
    fn dropped_seats_are_neither_flushed_nor_rolled_back() {
        let mut batcher = SyncBatcher::new(20);
        let timer = batcher.queue(seat(1), Available, Selected).unwrap();
        let batch = batcher.timer_fired(timer.token()).unwrap();
        batcher.queue(seat(2), Available, Selected);

        batcher.drop_seats([&seat(1), &seat(2)]);

        assert!(!batcher.is_pending(&seat(1)));
        assert!(batcher.is_empty());
        let resolution = batcher.resolve(batch.generation, Selected, false);
        assert!(resolution.rollbacks.is_empty());
        assert_eq!(resolution.next, NextFlush::Idle);
    }

    proptest! {
        #[test]
        fn only_the_final_write_per_seat_is_flushed(
            writes in proptest::collection::vec((1u16..6, any::<bool>()), 1..40),
        ) {
            let mut batcher = SyncBatcher::new(100);
            let mut last = BTreeMap::new();
            let mut timer = None;
            for (n, mark) in &writes {
                let desired = if *mark { BmsBooked } else { Available };
                if let Some(t) = batcher.queue(seat(*n), Available, desired) {
                    timer = Some(t);
                }
                last.insert(seat(*n), desired);
            }

            let batch = batcher.timer_fired(timer.unwrap().token()).unwrap();
            prop_assert_eq!(batch.seat_count(), last.len());
            for (status, seats) in batch.groups {
                for s in seats {
                    prop_assert_eq!(last.get(&s), Some(&status));
                }
            }
        }
    }
}
