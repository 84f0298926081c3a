//! The single mutable source of truth for seat statuses and class selections.
//!
//! Every mutation goes through one of three entry points:
//!
//! - [`SeatRegistry::transition`]: validated status changes
//! - [`SeatRegistry::apply_plan`]: an allocation plan (release plus claim)
//! - [`SeatRegistry::overwrite`]: privileged changes from reconciliation and
//!   rollback, where remote state wins
//!
//! Each call is all-or-nothing. A call that changes anything bumps the
//! revision and notifies every observer exactly once with the full change
//! set.

use crate::contiguity::is_contiguous;
use crate::error::Rejection;
use crate::planner::Plan;
use crate::seat_map::SeatMap;
use crate::types::{Block, ClassId, SeatId, SeatKey, SeatStatus};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Change notifications
// ============================================================================

/// One seat's status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatChange {
    /// Seat that changed
    pub seat: SeatId,
    /// Status before
    pub from: SeatStatus,
    /// Status after
    pub to: SeatStatus,
}

/// Every change committed by one registry mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatChangeSet {
    /// Registry revision after the mutation
    pub revision: u64,
    /// Changes in seat order
    pub changes: Vec<SeatChange>,
}

/// Receives a change set after every committed mutation.
///
/// Observers run synchronously inside the mutation and must not block.
pub trait RegistryObserver: Send + Sync {
    /// Called once per committed mutation
    fn seats_changed(&self, changes: &SeatChangeSet);
}

/// Handle returned by [`SeatRegistry::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ============================================================================
// Registry
// ============================================================================

/// Seat statuses and per-class selections
#[derive(Clone)]
pub struct SeatRegistry {
    map: Arc<SeatMap>,
    statuses: BTreeMap<SeatKey, SeatStatus>,
    selections: BTreeMap<ClassId, Block>,
    fragmented: BTreeSet<ClassId>,
    revision: u64,
    observers: Vec<(SubscriptionId, Arc<dyn RegistryObserver>)>,
    next_subscription: u64,
}

impl fmt::Debug for SeatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeatRegistry")
            .field("seats", &self.statuses.len())
            .field("selections", &self.selections)
            .field("revision", &self.revision)
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl SeatRegistry {
    /// Create a registry for `map`: every seat AVAILABLE except the seats the
    /// layout withdraws from sale, which start BLOCKED.
    #[must_use]
    pub fn new(map: Arc<SeatMap>) -> Self {
        let statuses = map
            .seat_keys()
            .map(|key| {
                let status = if map.is_statically_blocked(key) {
                    SeatStatus::Blocked
                } else {
                    SeatStatus::Available
                };
                (key, status)
            })
            .collect();

        Self {
            map,
            statuses,
            selections: BTreeMap::new(),
            fragmented: BTreeSet::new(),
            revision: 0,
            observers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// The seat map this registry tracks
    #[must_use]
    pub fn map(&self) -> &SeatMap {
        &self.map
    }

    /// Number of committed mutations so far
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Status of the seat at `key`
    #[must_use]
    pub fn status(&self, key: SeatKey) -> Option<SeatStatus> {
        self.statuses.get(&key).copied()
    }

    /// Status of the seat `id`
    #[must_use]
    pub fn status_of(&self, id: &SeatId) -> Option<SeatStatus> {
        self.map.locate(id).and_then(|key| self.status(key))
    }

    /// Whether the seat at `key` is AVAILABLE
    #[must_use]
    pub fn is_available(&self, key: SeatKey) -> bool {
        self.status(key) == Some(SeatStatus::Available)
    }

    /// Every seat with its status, in seat order
    pub fn seats(&self) -> impl Iterator<Item = (SeatKey, SeatStatus)> + '_ {
        self.statuses.iter().map(|(key, status)| (*key, *status))
    }

    /// Current selection of `class`
    #[must_use]
    pub fn selection(&self, class: &ClassId) -> Option<&Block> {
        self.selections.get(class)
    }

    /// Every non-empty selection, by class
    pub fn selections(&self) -> impl Iterator<Item = (&ClassId, &Block)> {
        self.selections.iter()
    }

    /// Number of SELECTED seats in `class`
    #[must_use]
    pub fn selected_count(&self, class: &ClassId) -> usize {
        self.selected_keys(class).len()
    }

    /// Total SELECTED seats across all classes
    #[must_use]
    pub fn total_selected(&self) -> usize {
        self.statuses
            .values()
            .filter(|status| **status == SeatStatus::Selected)
            .count()
    }

    /// Number of AVAILABLE seats in `class`
    #[must_use]
    pub fn available_in(&self, class: &ClassId) -> usize {
        self.map
            .rows_of(class)
            .flat_map(|(index, row)| row.seats().iter().map(move |&n| SeatKey::new(index, n)))
            .filter(|key| self.is_available(*key))
            .count()
    }

    /// SELECTED seats of `class`, row by row in slot order
    #[must_use]
    pub fn selected_keys(&self, class: &ClassId) -> Vec<SeatKey> {
        self.map
            .rows_of(class)
            .flat_map(|(index, row)| row.seats().iter().map(move |&n| SeatKey::new(index, n)))
            .filter(|key| self.status(*key) == Some(SeatStatus::Selected))
            .collect()
    }

    /// Classes whose SELECTED seats no longer form one contiguous block
    #[must_use]
    pub const fn fragmented_classes(&self) -> &BTreeSet<ClassId> {
        &self.fragmented
    }

    /// Add an observer, notified after every committed mutation
    pub fn subscribe(&mut self, observer: Arc<dyn RegistryObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, observer));
        id
    }

    /// Remove an observer; returns whether it was subscribed
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Apply validated status changes as one mutation.
    ///
    /// Every change is checked against the status rules before anything is
    /// written; the first disallowed change rejects the whole call. Changes to
    /// the status a seat already has are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::UnknownSeat`] for keys outside the map and
    /// [`Rejection::DisallowedTransition`] for forbidden changes.
    pub fn transition(
        &mut self,
        changes: &[(SeatKey, SeatStatus)],
        bms_mode: bool,
    ) -> Result<Option<SeatChangeSet>, Rejection> {
        let mut pending = Vec::with_capacity(changes.len());
        for &(key, to) in changes {
            let from = self.checked_status(key)?;
            if from == to {
                continue;
            }
            if !from.can_transition_to(to, bms_mode) {
                return Err(Rejection::DisallowedTransition {
                    seat: self.id_or_placeholder(key),
                    from,
                    to,
                });
            }
            pending.push((key, from, to));
        }
        Ok(self.commit(pending))
    }

    /// Apply an allocation plan: release then claim, as one mutation.
    ///
    /// Released seats must be SELECTED and claimed seats AVAILABLE.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] (and changes nothing) if any seat is in the
    /// wrong state.
    pub fn apply_plan(&mut self, plan: &Plan) -> Result<Option<SeatChangeSet>, Rejection> {
        let changes: Vec<(SeatKey, SeatStatus)> = plan
            .release
            .iter()
            .map(|&key| (key, SeatStatus::Available))
            .chain(plan.claim.iter().map(|&key| (key, SeatStatus::Selected)))
            .collect();

        for &(key, to) in &changes {
            let from = self.checked_status(key)?;
            let expected = match to {
                SeatStatus::Available => SeatStatus::Selected,
                _ => SeatStatus::Available,
            };
            if from != expected {
                return Err(Rejection::DisallowedTransition {
                    seat: self.id_or_placeholder(key),
                    from,
                    to,
                });
            }
        }
        self.transition(&changes, false)
    }

    /// Write statuses without transition checks (remote wins).
    ///
    /// Seats withdrawn from sale by the layout and keys outside the map are
    /// skipped.
    pub fn overwrite(&mut self, changes: &[(SeatKey, SeatStatus)]) -> Option<SeatChangeSet> {
        let pending: Vec<_> = changes
            .iter()
            .filter(|(key, _)| !self.map.is_statically_blocked(*key))
            .filter_map(|&(key, to)| {
                let from = self.status(key)?;
                (from != to).then_some((key, from, to))
            })
            .collect();
        self.commit(pending)
    }

    fn checked_status(&self, key: SeatKey) -> Result<SeatStatus, Rejection> {
        self.status(key)
            .ok_or_else(|| Rejection::UnknownSeat(self.id_or_placeholder(key)))
    }

    fn id_or_placeholder(&self, key: SeatKey) -> SeatId {
        self.map
            .seat_id(key)
            .unwrap_or_else(|| SeatId::from(format!("#{}-{}", key.row, key.number).as_str()))
    }

    fn commit(&mut self, pending: Vec<(SeatKey, SeatStatus, SeatStatus)>) -> Option<SeatChangeSet> {
        if pending.is_empty() {
            return None;
        }

        let mut touched = BTreeSet::new();
        let mut changes = Vec::with_capacity(pending.len());
        for (key, from, to) in pending {
            self.statuses.insert(key, to);
            if let Some(row) = self.map.row(key.row) {
                touched.insert(row.class().clone());
                changes.push(SeatChange {
                    seat: row.seat_id(key.number),
                    from,
                    to,
                });
            }
        }

        for class in touched {
            self.refresh_selection(class);
        }

        self.revision += 1;
        let change_set = SeatChangeSet {
            revision: self.revision,
            changes,
        };
        tracing::trace!(
            revision = self.revision,
            changes = change_set.changes.len(),
            "Registry mutation committed"
        );
        for (_, observer) in &self.observers {
            observer.seats_changed(&change_set);
        }
        Some(change_set)
    }

    fn refresh_selection(&mut self, class: ClassId) {
        let keys = self.selected_keys(&class);
        let Some(first) = keys.first() else {
            self.selections.remove(&class);
            self.fragmented.remove(&class);
            return;
        };

        let row_index = first.row;
        let numbers: Vec<_> = keys.iter().map(|key| key.number).collect();
        let single_row = keys.iter().all(|key| key.row == row_index);
        let contiguous = single_row
            && self
                .map
                .row(row_index)
                .is_some_and(|row| is_contiguous(row, &numbers));

        if contiguous {
            self.selections.insert(class.clone(), Block::new(row_index, numbers));
            self.fragmented.remove(&class);
        } else {
            tracing::warn!(class = %class, seats = keys.len(), "Selection is no longer contiguous");
            self.selections.remove(&class);
            self.fragmented.insert(class);
        }
    }
}
