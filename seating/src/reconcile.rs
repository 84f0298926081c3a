//! Merging a remote [`SeatStatusSnapshot`] into local state.
//!
//! Remote state wins, with three exceptions: seats the layout withdraws from
//! sale, seats with a write still buffered or in flight, and this client's own
//! selections showing up in the remote selected list.
//!
//! If a locally selected seat turns out to be sold, the whole selection of its
//! class is released so the patron starts over with a consistent block.

use crate::registry::SeatRegistry;
use crate::service::SeatStatusSnapshot;
use crate::types::{ClassId, SeatId, SeatKey, SeatStatus};
use std::collections::{BTreeMap, BTreeSet};

/// Changes one snapshot implies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Status writes, for [`SeatRegistry::overwrite`]
    pub overwrites: Vec<(SeatKey, SeatStatus)>,
    /// Classes whose selection was lost to a remote sale
    pub lost_classes: BTreeSet<ClassId>,
    /// Selected seats released because their class was lost, to persist as
    /// AVAILABLE
    pub released: Vec<SeatId>,
    /// Snapshot ids that name no seat of the map
    pub unknown: Vec<SeatId>,
    /// Seats left alone because a local write is pending
    pub skipped_pending: usize,
}

impl ReconcilePlan {
    /// Whether the snapshot changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overwrites.is_empty()
    }
}

/// Work out what `snapshot` changes in `registry`.
///
/// `is_pending` reports seats with a local write not yet confirmed; those keep
/// their local status.
pub fn plan_reconciliation<F>(registry: &SeatRegistry, snapshot: &SeatStatusSnapshot, is_pending: F) -> ReconcilePlan
where
    F: Fn(&SeatId) -> bool,
{
    let map = registry.map();
    let mut plan = ReconcilePlan::default();

    // Later lists win: a sold seat is sold even if someone still holds it.
    let mut remote: BTreeMap<SeatKey, SeatStatus> = BTreeMap::new();
    let lists = [
        (&snapshot.selected_seats, SeatStatus::Blocked),
        (&snapshot.bms_seats, SeatStatus::BmsBooked),
        (&snapshot.booked_seats, SeatStatus::Booked),
    ];
    for (ids, status) in lists {
        for id in ids {
            match map.locate(id) {
                Some(key) => {
                    remote.insert(key, status);
                },
                None => plan.unknown.push(id.clone()),
            }
        }
    }

    for (key, local) in registry.seats() {
        if map.is_statically_blocked(key) {
            continue;
        }
        let Some(id) = map.seat_id(key) else {
            continue;
        };

        let desired = match remote.get(&key).copied() {
            // Our own selection, as other clients see it.
            Some(SeatStatus::Blocked) if local == SeatStatus::Selected => local,
            Some(status) => status,
            None if matches!(local, SeatStatus::Booked | SeatStatus::BmsBooked | SeatStatus::Blocked) => {
                SeatStatus::Available
            },
            None => local,
        };
        if desired == local {
            continue;
        }
        if is_pending(&id) {
            plan.skipped_pending += 1;
            continue;
        }

        if local == SeatStatus::Selected && desired.is_taken() {
            if let Some(class) = map.row(key.row).map(|row| row.class().clone()) {
                tracing::warn!(seat = %id, class = %class, status = %desired, "Selected seat was sold remotely");
                plan.lost_classes.insert(class);
            }
        }
        plan.overwrites.push((key, desired));
    }

    let written: BTreeSet<SeatKey> = plan.overwrites.iter().map(|(key, _)| *key).collect();
    for class in &plan.lost_classes {
        for key in registry.selected_keys(class) {
            if written.contains(&key) {
                continue;
            }
            plan.overwrites.push((key, SeatStatus::Available));
            if let Some(id) = map.seat_id(key) {
                plan.released.push(id);
            }
        }
    }

    for id in &plan.unknown {
        tracing::debug!(seat = %id, "Snapshot names an unknown seat");
    }
    plan
}
