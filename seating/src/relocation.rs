//! Move mode: repositioning an already selected block, and telling single
//! seat activations from double ones.
//!
//! ```text
//!              selection > 1, contiguous, BMS off
//!   Inactive ─────────────────────────────────────▶ Active { class, len }
//!       ▲                                              │
//!       └── selection ≤ 1 · CancelMove · relocation ───┘
//!
//!   Idle ──press──▶ AwaitingSecond { seat, token, deadline } ──window / press──▶ Idle
//! ```
//!
//! The controller only holds the two state machines; the reducer decides what
//! a resolved activation does, using [`plan_relocation`], [`deselection`] and
//! [`can_add`].

use crate::contiguity::{run_containing, slot_neighbours};
use crate::error::Rejection;
use crate::registry::SeatRegistry;
use crate::types::{Block, ClassId, SeatId, SeatKey, SeatNumber};
use chrono::{DateTime, Duration, Utc};

/// Whether activations relocate the selected block
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MoveMode {
    /// Activations add or remove single seats
    #[default]
    Inactive,
    /// Activations on free seats move the block of `class`
    Active {
        /// Class of the block
        class: ClassId,
        /// Block length
        len: usize,
    },
}

/// Single/double activation disambiguation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActivationGate {
    /// No activation pending
    #[default]
    Idle,
    /// One activation seen; a second on the same seat before `deadline` is a
    /// double activation
    AwaitingSecond {
        /// Seat activated first
        seat: SeatId,
        /// Token the window timer carries
        token: u64,
        /// End of the window
        deadline: DateTime<Utc>,
    },
}

/// A disambiguated activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// One activation
    Single(SeatId),
    /// Two activations of the same seat inside the window
    Double(SeatId),
}

/// What the reducer has to do after a press
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Press {
    /// Activation resolved by this press
    pub resolved: Option<Activation>,
    /// Token of a newly armed window timer
    pub armed: Option<u64>,
    /// Whether the pending window timer must be cancelled
    pub cancel_timer: bool,
}

/// A completed relocation, kept until the move is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// Class of the block
    pub class: ClassId,
    /// Block before the move
    pub from: Block,
    /// Block after the move
    pub to: Block,
}

/// Move mode plus activation gate
#[derive(Debug, Clone, Default)]
pub struct RelocationController {
    mode: MoveMode,
    gate: ActivationGate,
    next_token: u64,
}

impl RelocationController {
    /// Inactive controller with an idle gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current move mode
    #[must_use]
    pub const fn mode(&self) -> &MoveMode {
        &self.mode
    }

    /// Current gate state
    #[must_use]
    pub const fn gate(&self) -> &ActivationGate {
        &self.gate
    }

    /// Whether move mode is active
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.mode, MoveMode::Active { .. })
    }

    /// Derive move mode after the selection of `class` changed.
    pub fn sync_mode(&mut self, registry: &SeatRegistry, class: &ClassId, bms_mode: bool) {
        if bms_mode {
            self.mode = MoveMode::Inactive;
            return;
        }
        match registry.selection(class) {
            Some(block) if block.len() > 1 => {
                let next = MoveMode::Active {
                    class: class.clone(),
                    len: block.len(),
                };
                if self.mode != next {
                    tracing::debug!(class = %class, len = block.len(), "Move mode active");
                }
                self.mode = next;
            },
            _ => {
                if matches!(&self.mode, MoveMode::Active { class: active, .. } if active == class) {
                    tracing::debug!(class = %class, "Move mode inactive");
                    self.mode = MoveMode::Inactive;
                }
            },
        }
    }

    /// Leave move mode
    pub fn deactivate(&mut self) {
        self.mode = MoveMode::Inactive;
    }

    /// Register an activation of `seat` at `now`.
    ///
    /// A second press on the pending seat inside the window resolves as a
    /// double activation. A press on another seat resolves the pending one as
    /// a single activation and opens a new window.
    pub fn press(&mut self, seat: SeatId, now: DateTime<Utc>, window: Duration) -> Press {
        match std::mem::take(&mut self.gate) {
            ActivationGate::AwaitingSecond {
                seat: pending,
                deadline,
                ..
            } if pending == seat && now <= deadline => Press {
                resolved: Some(Activation::Double(seat)),
                armed: None,
                cancel_timer: true,
            },
            ActivationGate::AwaitingSecond { seat: pending, .. } => {
                let token = self.arm(seat, now, window);
                Press {
                    resolved: Some(Activation::Single(pending)),
                    armed: Some(token),
                    cancel_timer: false,
                }
            },
            ActivationGate::Idle => {
                let token = self.arm(seat, now, window);
                Press {
                    resolved: None,
                    armed: Some(token),
                    cancel_timer: false,
                }
            },
        }
    }

    fn arm(&mut self, seat: SeatId, now: DateTime<Utc>, window: Duration) -> u64 {
        self.next_token += 1;
        self.gate = ActivationGate::AwaitingSecond {
            seat,
            token: self.next_token,
            deadline: now + window,
        };
        self.next_token
    }

    /// The window timer for `seat` fired. Stale tokens are ignored.
    pub fn window_elapsed(&mut self, seat: &SeatId, token: u64) -> Option<Activation> {
        match &self.gate {
            ActivationGate::AwaitingSecond {
                seat: pending,
                token: current,
                ..
            } if pending == seat && *current == token => {
                self.gate = ActivationGate::Idle;
                Some(Activation::Single(seat.clone()))
            },
            _ => {
                tracing::trace!(seat = %seat, token, "Ignoring stale activation window");
                None
            },
        }
    }

    /// Drop a pending activation; returns whether one was pending
    pub fn clear_gate(&mut self) -> bool {
        !matches!(std::mem::take(&mut self.gate), ActivationGate::Idle)
    }
}

/// Plan moving the `len`-seat block of `class` to start at `seat`.
///
/// The destination is the `len` seats from `seat` onward in slot order,
/// inside its gap-free run; all of them must be AVAILABLE.
///
/// # Errors
///
/// [`Rejection::ClassMismatch`] if `seat` is in another class,
/// [`Rejection::InsufficientSpace`] if the run is too short or any
/// destination seat is taken, [`Rejection::UnknownSeat`] for seats outside
/// the map.
pub fn plan_relocation(
    registry: &SeatRegistry,
    class: &ClassId,
    len: usize,
    seat: &SeatId,
) -> Result<Relocation, Rejection> {
    let map = registry.map();
    let unknown = || Rejection::UnknownSeat(seat.clone());
    let target = map.locate(seat).ok_or_else(unknown)?;
    let row = map.row(target.row).ok_or_else(unknown)?;
    if row.class() != class {
        return Err(Rejection::ClassMismatch {
            seat: seat.clone(),
            expected: class.clone(),
        });
    }

    let insufficient = || Rejection::InsufficientSpace {
        class: class.clone(),
        requested: len,
    };
    let from = registry.selection(class).cloned().ok_or_else(insufficient)?;
    let run = run_containing(row, target.number).ok_or_else(insufficient)?;
    let start = run
        .iter()
        .position(|&n| n == target.number)
        .ok_or_else(insufficient)?;
    let numbers = run
        .get(start..start.saturating_add(len))
        .filter(|window| window.len() == len)
        .ok_or_else(insufficient)?;
    if !numbers
        .iter()
        .all(|&n| registry.is_available(SeatKey::new(target.row, n)))
    {
        return Err(insufficient());
    }

    Ok(Relocation {
        class: class.clone(),
        from,
        to: Block::new(target.row, numbers.to_vec()),
    })
}

/// Seats released when `number` is deselected from `block`.
///
/// An edge seat goes alone; an interior seat takes every seat after it in
/// slot order with it, so the remainder stays contiguous.
#[must_use]
pub fn deselection(block: &Block, number: SeatNumber) -> Vec<SeatNumber> {
    match block.numbers.iter().position(|&n| n == number) {
        None => Vec::new(),
        Some(0) => vec![number],
        Some(p) if p + 1 == block.numbers.len() => vec![number],
        Some(p) => block.numbers[p..].to_vec(),
    }
}

/// Whether manually adding the seat at `key` keeps the selection of `class`
/// a single block: the selection is empty, or the seat sits directly beside
/// it in the same row.
#[must_use]
pub fn can_add(registry: &SeatRegistry, class: &ClassId, key: SeatKey) -> bool {
    match registry.selection(class) {
        None => registry.selected_count(class) == 0,
        Some(block) if block.row == key.row => registry.map().row(key.row).is_some_and(|row| {
            let (left, right) = slot_neighbours(row, &block.numbers);
            left == Some(key.number) || right == Some(key.number)
        }),
        Some(_) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::seat_map::{ClassLayout, RowLayout, SeatMap, SeatMapLayout};
    use crate::types::SeatStatus;
    use std::sync::Arc;

    fn registry() -> SeatRegistry {
        let class = |id: &str, rows: Vec<RowLayout>| ClassLayout {
            id: id.to_string(),
            label: None,
            base_row: None,
            rows,
        };
        let map = SeatMap::from_layout(&SeatMapLayout {
            classes: vec![
                class("SC", vec![RowLayout::from_notation("SC-A", "1-5 | 6-10").unwrap()]),
                class("ST", vec![RowLayout::from_notation("ST-A", "1-10").unwrap()]),
            ],
        })
        .unwrap();
        let mut registry = SeatRegistry::new(Arc::new(map));
        registry
            .transition(
                &[
                    (SeatKey::new(0, 2), SeatStatus::Selected),
                    (SeatKey::new(0, 3), SeatStatus::Selected),
                ],
                false,
            )
            .unwrap();
        registry
    }

    fn sc() -> ClassId {
        ClassId::new("SC")
    }

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH
    }

    #[test]
    fn mode_follows_selection_size() {
        let mut registry = registry();
        let mut controller = RelocationController::new();

        controller.sync_mode(&registry, &sc(), false);
        assert_eq!(controller.mode(), &MoveMode::Active { class: sc(), len: 2 });

        registry
            .transition(&[(SeatKey::new(0, 3), SeatStatus::Available)], false)
            .unwrap();
        controller.sync_mode(&registry, &sc(), false);
        assert_eq!(controller.mode(), &MoveMode::Inactive);
    }

    #[test]
    fn bms_mode_keeps_move_mode_off() {
        let registry = registry();
        let mut controller = RelocationController::new();
        controller.sync_mode(&registry, &sc(), true);
        assert!(!controller.is_active());
    }

    #[test]
    fn second_press_inside_window_is_double() {
        let mut controller = RelocationController::new();
        let seat = SeatId::from("SC-A-7");
        let window = Duration::milliseconds(300);

        let first = controller.press(seat.clone(), start(), window);
        assert_eq!(first.resolved, None);
        assert!(first.armed.is_some());

        let second = controller.press(seat.clone(), start() + Duration::milliseconds(120), window);
        assert_eq!(second.resolved, Some(Activation::Double(seat)));
        assert!(second.cancel_timer);
        assert_eq!(controller.gate(), &ActivationGate::Idle);
    }

    #[test]
    fn press_on_other_seat_resolves_pending_single() {
        let mut controller = RelocationController::new();
        let window = Duration::milliseconds(300);
        let first = controller.press(SeatId::from("SC-A-7"), start(), window);

        let second = controller.press(SeatId::from("SC-A-8"), start(), window);
        assert_eq!(second.resolved, Some(Activation::Single(SeatId::from("SC-A-7"))));

        // The first window's timer is now stale.
        assert_eq!(
            controller.window_elapsed(&SeatId::from("SC-A-7"), first.armed.unwrap()),
            None
        );
        assert_eq!(
            controller.window_elapsed(&SeatId::from("SC-A-8"), second.armed.unwrap()),
            Some(Activation::Single(SeatId::from("SC-A-8")))
        );
    }

    #[test]
    fn late_second_press_is_two_singles() {
        let mut controller = RelocationController::new();
        let seat = SeatId::from("SC-A-7");
        let window = Duration::milliseconds(300);
        controller.press(seat.clone(), start(), window);

        let late = controller.press(seat.clone(), start() + Duration::milliseconds(301), window);
        assert_eq!(late.resolved, Some(Activation::Single(seat)));
        assert!(late.armed.is_some());
    }

    #[test]
    fn relocation_needs_free_seats_of_the_same_class() {
        let registry = registry();

        let moved = plan_relocation(&registry, &sc(), 2, &SeatId::from("SC-A-7")).unwrap();
        assert_eq!(moved.from, Block::new(0, vec![2, 3]));
        assert_eq!(moved.to, Block::new(0, vec![7, 8]));

        // Seat 5 is the last before the gap: no room for two.
        assert!(matches!(
            plan_relocation(&registry, &sc(), 2, &SeatId::from("SC-A-5")),
            Err(Rejection::InsufficientSpace { .. })
        ));
        // Seat 1 runs into the selection itself.
        assert!(plan_relocation(&registry, &sc(), 2, &SeatId::from("SC-A-1")).is_err());
        assert!(matches!(
            plan_relocation(&registry, &sc(), 2, &SeatId::from("ST-A-4")),
            Err(Rejection::ClassMismatch { .. })
        ));
    }

    #[test]
    fn interior_deselect_releases_the_tail() {
        let block = Block::new(0, vec![3, 4, 5, 6]);
        assert_eq!(deselection(&block, 3), vec![3]);
        assert_eq!(deselection(&block, 6), vec![6]);
        assert_eq!(deselection(&block, 4), vec![4, 5, 6]);
        assert!(deselection(&block, 9).is_empty());
    }

    #[test]
    fn manual_add_must_touch_the_block() {
        let registry = registry();
        assert!(can_add(&registry, &sc(), SeatKey::new(0, 1)));
        assert!(can_add(&registry, &sc(), SeatKey::new(0, 4)));
        assert!(!can_add(&registry, &sc(), SeatKey::new(0, 6)));
        assert!(can_add(&registry, &ClassId::new("ST"), SeatKey::new(1, 9)));
    }
}
