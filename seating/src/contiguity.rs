//! Contiguity predicates and searches over a row layout.
//!
//! Adjacency is decided by slot position, never by seat number: two seats
//! numbered 5 and 6 with an aisle gap between them are not adjacent. Every
//! function here is pure.

use crate::seat_map::{Row, Slot};
use crate::types::SeatNumber;

/// Whether `seats` occupy consecutive slots of `row`.
///
/// Order of `seats` does not matter. Empty input, unknown numbers and
/// duplicates are never contiguous.
#[must_use]
pub fn is_contiguous(row: &Row, seats: &[SeatNumber]) -> bool {
    if seats.is_empty() {
        return false;
    }
    let Some(mut slots) = seats
        .iter()
        .map(|&number| row.slot_of(number))
        .collect::<Option<Vec<_>>>()
    else {
        return false;
    };
    slots.sort_unstable();
    slots.windows(2).all(|pair| pair[1] == pair[0] + 1)
}

/// The `count` seats starting at `start_index` of `sorted_row_seats`, if they
/// exist and are contiguous in `row`.
#[must_use]
pub fn find_block(
    row: &Row,
    sorted_row_seats: &[SeatNumber],
    count: usize,
    start_index: usize,
) -> Option<Vec<SeatNumber>> {
    if count == 0 {
        return None;
    }
    let end = start_index.checked_add(count)?;
    let candidate = sorted_row_seats.get(start_index..end)?;
    is_contiguous(row, candidate).then(|| candidate.to_vec())
}

/// The point blocks in `row` are biased toward, in seat-number coordinates.
///
/// - one gap: the gap's position
/// - several gaps: the gap whose slot is nearest the slot midpoint (ties:
///   lower slot)
/// - no gap: the midpoint of the numeric seat range
#[must_use]
pub fn row_center(row: &Row) -> f64 {
    let gaps: Vec<usize> = row
        .slots()
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| (*slot == Slot::Gap).then_some(index))
        .collect();

    #[allow(clippy::cast_precision_loss)] // slot counts are tiny
    let midpoint = row.slots().len().saturating_sub(1) as f64 / 2.0;

    #[allow(clippy::cast_precision_loss)]
    let chosen = gaps.iter().copied().min_by(|a, b| {
        let da = (*a as f64 - midpoint).abs();
        let db = (*b as f64 - midpoint).abs();
        da.total_cmp(&db).then(a.cmp(b))
    });

    match chosen {
        Some(gap) => gap_position(row, gap),
        None => match (row.lowest(), row.highest()) {
            (Some(low), Some(high)) => (f64::from(low) + f64::from(high)) / 2.0,
            _ => 0.0,
        },
    }
}

/// Position of the gap at slot `gap`: midway between its neighbouring seat
/// numbers, or half a seat beyond its only neighbour at a row edge.
fn gap_position(row: &Row, gap: usize) -> f64 {
    let before = row.slots()[..gap].iter().rev().find_map(seat_number);
    let after = row.slots().get(gap + 1..).and_then(|rest| rest.iter().find_map(seat_number));
    match (before, after) {
        (Some(b), Some(a)) => (f64::from(b) + f64::from(a)) / 2.0,
        (Some(b), None) => f64::from(b) + 0.5,
        (None, Some(a)) => f64::from(a) - 0.5,
        (None, None) => 0.0,
    }
}

const fn seat_number(slot: &Slot) -> Option<SeatNumber> {
    match slot {
        Slot::Seat(number) => Some(*number),
        Slot::Gap => None,
    }
}

/// Gap-free segments of `row`, each in slot order
#[must_use]
pub fn runs(row: &Row) -> Vec<Vec<SeatNumber>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for slot in row.slots() {
        match slot {
            Slot::Seat(number) => current.push(*number),
            Slot::Gap => {
                if !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
            },
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// The gap-free segment containing seat `number`
#[must_use]
pub fn run_containing(row: &Row, number: SeatNumber) -> Option<Vec<SeatNumber>> {
    runs(row).into_iter().find(|run| run.contains(&number))
}

/// Every window of `count` contiguous seats in `row` whose seats all satisfy
/// `is_free`, in slot order.
pub fn candidate_blocks<F>(row: &Row, count: usize, is_free: F) -> Vec<Vec<SeatNumber>>
where
    F: Fn(SeatNumber) -> bool,
{
    if count == 0 {
        return Vec::new();
    }
    runs(row)
        .iter()
        .flat_map(|run| run.windows(count))
        .filter(|window| window.iter().all(|&number| is_free(number)))
        .map(<[SeatNumber]>::to_vec)
        .collect()
}

/// Seats directly left and right of a slot-ordered block, stopping at gaps
/// and row edges.
#[must_use]
pub fn slot_neighbours(row: &Row, block: &[SeatNumber]) -> (Option<SeatNumber>, Option<SeatNumber>) {
    let first = block.first().and_then(|&n| row.slot_of(n));
    let last = block.last().and_then(|&n| row.slot_of(n));
    let left = first
        .and_then(|slot| slot.checked_sub(1))
        .and_then(|slot| row.seat_at(slot));
    let right = last.and_then(|slot| row.seat_at(slot + 1));
    (left, right)
}
