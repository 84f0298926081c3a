//! The "add one seat" decision procedure.
//!
//! [`AllocationPlanner`] holds an ordered list of [`AllocationStrategy`]
//! objects. Each interaction asks for a block of `selected + 1` seats; the
//! strategies are tried in order and the first plan wins:
//!
//! 1. [`AdjacentToBooked`]: fresh selections start next to sold seats
//! 2. [`NearestCenter`]: fresh selections take the most central block of the
//!    first row that has one
//! 3. [`GrowInRow`]: an existing block grows by one seat in its row
//! 4. [`OverflowGuard`]: records selections in the penalty zone, never plans
//! 5. [`ClassReflow`]: the best-scoring block anywhere in the class replaces
//!    the current selection
//!
//! No strategy ever produces a block spanning rows or crossing a gap, and a
//! plan always holds exactly `target` seats.

use crate::contiguity::{candidate_blocks, row_center, run_containing, slot_neighbours};
use crate::error::Rejection;
use crate::registry::SeatRegistry;
use crate::scoring::{BlockScore, ScoringFunction};
use crate::seat_map::{Row, SeatClass, SeatMap};
use crate::types::{Block, ClassId, RowIndex, SeatKey, SeatNumber, SeatStatus};
use serde::Serialize;
use std::fmt;

// ============================================================================
// Plans
// ============================================================================

/// The strategy that produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Fresh selection next to a sold seat
    AdjacentToBooked,
    /// Fresh selection nearest the row center
    NearestCenter,
    /// One-seat growth in the current row
    GrowInRow,
    /// Penalty-zone bookkeeping
    OverflowGuard,
    /// Class-wide replacement ("N+1")
    ClassReflow,
}

impl Phase {
    /// Metric label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdjacentToBooked => "adjacent_to_booked",
            Self::NearestCenter => "nearest_center",
            Self::GrowInRow => "grow_in_row",
            Self::OverflowGuard => "overflow_guard",
            Self::ClassReflow => "class_reflow",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A planned selection change, applied atomically by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Class whose selection changes
    pub class: ClassId,
    /// The resulting selection
    pub block: Block,
    /// Seats to deselect
    pub release: Vec<SeatKey>,
    /// Seats to select
    pub claim: Vec<SeatKey>,
    /// Strategy that produced the plan
    pub phase: Phase,
}

impl Plan {
    /// Plan replacing `current` with `block`
    #[must_use]
    pub fn replacing(class: &ClassId, current: Option<&Block>, block: Block, phase: Phase) -> Self {
        let old: Vec<SeatKey> = current.map(|b| b.keys().collect()).unwrap_or_default();
        let new: Vec<SeatKey> = block.keys().collect();
        Self {
            class: class.clone(),
            release: old.iter().filter(|k| !new.contains(k)).copied().collect(),
            claim: new.iter().filter(|k| !old.contains(k)).copied().collect(),
            block,
            phase,
        }
    }
}

/// Read-only view handed to every strategy
#[derive(Clone, Copy)]
pub struct PlanContext<'a> {
    /// The seat map
    pub map: &'a SeatMap,
    /// Current statuses and selections
    pub registry: &'a SeatRegistry,
    /// Block scoring
    pub scoring: &'a ScoringFunction,
}

impl<'a> PlanContext<'a> {
    /// Create a context over `registry` and its seat map
    #[must_use]
    pub fn new(registry: &'a SeatRegistry, scoring: &'a ScoringFunction) -> Self {
        Self {
            map: registry.map(),
            registry,
            scoring,
        }
    }

    fn status(&self, row: RowIndex, number: SeatNumber) -> Option<SeatStatus> {
        self.registry.status(SeatKey::new(row, number))
    }

    fn is_available(&self, row: RowIndex, number: SeatNumber) -> bool {
        self.status(row, number) == Some(SeatStatus::Available)
    }

    fn current(&self, class: &SeatClass) -> Option<&'a Block> {
        self.registry.selection(class.id())
    }

    fn is_fresh(&self, class: &SeatClass) -> bool {
        self.registry.selected_count(class.id()) == 0
    }

    fn rows(&self, class: &'a SeatClass) -> impl Iterator<Item = (usize, RowIndex, &'a Row)> + 'a {
        let map = self.map;
        class
            .rows()
            .iter()
            .enumerate()
            .filter_map(move |(position, &index)| map.row(index).map(|row| (position, index, row)))
    }
}

/// One phase of the allocation procedure.
///
/// `attempt` returns a plan whose block has exactly `target` seats, or `None`
/// to let the next strategy try.
pub trait AllocationStrategy: Send + Sync {
    /// The phase this strategy implements
    fn phase(&self) -> Phase;

    /// Try to plan a block of `target` seats in `class`
    fn attempt(&self, ctx: &PlanContext<'_>, class: &SeatClass, target: usize) -> Option<Plan>;
}

// ============================================================================
// Strategies
// ============================================================================

/// Start a fresh selection next to a sold seat, as close to the row center as
/// possible, then grow toward the center.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdjacentToBooked;

impl AllocationStrategy for AdjacentToBooked {
    fn phase(&self) -> Phase {
        Phase::AdjacentToBooked
    }

    fn attempt(&self, ctx: &PlanContext<'_>, class: &SeatClass, target: usize) -> Option<Plan> {
        if !ctx.is_fresh(class) {
            return None;
        }

        let mut best: Option<(f64, usize, SeatNumber, RowIndex)> = None;
        for (position, index, row) in ctx.rows(class) {
            let center = row_center(row);
            for &number in row.seats() {
                if !ctx.is_available(index, number) {
                    continue;
                }
                let beside_sold = [number.checked_sub(1), number.checked_add(1)]
                    .into_iter()
                    .flatten()
                    .any(|n| ctx.status(index, n).is_some_and(SeatStatus::is_taken));
                if !beside_sold {
                    continue;
                }
                let candidate = ((f64::from(number) - center).abs(), position, number, index);
                let better = best.is_none_or(|b| {
                    candidate
                        .0
                        .total_cmp(&b.0)
                        .then(candidate.1.cmp(&b.1))
                        .then(candidate.2.cmp(&b.2))
                        .is_lt()
                });
                if better {
                    best = Some(candidate);
                }
            }
        }

        let (_, _, start, index) = best?;
        let row = ctx.map.row(index)?;
        let numbers = grow_toward_center(row, start, target, |n| ctx.is_available(index, n))?;
        tracing::debug!(row = row.label(), start, "Fresh block next to a sold seat");
        Some(Plan::replacing(class.id(), None, Block::new(index, numbers), self.phase()))
    }
}

/// Grow a block from `start` toward the row center first, then away from it,
/// staying inside `start`'s gap-free run.
fn grow_toward_center<F>(row: &Row, start: SeatNumber, target: usize, is_free: F) -> Option<Vec<SeatNumber>>
where
    F: Fn(SeatNumber) -> bool,
{
    let run = run_containing(row, start)?;
    let origin = run.iter().position(|&n| n == start)?;
    let center = row_center(row);
    let distance = |n: SeatNumber| (f64::from(n) - center).abs();

    let toward_right = run
        .get(origin + 1)
        .is_some_and(|&right| distance(right) < distance(start));

    let (mut low, mut high) = (origin, origin);
    let grow = |rightwards: bool, low: &mut usize, high: &mut usize| {
        while *high - *low + 1 < target {
            let next = if rightwards {
                high.checked_add(1).filter(|&i| i < run.len())
            } else {
                low.checked_sub(1)
            };
            match next {
                Some(i) if is_free(run[i]) => {
                    if rightwards {
                        *high = i;
                    } else {
                        *low = i;
                    }
                },
                _ => break,
            }
        }
    };
    grow(toward_right, &mut low, &mut high);
    grow(!toward_right, &mut low, &mut high);

    (high - low + 1 == target).then(|| run[low..=high].to_vec())
}

/// Fresh selection: the first row (front to back) with a free block wins, and
/// within it the block nearest the row center (ties: lower start number).
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCenter;

impl AllocationStrategy for NearestCenter {
    fn phase(&self) -> Phase {
        Phase::NearestCenter
    }

    fn attempt(&self, ctx: &PlanContext<'_>, class: &SeatClass, target: usize) -> Option<Plan> {
        if !ctx.is_fresh(class) {
            return None;
        }

        for (_, index, row) in ctx.rows(class) {
            let center = row_center(row);
            let best = candidate_blocks(row, target, |n| ctx.is_available(index, n))
                .into_iter()
                .map(|numbers| Block::new(index, numbers))
                .min_by(|a, b| {
                    (a.center() - center)
                        .abs()
                        .total_cmp(&(b.center() - center).abs())
                        .then(a.lowest().cmp(&b.lowest()))
                });
            if let Some(block) = best {
                return Some(Plan::replacing(class.id(), None, block, self.phase()));
            }
        }
        None
    }
}

/// Extend the current block by one seat in its row, growing outward: when
/// both sides are free, the side that moves the block center away from the
/// row center wins (equal distance: left).
#[derive(Debug, Clone, Copy, Default)]
pub struct GrowInRow;

impl AllocationStrategy for GrowInRow {
    fn phase(&self) -> Phase {
        Phase::GrowInRow
    }

    fn attempt(&self, ctx: &PlanContext<'_>, class: &SeatClass, target: usize) -> Option<Plan> {
        let current = ctx.current(class)?;
        if current.len() + 1 != target {
            return None;
        }
        let row = ctx.map.row(current.row)?;
        let (left, right) = slot_neighbours(row, &current.numbers);
        let left = left.filter(|&n| ctx.is_available(current.row, n));
        let right = right.filter(|&n| ctx.is_available(current.row, n));

        let with_left = |n: SeatNumber| {
            let mut numbers = Vec::with_capacity(target);
            numbers.push(n);
            numbers.extend_from_slice(&current.numbers);
            Block::new(current.row, numbers)
        };
        let with_right = |n: SeatNumber| {
            let mut numbers = current.numbers.clone();
            numbers.push(n);
            Block::new(current.row, numbers)
        };

        let block = match (left, right) {
            (Some(l), Some(r)) => {
                let center = row_center(row);
                let (lb, rb) = (with_left(l), with_right(r));
                if (rb.center() - center).abs() > (lb.center() - center).abs() {
                    rb
                } else {
                    lb
                }
            },
            (Some(l), None) => with_left(l),
            (None, Some(r)) => with_right(r),
            (None, None) => return None,
        };
        Some(Plan::replacing(class.id(), Some(current), block, self.phase()))
    }
}

/// Records growth that has reached the base row. Always declines: a block
/// never spans rows, so the class-wide reflow decides what happens next.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverflowGuard;

impl AllocationStrategy for OverflowGuard {
    fn phase(&self) -> Phase {
        Phase::OverflowGuard
    }

    fn attempt(&self, ctx: &PlanContext<'_>, class: &SeatClass, target: usize) -> Option<Plan> {
        let current = ctx.current(class)?;
        let base = class.base_row()?;
        let position = class.position_of(current.row)?;
        if position >= base {
            tracing::trace!(
                class = %class.id(),
                position,
                base,
                target,
                "Selection sits in the penalty zone"
            );
            metrics::counter!(crate::metrics::OVERFLOW_ZONE).increment(1);
        }
        None
    }
}

/// Score every free block of `target` seats in the class (the current
/// selection counts as free and its row as preferred) and replace the
/// selection with the best one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassReflow;

impl AllocationStrategy for ClassReflow {
    fn phase(&self) -> Phase {
        Phase::ClassReflow
    }

    fn attempt(&self, ctx: &PlanContext<'_>, class: &SeatClass, target: usize) -> Option<Plan> {
        let current = ctx.current(class);
        let preferred = current.map(|block| block.row);
        let own = |index: RowIndex, n: SeatNumber| {
            current.is_some_and(|block| block.row == index && block.contains(n))
        };

        let mut best: Option<(BlockScore, Block)> = None;
        for (_, index, row) in ctx.rows(class) {
            let free = |n: SeatNumber| ctx.is_available(index, n) || own(index, n);
            for numbers in candidate_blocks(row, target, free) {
                let block = Block::new(index, numbers);
                let score = ctx.scoring.score(&block, row, class, preferred);
                if best.as_ref().is_none_or(|(top, _)| score.beats(top)) {
                    best = Some((score, block));
                }
            }
        }

        let (score, block) = best?;
        tracing::debug!(
            class = %class.id(),
            row = block.row,
            total = score.total,
            "Class-wide reflow"
        );
        Some(Plan::replacing(class.id(), current, block, self.phase()))
    }
}

// ============================================================================
// Planner
// ============================================================================

/// Ordered list of strategies; the first plan wins
pub struct AllocationPlanner {
    strategies: Vec<Box<dyn AllocationStrategy>>,
}

impl fmt::Debug for AllocationPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.strategies.iter().map(|s| s.phase()))
            .finish()
    }
}

impl Default for AllocationPlanner {
    fn default() -> Self {
        Self::with_strategies(vec![
            Box::new(AdjacentToBooked),
            Box::new(NearestCenter),
            Box::new(GrowInRow),
            Box::new(OverflowGuard),
            Box::new(ClassReflow),
        ])
    }
}

impl AllocationPlanner {
    /// Planner with a custom strategy order
    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn AllocationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Plan adding one seat to `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::UnknownClass`] for classes outside the map and
    /// [`Rejection::InsufficientSpace`] when no strategy finds a block.
    pub fn plan(&self, ctx: &PlanContext<'_>, class: &ClassId) -> Result<Plan, Rejection> {
        let seat_class = ctx
            .map
            .class(class)
            .ok_or_else(|| Rejection::UnknownClass(class.clone()))?;
        let target = ctx.registry.selected_count(class) + 1;
        let insufficient = || Rejection::InsufficientSpace {
            class: class.clone(),
            requested: target,
        };

        if ctx.registry.available_in(class) == 0 {
            return Err(insufficient());
        }

        for strategy in &self.strategies {
            if let Some(plan) = strategy.attempt(ctx, seat_class, target) {
                tracing::debug!(
                    class = %class,
                    phase = %plan.phase,
                    target,
                    row = plan.block.row,
                    "Allocation planned"
                );
                return Ok(plan);
            }
            tracing::trace!(phase = %strategy.phase(), "Strategy declined");
        }
        Err(insufficient())
    }
}
