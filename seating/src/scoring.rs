//! Desirability score of a candidate block.
//!
//! Higher is better. The total is the sum of five terms:
//!
//! - **center**: `max(0, base − slope·|block center − row center|)`
//! - **row priority**: the preferred-row bonus, or the bonus for the row's
//!   position within its class
//! - **base penalty**: `−(penalty + step·(position − base))` from the base row
//!   back, zero in front of it
//! - **buffer**: `weight·min(left, right)`, the numeric distance from the
//!   block's edges to the row's lowest and highest seat numbers (discourages
//!   orphaned single seats)
//! - **aisle**: bonus for rows containing a gap

use crate::config::ScoringWeights;
use crate::contiguity::row_center;
use crate::seat_map::{Row, SeatClass};
use crate::types::{Block, RowIndex, SeatNumber};
use std::cmp::Ordering;

/// Totals closer than this are ties
const TIE_EPSILON: f64 = 1e-9;

/// A scored block, with every term kept for diagnostics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockScore {
    /// Center term
    pub center: f64,
    /// Row priority term
    pub row_priority: f64,
    /// Base-row penalty term (zero or negative)
    pub base_penalty: f64,
    /// Orphan-avoidance term
    pub buffer: f64,
    /// Aisle term
    pub aisle: f64,
    /// Sum of all terms
    pub total: f64,
    /// Row position within the class (tie-break key)
    pub row_position: usize,
    /// Lowest seat number of the block (tie-break key)
    pub start: SeatNumber,
}

impl BlockScore {
    /// Whether this score wins over `other`.
    ///
    /// Higher total wins; equal totals go to the front-most row, then to the
    /// lowest starting seat number.
    #[must_use]
    pub fn beats(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Greater
    }

    fn compare(&self, other: &Self) -> Ordering {
        if (self.total - other.total).abs() > TIE_EPSILON {
            return self.total.total_cmp(&other.total);
        }
        // Lower keys win, so they compare as greater.
        other
            .row_position
            .cmp(&self.row_position)
            .then(other.start.cmp(&self.start))
    }
}

/// Scores blocks with a fixed set of weights
#[derive(Debug, Clone, Default)]
pub struct ScoringFunction {
    weights: ScoringWeights,
}

impl ScoringFunction {
    /// Create a scoring function
    #[must_use]
    pub const fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// The weights in use
    #[must_use]
    pub const fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score `block`, which sits in `row` of `class`.
    ///
    /// `preferred_row` is a seat map row index; a block in that row receives
    /// the preferred-row bonus instead of its positional bonus.
    #[must_use]
    pub fn score(
        &self,
        block: &Block,
        row: &Row,
        class: &SeatClass,
        preferred_row: Option<RowIndex>,
    ) -> BlockScore {
        let w = &self.weights;
        let position = class.position_of(block.row).unwrap_or(usize::MAX);

        let distance = (block.center() - row_center(row)).abs();
        let center = (w.center_base - w.center_slope * distance).max(0.0);

        let row_priority = if preferred_row == Some(block.row) {
            w.preferred_row_bonus
        } else {
            w.row_priority
                .get(position)
                .or_else(|| w.row_priority.last())
                .copied()
                .unwrap_or(0.0)
        };

        let base_penalty = match class.base_row() {
            Some(base) if position >= base => {
                #[allow(clippy::cast_precision_loss)] // row positions are tiny
                let behind = (position - base) as f64;
                -(w.base_penalty + w.base_penalty_step * behind)
            },
            _ => 0.0,
        };

        let start = block.lowest().unwrap_or_default();
        let buffer = match (row.lowest(), row.highest(), block.highest()) {
            (Some(low), Some(high), Some(end)) => {
                let left = start.saturating_sub(low);
                let right = high.saturating_sub(end);
                w.buffer_weight * f64::from(left.min(right))
            },
            _ => 0.0,
        };

        let aisle = if row.has_gap() { w.aisle_bonus } else { 0.0 };

        BlockScore {
            center,
            row_priority,
            base_penalty,
            buffer,
            aisle,
            total: center + row_priority + base_penalty + buffer + aisle,
            row_position: position,
            start,
        }
    }
}
