//! Domain types for the seat allocation engine.
//!
//! Identifiers, seat statuses, blocks and the show key shared by every other
//! module. Nothing here holds mutable state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Seat number as printed on the seat (not its slot position)
pub type SeatNumber = u16;

/// Index of a row in the seat map (across all classes, front to back)
pub type RowIndex = usize;

/// Canonical seat label, `"{row}-{number}"` (e.g. `SC-A-3`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(String);

impl SeatId {
    /// Build the canonical id for seat `number` in row `row`
    #[must_use]
    pub fn new(row: &str, number: SeatNumber) -> Self {
        Self(format!("{row}-{number}"))
    }

    /// The label as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SeatId {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a seat class (price tier)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    /// Create a class id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a seat in the seat map: row index plus seat number
///
/// Cheap to copy; used as the registry key. [`SeatId`] is the external name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeatKey {
    /// Row index in the seat map
    pub row: RowIndex,
    /// Seat number within the row
    pub number: SeatNumber,
}

impl SeatKey {
    /// Create a seat key
    #[must_use]
    pub const fn new(row: RowIndex, number: SeatNumber) -> Self {
        Self { row, number }
    }
}

// ============================================================================
// Seat status
// ============================================================================

/// Status of a single seat
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    /// Free to select
    Available,
    /// Provisionally held by this session
    Selected,
    /// Sold
    Booked,
    /// Held by another session or withdrawn from sale
    Blocked,
    /// Sold through the external (BMS) channel
    BmsBooked,
}

impl SeatStatus {
    /// Whether `self → to` is a permitted transition.
    ///
    /// `AVAILABLE ↔ SELECTED` and `SELECTED → BOOKED` are always permitted;
    /// `AVAILABLE ↔ BMS_BOOKED` only while BMS marking mode is on. `BOOKED` and
    /// `BLOCKED` never leave their state within a session.
    #[must_use]
    pub const fn can_transition_to(self, to: Self, bms_mode: bool) -> bool {
        matches!(
            (self, to),
            (Self::Available, Self::Selected)
                | (Self::Selected, Self::Available | Self::Booked)
        ) || (bms_mode
            && matches!(
                (self, to),
                (Self::Available, Self::BmsBooked) | (Self::BmsBooked, Self::Available)
            ))
    }

    /// Sold through either channel
    #[must_use]
    pub const fn is_taken(self) -> bool {
        matches!(self, Self::Booked | Self::BmsBooked)
    }

    /// Wire name, as used by the booking service
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Selected => "SELECTED",
            Self::Booked => "BOOKED",
            Self::Blocked => "BLOCKED",
            Self::BmsBooked => "BMS_BOOKED",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Blocks
// ============================================================================

/// A contiguous run of seats within one row, in slot order
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Row the block sits in
    pub row: RowIndex,
    /// Seat numbers in slot order
    pub numbers: Vec<SeatNumber>,
}

impl Block {
    /// Create a block
    #[must_use]
    pub const fn new(row: RowIndex, numbers: Vec<SeatNumber>) -> Self {
        Self { row, numbers }
    }

    /// Number of seats in the block
    #[must_use]
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    /// Whether the block has no seats
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// Whether `number` is part of the block
    #[must_use]
    pub fn contains(&self, number: SeatNumber) -> bool {
        self.numbers.contains(&number)
    }

    /// Mean seat number, in the same coordinates as a row center
    #[must_use]
    pub fn center(&self) -> f64 {
        if self.numbers.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.numbers.iter().map(|&n| f64::from(n)).sum();
        #[allow(clippy::cast_precision_loss)] // blocks hold a handful of seats
        let len = self.numbers.len() as f64;
        sum / len
    }

    /// Lowest seat number in the block
    #[must_use]
    pub fn lowest(&self) -> Option<SeatNumber> {
        self.numbers.iter().copied().min()
    }

    /// Highest seat number in the block
    #[must_use]
    pub fn highest(&self) -> Option<SeatNumber> {
        self.numbers.iter().copied().max()
    }

    /// Registry keys of every seat in the block
    pub fn keys(&self) -> impl Iterator<Item = SeatKey> + '_ {
        self.numbers.iter().map(move |&n| SeatKey::new(self.row, n))
    }
}

// ============================================================================
// Show
// ============================================================================

/// Identifies one performance: the date and the show name
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShowKey {
    /// Performance date
    pub date: NaiveDate,
    /// Show name or slot (e.g. "matinee")
    pub show: String,
}

impl ShowKey {
    /// Create a show key
    #[must_use]
    pub fn new(date: NaiveDate, show: impl Into<String>) -> Self {
        Self {
            date,
            show: show.into(),
        }
    }
}

impl fmt::Display for ShowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.show)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_id_uses_row_dash_number() {
        assert_eq!(SeatId::new("SC-A", 3).as_str(), "SC-A-3");
        assert_eq!(SeatId::from("SC-A-3"), SeatId::new("SC-A", 3));
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&SeatStatus::BmsBooked).unwrap_or_default();
        assert_eq!(json, "\"BMS_BOOKED\"");
        assert_eq!(SeatStatus::BmsBooked.to_string(), "BMS_BOOKED");
    }

    #[test]
    fn transitions_follow_status_rules() {
        use SeatStatus::{Available, Blocked, BmsBooked, Booked, Selected};

        assert!(Available.can_transition_to(Selected, false));
        assert!(Selected.can_transition_to(Available, false));
        assert!(Selected.can_transition_to(Booked, false));
        assert!(!Available.can_transition_to(BmsBooked, false));
        assert!(Available.can_transition_to(BmsBooked, true));
        assert!(BmsBooked.can_transition_to(Available, true));
        assert!(!Booked.can_transition_to(Available, true));
        assert!(!Blocked.can_transition_to(Selected, true));
        assert!(!Available.can_transition_to(Booked, false));
    }

    #[test]
    fn block_center_is_mean_number() {
        let block = Block::new(0, vec![4, 5, 6]);
        assert!((block.center() - 5.0).abs() < f64::EPSILON);
        assert_eq!(block.lowest(), Some(4));
        assert_eq!(block.highest(), Some(6));
        assert!(Block::new(0, vec![]).is_empty());
    }
}
