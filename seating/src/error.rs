//! Error types for the seating engine.

use crate::types::{ClassId, SeatId, SeatNumber, SeatStatus};
use thiserror::Error;

/// Seat map construction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The same row label appears twice
    #[error("Duplicate row label: {0}")]
    DuplicateRow(String),

    /// A seat number appears twice in one row
    #[error("Duplicate seat number {number} in row {row}")]
    DuplicateSeat {
        /// Row label
        row: String,
        /// Repeated number
        number: SeatNumber,
    },

    /// The same class id appears twice
    #[error("Duplicate class id: {0}")]
    DuplicateClass(String),

    /// A class without rows
    #[error("Class {0} has no rows")]
    EmptyClass(String),

    /// A row without a single seat
    #[error("Row {0} has no seats")]
    RowWithoutSeats(String),

    /// `base_row` names a row outside its class
    #[error("Base row {base_row} is not a row of class {class}")]
    BaseRowOutOfRange {
        /// Class id
        class: String,
        /// The offending base row label
        base_row: String,
    },

    /// A blocked seat number that is not in its row
    #[error("Blocked seat {number} does not exist in row {row}")]
    UnknownBlockedSeat {
        /// Row label
        row: String,
        /// Missing number
        number: SeatNumber,
    },

    /// Row notation that cannot be parsed
    #[error("Invalid row notation {token:?} in row {row}")]
    InvalidNotation {
        /// Row label
        row: String,
        /// Offending token
        token: String,
    },

    /// The layout document is not valid JSON for a seat map
    #[error("Invalid layout document: {0}")]
    Parse(String),
}

/// Failures reported by the booking service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service could not be reached
    #[error("Booking service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request
    #[error("Booking service rejected the request: {0}")]
    Rejected(String),

    /// The call did not complete in time
    #[error("Booking service timed out")]
    Timeout,
}

/// Configuration loading failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable holds an unparseable value
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
    },
}

/// A routine miss: the interaction is a no-op and leaves every seat unchanged.
///
/// Rejections are recorded in state and counted, never returned to callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No contiguous block of the requested size is free
    #[error("No contiguous block of {requested} seats available in class {class}")]
    InsufficientSpace {
        /// Class searched
        class: ClassId,
        /// Requested block size
        requested: usize,
    },

    /// Relocation target belongs to another class
    #[error("Seat {seat} is not in class {expected}")]
    ClassMismatch {
        /// Clicked seat
        seat: SeatId,
        /// Class of the block being moved
        expected: ClassId,
    },

    /// The status change is not permitted
    #[error("Seat {seat} cannot go from {from} to {to}")]
    DisallowedTransition {
        /// Seat
        seat: SeatId,
        /// Current status
        from: SeatStatus,
        /// Requested status
        to: SeatStatus,
    },

    /// The seat does not react to activation (booked, blocked, or not adjacent)
    #[error("Seat {0} is not interactive")]
    NotInteractive(SeatId),

    /// The seat is not part of the seat map
    #[error("Unknown seat {0}")]
    UnknownSeat(SeatId),

    /// The class is not part of the seat map
    #[error("Unknown class {0}")]
    UnknownClass(ClassId),
}

impl Rejection {
    /// Metric label for this rejection kind
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InsufficientSpace { .. } => "insufficient_space",
            Self::ClassMismatch { .. } => "class_mismatch",
            Self::DisallowedTransition { .. } => "disallowed_transition",
            Self::NotInteractive(_) => "not_interactive",
            Self::UnknownSeat(_) => "unknown_seat",
            Self::UnknownClass(_) => "unknown_class",
        }
    }
}
