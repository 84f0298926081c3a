//! Seating engine metric descriptions.
//!
//! Counters are recorded through the `metrics` facade wherever the engine
//! makes a decision; binaries call [`register_seating_metrics`] once after
//! installing a recorder.

use metrics::{describe_counter, describe_gauge};

/// Allocations applied, labelled by `phase`
pub const ALLOCATIONS: &str = "seating_allocations_total";
/// Interactions that changed nothing, labelled by `reason`
pub const REJECTIONS: &str = "seating_rejections_total";
/// Blocks moved in move mode
pub const RELOCATIONS: &str = "seating_relocations_total";
/// Batch calls to the booking service, labelled by `status` (`ok` or `error`)
pub const SYNC_FLUSHES: &str = "seating_sync_flushes_total";
/// Seats restored after a failed write
pub const SYNC_ROLLBACKS: &str = "seating_sync_rollbacks_total";
/// Allocations that reached the overflow zone
pub const OVERFLOW_ZONE: &str = "seating_overflow_zone_total";
/// Seats currently SELECTED
pub const SELECTED_SEATS: &str = "seating_selected_seats";

/// Register all seating metric descriptions.
pub fn register_seating_metrics() {
    describe_counter!(ALLOCATIONS, "Allocations applied, by planner phase");
    describe_counter!(REJECTIONS, "Seat interactions rejected without changes, by reason");
    describe_counter!(RELOCATIONS, "Selected blocks moved to a new position");
    describe_counter!(SYNC_FLUSHES, "Batched status writes sent to the booking service");
    describe_counter!(SYNC_ROLLBACKS, "Seats rolled back after a failed write");
    describe_counter!(OVERFLOW_ZONE, "Allocations that could not grow inside the preferred zone");
    describe_gauge!(SELECTED_SEATS, "Seats currently selected in this session");
}
