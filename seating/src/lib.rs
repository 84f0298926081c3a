//! # Box Office Seating
//!
//! Contiguous seat-block allocation for a theater box office.
//!
//! A patron's party grows one seat per interaction with a class. The engine
//! decides which seats to select, keeps the selection one contiguous block
//! that never crosses an aisle, lets staff move the block around, and keeps
//! the optimistic local marks in line with the remote booking service.
//!
//! ## Components
//!
//! - [`seat_map`]: the static seating chart, loaded from a JSON layout
//! - [`contiguity`]: block geometry (contiguity checks, runs, row centers)
//! - [`scoring`]: desirability of a candidate block
//! - [`planner`]: the ordered allocation strategies
//! - [`relocation`]: move mode and single/double activation
//! - [`sync`]: batching of status writes for the booking service
//! - [`registry`]: the single mutable source of truth for seat statuses
//! - [`reconcile`]: merging remote snapshots
//! - [`reducer`]: the [`SeatingReducer`] tying everything together
//!
//! ## Example
//!
//! ```ignore
//! use box_office_runtime::Store;
//! use box_office_seating::*;
//!
//! let map = Arc::new(SeatMap::from_json(layout)?);
//! let store = Store::new(
//!     SeatingState::new(map, &config.timing),
//!     SeatingReducer::with_weights(config.scoring.clone()),
//!     SeatingEnvironment::new(clock, service, config.show.clone(), config.timing),
//! );
//!
//! store.send(SeatingAction::AddSeat { class: ClassId::new("STALLS") }).await?;
//! ```

pub mod config;
pub mod contiguity;
pub mod error;
pub mod metrics;
pub mod planner;
pub mod reconcile;
pub mod reducer;
pub mod registry;
pub mod relocation;
pub mod scoring;
pub mod seat_map;
pub mod service;
pub mod sync;
pub mod types;

pub use config::{EngineConfig, ScoringWeights, TimingConfig};
pub use error::{ConfigError, LayoutError, Rejection, ServiceError};
pub use planner::{AllocationPlanner, AllocationStrategy, Phase, Plan};
pub use reducer::{
    ACTIVATION_TIMER, FLUSH_TIMER, SeatingAction, SeatingEnvironment, SeatingReducer, SeatingState,
};
pub use registry::{RegistryObserver, SeatChange, SeatChangeSet, SeatRegistry, SubscriptionId};
pub use relocation::{MoveMode, Relocation};
pub use seat_map::SeatMap;
pub use service::{BookingService, InMemoryBookingService, SeatStatusSnapshot, SeatUpdate};
pub use types::{Block, ClassId, SeatId, SeatKey, SeatNumber, SeatStatus, ShowKey};
