//! # Box Office Testing
//!
//! Testing utilities and helpers for the box-office seat engine.
//!
//! This crate provides:
//! - A deterministic clock (`FixedClock`)
//! - A Given/When/Then harness for reducers (`ReducerTest`)
//! - Assertion helpers for effects, including keyed timers
//!
//! ## Example
//!
//! ```ignore
//! use box_office_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(SeatingReducer::new())
//!     .with_env(test_environment())
//!     .given_state(state_with_hall())
//!     .when_action(SeatingAction::AddSeat { class })
//!     .then_state(|state| assert_eq!(state.selected_count(&class), 1))
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use box_office_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Duration, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use box_office_testing::mocks::FixedClock;
    /// use box_office_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_089))
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
