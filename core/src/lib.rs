//! # Box Office Core
//!
//! Core traits and types for the box-office seat engine.
//!
//! The engine is written as a set of reducers driven by a Store runtime:
//!
//! - **State**: owned domain state (seat registry, selections, pending syncs)
//! - **Action**: every input (seat activations, timer deliveries, remote results)
//! - **Reducer**: synchronous `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: descriptions of timers and remote calls, executed by the runtime
//! - **Environment**: injected collaborators (clock, booking service)
//!
//! Reducers never sleep and never perform I/O. Anything that has to happen
//! later is returned as an [`effect::Effect`], which keeps every decision
//! observable and testable without a runtime.
//!
//! ## Example
//!
//! ```ignore
//! use box_office_core::*;
//!
//! impl Reducer for SeatingReducer {
//!     type State = SeatingState;
//!     type Action = SeatingAction;
//!     type Environment = SeatingEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut SeatingState,
//!         action: SeatingAction,
//!         env: &SeatingEnvironment,
//!     ) -> SmallVec<[Effect<SeatingAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// Declarative macros for effect construction
pub mod effect_macros;

/// Reducer module - The core trait for business logic
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Implementations validate the action, update state in place and
        /// return effect descriptions. They must complete synchronously: the
        /// runtime holds the state write lock for the whole call.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values. The reducer returns them and the runtime executes them;
/// nothing in this module performs I/O.
pub mod effect {
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Identifier of a keyed timer.
    ///
    /// At most one timer per id is pending in a Store: scheduling an id that is
    /// already pending replaces the earlier timer.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct TimerId(&'static str);

    impl TimerId {
        /// Create a timer id from a static name
        #[must_use]
        pub const fn new(name: &'static str) -> Self {
            Self(name)
        }

        /// The timer name
        #[must_use]
        pub const fn as_str(&self) -> &'static str {
            self.0
        }
    }

    impl fmt::Display for TimerId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Keyed, cancellable delayed action
        ///
        /// Replaces any pending timer with the same `id`.
        Schedule {
            /// Timer key
            id: TimerId,
            /// How long to wait
            duration: Duration,
            /// Action to dispatch when the timer fires
            action: Box<Action>,
        },

        /// Cancel the pending timer with this id, if any
        ///
        /// The timer's action is dropped; state owned by the reducer is not
        /// touched.
        Cancel(TimerId),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Schedule {
                    id,
                    duration,
                    action,
                } => f
                    .debug_struct("Effect::Schedule")
                    .field("id", id)
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Whether this effect does nothing
        #[must_use]
        pub fn is_none(&self) -> bool {
            match self {
                Effect::None => true,
                Effect::Parallel(effects) => effects.iter().all(Effect::is_none),
                _ => false,
            }
        }

        /// The timer id this effect schedules, if it is a `Schedule`
        #[must_use]
        pub const fn scheduled_timer(&self) -> Option<(TimerId, Duration)> {
            match self {
                Effect::Schedule { id, duration, .. } => Some((*id, *duration)),
                _ => None,
            }
        }

        /// The timer id this effect cancels, if it is a `Cancel`
        #[must_use]
        pub const fn cancelled_timer(&self) -> Option<TimerId> {
            match self {
                Effect::Cancel(id) => Some(*id),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by `Utc::now()`
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
