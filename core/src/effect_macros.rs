//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when reducers return timers and remote calls.

/// Create an `Effect::Future` from an async block
///
/// # Example
///
/// ```rust,ignore
/// use box_office_core::async_effect;
///
/// async_effect! {
///     let snapshot = service.fetch_seat_status(date, show).await;
///     Some(SeatingAction::SnapshotLoaded { snapshot })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Schedule` for a keyed, cancellable timer
///
/// # Example
///
/// ```rust,ignore
/// use box_office_core::schedule;
/// use std::time::Duration;
///
/// schedule! {
///     id: FLUSH_TIMER,
///     after: Duration::from_millis(500),
///     action: SeatingAction::FlushTimerFired { token }
/// }
/// ```
#[macro_export]
macro_rules! schedule {
    (
        id: $id:expr,
        after: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Schedule {
            id: $id,
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create an `Effect::Cancel` for a keyed timer
///
/// # Example
///
/// ```rust,ignore
/// use box_office_core::cancel;
///
/// cancel!(ACTIVATION_TIMER)
/// ```
#[macro_export]
macro_rules! cancel {
    ($id:expr) => {
        $crate::effect::Effect::Cancel($id)
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::{Effect, TimerId};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    const TIMER: TimerId = TimerId::new("test.timer");

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_schedule_and_cancel_macros() {
        let effect = schedule! {
            id: TIMER,
            after: Duration::from_millis(300),
            action: TestAction::TimeoutExpired
        };
        assert_eq!(
            effect.scheduled_timer(),
            Some((TIMER, Duration::from_millis(300)))
        );

        let effect: Effect<TestAction> = cancel!(TIMER);
        assert_eq!(effect.cancelled_timer(), Some(TIMER));
    }
}
