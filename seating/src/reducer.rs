//! The seating reducer: every interaction, timer and remote result of one
//! box-office session goes through [`SeatingReducer::reduce`].
//!
//! The reducer owns no I/O. Timers come back as
//! [`SeatingAction::ActivationWindowElapsed`] and
//! [`SeatingAction::FlushTimerFired`]; booking service calls come back as
//! [`SeatingAction::BatchPersisted`], [`SeatingAction::MovePersisted`] and
//! [`SeatingAction::SnapshotLoaded`].
//!
//! Every status change destined for the booking service is applied to the
//! registry first and queued in the [`SyncBatcher`] second, except
//! relocations, which are persisted as one move request.

use crate::config::{ScoringWeights, TimingConfig};
use crate::error::{Rejection, ServiceError};
use crate::metrics::{ALLOCATIONS, REJECTIONS, RELOCATIONS, SELECTED_SEATS, SYNC_FLUSHES, SYNC_ROLLBACKS};
use crate::planner::{AllocationPlanner, PlanContext};
use crate::reconcile::plan_reconciliation;
use crate::registry::{SeatChangeSet, SeatRegistry};
use crate::relocation::{
    Activation, MoveMode, Relocation, RelocationController, can_add, deselection, plan_relocation,
};
use crate::scoring::ScoringFunction;
use crate::seat_map::SeatMap;
use crate::service::{BookingService, SeatStatusSnapshot, SeatUpdate};
use crate::sync::{FlushBatch, FlushTimer, NextFlush, SyncBatcher};
use crate::types::{ClassId, SeatId, SeatKey, SeatStatus, ShowKey};
use box_office_core::effect::{Effect, TimerId};
use box_office_core::environment::Clock;
use box_office_core::reducer::Reducer;
use box_office_core::{async_effect, cancel, schedule};
use smallvec::{SmallVec, smallvec};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Timer disambiguating single from double seat activations
pub const ACTIVATION_TIMER: TimerId = TimerId::new("relocation.activation");

/// Timer flushing buffered status writes
pub const FLUSH_TIMER: TimerId = TimerId::new("sync.flush");

type Effects = SmallVec<[Effect<SeatingAction>; 4]>;

// ============================================================================
// Actions
// ============================================================================

/// Inputs of the seating engine
#[derive(Clone, Debug)]
pub enum SeatingAction {
    // Commands
    /// Grow the selection of a class by one seat
    AddSeat {
        /// Class interacted with
        class: ClassId,
    },

    /// A seat was activated (clicked)
    ActivateSeat {
        /// Seat activated
        seat: SeatId,
    },

    /// Leave move mode without changing any seat
    CancelMove,

    /// Switch BMS marking mode
    SetBmsMode {
        /// Whether activations mark seats as sold through the external channel
        enabled: bool,
    },

    /// Book the selected seats of one class, or of every class
    CommitSelection {
        /// Class to commit; every class when `None`
        class: Option<ClassId>,
    },

    /// Release the selected seats of one class, or of every class
    ClearSelection {
        /// Class to clear; every class when `None`
        class: Option<ClassId>,
    },

    /// Fetch the remote status of the current show
    Refresh,

    /// End the session: flush everything, cancel every timer
    Teardown,

    // Timer deliveries
    /// The disambiguation window of a seat activation closed
    ActivationWindowElapsed {
        /// Seat activated
        seat: SeatId,
        /// Window token
        token: u64,
    },

    /// The flush timer fired
    FlushTimerFired {
        /// Timer token
        token: u64,
    },

    // Remote results
    /// A status batch call completed
    BatchPersisted {
        /// Flush generation
        generation: u64,
        /// Status of the group
        status: SeatStatus,
        /// Call outcome
        result: Result<(), ServiceError>,
    },

    /// A move request completed
    MovePersisted {
        /// The relocation that was sent
        relocation: Relocation,
        /// Call outcome
        result: Result<(), ServiceError>,
    },

    /// A remote snapshot arrived
    SnapshotLoaded {
        /// Remote statuses
        snapshot: SeatStatusSnapshot,
    },

    /// Fetching the remote snapshot failed
    SnapshotFailed {
        /// Failure
        error: ServiceError,
    },
}

// ============================================================================
// State
// ============================================================================

/// State of one box-office session
#[derive(Debug, Clone)]
pub struct SeatingState {
    /// Seat statuses and selections
    pub registry: SeatRegistry,
    /// Move mode and activation gate
    pub relocation: RelocationController,
    /// Buffered writes
    pub sync: SyncBatcher,
    /// Whether BMS marking mode is on
    pub bms_mode: bool,
    /// Rejection of the most recent interaction, cleared by the next success
    pub last_rejection: Option<Rejection>,
    /// Set by teardown; commands are ignored afterwards
    pub closed: bool,
}

impl SeatingState {
    /// Fresh session over `map`
    #[must_use]
    pub fn new(map: Arc<SeatMap>, timing: &TimingConfig) -> Self {
        Self {
            registry: SeatRegistry::new(map),
            relocation: RelocationController::new(),
            sync: SyncBatcher::new(timing.batch_threshold),
            bms_mode: false,
            last_rejection: None,
            closed: false,
        }
    }

    /// Selected seats of `class`, in slot order
    #[must_use]
    pub fn current_selection(&self, class: &ClassId) -> Vec<SeatId> {
        let map = self.registry.map();
        self.registry
            .selected_keys(class)
            .into_iter()
            .filter_map(|key| map.seat_id(key))
            .collect()
    }

    /// Selected seats of every class that has any
    #[must_use]
    pub fn current_selections(&self) -> BTreeMap<ClassId, Vec<SeatId>> {
        self.registry
            .map()
            .classes()
            .iter()
            .map(|class| (class.id().clone(), self.current_selection(class.id())))
            .filter(|(_, seats)| !seats.is_empty())
            .collect()
    }

    /// Number of selected seats in `class`
    #[must_use]
    pub fn selected_count(&self, class: &ClassId) -> usize {
        self.registry.selected_count(class)
    }

    /// Status of seat `seat`
    #[must_use]
    pub fn status_of(&self, seat: &SeatId) -> Option<SeatStatus> {
        self.registry.status_of(seat)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Collaborators of the seating reducer
#[derive(Clone)]
pub struct SeatingEnvironment {
    /// Clock for the activation window
    pub clock: Arc<dyn Clock>,
    /// Remote booking service
    pub service: Arc<dyn BookingService>,
    /// The performance being sold
    pub show: ShowKey,
    /// Timer and batching settings
    pub timing: TimingConfig,
}

impl SeatingEnvironment {
    /// Create an environment
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        service: Arc<dyn BookingService>,
        show: ShowKey,
        timing: TimingConfig,
    ) -> Self {
        Self {
            clock,
            service,
            show,
            timing,
        }
    }

    fn activation_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.timing.activation_window()).unwrap_or(chrono::Duration::MAX)
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer of the seating engine
#[derive(Debug, Clone, Default)]
pub struct SeatingReducer {
    planner: Arc<AllocationPlanner>,
    scoring: ScoringFunction,
}

impl SeatingReducer {
    /// Reducer with the default strategies and weights
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reducer scoring blocks with `weights`
    #[must_use]
    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self {
            planner: Arc::new(AllocationPlanner::default()),
            scoring: ScoringFunction::new(weights),
        }
    }

    /// Replace the planner
    #[must_use]
    pub fn with_planner(mut self, planner: AllocationPlanner) -> Self {
        self.planner = Arc::new(planner);
        self
    }

    // ------------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------------

    fn add_seat(&self, state: &mut SeatingState, env: &SeatingEnvironment, class: &ClassId) -> Effects {
        let ctx = PlanContext::new(&state.registry, &self.scoring);
        let plan = match self.planner.plan(&ctx, class) {
            Ok(plan) => plan,
            Err(rejection) => return Self::reject(state, rejection),
        };

        match state.registry.apply_plan(&plan) {
            Ok(changes) => {
                metrics::counter!(ALLOCATIONS, "phase" => plan.phase.as_str()).increment(1);
                state.last_rejection = None;
                let mut effects = Effects::new();
                Self::queue_changes(state, env, changes.as_ref(), &mut effects);
                Self::after_selection_change(state, [class.clone()]);
                effects
            },
            Err(rejection) => Self::reject(state, rejection),
        }
    }

    fn activate_seat(state: &mut SeatingState, env: &SeatingEnvironment, seat: SeatId) -> Effects {
        let Some(key) = state.registry.map().locate(&seat) else {
            return Self::reject(state, Rejection::UnknownSeat(seat));
        };
        let status = state.registry.status(key);

        if state.bms_mode {
            return Self::toggle_bms(state, env, key, seat);
        }
        if !matches!(status, Some(SeatStatus::Available | SeatStatus::Selected)) {
            return Self::reject(state, Rejection::NotInteractive(seat));
        }

        // Outside move mode there is nothing to disambiguate.
        if !state.relocation.is_active() {
            let mut effects = Effects::new();
            if state.relocation.clear_gate() {
                effects.push(cancel!(ACTIVATION_TIMER));
            }
            effects.extend(Self::resolve_activation(state, env, Activation::Single(seat)));
            return effects;
        }

        let press = state
            .relocation
            .press(seat.clone(), env.clock.now(), env.activation_window());

        let mut effects = Effects::new();
        if press.cancel_timer {
            effects.push(cancel!(ACTIVATION_TIMER));
        }
        if let Some(token) = press.armed {
            effects.push(schedule! {
                id: ACTIVATION_TIMER,
                after: env.timing.activation_window(),
                action: SeatingAction::ActivationWindowElapsed { seat, token }
            });
        }
        if let Some(activation) = press.resolved {
            effects.extend(Self::resolve_activation(state, env, activation));
        }
        effects
    }

    fn resolve_activation(state: &mut SeatingState, env: &SeatingEnvironment, activation: Activation) -> Effects {
        let (seat, double) = match activation {
            Activation::Single(seat) => (seat, false),
            Activation::Double(seat) => (seat, true),
        };
        let map = state.registry.map();
        let Some((key, class)) = map
            .locate(&seat)
            .and_then(|key| Some((key, map.row(key.row)?.class().clone())))
        else {
            return Self::reject(state, Rejection::UnknownSeat(seat));
        };

        match state.registry.status(key) {
            Some(SeatStatus::Selected) => Self::deselect(state, env, &class, key),
            Some(SeatStatus::Available) => match state.relocation.mode().clone() {
                MoveMode::Active { class: active, len } if !double => {
                    Self::relocate(state, env, &active, len, &seat)
                },
                _ => Self::manual_add(state, env, &class, key, seat),
            },
            // Taken by reconciliation while the window was open.
            _ => Self::reject(state, Rejection::NotInteractive(seat)),
        }
    }

    fn manual_add(
        state: &mut SeatingState,
        env: &SeatingEnvironment,
        class: &ClassId,
        key: SeatKey,
        seat: SeatId,
    ) -> Effects {
        if !can_add(&state.registry, class, key) {
            return Self::reject(state, Rejection::NotInteractive(seat));
        }
        Self::apply_transition(state, env, &[(key, SeatStatus::Selected)], false, class)
    }

    fn deselect(state: &mut SeatingState, env: &SeatingEnvironment, class: &ClassId, key: SeatKey) -> Effects {
        let numbers = match state.registry.selection(class) {
            Some(block) if block.row == key.row => deselection(block, key.number),
            _ => vec![key.number],
        };
        let changes: Vec<_> = numbers
            .into_iter()
            .map(|number| (SeatKey::new(key.row, number), SeatStatus::Available))
            .collect();
        Self::apply_transition(state, env, &changes, false, class)
    }

    fn toggle_bms(state: &mut SeatingState, env: &SeatingEnvironment, key: SeatKey, seat: SeatId) -> Effects {
        let target = match state.registry.status(key) {
            Some(SeatStatus::BmsBooked) => SeatStatus::Available,
            Some(SeatStatus::Available) => SeatStatus::BmsBooked,
            // Held seats are released through checkout, never marked.
            _ => return Self::reject(state, Rejection::NotInteractive(seat)),
        };
        let Some(class) = state.registry.map().class_of(&seat).cloned() else {
            return Self::reject(state, Rejection::UnknownSeat(seat));
        };
        tracing::debug!(seat = %seat, status = %target, "BMS mark");
        Self::apply_transition(state, env, &[(key, target)], true, &class)
    }

    fn apply_transition(
        state: &mut SeatingState,
        env: &SeatingEnvironment,
        changes: &[(SeatKey, SeatStatus)],
        bms_mode: bool,
        class: &ClassId,
    ) -> Effects {
        match state.registry.transition(changes, bms_mode) {
            Ok(change_set) => {
                state.last_rejection = None;
                let mut effects = Effects::new();
                Self::queue_changes(state, env, change_set.as_ref(), &mut effects);
                Self::after_selection_change(state, [class.clone()]);
                effects
            },
            Err(rejection) => Self::reject(state, rejection),
        }
    }

    // ------------------------------------------------------------------------
    // Move mode
    // ------------------------------------------------------------------------

    fn relocate(
        state: &mut SeatingState,
        env: &SeatingEnvironment,
        class: &ClassId,
        len: usize,
        seat: &SeatId,
    ) -> Effects {
        let relocation = match plan_relocation(&state.registry, class, len, seat) {
            Ok(relocation) => relocation,
            Err(rejection) => return Self::reject(state, rejection),
        };

        let changes: Vec<_> = relocation
            .from
            .keys()
            .map(|key| (key, SeatStatus::Available))
            .chain(relocation.to.keys().map(|key| (key, SeatStatus::Selected)))
            .collect();
        let change_set = match state.registry.transition(&changes, false) {
            Ok(Some(change_set)) => change_set,
            Ok(None) => return SmallVec::new(),
            Err(rejection) => return Self::reject(state, rejection),
        };

        state.last_rejection = None;
        state.sync.drop_seats(change_set.changes.iter().map(|change| &change.seat));
        state.relocation.deactivate();
        Self::record_selected(state);

        metrics::counter!(RELOCATIONS).increment(1);
        tracing::info!(
            class = %class,
            from_row = relocation.from.row,
            to_row = relocation.to.row,
            seats = len,
            "Block relocated"
        );

        let updates: Vec<SeatUpdate> = change_set
            .changes
            .iter()
            .map(|change| SeatUpdate {
                seat_id: change.seat.clone(),
                status: change.to,
            })
            .collect();
        let service = Arc::clone(&env.service);
        let show = env.show.clone();
        smallvec![async_effect! {
            let result = service.persist_seat_move(updates, show.date, show.show).await;
            Some(SeatingAction::MovePersisted { relocation, result })
        }]
    }

    fn move_persisted(
        state: &mut SeatingState,
        env: &SeatingEnvironment,
        relocation: &Relocation,
        result: Result<(), ServiceError>,
    ) -> Effects {
        let Err(error) = result else {
            tracing::debug!(class = %relocation.class, "Move persisted");
            return SmallVec::new();
        };

        let registry = &state.registry;
        let unchanged = relocation
            .to
            .keys()
            .all(|key| registry.status(key) == Some(SeatStatus::Selected))
            && relocation.from.keys().all(|key| registry.is_available(key));
        if !unchanged {
            tracing::warn!(class = %relocation.class, %error, "Move failed; seats changed since, not rolled back");
            return SmallVec::new();
        }

        let restore: Vec<_> = relocation
            .to
            .keys()
            .map(|key| (key, SeatStatus::Available))
            .chain(relocation.from.keys().map(|key| (key, SeatStatus::Selected)))
            .collect();
        let change_set = state.registry.overwrite(&restore);
        metrics::counter!(SYNC_ROLLBACKS).increment(restore.len() as u64);
        tracing::warn!(class = %relocation.class, %error, "Move failed; block restored");

        // The original block's writes were dropped when the move was sent.
        let mut effects = Effects::new();
        Self::queue_changes(state, env, change_set.as_ref(), &mut effects);
        Self::after_selection_change(state, [relocation.class.clone()]);
        effects
    }

    // ------------------------------------------------------------------------
    // Checkout
    // ------------------------------------------------------------------------

    fn target_classes(state: &SeatingState, class: Option<ClassId>) -> Vec<ClassId> {
        class.map_or_else(
            || {
                state
                    .registry
                    .map()
                    .classes()
                    .iter()
                    .map(|class| class.id().clone())
                    .collect()
            },
            |class| vec![class],
        )
    }

    fn selected_of(state: &SeatingState, classes: &[ClassId]) -> Vec<SeatKey> {
        classes
            .iter()
            .flat_map(|class| state.registry.selected_keys(class))
            .collect()
    }

    fn commit_selection(state: &mut SeatingState, class: Option<ClassId>) -> Effects {
        let classes = Self::target_classes(state, class);
        let changes: Vec<_> = Self::selected_of(state, &classes)
            .into_iter()
            .map(|key| (key, SeatStatus::Booked))
            .collect();

        match state.registry.transition(&changes, false) {
            Ok(Some(change_set)) => {
                state.last_rejection = None;
                state.sync.drop_seats(change_set.changes.iter().map(|change| &change.seat));
                state.relocation.deactivate();
                Self::record_selected(state);
                tracing::info!(seats = change_set.changes.len(), "Selection committed");
            },
            Ok(None) => tracing::debug!("Nothing selected to commit"),
            Err(rejection) => return Self::reject(state, rejection),
        }
        SmallVec::new()
    }

    fn clear_selection(state: &mut SeatingState, env: &SeatingEnvironment, class: Option<ClassId>) -> Effects {
        let classes = Self::target_classes(state, class);
        let changes: Vec<_> = Self::selected_of(state, &classes)
            .into_iter()
            .map(|key| (key, SeatStatus::Available))
            .collect();

        match state.registry.transition(&changes, false) {
            Ok(change_set) => {
                let mut effects = Effects::new();
                Self::queue_changes(state, env, change_set.as_ref(), &mut effects);
                Self::after_selection_change(state, classes);
                effects
            },
            Err(rejection) => Self::reject(state, rejection),
        }
    }

    // ------------------------------------------------------------------------
    // Synchronisation
    // ------------------------------------------------------------------------

    fn queue_changes(
        state: &mut SeatingState,
        env: &SeatingEnvironment,
        change_set: Option<&SeatChangeSet>,
        effects: &mut Effects,
    ) {
        let Some(change_set) = change_set else {
            return;
        };
        let mut timer = None;
        for change in &change_set.changes {
            if let Some(armed) = state.sync.queue(change.seat.clone(), change.from, change.to) {
                timer = Some(armed);
            }
        }
        if let Some(timer) = timer {
            effects.push(Self::schedule_flush(env, timer));
        }
    }

    fn schedule_flush(env: &SeatingEnvironment, timer: FlushTimer) -> Effect<SeatingAction> {
        let duration = match timer {
            FlushTimer::Debounce { .. } => env.timing.debounce(),
            FlushTimer::Grace { .. } => env.timing.grace(),
        };
        schedule! {
            id: FLUSH_TIMER,
            after: duration,
            action: SeatingAction::FlushTimerFired { token: timer.token() }
        }
    }

    fn flush(env: &SeatingEnvironment, batch: FlushBatch, effects: &mut Effects) {
        tracing::debug!(
            generation = batch.generation,
            seats = batch.seat_count(),
            groups = batch.groups.len(),
            "Flushing buffered writes"
        );
        let generation = batch.generation;
        for (status, seats) in batch.groups {
            let service = Arc::clone(&env.service);
            effects.push(async_effect! {
                let result = service.persist_seat_status_batch(seats, status).await;
                Some(SeatingAction::BatchPersisted {
                    generation,
                    status,
                    result,
                })
            });
        }
    }

    fn batch_persisted(
        state: &mut SeatingState,
        env: &SeatingEnvironment,
        generation: u64,
        status: SeatStatus,
        result: &Result<(), ServiceError>,
    ) -> Effects {
        let resolution = state.sync.resolve(generation, status, result.is_ok());
        let mut effects = Effects::new();

        match result {
            Ok(()) => {
                metrics::counter!(SYNC_FLUSHES, "status" => "ok").increment(1);
                tracing::debug!(generation, %status, "Batch persisted");
            },
            Err(error) => {
                metrics::counter!(SYNC_FLUSHES, "status" => "error").increment(1);
                let map = state.registry.map();
                let registry = &state.registry;
                let restore: Vec<_> = resolution
                    .rollbacks
                    .iter()
                    .filter_map(|rollback| {
                        let key = map.locate(&rollback.seat)?;
                        (registry.status(key) == Some(rollback.expected)).then_some((key, rollback.restore))
                    })
                    .collect();
                tracing::warn!(
                    generation,
                    %status,
                    %error,
                    seats = restore.len(),
                    "Batch write failed; rolling back"
                );
                if let Some(change_set) = state.registry.overwrite(&restore) {
                    metrics::counter!(SYNC_ROLLBACKS).increment(change_set.changes.len() as u64);
                    let classes = Self::classes_of(&state.registry, &change_set);
                    Self::repair_fragmented(state, env, &mut effects);
                    Self::after_selection_change(state, classes);
                }
            },
        }

        match resolution.next {
            NextFlush::Idle => {},
            NextFlush::Schedule(_) if state.closed => {
                if let Some(batch) = state.sync.drain() {
                    Self::flush(env, batch, &mut effects);
                }
            },
            NextFlush::Schedule(timer) => effects.push(Self::schedule_flush(env, timer)),
            NextFlush::Now(batch) => Self::flush(env, batch, &mut effects),
        }
        effects
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    fn snapshot_loaded(state: &mut SeatingState, env: &SeatingEnvironment, snapshot: &SeatStatusSnapshot) -> Effects {
        let plan = plan_reconciliation(&state.registry, snapshot, |seat| state.sync.is_pending(seat));
        if plan.is_empty() {
            tracing::debug!(skipped_pending = plan.skipped_pending, "Snapshot matches local state");
            return SmallVec::new();
        }

        let mut effects = Effects::new();
        let Some(change_set) = state.registry.overwrite(&plan.overwrites) else {
            return effects;
        };
        for change in &change_set.changes {
            tracing::debug!(seat = %change.seat, from = %change.from, to = %change.to, "Remote status applied");
        }

        let mut timer = None;
        for seat in plan.released {
            if let Some(armed) = state.sync.queue(seat, SeatStatus::Selected, SeatStatus::Available) {
                timer = Some(armed);
            }
        }
        if let Some(timer) = timer {
            effects.push(Self::schedule_flush(env, timer));
        }

        let classes = Self::classes_of(&state.registry, &change_set);
        Self::repair_fragmented(state, env, &mut effects);
        Self::after_selection_change(state, classes);
        effects
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    fn set_bms_mode(state: &mut SeatingState, enabled: bool) -> Effects {
        if state.bms_mode == enabled {
            return SmallVec::new();
        }
        state.bms_mode = enabled;
        tracing::info!(enabled, "BMS marking mode");

        if enabled {
            state.relocation.deactivate();
            state.relocation.clear_gate();
            return smallvec![cancel!(ACTIVATION_TIMER)];
        }
        let classes: Vec<_> = state.registry.selections().map(|(class, _)| class.clone()).collect();
        Self::after_selection_change(state, classes);
        SmallVec::new()
    }

    fn teardown(state: &mut SeatingState, env: &SeatingEnvironment) -> Effects {
        state.closed = true;
        state.relocation.deactivate();
        state.relocation.clear_gate();
        tracing::info!(pending = state.sync.len(), "Session teardown");

        let mut effects: Effects = smallvec![cancel!(ACTIVATION_TIMER), cancel!(FLUSH_TIMER)];
        if let Some(batch) = state.sync.drain() {
            Self::flush(env, batch, &mut effects);
        }
        effects
    }

    // ------------------------------------------------------------------------
    // Shared
    // ------------------------------------------------------------------------

    fn reject(state: &mut SeatingState, rejection: Rejection) -> Effects {
        tracing::debug!(reason = rejection.reason(), "{rejection}");
        metrics::counter!(REJECTIONS, "reason" => rejection.reason()).increment(1);
        state.last_rejection = Some(rejection);
        SmallVec::new()
    }

    fn classes_of(registry: &SeatRegistry, change_set: &SeatChangeSet) -> BTreeSet<ClassId> {
        change_set
            .changes
            .iter()
            .filter_map(|change| registry.map().class_of(&change.seat).cloned())
            .collect()
    }

    /// Release every class whose selection stopped being one block.
    fn repair_fragmented(state: &mut SeatingState, env: &SeatingEnvironment, effects: &mut Effects) {
        let fragmented: Vec<ClassId> = state.registry.fragmented_classes().iter().cloned().collect();
        for class in fragmented {
            let release: Vec<_> = state
                .registry
                .selected_keys(&class)
                .into_iter()
                .map(|key| (key, SeatStatus::Available))
                .collect();
            tracing::warn!(class = %class, seats = release.len(), "Releasing fragmented selection");
            let change_set = state.registry.overwrite(&release);
            Self::queue_changes(state, env, change_set.as_ref(), effects);
        }
    }

    fn after_selection_change<I>(state: &mut SeatingState, classes: I)
    where
        I: IntoIterator<Item = ClassId>,
    {
        for class in classes {
            state.relocation.sync_mode(&state.registry, &class, state.bms_mode);
        }
        Self::record_selected(state);
    }

    fn record_selected(state: &SeatingState) {
        #[allow(clippy::cast_precision_loss)] // seat counts are tiny
        let selected = state.registry.total_selected() as f64;
        metrics::gauge!(SELECTED_SEATS).set(selected);
    }
}

impl Reducer for SeatingReducer {
    type State = SeatingState;
    type Action = SeatingAction;
    type Environment = SeatingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if state.closed && Self::is_command(&action) {
            tracing::debug!("Ignoring command after teardown");
            return SmallVec::new();
        }

        match action {
            // ========== Interactions ==========
            SeatingAction::AddSeat { class } => self.add_seat(state, env, &class),
            SeatingAction::ActivateSeat { seat } => Self::activate_seat(state, env, seat),
            SeatingAction::ActivationWindowElapsed { seat, token } => {
                match state.relocation.window_elapsed(&seat, token) {
                    Some(activation) => Self::resolve_activation(state, env, activation),
                    None => SmallVec::new(),
                }
            },
            SeatingAction::CancelMove => {
                state.relocation.deactivate();
                state.relocation.clear_gate();
                tracing::debug!("Move mode cancelled");
                smallvec![cancel!(ACTIVATION_TIMER)]
            },
            SeatingAction::SetBmsMode { enabled } => Self::set_bms_mode(state, enabled),

            // ========== Checkout ==========
            SeatingAction::CommitSelection { class } => Self::commit_selection(state, class),
            SeatingAction::ClearSelection { class } => Self::clear_selection(state, env, class),

            // ========== Synchronisation ==========
            SeatingAction::FlushTimerFired { token } => {
                let mut effects = Effects::new();
                if let Some(batch) = state.sync.timer_fired(token) {
                    Self::flush(env, batch, &mut effects);
                }
                effects
            },
            SeatingAction::BatchPersisted {
                generation,
                status,
                result,
            } => Self::batch_persisted(state, env, generation, status, &result),
            SeatingAction::MovePersisted { relocation, result } => {
                Self::move_persisted(state, env, &relocation, result)
            },

            // ========== Reconciliation ==========
            SeatingAction::Refresh => {
                let service = Arc::clone(&env.service);
                let show = env.show.clone();
                smallvec![async_effect! {
                    match service.fetch_seat_status(show.date, show.show).await {
                        Ok(snapshot) => Some(SeatingAction::SnapshotLoaded { snapshot }),
                        Err(error) => Some(SeatingAction::SnapshotFailed { error }),
                    }
                }]
            },
            SeatingAction::SnapshotLoaded { snapshot } => Self::snapshot_loaded(state, env, &snapshot),
            SeatingAction::SnapshotFailed { error } => {
                tracing::warn!(%error, show = %env.show, "Seat status refresh failed");
                SmallVec::new()
            },

            // ========== Lifecycle ==========
            SeatingAction::Teardown => Self::teardown(state, env),
        }
    }
}

impl SeatingReducer {
    const fn is_command(action: &SeatingAction) -> bool {
        matches!(
            action,
            SeatingAction::AddSeat { .. }
                | SeatingAction::ActivateSeat { .. }
                | SeatingAction::CancelMove
                | SeatingAction::SetBmsMode { .. }
                | SeatingAction::CommitSelection { .. }
                | SeatingAction::ClearSelection { .. }
                | SeatingAction::Refresh
                | SeatingAction::Teardown
        )
    }
}
