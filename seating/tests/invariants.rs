//! Property tests: random box-office sessions never leave a class with a
//! fragmented selection.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use box_office_core::effect::Effect;
use box_office_core::reducer::Reducer;
use box_office_seating::contiguity::is_contiguous;
use box_office_seating::{
    ACTIVATION_TIMER, ClassId, FLUSH_TIMER, InMemoryBookingService, MoveMode, SeatId, SeatMap, SeatStatus,
    SeatingAction, SeatingEnvironment, SeatingReducer, SeatingState, ShowKey, TimingConfig,
};
use box_office_testing::test_clock;
use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;

const HALL: &str = r#"{
  "classes": [
    {
      "id": "ST",
      "rows": [
        { "label": "ST-A", "slots": [1, 2, 3, 4, "gap", 5, 6, 7, 8] },
        { "label": "ST-B", "slots": [1, 2, 3, 4, 5, 6, 7, 8], "blocked": [4] }
      ]
    },
    { "id": "SC", "rows": [ { "label": "SC-A", "slots": [1, 2, 3, 4, 5, 6] } ] }
  ]
}"#;

const ROWS: [&str; 3] = ["ST-A", "ST-B", "SC-A"];

#[derive(Debug, Clone)]
enum Step {
    Add(usize),
    Press(usize, u16),
    WindowCloses,
    FlushFires,
    Bms(bool),
    Commit,
    Clear,
    CancelMove,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => (0..2usize).prop_map(Step::Add),
        4 => (0..3usize, 1..=8u16).prop_map(|(row, number)| Step::Press(row, number)),
        3 => Just(Step::WindowCloses),
        1 => Just(Step::FlushFires),
        1 => any::<bool>().prop_map(Step::Bms),
        1 => Just(Step::Commit),
        1 => Just(Step::Clear),
        1 => Just(Step::CancelMove),
    ]
}

struct Session {
    reducer: SeatingReducer,
    state: SeatingState,
    env: SeatingEnvironment,
    window: Option<SeatingAction>,
    flush: Option<SeatingAction>,
}

impl Session {
    fn new() -> Self {
        let timing = TimingConfig::default();
        let map = Arc::new(SeatMap::from_json(HALL).unwrap());
        Self {
            reducer: SeatingReducer::new(),
            state: SeatingState::new(map, &timing),
            env: SeatingEnvironment::new(
                Arc::new(test_clock()),
                Arc::new(InMemoryBookingService::new()),
                ShowKey::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), "evening"),
                timing,
            ),
            window: None,
            flush: None,
        }
    }

    /// Reduce one action and keep the latest pending timer per id, the way the
    /// store's keyed timer table would.
    fn reduce(&mut self, action: SeatingAction) {
        for effect in self.reducer.reduce(&mut self.state, action, &self.env) {
            match effect {
                Effect::Schedule { id, action, .. } if id == ACTIVATION_TIMER => self.window = Some(*action),
                Effect::Schedule { id, action, .. } if id == FLUSH_TIMER => self.flush = Some(*action),
                Effect::Cancel(id) if id == ACTIVATION_TIMER => self.window = None,
                Effect::Cancel(id) if id == FLUSH_TIMER => self.flush = None,
                _ => {},
            }
        }
    }

    fn apply(&mut self, step: Step) {
        let classes = [ClassId::new("ST"), ClassId::new("SC")];
        match step {
            Step::Add(class) => self.reduce(SeatingAction::AddSeat {
                class: classes[class].clone(),
            }),
            Step::Press(row, number) => self.reduce(SeatingAction::ActivateSeat {
                seat: SeatId::new(ROWS[row], number),
            }),
            Step::WindowCloses => {
                if let Some(action) = self.window.take() {
                    self.reduce(action);
                }
            },
            Step::FlushFires => {
                if let Some(action) = self.flush.take() {
                    self.reduce(action);
                }
            },
            Step::Bms(enabled) => self.reduce(SeatingAction::SetBmsMode { enabled }),
            Step::Commit => self.reduce(SeatingAction::CommitSelection { class: None }),
            Step::Clear => self.reduce(SeatingAction::ClearSelection { class: None }),
            Step::CancelMove => self.reduce(SeatingAction::CancelMove),
        }
    }

    fn check(&self) {
        let registry = &self.state.registry;
        let map = registry.map();
        assert!(registry.fragmented_classes().is_empty());

        for class in map.classes() {
            let keys = registry.selected_keys(class.id());
            let Some(first) = keys.first() else {
                continue;
            };
            assert!(keys.iter().all(|key| key.row == first.row), "selection spans rows");
            let numbers: Vec<_> = keys.iter().map(|key| key.number).collect();
            assert!(is_contiguous(map.row(first.row).unwrap(), &numbers), "selection crosses a gap");
        }

        for key in map.blocked_seats() {
            assert_eq!(registry.status(*key), Some(SeatStatus::Blocked));
        }

        if let MoveMode::Active { class, len } = self.state.relocation.mode() {
            assert_eq!(registry.selected_count(class), *len);
            assert!(*len > 1);
        }
    }
}

proptest! {
    #[test]
    fn selections_stay_one_block(steps in proptest::collection::vec(step(), 1..60)) {
        let mut session = Session::new();
        for step in steps {
            session.apply(step);
            session.check();
        }
    }
}
