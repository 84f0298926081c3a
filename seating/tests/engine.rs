//! End-to-end tests: the seating reducer inside a `Store`, talking to the
//! in-memory booking service under paused tokio time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use box_office_runtime::Store;
use box_office_seating::{
    ClassId, InMemoryBookingService, SeatId, SeatMap, SeatStatus, SeatStatusSnapshot, SeatingAction,
    SeatingEnvironment, SeatingReducer, SeatingState, ShowKey, TimingConfig,
};
use box_office_testing::test_clock;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

// ============================================================================
// Fixtures
// ============================================================================

const HALL: &str = r#"{
  "classes": [
    {
      "id": "ST",
      "rows": [
        { "label": "ST-A", "slots": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10] },
        { "label": "ST-B", "slots": [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24] }
      ]
    }
  ]
}"#;

type SeatingStore = Store<SeatingState, SeatingAction, SeatingEnvironment, SeatingReducer>;

fn stalls() -> ClassId {
    ClassId::new("ST")
}

fn seat(label: &str) -> SeatId {
    SeatId::from(label)
}

fn show() -> ShowKey {
    ShowKey::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), "evening")
}

fn store_with(service: &InMemoryBookingService) -> SeatingStore {
    let timing = TimingConfig::default();
    let map = Arc::new(SeatMap::from_json(HALL).unwrap());
    let env = SeatingEnvironment::new(Arc::new(test_clock()), Arc::new(service.clone()), show(), timing);
    Store::new(SeatingState::new(map, &timing), SeatingReducer::new(), env)
}

async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

// ============================================================================
// Flushing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn writes_flush_after_the_debounce() {
    let service = InMemoryBookingService::new();
    let store = store_with(&service);

    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    advance(300).await;
    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();

    // The second write restarted the quiet period.
    advance(499).await;
    assert!(service.batch_calls().is_empty());

    advance(2).await;
    store.settle().await;
    let calls = service.batch_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, SeatStatus::Selected);
    assert_eq!(calls[0].seats, vec![seat("ST-A-4"), seat("ST-A-5")]);
    assert!(store.state(|s| s.sync.is_empty() && !s.sync.in_flight()).await);
}

#[tokio::test(start_paused = true)]
async fn full_buffer_flushes_after_the_grace_delay() {
    let service = InMemoryBookingService::new();
    let store = store_with(&service);

    store.send(SeatingAction::SetBmsMode { enabled: true }).await.unwrap();
    for number in 1..=20 {
        store
            .send(SeatingAction::ActivateSeat {
                seat: SeatId::new("ST-B", number),
            })
            .await
            .unwrap();
    }

    advance(51).await;
    store.settle().await;
    let calls = service.batch_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].status, SeatStatus::BmsBooked);
    assert_eq!(calls[0].seats.len(), 20);
    assert_eq!(service.snapshot().bms_seats.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn one_flight_at_a_time() {
    let service = InMemoryBookingService::new().with_latency(Duration::from_millis(1_000));
    let store = store_with(&service);

    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    advance(501).await;
    assert!(store.state(|s| s.sync.in_flight()).await);

    // Written while the first flight is out; it waits in the buffer.
    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    advance(600).await;
    assert!(service.batch_calls().is_empty());
    assert_eq!(store.state(|s| s.sync.len()).await, 1);

    // The first flight lands at 1.5s; the follow-up debounces from there.
    advance(500).await;
    assert_eq!(service.batch_calls().len(), 1);
    assert!(!store.state(|s| s.sync.in_flight()).await);

    advance(1_500).await;
    store.settle().await;
    let calls = service.batch_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].seats, vec![seat("ST-A-4")]);
}

#[tokio::test(start_paused = true)]
async fn failed_batch_rolls_the_seats_back() {
    let service = InMemoryBookingService::new();
    service.fail_batches_for(SeatStatus::Selected, true);
    let store = store_with(&service);

    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    advance(501).await;
    store.settle().await;

    assert_eq!(service.batch_calls().len(), 1);
    assert_eq!(store.state(|s| s.selected_count(&stalls())).await, 0);
    assert_eq!(
        store.state(|s| s.status_of(&seat("ST-A-4"))).await,
        Some(SeatStatus::Available)
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_drains_without_waiting_for_timers() {
    let service = InMemoryBookingService::new();
    let store = store_with(&service);

    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    store.send(SeatingAction::Teardown).await.unwrap();
    assert_ok!(store.shutdown(Duration::from_millis(100)).await);

    assert_eq!(service.batch_calls().len(), 1);
    assert_eq!(store.pending_timers(), 0);
    assert_err!(store.send(SeatingAction::AddSeat { class: stalls() }).await);
}

// ============================================================================
// Move mode
// ============================================================================

#[tokio::test(start_paused = true)]
async fn single_activation_moves_the_block_in_one_request() {
    let service = InMemoryBookingService::new();
    let store = store_with(&service);

    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    store.send(SeatingAction::ActivateSeat { seat: seat("ST-A-8") }).await.unwrap();

    advance(301).await;
    store.settle().await;
    assert_eq!(
        store.state(|s| s.current_selection(&stalls())).await,
        vec![seat("ST-A-8"), seat("ST-A-9")]
    );

    // The debounce timer finds nothing left to flush.
    advance(500).await;
    store.settle().await;
    assert!(service.batch_calls().is_empty());

    let moves = service.move_calls();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0].updates.len(), 4);
    assert_eq!(moves[0].show, "evening");
    assert_eq!(service.snapshot().selected_seats, vec![seat("ST-A-8"), seat("ST-A-9")]);
}

#[tokio::test(start_paused = true)]
async fn refused_move_restores_the_block() {
    let service = InMemoryBookingService::new();
    service.fail_moves(true);
    let store = store_with(&service);

    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    store.send(SeatingAction::ActivateSeat { seat: seat("ST-A-8") }).await.unwrap();
    advance(301).await;
    store.settle().await;

    assert_eq!(
        store.state(|s| s.current_selection(&stalls())).await,
        vec![seat("ST-A-4"), seat("ST-A-5")]
    );
    assert!(store.state(|s| s.relocation.is_active()).await);

    // The restored block is written back through the buffer.
    advance(500).await;
    store.settle().await;
    assert_eq!(service.batch_calls().len(), 2);
    assert_eq!(service.snapshot().selected_seats, vec![seat("ST-A-4"), seat("ST-A-5")]);
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn refresh_applies_the_remote_snapshot() {
    let service = InMemoryBookingService::with_snapshot(SeatStatusSnapshot {
        booked_seats: vec![seat("ST-A-5"), seat("ST-A-6")],
        bms_seats: vec![seat("ST-B-1")],
        selected_seats: vec![seat("ST-A-1")],
    });
    let store = store_with(&service);
    let mut actions = store.subscribe_actions();

    store.send(SeatingAction::Refresh).await.unwrap();
    store.settle().await;

    assert!(matches!(actions.try_recv(), Ok(SeatingAction::SnapshotLoaded { .. })));
    assert_eq!(
        store.state(|s| s.status_of(&seat("ST-A-5"))).await,
        Some(SeatStatus::Booked)
    );
    assert_eq!(
        store.state(|s| s.status_of(&seat("ST-A-1"))).await,
        Some(SeatStatus::Blocked)
    );

    // A fresh selection now starts beside the sold seats.
    store.send(SeatingAction::AddSeat { class: stalls() }).await.unwrap();
    assert_eq!(
        store.state(|s| s.current_selection(&stalls())).await,
        vec![seat("ST-A-4")]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_changes_nothing() {
    let service = InMemoryBookingService::new();
    service.fail_fetch(true);
    let store = store_with(&service);
    let mut actions = store.subscribe_actions();

    store.send(SeatingAction::Refresh).await.unwrap();
    store.settle().await;

    assert!(matches!(actions.try_recv(), Ok(SeatingAction::SnapshotFailed { .. })));
    assert_eq!(service.fetch_calls(), 1);
    assert_eq!(
        store.state(|s| s.status_of(&seat("ST-A-5"))).await,
        Some(SeatStatus::Available)
    );
}
