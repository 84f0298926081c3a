//! The remote booking service: what the engine reads and writes.
//!
//! The engine only talks to the service through effects built from
//! [`BookingService`], so implementations are swapped via the environment.
//! [`InMemoryBookingService`] is the implementation used by tests and the
//! demo binary.

use crate::error::ServiceError;
use crate::types::{SeatId, SeatStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Remote view of a show, the input of reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatStatusSnapshot {
    /// Seats sold through this box office
    #[serde(default)]
    pub booked_seats: Vec<SeatId>,
    /// Seats sold through the external channel
    #[serde(default)]
    pub bms_seats: Vec<SeatId>,
    /// Seats held as selections by any client
    #[serde(default)]
    pub selected_seats: Vec<SeatId>,
}

/// One seat of a move request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatUpdate {
    /// Seat to write
    pub seat_id: SeatId,
    /// Status to write
    pub status: SeatStatus,
}

/// Future returned by [`BookingService`] methods
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// The booking service API
///
/// Methods return boxed futures so the service can be shared as
/// `Arc<dyn BookingService>` in the environment.
pub trait BookingService: Send + Sync {
    /// Fetch the remote status of every seat of a show
    fn fetch_seat_status(&self, date: NaiveDate, show: String) -> ServiceFuture<'_, SeatStatusSnapshot>;

    /// Persist one status for many seats
    fn persist_seat_status_batch(&self, seats: Vec<SeatId>, status: SeatStatus) -> ServiceFuture<'_, ()>;

    /// Persist a relocation as one request
    fn persist_seat_move(&self, updates: Vec<SeatUpdate>, date: NaiveDate, show: String) -> ServiceFuture<'_, ()>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Batch request recorded by [`InMemoryBookingService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCall {
    /// Seats in the request
    pub seats: Vec<SeatId>,
    /// Status requested
    pub status: SeatStatus,
}

/// Move request recorded by [`InMemoryBookingService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    /// Seats in the request
    pub updates: Vec<SeatUpdate>,
    /// Show date
    pub date: NaiveDate,
    /// Show name
    pub show: String,
}

#[derive(Debug, Default)]
struct Inner {
    snapshot: SeatStatusSnapshot,
    batch_calls: Vec<BatchCall>,
    move_calls: Vec<MoveCall>,
    fetch_calls: usize,
    failing_statuses: BTreeSet<SeatStatus>,
    fail_moves: bool,
    fail_fetch: bool,
}

impl Inner {
    fn write(&mut self, seat: &SeatId, status: SeatStatus) {
        let snapshot = &mut self.snapshot;
        for list in [
            &mut snapshot.booked_seats,
            &mut snapshot.bms_seats,
            &mut snapshot.selected_seats,
        ] {
            list.retain(|s| s != seat);
        }
        match status {
            SeatStatus::Booked => snapshot.booked_seats.push(seat.clone()),
            SeatStatus::BmsBooked => snapshot.bms_seats.push(seat.clone()),
            SeatStatus::Selected => snapshot.selected_seats.push(seat.clone()),
            SeatStatus::Available | SeatStatus::Blocked => {},
        }
    }
}

/// Booking service held in memory.
///
/// Records every call, applies successful writes to its snapshot, and can be
/// told to fail specific calls. An optional latency delays every call, which
/// under paused tokio time keeps flushes in flight deterministically.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingService {
    inner: Arc<Mutex<Inner>>,
    latency: Option<Duration>,
}

impl InMemoryBookingService {
    /// Empty service
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service that reports `snapshot`
    #[must_use]
    pub fn with_snapshot(snapshot: SeatStatusSnapshot) -> Self {
        let service = Self::new();
        service.set_snapshot(snapshot);
        service
    }

    /// Delay every call by `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the remote snapshot
    pub fn set_snapshot(&self, snapshot: SeatStatusSnapshot) {
        self.lock().snapshot = snapshot;
    }

    /// Current remote snapshot
    #[must_use]
    pub fn snapshot(&self) -> SeatStatusSnapshot {
        self.lock().snapshot.clone()
    }

    /// Make batch writes of `status` fail (or succeed again)
    pub fn fail_batches_for(&self, status: SeatStatus, fail: bool) {
        let mut inner = self.lock();
        if fail {
            inner.failing_statuses.insert(status);
        } else {
            inner.failing_statuses.remove(&status);
        }
    }

    /// Make move requests fail (or succeed again)
    pub fn fail_moves(&self, fail: bool) {
        self.lock().fail_moves = fail;
    }

    /// Make snapshot fetches fail (or succeed again)
    pub fn fail_fetch(&self, fail: bool) {
        self.lock().fail_fetch = fail;
    }

    /// Batch requests received so far
    #[must_use]
    pub fn batch_calls(&self) -> Vec<BatchCall> {
        self.lock().batch_calls.clone()
    }

    /// Move requests received so far
    #[must_use]
    pub fn move_calls(&self) -> Vec<MoveCall> {
        self.lock().move_calls.clone()
    }

    /// Number of snapshot fetches so far
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.lock().fetch_calls
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl BookingService for InMemoryBookingService {
    fn fetch_seat_status(&self, date: NaiveDate, show: String) -> ServiceFuture<'_, SeatStatusSnapshot> {
        Box::pin(async move {
            self.wait().await;
            let mut inner = self.lock();
            inner.fetch_calls += 1;
            if inner.fail_fetch {
                return Err(ServiceError::Unavailable(format!("no status for {show} on {date}")));
            }
            Ok(inner.snapshot.clone())
        })
    }

    fn persist_seat_status_batch(&self, seats: Vec<SeatId>, status: SeatStatus) -> ServiceFuture<'_, ()> {
        Box::pin(async move {
            self.wait().await;
            let mut inner = self.lock();
            let failing = inner.failing_statuses.contains(&status);
            inner.batch_calls.push(BatchCall {
                seats: seats.clone(),
                status,
            });
            if failing {
                return Err(ServiceError::Rejected(format!("{status} batch refused")));
            }
            for seat in &seats {
                inner.write(seat, status);
            }
            Ok(())
        })
    }

    fn persist_seat_move(&self, updates: Vec<SeatUpdate>, date: NaiveDate, show: String) -> ServiceFuture<'_, ()> {
        Box::pin(async move {
            self.wait().await;
            let mut inner = self.lock();
            let failing = inner.fail_moves;
            inner.move_calls.push(MoveCall {
                updates: updates.clone(),
                date,
                show,
            });
            if failing {
                return Err(ServiceError::Rejected("move refused".to_string()));
            }
            for update in &updates {
                inner.write(&update.seat_id, update.status);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    #[test]
    fn snapshot_uses_camel_case_fields() {
        let json = r#"{"bookedSeats":["SC-A-1"],"bmsSeats":["SC-A-2"],"selectedSeats":[]}"#;
        let snapshot: SeatStatusSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.booked_seats, vec![SeatId::from("SC-A-1")]);
        assert_eq!(snapshot.bms_seats, vec![SeatId::from("SC-A-2")]);

        let partial: SeatStatusSnapshot = serde_json::from_str(r#"{"bookedSeats":[]}"#).unwrap();
        assert!(partial.selected_seats.is_empty());
    }

    #[tokio::test]
    async fn successful_batches_update_the_snapshot() {
        let service = InMemoryBookingService::new();
        service
            .persist_seat_status_batch(vec![SeatId::from("SC-A-1")], SeatStatus::BmsBooked)
            .await
            .unwrap();
        service
            .persist_seat_status_batch(vec![SeatId::from("SC-A-1")], SeatStatus::Available)
            .await
            .unwrap();

        let snapshot = service.fetch_seat_status(date(), "evening".to_string()).await.unwrap();
        assert!(snapshot.bms_seats.is_empty());
        assert_eq!(service.batch_calls().len(), 2);
        assert_eq!(service.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn failing_calls_are_recorded_but_not_applied() {
        let service = InMemoryBookingService::new();
        service.fail_batches_for(SeatStatus::Selected, true);
        service.fail_moves(true);

        let batch = service
            .persist_seat_status_batch(vec![SeatId::from("SC-A-1")], SeatStatus::Selected)
            .await;
        let moved = service
            .persist_seat_move(
                vec![SeatUpdate {
                    seat_id: SeatId::from("SC-A-2"),
                    status: SeatStatus::Selected,
                }],
                date(),
                "evening".to_string(),
            )
            .await;

        assert!(batch.is_err());
        assert!(moved.is_err());
        assert_eq!(service.snapshot(), SeatStatusSnapshot::default());
        assert_eq!(service.move_calls()[0].show, "evening");
    }
}
