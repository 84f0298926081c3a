//! Walk-through of one box-office session against an in-memory booking
//! service.
//!
//! ```bash
//! RUST_LOG=box_office_seating=debug cargo run -p box-office-seating --bin seating-demo
//! ```

use anyhow::Context;
use box_office_core::environment::SystemClock;
use box_office_runtime::Store;
use box_office_runtime::metrics::install_prometheus;
use box_office_seating::metrics::register_seating_metrics;
use box_office_seating::{
    ClassId, EngineConfig, InMemoryBookingService, SeatId, SeatMap, SeatStatusSnapshot, SeatingAction,
    SeatingEnvironment, SeatingReducer, SeatingState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LAYOUT: &str = include_str!("../../layouts/main_hall.json");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = install_prometheus()?;
    register_seating_metrics();

    let map = Arc::new(SeatMap::from_json(LAYOUT).context("loading the main hall layout")?);
    info!(show = %config.show, classes = map.classes().len(), "Seat map loaded");

    let service = InMemoryBookingService::with_snapshot(SeatStatusSnapshot {
        booked_seats: ["ST-A-6", "ST-A-7", "ST-C-8"].map(SeatId::from).to_vec(),
        bms_seats: vec![SeatId::from("CI-B-3")],
        selected_seats: vec![SeatId::from("ST-B-9")],
    });
    let env = SeatingEnvironment::new(
        Arc::new(SystemClock),
        Arc::new(service.clone()),
        config.show.clone(),
        config.timing,
    );
    let store = Store::new(
        SeatingState::new(map, &config.timing),
        SeatingReducer::with_weights(config.scoring.clone()),
        env,
    );

    store.send(SeatingAction::Refresh).await?;
    store.settle().await;

    let stalls = ClassId::new("STALLS");
    for _ in 0..4 {
        store.send(SeatingAction::AddSeat { class: stalls.clone() }).await?;
    }
    let selection = store.state(|s| s.current_selection(&stalls)).await;
    info!(seats = ?selection, "Party of four placed");

    // A single activation resolves once the double-activation window closes.
    store.send(SeatingAction::ActivateSeat { seat: SeatId::from("ST-D-3") }).await?;
    tokio::time::sleep(config.timing.activation_window() + Duration::from_millis(50)).await;
    store.settle().await;
    let moved = store.state(|s| s.current_selection(&stalls)).await;
    info!(seats = ?moved, "Block moved");

    store.send(SeatingAction::CommitSelection { class: Some(stalls) }).await?;
    store.send(SeatingAction::AddSeat { class: ClassId::new("CIRCLE") }).await?;
    store.send(SeatingAction::Teardown).await?;
    store.shutdown(Duration::from_secs(5)).await?;

    info!(
        batches = service.batch_calls().len(),
        moves = service.move_calls().len(),
        "Session closed"
    );
    println!("{}", metrics.render());
    Ok(())
}
