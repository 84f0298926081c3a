//! Prometheus metrics for the runtime.
//!
//! The Store records counters and histograms through the `metrics` facade.
//! Nothing is exported until a recorder is installed, which binaries do with
//! [`install_prometheus`].
//!
//! # Example
//!
//! ```rust,no_run
//! use box_office_runtime::metrics::install_prometheus;
//!
//! # fn example() -> Result<(), box_office_runtime::metrics::MetricsError> {
//! let handle = install_prometheus()?;
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install a Prometheus recorder and register the Store metric descriptions.
///
/// # Errors
///
/// Returns [`MetricsError::Build`] if the bucket configuration is rejected and
/// [`MetricsError::Install`] if a recorder is already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_store_metrics();
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

/// Register all Store metric descriptions.
pub fn register_store_metrics() {
    describe_counter!(
        "store.commands.total",
        "Total number of actions reduced by the store"
    );
    describe_histogram!(
        "store.reducer.duration_seconds",
        "Time spent inside the reducer per action"
    );
    describe_counter!(
        "store.effects.executed",
        "Total number of effects executed, by type"
    );
    describe_counter!(
        "store.timers.replaced",
        "Keyed timers replaced by a reschedule before firing"
    );
    describe_counter!(
        "store.timers.cancelled",
        "Keyed timers cancelled before firing"
    );
    describe_counter!(
        "store.shutdown.initiated",
        "Graceful shutdowns started"
    );
    describe_counter!(
        "store.shutdown.completed",
        "Graceful shutdowns that drained all effects"
    );
    describe_counter!(
        "store.shutdown.timeout",
        "Graceful shutdowns that timed out with effects still pending"
    );
    describe_counter!(
        "store.shutdown.rejected_actions",
        "Actions rejected because the store was shutting down"
    );
}
