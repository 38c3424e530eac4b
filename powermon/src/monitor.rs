//! Wires the poller and exporter together for a monitoring run.
//!
//! Two independent schedules run concurrently: the poller's fetch cadence
//! (~20/s by default) and the exporter's output cadence (~10/s). The ring
//! is the only shared mutable state between them. This module owns the
//! cross-task shutdown contract: whatever way the exporter exits — duration
//! reached, stop flag, sink failure — the poller is always stopped before
//! control returns to the caller.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::error::Result;
use crate::export::{Exporter, ExporterConfig, ExportSummary, RowSink};
use crate::poller::{Poller, PollerConfig};
use crate::ring::{DEFAULT_CAPACITY, SampleRing};
use crate::sample::PowerSupplyReading;
use crate::source::TelemetrySource;

/// Combined configuration for a monitoring run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Ring buffer capacity (historical depth traded for bounded memory).
    pub capacity: usize,
    /// Poll loop tuning.
    pub poller: PollerConfig,
    /// Export loop tuning.
    pub exporter: ExporterConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            poller: PollerConfig::default(),
            exporter: ExporterConfig::default(),
        }
    }
}

/// Result of a one-shot connection test.
#[derive(Debug, Clone)]
pub struct ConnectionReport {
    /// Current total power draw in watts.
    pub power_watts: f64,
    /// Power supplies visible on the system (may be empty).
    pub supplies: Vec<PowerSupplyReading>,
}

/// Performs one power fetch and one supply fetch without starting
/// continuous monitoring.
///
/// # Errors
///
/// Returns the underlying [`crate::error::FetchError`] if either call
/// fails — here a transient failure is the answer, not something to retry.
pub fn test_connection(source: &mut dyn TelemetrySource) -> Result<ConnectionReport> {
    let power_watts = source.fetch_power()?;
    let supplies = source.fetch_power_supplies()?;
    Ok(ConnectionReport {
        power_watts,
        supplies,
    })
}

/// Runs a full monitoring session: spawns the poller, runs the exporter in
/// the calling thread, and stops the poller on every exit path.
///
/// Setting `stop` (e.g. from a Ctrl+C handler) ends the session after a
/// final flush of buffered rows.
///
/// # Errors
///
/// Propagates the exporter's fatal errors ([`crate::error::ExportError`])
/// and surfaces a poller panic as [`crate::error::MonitorError`] when the
/// export itself succeeded.
pub fn run_monitor(
    source: Box<dyn TelemetrySource>,
    sink: &mut dyn RowSink,
    config: MonitorConfig,
    stop: &Arc<AtomicBool>,
) -> Result<ExportSummary> {
    let ring = Arc::new(SampleRing::new(config.capacity));
    let mut poller = Poller::spawn(source, Arc::clone(&ring), config.poller);

    let exporter = Exporter::new(config.exporter);
    let result = exporter.run(&ring, sink, stop);

    if result.is_err()
        && let Some(last_error) = poller.last_error()
    {
        tracing::warn!("last fetch error before shutdown: {last_error}");
    }

    // The poller stops regardless of how the export ended; an exporter
    // error takes precedence over a stop-path error in the return value.
    match poller.stop() {
        Ok(_) => result,
        Err(stop_error) => match result {
            Ok(_) => Err(stop_error.into()),
            Err(export_error) => {
                tracing::error!("poller stop failed during error shutdown: {stop_error}");
                Err(export_error)
            }
        },
    }
}
