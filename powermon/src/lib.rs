//! # powermon
//!
//! High-frequency server power telemetry collector with buffered CSV export.
//!
//! powermon polls a Redfish power endpoint (Dell iDRAC and compatibles) at
//! high frequency from a background thread, buffers samples in a bounded
//! in-memory ring, and exports the latest reading at an independent output
//! cadence to an append-only CSV file. It is a best-effort monitoring tool:
//! old samples are dropped rather than ever blocking the producer, and
//! durability is periodic-flush, not transactional.
//!
//! ## Key Properties
//!
//! - Producer and consumer run at independent cadences — a slow remote
//!   degrades sample resolution but never delays durable writes, and a
//!   slow sink never delays polling
//! - Bounded memory: a fixed-capacity ring overwrites oldest on overflow
//! - Transient fetch failures are absorbed with backoff inside the poller;
//!   only sink failures and startup connectivity problems are fatal
//! - One-time schema freeze for per-supply CSV columns
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//!
//! use powermon::export::CsvFileSink;
//! use powermon::monitor::{run_monitor, MonitorConfig};
//! use powermon::redfish::{RedfishClient, RedfishConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RedfishClient::new(RedfishConfig::new("10.0.0.120", "root", "calvin"))?;
//! let mut sink = CsvFileSink::create("system_power_data.csv")?;
//! let stop = Arc::new(AtomicBool::new(false));
//!
//! let summary = run_monitor(Box::new(client), &mut sink, MonitorConfig::default(), &stop)?;
//! println!("wrote {} rows at {:.2} rows/s", summary.rows_written, summary.average_rate);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Data flow: telemetry source → poller → sample ring → {rate estimator,
//! exporter} → CSV sink. The ring is the sole synchronization point.
//!
//! - [`source::TelemetrySource`] — the narrow capability seam to the remote API
//! - [`redfish::RedfishClient`] — concrete source for Redfish endpoints
//! - [`ring::SampleRing`] — bounded, mutex-guarded sample store
//! - [`poller::Poller`] — background fetch loop with degrade-and-retry
//! - [`export::Exporter`] — cadence-driven projection and batched flush
//! - [`monitor`] — session orchestration and connection testing
//! - [`error`] — error types

pub mod error;
pub mod export;
pub mod monitor;
pub mod poller;
pub mod rate;
#[cfg(feature = "redfish")]
pub mod redfish;
pub mod ring;
pub mod sample;
pub mod source;

// Re-export primary API types at crate root for convenience.
pub use error::{PowermonError, Result};
pub use export::{CsvFileSink, Exporter, ExporterConfig, ExportSummary};
pub use monitor::{ConnectionReport, MonitorConfig, run_monitor, test_connection};
pub use poller::{Poller, PollerConfig};
pub use ring::SampleRing;
pub use sample::{PowerSupplyReading, Sample};
pub use source::TelemetrySource;
