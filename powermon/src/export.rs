//! Cadence-driven export: projects buffered samples into tabular rows and
//! flushes them to a durable sink.
//!
//! The exporter runs independently of the poller at its own target
//! interval, reading only the ring's latest sample on each tick. Rows
//! accumulate in an in-memory write buffer and hit storage in batches, so
//! sink latency never shows up in the per-tick path.
//!
//! # Schema freeze
//!
//! The power-supply column set is a one-time decision: it is frozen from
//! the first observed sample that carries non-empty supply data and never
//! changes afterwards. Later samples reporting a different id set are
//! projected against the frozen columns — unknown ids are dropped, missing
//! ids become empty cells. See [`ExportSchema`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::SecondsFormat;

use crate::error::{ExportError, Result};
use crate::rate::estimate_rate;
use crate::ring::SampleRing;
use crate::sample::Sample;

/// Upper bound on the idle wait between exporter ticks. Bounds CPU usage
/// without missing the schedule by more than about this much.
const MAX_IDLE_WAIT: Duration = Duration::from_millis(10);

/// The frozen power-supply column set for one export run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSchema {
    supply_ids: Vec<String>,
}

impl ExportSchema {
    /// Creates a schema with an explicit id set.
    pub fn new(supply_ids: Vec<String>) -> Self {
        Self { supply_ids }
    }

    /// Freezes the schema from the first sample carrying non-empty supply
    /// data, or an empty schema if no such sample exists yet.
    pub fn freeze_from(samples: &[Sample]) -> Self {
        let supply_ids = samples
            .iter()
            .find(|s| !s.power_supplies.is_empty())
            .map(|s| s.power_supplies.iter().map(|ps| ps.id.clone()).collect())
            .unwrap_or_default();
        Self { supply_ids }
    }

    /// The frozen supply ids, in column order.
    pub fn supply_ids(&self) -> &[String] {
        &self.supply_ids
    }

    /// Returns the full header column list.
    pub fn header(&self) -> Vec<String> {
        let mut columns = vec![
            "timestamp".to_string(),
            "elapsed_seconds".to_string(),
            "total_power_watts".to_string(),
        ];
        for id in &self.supply_ids {
            columns.push(format!("ps_{id}_output_watts"));
            columns.push(format!("ps_{id}_input_watts"));
        }
        columns
    }

    /// Projects a sample into a row against this schema.
    ///
    /// `elapsed_seconds` is rounded to 6 decimal places.
    pub fn project(&self, sample: &Sample, elapsed_seconds: f64) -> ExportRow {
        let supply_watts = self
            .supply_ids
            .iter()
            .map(|id| {
                sample
                    .supply(id)
                    .map_or((None, None), |ps| (ps.output_watts, ps.input_watts))
            })
            .collect();

        ExportRow {
            timestamp: sample
                .timestamp
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            elapsed_seconds: round_micros(elapsed_seconds),
            total_power_watts: sample.total_power_watts,
            supply_watts,
        }
    }
}

/// One flattened output row, aligned to a frozen [`ExportSchema`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    /// Wall-clock timestamp of the underlying sample (RFC 3339).
    pub timestamp: String,
    /// Seconds since export start, rounded to microsecond precision.
    pub elapsed_seconds: f64,
    /// Total power draw in watts; empty cell when absent.
    pub total_power_watts: Option<f64>,
    /// `(output_watts, input_watts)` per schema supply id, in schema order.
    pub supply_watts: Vec<(Option<f64>, Option<f64>)>,
}

/// Rounds to 6 decimal places.
fn round_micros(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// A durable row sink. Writes must either succeed completely or error —
/// a sink failure is fatal to the exporter, never masked.
pub trait RowSink {
    /// Writes the header line. Called exactly once, before any rows.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SinkWrite`] if the write fails.
    fn write_header(&mut self, schema: &ExportSchema) -> Result<()>;

    /// Appends a batch of rows in order.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SinkWrite`] if the write fails.
    fn write_rows(&mut self, rows: &[ExportRow]) -> Result<()>;

    /// Flushes buffered bytes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SinkWrite`] if the flush fails.
    fn flush(&mut self) -> Result<()>;
}

/// Formats one row as a CSV line (no trailing newline).
fn format_row(row: &ExportRow) -> String {
    let mut fields = Vec::with_capacity(3 + row.supply_watts.len() * 2);
    fields.push(row.timestamp.clone());
    fields.push(format_float(row.elapsed_seconds));
    fields.push(row.total_power_watts.map(format_float).unwrap_or_default());
    for &(output, input) in &row.supply_watts {
        fields.push(output.map(format_float).unwrap_or_default());
        fields.push(input.map(format_float).unwrap_or_default());
    }
    fields.join(",")
}

/// Formats a float without scientific notation surprises for the value
/// ranges involved (watts, seconds).
fn format_float(value: f64) -> String {
    format!("{value}")
}

/// Append-only CSV file sink with buffered writes.
#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvFileSink {
    /// Creates (or truncates) the output file.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::SinkOpen`] if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| ExportError::SinkOpen {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    /// The output file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> ExportError {
        ExportError::SinkWrite {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl RowSink for CsvFileSink {
    fn write_header(&mut self, schema: &ExportSchema) -> Result<()> {
        writeln!(self.writer, "{}", schema.header().join(","))
            .map_err(|e| self.write_error(e))?;
        Ok(())
    }

    fn write_rows(&mut self, rows: &[ExportRow]) -> Result<()> {
        for row in rows {
            writeln!(self.writer, "{}", format_row(row)).map_err(|e| self.write_error(e))?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| self.write_error(e))?;
        Ok(())
    }
}

/// Tuning knobs for the export loop.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Target output interval between rows.
    pub interval: Duration,
    /// Total run duration; `None` runs until the stop flag is set.
    pub duration: Option<Duration>,
    /// Flush the write buffer to the sink at this many rows.
    pub flush_threshold: usize,
    /// How long to wait for the first sample before failing with
    /// [`ExportError::NoData`].
    pub startup_grace: Duration,
    /// Interval between status log lines.
    pub status_every: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            duration: None,
            flush_threshold: 1000,
            startup_grace: Duration::from_secs(2),
            status_every: Duration::from_secs(5),
        }
    }
}

/// End-of-run statistics.
#[derive(Debug, Clone, Copy)]
pub struct ExportSummary {
    /// Total rows written to the sink (including the final flush).
    pub rows_written: u64,
    /// Wall time from first tick to exit.
    pub elapsed: Duration,
    /// Achieved export rate in rows per second.
    pub average_rate: f64,
}

/// The cadence-driven export loop.
#[derive(Debug)]
pub struct Exporter {
    config: ExporterConfig,
}

impl Exporter {
    /// Creates an exporter with the given configuration.
    pub fn new(config: ExporterConfig) -> Self {
        Self { config }
    }

    /// Runs the export loop until the duration elapses or `stop` is set.
    ///
    /// Blocks the calling thread. Waits up to the startup grace window for
    /// the poller to produce a first sample, freezes the column schema,
    /// writes the header, then samples the ring's latest entry at the
    /// target interval. The schedule is open-loop: a stalled tick exports
    /// the latest sample once, it is never backfilled with one row per
    /// missed interval.
    ///
    /// # Errors
    ///
    /// - [`ExportError::NoData`] if no sample arrives within the grace
    ///   window (upstream connectivity problem).
    /// - [`ExportError::SinkWrite`] if any sink write or flush fails;
    ///   buffered rows up to that point are lost, by design.
    pub fn run(
        &self,
        ring: &SampleRing,
        sink: &mut dyn RowSink,
        stop: &AtomicBool,
    ) -> Result<ExportSummary> {
        self.wait_for_first_sample(ring, stop)?;

        // Freeze the column set once, before any data row.
        let schema = ExportSchema::freeze_from(&ring.snapshot());
        sink.write_header(&schema)?;
        tracing::info!(
            supplies = schema.supply_ids().len(),
            rate = ring.sampling_rate(),
            "export started"
        );

        let start = Instant::now();
        let mut next_tick = start;
        let mut last_status = start;
        let mut buffer: Vec<ExportRow> = Vec::with_capacity(self.config.flush_threshold);
        let mut rows_written: u64 = 0;

        loop {
            if stop.load(Ordering::Acquire) {
                tracing::info!("stop requested, draining write buffer");
                break;
            }

            let now = Instant::now();
            if let Some(duration) = self.config.duration
                && now.duration_since(start) >= duration
            {
                tracing::info!(?duration, "configured duration reached");
                break;
            }

            if now >= next_tick {
                if let Some(sample) = ring.latest() {
                    let elapsed = now.duration_since(start).as_secs_f64();
                    buffer.push(schema.project(&sample, elapsed));
                }
                // Advance the open-loop schedule; when the loop stalled
                // past it, snap forward instead of firing for every missed
                // interval.
                next_tick += self.config.interval;
                if next_tick <= now {
                    next_tick = now + self.config.interval;
                }
            }

            if buffer.len() >= self.config.flush_threshold {
                sink.write_rows(&buffer)?;
                sink.flush()?;
                rows_written += buffer.len() as u64;
                buffer.clear();
            }

            if now.duration_since(last_status) >= self.config.status_every {
                self.log_status(ring, rows_written + buffer.len() as u64, start);
                last_status = now;
            }

            let until_next = next_tick.saturating_duration_since(Instant::now());
            std::thread::sleep(until_next.min(MAX_IDLE_WAIT));
        }

        // Final flush of whatever is still buffered.
        if !buffer.is_empty() {
            sink.write_rows(&buffer)?;
            sink.flush()?;
            rows_written += buffer.len() as u64;
        }

        let elapsed = start.elapsed();
        let average_rate = if elapsed.as_secs_f64() > 0.0 {
            #[allow(clippy::cast_precision_loss)] // row counts are far below 2^52
            {
                rows_written as f64 / elapsed.as_secs_f64()
            }
        } else {
            0.0
        };

        tracing::info!(rows_written, ?elapsed, average_rate, "export finished");

        Ok(ExportSummary {
            rows_written,
            elapsed,
            average_rate,
        })
    }

    /// Blocks until the ring is non-empty, the grace window expires, or
    /// the stop flag is set (which exits cleanly before any data).
    fn wait_for_first_sample(&self, ring: &SampleRing, stop: &AtomicBool) -> Result<()> {
        let wait_start = Instant::now();
        while ring.is_empty() {
            if stop.load(Ordering::Acquire) {
                return Ok(());
            }
            if wait_start.elapsed() >= self.config.startup_grace {
                return Err(ExportError::NoData {
                    waited: self.config.startup_grace,
                }
                .into());
            }
            std::thread::sleep(MAX_IDLE_WAIT);
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)] // row counts are far below 2^52
    fn log_status(&self, ring: &SampleRing, total_rows: u64, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        let actual_rate = if elapsed > 0.0 {
            total_rows as f64 / elapsed
        } else {
            0.0
        };
        let backend_rate = estimate_rate(&ring.snapshot());
        let latest_watts = ring.latest().and_then(|s| s.total_power_watts);

        tracing::info!(
            rows = total_rows,
            export_rate = actual_rate,
            sample_rate = backend_rate,
            latest_watts,
            "collecting"
        );
    }
}
