//! End-to-end tests for the poller + exporter pipeline.

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use powermon::error::{ExportError, FetchError, PowermonError};
use powermon::export::{CsvFileSink, ExportRow, ExportSchema, ExporterConfig, RowSink};
use powermon::monitor::{MonitorConfig, run_monitor, test_connection};
use powermon::poller::PollerConfig;
use powermon::sample::PowerSupplyReading;
use powermon::source::TelemetrySource;

/// Scripted telemetry source shared with the test body via atomics.
struct MockSource {
    watts: f64,
    supplies: Vec<PowerSupplyReading>,
    fail: Arc<AtomicBool>,
    power_fetches: Arc<AtomicUsize>,
}

impl MockSource {
    fn two_supplies(watts: f64) -> Self {
        Self {
            watts,
            supplies: vec![
                PowerSupplyReading {
                    id: "PS1".to_string(),
                    input_watts: Some(85.0),
                    output_watts: Some(80.0),
                    state: Some("Enabled".to_string()),
                },
                PowerSupplyReading {
                    id: "PS2".to_string(),
                    input_watts: Some(75.0),
                    output_watts: Some(70.0),
                    state: Some("Enabled".to_string()),
                },
            ],
            fail: Arc::new(AtomicBool::new(false)),
            power_fetches: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl TelemetrySource for MockSource {
    fn fetch_power(&mut self) -> Result<f64, FetchError> {
        self.power_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(FetchError::HttpStatus {
                status: 503,
                path: "/Power".to_string(),
            });
        }
        Ok(self.watts)
    }

    fn fetch_power_supplies(&mut self) -> Result<Vec<PowerSupplyReading>, FetchError> {
        Ok(self.supplies.clone())
    }
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        capacity: 100,
        poller: PollerConfig {
            poll_interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(5),
            supply_refresh_every: 20,
            stop_grace: Duration::from_secs(1),
        },
        exporter: ExporterConfig {
            interval: Duration::from_millis(50),
            duration: Some(Duration::from_millis(500)),
            flush_threshold: 1000,
            startup_grace: Duration::from_secs(2),
            status_every: Duration::from_secs(5),
        },
    }
}

#[test]
fn test_full_run_produces_csv_with_supply_columns() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("power.csv");

    let source = MockSource::two_supplies(150.0);
    let mut sink = CsvFileSink::create(&csv_path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let summary = run_monitor(Box::new(source), &mut sink, fast_config(), &stop).unwrap();
    drop(sink);

    assert!(summary.rows_written >= 4, "got {}", summary.rows_written);

    let contents = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<_> = contents.lines().collect();

    assert_eq!(
        lines[0],
        "timestamp,elapsed_seconds,total_power_watts,\
         ps_PS1_output_watts,ps_PS1_input_watts,ps_PS2_output_watts,ps_PS2_input_watts"
    );
    assert_eq!(lines.len() as u64, summary.rows_written + 1);

    // Every data row carries the mocked reading. Supply columns are only
    // populated on rows whose backing sample carried supply detail (every
    // 20th poll), so they are either blank or the mocked values.
    for line in &lines[1..] {
        let fields: Vec<_> = line.split(',').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[2], "150");
        assert!(fields[3] == "80" || fields[3].is_empty(), "row: {line}");
        assert!(fields[4] == "85" || fields[4].is_empty(), "row: {line}");
        assert!(fields[5] == "70" || fields[5].is_empty(), "row: {line}");
        assert!(fields[6] == "75" || fields[6].is_empty(), "row: {line}");
    }
}

#[test]
fn test_export_tick_count_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("power.csv");

    let source = MockSource::two_supplies(100.0);
    let mut sink = CsvFileSink::create(&csv_path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let mut config = fast_config();
    config.exporter.interval = Duration::from_millis(100);
    config.exporter.duration = Some(Duration::from_secs(1));

    let summary = run_monitor(Box::new(source), &mut sink, config, &stop).unwrap();

    // I=0.1s over D=1.0s: between 9 and 11 rows under jitter tolerance.
    assert!(
        (9..=11).contains(&summary.rows_written),
        "got {} rows",
        summary.rows_written
    );
}

#[test]
fn test_no_data_error_when_source_never_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("power.csv");

    let source = MockSource::two_supplies(100.0);
    source.fail.store(true, Ordering::SeqCst);

    let mut sink = CsvFileSink::create(&csv_path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let mut config = fast_config();
    config.exporter.startup_grace = Duration::from_millis(100);

    let err = run_monitor(Box::new(source), &mut sink, config, &stop).unwrap_err();
    assert!(matches!(
        err,
        PowermonError::Export(ExportError::NoData { .. })
    ));
}

#[test]
fn test_sink_failure_stops_poller() {
    /// Sink that accepts the header and rejects the first row batch.
    struct FailOnRowsSink;

    impl RowSink for FailOnRowsSink {
        fn write_header(&mut self, _schema: &ExportSchema) -> powermon::Result<()> {
            Ok(())
        }

        fn write_rows(&mut self, _rows: &[ExportRow]) -> powermon::Result<()> {
            Err(ExportError::SinkWrite {
                path: "failing".to_string(),
                source: std::io::Error::other("disk full"),
            }
            .into())
        }

        fn flush(&mut self) -> powermon::Result<()> {
            Ok(())
        }
    }

    let source = MockSource::two_supplies(100.0);
    let power_fetches = Arc::clone(&source.power_fetches);

    let mut sink = FailOnRowsSink;
    let stop = Arc::new(AtomicBool::new(false));

    let mut config = fast_config();
    // Force an early flush so the failure fires fast.
    config.exporter.flush_threshold = 1;
    config.exporter.duration = None;

    let err = run_monitor(Box::new(source), &mut sink, config, &stop).unwrap_err();
    assert!(matches!(
        err,
        PowermonError::Export(ExportError::SinkWrite { .. })
    ));

    // run_monitor stops the poller on the error path; once it returns, no
    // further fetches may happen.
    let fetches_after_return = power_fetches.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(power_fetches.load(Ordering::SeqCst), fetches_after_return);
}

#[test]
fn test_external_stop_drains_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("power.csv");

    let source = MockSource::two_supplies(120.0);
    let mut sink = CsvFileSink::create(&csv_path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let mut config = fast_config();
    config.exporter.duration = None; // unbounded; only the flag ends it

    let stopper = Arc::clone(&stop);
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        stopper.store(true, Ordering::SeqCst);
    });

    let summary = run_monitor(Box::new(source), &mut sink, config, &stop).unwrap();
    handle.join().unwrap();
    drop(sink);

    // The final flush wrote whatever was buffered when the flag fired.
    assert!(summary.rows_written >= 2, "got {}", summary.rows_written);
    let contents = fs::read_to_string(&csv_path).unwrap();
    assert_eq!(contents.lines().count() as u64, summary.rows_written + 1);
}

#[test]
fn test_connection_report_against_mock() {
    let mut source = MockSource::two_supplies(245.5);

    let report = test_connection(&mut source).unwrap();
    assert_eq!(report.power_watts, 245.5);
    assert_eq!(report.supplies.len(), 2);
    assert_eq!(report.supplies[0].id, "PS1");
    assert_eq!(report.supplies[1].id, "PS2");
}

#[test]
fn test_degraded_source_keeps_collecting() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("power.csv");

    let source = MockSource::two_supplies(100.0);
    let fail = Arc::clone(&source.fail);

    let mut sink = CsvFileSink::create(&csv_path).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let mut config = fast_config();
    config.exporter.duration = Some(Duration::from_millis(600));

    // Flip the source into failure for a stretch mid-run; the monitor must
    // ride it out rather than crash.
    let flipper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        fail.store(true, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        fail.store(false, Ordering::SeqCst);
    });

    let summary = run_monitor(Box::new(source), &mut sink, config, &stop).unwrap();
    flipper.join().unwrap();

    assert!(summary.rows_written > 0);
}
