//! Background poller: drives the telemetry source at a fixed cadence.
//!
//! The poller owns its source and runs on a dedicated OS thread, pushing
//! completed samples into the shared [`SampleRing`]. It is deliberately
//! decoupled from the exporter's output cadence — a slow remote endpoint
//! degrades sample resolution but never blocks the durable-write path.
//!
//! # Error behavior
//!
//! Every expected fetch failure is absorbed inside the loop: the error is
//! recorded in a last-error slot (overwritten each time), the poller backs
//! off, and no sample is appended for that iteration. Only panics cross
//! the loop boundary, and those surface through [`Poller::stop`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::MonitorError;
use crate::ring::SampleRing;
use crate::sample::Sample;
use crate::source::TelemetrySource;

/// Tuning knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Sleep between successful polls. This bounds the maximum achievable
    /// sample cadence.
    pub poll_interval: Duration,
    /// Sleep after a failed poll before retrying.
    pub error_backoff: Duration,
    /// Fetch power-supply detail every Nth successful poll, counted by
    /// samples already buffered rather than wall time — supply fetch
    /// frequency stays proportional to successful-poll frequency.
    pub supply_refresh_every: usize,
    /// How long [`Poller::stop`] waits for the thread before abandoning it.
    pub stop_grace: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            error_backoff: Duration::from_secs(1),
            supply_refresh_every: 20,
            stop_grace: Duration::from_secs(2),
        }
    }
}

/// How a poller shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The thread observed the stop flag and exited within the grace period.
    Joined,
    /// The thread did not exit in time (e.g. blocked in a slow fetch) and
    /// was abandoned. Its resources are reclaimed when the fetch returns.
    Abandoned,
}

/// Handle to a running background poller.
///
/// Created by [`Poller::spawn`]; dropping the handle without calling
/// [`Poller::stop`] signals the thread to exit but does not wait for it.
#[derive(Debug)]
pub struct Poller {
    running: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
    handle: Option<JoinHandle<()>>,
    done_rx: mpsc::Receiver<()>,
    stop_grace: Duration,
}

impl Poller {
    /// Spawns the poll loop on a new thread.
    ///
    /// The loop runs until [`Poller::stop`] is called (or the handle is
    /// dropped), appending one sample per successful fetch.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn a thread.
    pub fn spawn(
        source: Box<dyn TelemetrySource>,
        ring: Arc<SampleRing>,
        config: PollerConfig,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let last_error = Arc::new(Mutex::new(None));
        let (done_tx, done_rx) = mpsc::channel();

        let thread_running = Arc::clone(&running);
        let thread_last_error = Arc::clone(&last_error);
        let stop_grace = config.stop_grace;

        let handle = std::thread::Builder::new()
            .name("powermon-poller".to_string())
            .spawn(move || {
                poll_loop(source, &ring, &thread_running, &thread_last_error, &config);
                // Dropping the sender signals loop completion to stop().
                drop(done_tx);
            })
            .expect("failed to spawn poller thread");

        Self {
            running,
            last_error,
            handle: Some(handle),
            done_rx,
            stop_grace,
        }
    }

    /// Returns whether the loop has been asked to keep running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Returns the message of the most recent fetch failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Signals the loop to stop and waits up to the configured grace
    /// period for the thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::PollerPanicked`] if the thread died from a
    /// panic, or [`MonitorError::NotRunning`] if already stopped.
    pub fn stop(&mut self) -> Result<StopOutcome, MonitorError> {
        let Some(handle) = self.handle.take() else {
            return Err(MonitorError::NotRunning);
        };

        self.running.store(false, Ordering::Release);

        match self.done_rx.recv_timeout(self.stop_grace) {
            // Disconnect means the loop returned and dropped its sender.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match handle.join() {
                Ok(()) => Ok(StopOutcome::Joined),
                Err(panic) => Err(MonitorError::PollerPanicked {
                    message: panic_message(&panic),
                }),
            },
            Err(RecvTimeoutError::Timeout) => {
                // Likely blocked inside a slow fetch. Abandon rather than
                // hang shutdown; the thread exits on its next flag check.
                tracing::warn!(
                    grace = ?self.stop_grace,
                    "poller did not stop within grace period, abandoning thread"
                );
                drop(handle);
                Ok(StopOutcome::Abandoned)
            }
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// The poll loop body. Runs on the poller thread until the flag clears.
fn poll_loop(
    mut source: Box<dyn TelemetrySource>,
    ring: &SampleRing,
    running: &AtomicBool,
    last_error: &Mutex<Option<String>>,
    config: &PollerConfig,
) {
    while running.load(Ordering::Acquire) {
        match source.fetch_power() {
            Ok(watts) => {
                // Supply detail is fetched on every Nth buffered sample; a
                // failure here degrades the sample rather than dropping it.
                let supplies = if ring.len() % config.supply_refresh_every.max(1) == 0 {
                    match source.fetch_power_supplies() {
                        Ok(supplies) => supplies,
                        Err(e) => {
                            tracing::debug!("power supply fetch failed: {e}");
                            Vec::new()
                        }
                    }
                } else {
                    Vec::new()
                };

                ring.push(Sample::now(watts, supplies));
                std::thread::sleep(config.poll_interval);
            }
            Err(e) => {
                tracing::warn!("power fetch failed: {e}");
                *last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(e.to_string());
                std::thread::sleep(config.error_backoff);
            }
        }
    }
}

/// Extracts a readable message from a panic payload.
fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::sample::PowerSupplyReading;

    /// Source that cycles through a script of outcomes.
    struct ScriptedSource {
        script: Vec<Result<f64, ()>>,
        position: usize,
        supplies: Vec<PowerSupplyReading>,
        supply_calls: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<f64, ()>>) -> Self {
            Self {
                script,
                position: 0,
                supplies: Vec::new(),
                supply_calls: 0,
            }
        }
    }

    impl TelemetrySource for ScriptedSource {
        fn fetch_power(&mut self) -> Result<f64, FetchError> {
            let outcome = self.script[self.position % self.script.len()];
            self.position += 1;
            outcome.map_err(|()| FetchError::HttpStatus {
                status: 500,
                path: "/Power".to_string(),
            })
        }

        fn fetch_power_supplies(&mut self) -> Result<Vec<PowerSupplyReading>, FetchError> {
            self.supply_calls += 1;
            Ok(self.supplies.clone())
        }
    }

    fn fast_config() -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_millis(1),
            error_backoff: Duration::from_millis(1),
            supply_refresh_every: 20,
            stop_grace: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_poller_collects_samples() {
        let ring = Arc::new(SampleRing::new(100));
        let source = ScriptedSource::new(vec![Ok(150.0)]);

        let mut poller = Poller::spawn(Box::new(source), Arc::clone(&ring), fast_config());

        // Wait for a handful of samples.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ring.len() < 5 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        let outcome = poller.stop().unwrap();
        assert_eq!(outcome, StopOutcome::Joined);
        assert!(ring.len() >= 5);
        assert_eq!(ring.latest().unwrap().total_power_watts, Some(150.0));
        assert!(poller.last_error().is_none());
    }

    #[test]
    fn test_failures_never_become_samples() {
        let ring = Arc::new(SampleRing::new(100));
        // Alternate success and failure: only successes may appear.
        let source = ScriptedSource::new(vec![Ok(100.0), Err(())]);

        let mut poller = Poller::spawn(Box::new(source), Arc::clone(&ring), fast_config());

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ring.len() < 4 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }

        poller.stop().unwrap();

        let snapshot = ring.snapshot();
        assert!(!snapshot.is_empty());
        for sample in &snapshot {
            assert_eq!(sample.total_power_watts, Some(100.0));
        }
        // The failures were recorded, not appended.
        let last_error = poller.last_error().unwrap();
        assert!(last_error.contains("500"), "unexpected error: {last_error}");
    }

    #[test]
    fn test_stop_twice_errors() {
        let ring = Arc::new(SampleRing::new(10));
        let source = ScriptedSource::new(vec![Ok(1.0)]);

        let mut poller = Poller::spawn(Box::new(source), ring, fast_config());
        poller.stop().unwrap();

        assert!(matches!(poller.stop(), Err(MonitorError::NotRunning)));
    }

    #[test]
    fn test_no_samples_after_stop() {
        let ring = Arc::new(SampleRing::new(100));
        let source = ScriptedSource::new(vec![Ok(1.0)]);

        let mut poller = Poller::spawn(Box::new(source), Arc::clone(&ring), fast_config());
        std::thread::sleep(Duration::from_millis(20));
        poller.stop().unwrap();

        let len_after_stop = ring.len();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(ring.len(), len_after_stop);
    }

    #[test]
    fn test_first_sample_carries_supplies() {
        let ring = Arc::new(SampleRing::new(100));
        let mut source = ScriptedSource::new(vec![Ok(150.0)]);
        source.supplies = vec![PowerSupplyReading {
            id: "PS1".to_string(),
            input_watts: Some(85.0),
            output_watts: Some(80.0),
            state: Some("Enabled".to_string()),
        }];

        let mut poller = Poller::spawn(Box::new(source), Arc::clone(&ring), fast_config());

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ring.is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        poller.stop().unwrap();

        // The very first poll sees an empty ring (0 % 20 == 0) and fetches
        // supply detail.
        let first = &ring.snapshot()[0];
        assert_eq!(first.power_supplies.len(), 1);
        assert_eq!(first.power_supplies[0].id, "PS1");
    }
}
