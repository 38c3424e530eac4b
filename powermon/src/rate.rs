//! Effective sampling-rate estimation over recent samples.

use crate::ring::SampleRing;
use crate::sample::Sample;

/// Number of trailing samples the estimate is computed over.
pub const RATE_WINDOW: usize = 10;

/// Estimates the effective sampling rate in samples per second.
///
/// Looks at the most recent `min(RATE_WINDOW, len)` samples and divides the
/// interval count by the monotonic time span. Returns `0.0` when fewer than
/// two samples are available, and `0.0` for a non-positive span (duplicate
/// timestamps or clock anomalies).
#[allow(clippy::cast_precision_loss)] // window length is at most RATE_WINDOW
pub fn estimate_rate(samples: &[Sample]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let start = samples.len().saturating_sub(RATE_WINDOW);
    let window = &samples[start..];

    let first = window.first().expect("window has >= 2 samples");
    let last = window.last().expect("window has >= 2 samples");

    // Instant::duration_since saturates to zero when out of order.
    let span = last.monotonic.duration_since(first.monotonic).as_secs_f64();
    if span <= 0.0 {
        return 0.0;
    }

    (window.len() - 1) as f64 / span
}

impl SampleRing {
    /// Estimates the current sampling rate from a snapshot of the ring.
    pub fn sampling_rate(&self) -> f64 {
        estimate_rate(&self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn sample_at(monotonic: Instant, watts: f64) -> Sample {
        let mut sample = Sample::now(watts, Vec::new());
        sample.monotonic = monotonic;
        sample
    }

    #[test]
    fn test_empty_and_singleton_return_zero() {
        assert_eq!(estimate_rate(&[]), 0.0);

        let one = vec![sample_at(Instant::now(), 100.0)];
        assert_eq!(estimate_rate(&one), 0.0);
    }

    #[test]
    fn test_two_samples_one_second_apart() {
        let base = Instant::now();
        let samples = vec![
            sample_at(base, 100.0),
            sample_at(base + Duration::from_secs(1), 101.0),
        ];

        let rate = estimate_rate(&samples);
        assert!((rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_twenty_per_second_cadence() {
        let base = Instant::now();
        let samples: Vec<_> = (0..10)
            .map(|i| sample_at(base + Duration::from_millis(50 * i), 100.0))
            .collect();

        let rate = estimate_rate(&samples);
        assert!((rate - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_window_limits_to_recent_samples() {
        let base = Instant::now();
        // 20 old samples at 1/s, then 10 recent at 10/s. Only the trailing
        // window of 10 should count.
        let mut samples: Vec<_> = (0..20)
            .map(|i| sample_at(base + Duration::from_secs(i), 100.0))
            .collect();
        let recent_base = base + Duration::from_secs(30);
        samples.extend(
            (0..10).map(|i| sample_at(recent_base + Duration::from_millis(100 * i), 100.0)),
        );

        let rate = estimate_rate(&samples);
        assert!((rate - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_span_returns_zero() {
        let now = Instant::now();
        let samples = vec![sample_at(now, 100.0), sample_at(now, 101.0)];
        assert_eq!(estimate_rate(&samples), 0.0);
    }

    #[test]
    fn test_ring_sampling_rate() {
        let ring = SampleRing::new(100);
        assert_eq!(ring.sampling_rate(), 0.0);

        let base = Instant::now();
        ring.push(sample_at(base, 100.0));
        ring.push(sample_at(base + Duration::from_secs(1), 101.0));

        assert!((ring.sampling_rate() - 1.0).abs() < 1e-9);
    }
}
