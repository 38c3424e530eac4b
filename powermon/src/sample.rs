//! Core data model: power samples as produced by the poller.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single reading from one power supply unit.
///
/// Every field except `id` is optional — Redfish implementations vary in
/// which attributes they report per supply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSupplyReading {
    /// Supply identifier (`MemberId` or `Id` in Redfish terms).
    pub id: String,
    /// Input power in watts, if reported.
    pub input_watts: Option<f64>,
    /// Output power in watts, if reported.
    pub output_watts: Option<f64>,
    /// Operational state (e.g. `Enabled`), if reported.
    pub state: Option<String>,
}

/// One power measurement, immutable once created.
///
/// Samples are produced exclusively by the poller and carry both a
/// wall-clock timestamp (for export) and a monotonic timestamp (for rate
/// estimation and ordering, immune to clock adjustments).
#[derive(Debug, Clone)]
pub struct Sample {
    /// Wall-clock time the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Monotonic time the sample was taken.
    pub monotonic: Instant,
    /// Total system power draw in watts.
    pub total_power_watts: Option<f64>,
    /// Per-supply readings. Empty on polls that skip the supply fetch.
    pub power_supplies: Vec<PowerSupplyReading>,
}

impl Sample {
    /// Creates a sample stamped with the current wall-clock and monotonic time.
    pub fn now(total_power_watts: f64, power_supplies: Vec<PowerSupplyReading>) -> Self {
        Self {
            timestamp: Utc::now(),
            monotonic: Instant::now(),
            total_power_watts: Some(total_power_watts),
            power_supplies,
        }
    }

    /// Returns the supply reading with the given id, if present.
    pub fn supply(&self, id: &str) -> Option<&PowerSupplyReading> {
        self.power_supplies.iter().find(|ps| ps.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_lookup() {
        let sample = Sample::now(
            150.0,
            vec![
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
        );

        assert_eq!(sample.supply("PS1").unwrap().output_watts, Some(80.0));
        assert_eq!(sample.supply("PS2").unwrap().input_watts, Some(75.0));
        assert!(sample.supply("PS3").is_none());
    }

    #[test]
    fn test_now_stamps_current_time() {
        let before = Utc::now();
        let sample = Sample::now(100.0, Vec::new());
        let after = Utc::now();

        assert!(sample.timestamp >= before);
        assert!(sample.timestamp <= after);
        assert_eq!(sample.total_power_watts, Some(100.0));
        assert!(sample.power_supplies.is_empty());
    }
}
