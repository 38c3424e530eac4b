//! The telemetry source capability consumed by the poller.

use crate::error::FetchError;
use crate::sample::PowerSupplyReading;

/// An external source of power telemetry.
///
/// This is the narrow seam between the core and the remote API: anything
/// that can produce a total power figure and a set of supply readings can
/// drive the monitor. Calls are synchronous and may block; the core owns
/// all rate limiting and retry policy, the source must be safe to call
/// repeatedly. Any internal caching (endpoint discovery, sessions) is the
/// source's own concern and invisible to callers.
pub trait TelemetrySource: Send {
    /// Fetches the current total power consumption in watts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on any network, auth, or parse failure.
    /// Callers must not assume any particular retry has happened.
    fn fetch_power(&mut self) -> Result<f64, FetchError>;

    /// Fetches per-supply readings.
    ///
    /// An empty list is a legitimate result — not every system reports
    /// power supplies.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on any network, auth, or parse failure.
    fn fetch_power_supplies(&mut self) -> Result<Vec<PowerSupplyReading>, FetchError>;
}
