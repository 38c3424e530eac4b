//! Error types for the powermon telemetry collector.

use std::time::Duration;

use thiserror::Error;

/// The main error type for all powermon operations.
///
/// This enum covers the fatal conditions that surface at the monitor
/// boundary. Transient fetch failures are absorbed inside the poller loop
/// and only appear here when a one-shot operation (connection test) fails.
#[derive(Error, Debug)]
pub enum PowermonError {
    /// A telemetry fetch failed (only fatal for one-shot operations).
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Error in the export path (startup or sink write).
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// Error in poller lifecycle management.
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

/// Transient failures when fetching telemetry from the remote endpoint.
///
/// The poller recovers from all of these by backing off and retrying; they
/// never propagate past its loop. They are only fatal when returned from a
/// one-shot connection test.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Failed to construct the HTTP client.
    #[cfg(feature = "redfish")]
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP request itself failed (connection, timeout, TLS).
    #[cfg(feature = "redfish")]
    #[error("request to '{path}' failed: {source}")]
    Request {
        /// The request path relative to the service root.
        path: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The server returned a non-success status.
    #[error("server returned status {status} for '{path}'")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The request path relative to the service root.
        path: String,
    },

    /// The response body could not be decoded as JSON.
    #[error("invalid JSON from '{path}': {reason}")]
    InvalidJson {
        /// The request path relative to the service root.
        path: String,
        /// Description of the decode failure.
        reason: String,
    },

    /// The response was valid JSON but the expected field was missing.
    #[error("power data not found in response: {reason}")]
    PowerDataMissing {
        /// Which field or structure was expected.
        reason: String,
    },
}

/// Errors in the export path.
#[derive(Error, Debug)]
pub enum ExportError {
    /// No sample arrived within the startup grace window. Signals a
    /// connectivity problem upstream.
    #[error("no power samples collected within {waited:?}; check the remote connection")]
    NoData {
        /// How long the exporter waited before giving up.
        waited: Duration,
    },

    /// The durable sink rejected a write. Fatal — never masked.
    #[error("failed to write to sink '{path}': {source}")]
    SinkWrite {
        /// The sink path (display form).
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sink could not be created or opened.
    #[error("failed to open sink '{path}': {source}")]
    SinkOpen {
        /// The sink path (display form).
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors in poller lifecycle management.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The poller thread panicked. Expected fetch failures are absorbed in
    /// the loop; this only fires for programming errors.
    #[error("poller thread panicked: {message}")]
    PollerPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The poller was already stopped when stop was requested.
    #[error("poller is not running")]
    NotRunning,
}

/// Type alias for `Result<T, PowermonError>`.
pub type Result<T> = std::result::Result<T, PowermonError>;
