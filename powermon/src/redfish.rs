//! Redfish telemetry source for Dell iDRAC (and compatible) endpoints.
//!
//! Implements [`TelemetrySource`] over the Redfish REST API using a
//! persistent blocking HTTP client. The power resource URI is discovered
//! once from the system resource and cached for the life of the client.
//!
//! Authentication is HTTP basic auth; transport security is controlled by
//! the `verify_ssl` flag (iDRACs commonly ship self-signed certificates).
//!
//! # Example
//!
//! ```rust,no_run
//! use powermon::redfish::{RedfishClient, RedfishConfig};
//! use powermon::source::TelemetrySource;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RedfishConfig::new("10.0.0.120", "root", "calvin");
//! let mut client = RedfishClient::new(config)?;
//!
//! let watts = client.fetch_power()?;
//! println!("current draw: {watts} W");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde_json::Value;

use crate::error::FetchError;
use crate::sample::PowerSupplyReading;
use crate::source::TelemetrySource;

/// Default Redfish system resource identifier.
pub const DEFAULT_SYSTEM_ID: &str = "/Systems/System.Embedded.1";

/// Configuration for a Redfish endpoint.
#[derive(Debug, Clone)]
pub struct RedfishConfig {
    /// Hostname or IP address of the management controller.
    pub host: String,
    /// Basic auth username.
    pub username: String,
    /// Basic auth password.
    pub password: String,
    /// System resource identifier relative to the service root.
    pub system_id: String,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Whether to verify TLS certificates.
    pub verify_ssl: bool,
}

impl RedfishConfig {
    /// Creates a config with sensible defaults.
    ///
    /// Defaults: system id `/Systems/System.Embedded.1`, 5s timeout,
    /// certificate verification disabled (self-signed iDRAC certs).
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            system_id: DEFAULT_SYSTEM_ID.to_string(),
            timeout: Duration::from_secs(5),
            verify_ssl: false,
        }
    }

    /// Sets the system resource identifier.
    #[must_use]
    pub fn with_system_id(mut self, system_id: impl Into<String>) -> Self {
        self.system_id = system_id.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub fn with_verify_ssl(mut self, verify_ssl: bool) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }
}

/// Blocking Redfish API client with power URI caching.
#[derive(Debug)]
pub struct RedfishClient {
    config: RedfishConfig,
    base_url: String,
    client: reqwest::blocking::Client,
    /// Cached `Power` resource URI, discovered on first use.
    power_uri: Option<String>,
}

impl RedfishClient {
    /// Builds the client. Connections are kept alive across requests.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::ClientCreate`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: RedfishConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| FetchError::ClientCreate { source: e })?;

        let base_url = format!("https://{}/redfish/v1", config.host);

        Ok(Self {
            config,
            base_url,
            client,
            power_uri: None,
        })
    }

    /// Performs a GET against a path relative to the service root and
    /// decodes the JSON body.
    fn get(&self, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FetchError::Request {
                path: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        response.json().map_err(|e| FetchError::InvalidJson {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Returns the `Power` resource URI for the configured system,
    /// discovering and caching it on first call.
    fn power_uri(&mut self) -> Result<String, FetchError> {
        if let Some(uri) = &self.power_uri {
            return Ok(uri.clone());
        }

        let system = self.get(&self.config.system_id)?;
        let uri = system
            .pointer("/Power/@odata.id")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::PowerDataMissing {
                reason: format!("no Power URI for system '{}'", self.config.system_id),
            })?;

        // Some implementations return the full service-root path.
        let uri = uri
            .strip_prefix("/redfish/v1")
            .unwrap_or(uri)
            .to_string();

        self.power_uri = Some(uri.clone());
        Ok(uri)
    }
}

impl TelemetrySource for RedfishClient {
    fn fetch_power(&mut self) -> Result<f64, FetchError> {
        let uri = self.power_uri()?;
        let power = self.get(&uri)?;
        extract_total_power(&power)
    }

    fn fetch_power_supplies(&mut self) -> Result<Vec<PowerSupplyReading>, FetchError> {
        let uri = self.power_uri()?;
        let power = self.get(&uri)?;
        Ok(extract_power_supplies(&power))
    }
}

/// Extracts the total power draw from a `Power` resource body.
///
/// Dell iDRAC reports `PowerControl[].PowerConsumedWatts`; some other
/// Redfish implementations only fill `PowerMetrics.AverageConsumedWatts`.
fn extract_total_power(power: &Value) -> Result<f64, FetchError> {
    let controls = power
        .get("PowerControl")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::PowerDataMissing {
            reason: "response has no PowerControl array".to_string(),
        })?;

    for control in controls {
        if let Some(watts) = control.get("PowerConsumedWatts").and_then(Value::as_f64) {
            return Ok(watts);
        }
    }

    for control in controls {
        if let Some(watts) = control
            .pointer("/PowerMetrics/AverageConsumedWatts")
            .and_then(Value::as_f64)
        {
            return Ok(watts);
        }
    }

    Err(FetchError::PowerDataMissing {
        reason: "no PowerConsumedWatts or AverageConsumedWatts in PowerControl".to_string(),
    })
}

/// Extracts per-supply readings from a `Power` resource body.
///
/// Missing fields become `None`; a missing or empty `PowerSupplies` array
/// yields an empty list (legitimate — not an error).
fn extract_power_supplies(power: &Value) -> Vec<PowerSupplyReading> {
    let Some(supplies) = power.get("PowerSupplies").and_then(Value::as_array) else {
        return Vec::new();
    };

    supplies
        .iter()
        .map(|supply| PowerSupplyReading {
            id: supply
                .get("MemberId")
                .or_else(|| supply.get("Id"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input_watts: supply.get("PowerInputWatts").and_then(Value::as_f64),
            output_watts: supply.get("PowerOutputWatts").and_then(Value::as_f64),
            state: supply
                .pointer("/Status/State")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        })
        .collect()
}
