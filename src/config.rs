//! System configuration parameters
//!
//! All tunable parameters for the controller.  Compile-time defaults come
//! from the build environment (`JURA_MQTT_URI`, `JURA_NTP_SERVER`,
//! `JURA_WIFI_SSID`, `JURA_WIFI_PASSWORD`); a validated copy can be
//! persisted to NVS through [`ConfigPort`](crate::app::ports::ConfigPort).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

const DEFAULT_MQTT_URI: &str = match option_env!("JURA_MQTT_URI") {
    Some(uri) => uri,
    None => "mqtt://broker.local:1883",
};

const DEFAULT_NTP_SERVER: &str = match option_env!("JURA_NTP_SERVER") {
    Some(server) => server,
    None => "pool.ntp.org",
};

const DEFAULT_WIFI_SSID: &str = match option_env!("JURA_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};

const DEFAULT_WIFI_PASSWORD: &str = match option_env!("JURA_WIFI_PASSWORD") {
    Some(password) => password,
    None => "",
};

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Network ---
    /// Broker URI, `mqtt://` or `mqtts://`
    pub mqtt_uri: heapless::String<128>,
    /// SNTP server host name
    pub ntp_server: heapless::String<64>,
    /// Station SSID (empty = not provisioned)
    pub wifi_ssid: heapless::String<32>,
    /// Station password (empty = open network)
    pub wifi_password: heapless::String<64>,

    // --- Timing ---
    /// Telemetry report interval (seconds)
    pub telemetry_interval_secs: u32,
    /// How long to wait for IP / MQTT session before retrying (seconds)
    pub connect_timeout_secs: u32,
    /// SNTP sync polls before giving up
    pub time_sync_retries: u8,
    /// Delay between SNTP sync polls (milliseconds)
    pub time_sync_retry_interval_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            mqtt_uri: truncated(DEFAULT_MQTT_URI),
            ntp_server: truncated(DEFAULT_NTP_SERVER),
            wifi_ssid: truncated(DEFAULT_WIFI_SSID),
            wifi_password: truncated(DEFAULT_WIFI_PASSWORD),

            telemetry_interval_secs: 60,
            connect_timeout_secs: 60,
            time_sync_retries: 10,
            time_sync_retry_interval_ms: 2000,
        }
    }
}

impl SystemConfig {
    /// Range-check every field.  Called before persisting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let uri = self.mqtt_uri.as_str();
        if !(uri.starts_with("mqtt://") || uri.starts_with("mqtts://")) {
            return Err(ConfigError::ValidationFailed(
                "mqtt_uri must start with mqtt:// or mqtts://",
            ));
        }
        if self.ntp_server.is_empty() {
            return Err(ConfigError::ValidationFailed("ntp_server must not be empty"));
        }
        if !self.wifi_ssid.bytes().all(|b| (0x20..=0x7E).contains(&b)) {
            return Err(ConfigError::ValidationFailed(
                "wifi_ssid must be printable ASCII",
            ));
        }
        if !self.wifi_password.is_empty() && self.wifi_password.len() < 8 {
            return Err(ConfigError::ValidationFailed(
                "wifi_password must be 8-64 bytes, or empty for open",
            ));
        }
        if !(10..=86_400).contains(&self.telemetry_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "telemetry_interval_secs must be 10-86400",
            ));
        }
        if !(1..=600).contains(&self.connect_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "connect_timeout_secs must be 1-600",
            ));
        }
        if self.time_sync_retries == 0 {
            return Err(ConfigError::ValidationFailed(
                "time_sync_retries must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn telemetry_interval(&self) -> core::time::Duration {
        core::time::Duration::from_secs(u64::from(self.telemetry_interval_secs))
    }

    pub fn connect_timeout(&self) -> core::time::Duration {
        core::time::Duration::from_secs(u64::from(self.connect_timeout_secs))
    }
}

/// Copy as much of `s` as fits, cutting on a char boundary.
fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
