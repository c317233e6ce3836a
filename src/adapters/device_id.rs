//! Device identity derived from the ESP32 factory MAC address.
//!
//! The identity is the full 6-byte MAC in lowercase hex (`a4cf12b3c4d5`).
//! It is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - The root segment of every MQTT topic this device uses
//! - The MQTT client id
//!
//! The soft-AP name uses the last 3 bytes (`jura-b3c4d5`).

use core::fmt;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Length of the hex identity string.
pub const IDENTITY_LEN: usize = 12;

/// Lowercase hex MAC, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(heapless::String<IDENTITY_LEN>);

impl DeviceIdentity {
    pub fn from_mac(mac: &MacAddress) -> Self {
        let mut id = heapless::String::new();
        use core::fmt::Write;
        for b in mac {
            // 6 bytes × 2 hex digits always fits IDENTITY_LEN.
            let _ = write!(id, "{:02x}", b);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: `mac` is a valid 6-byte buffer, which is what the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Soft-AP name from the last 3 MAC bytes.
/// Format: `jura-xxyyzz`.
pub fn access_point_name(mac: &MacAddress) -> heapless::String<16> {
    let mut name = heapless::String::<16>::new();
    use core::fmt::Write;
    let _ = write!(name, "jura-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}
