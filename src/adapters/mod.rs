//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements   | Connects to                   |
//! |-------------|--------------|-------------------------------|
//! | `device_id` | —            | eFuse factory MAC             |
//! | `flash`     | FlashPort    | esp-ota / two-slot simulation |
//! | `mqtt`      | MessagePort  | esp-mqtt client (espidf only) |
//! | `nvs`       | ConfigPort   | NVS / in-memory store         |
//! | `time`      | ClockPort    | SNTP + system clock           |
//! | `wifi`      | LinkPort     | ESP-IDF WiFi STA              |

pub mod device_id;
pub mod flash;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod nvs;
pub mod time;
pub mod wifi;
