//! Wall-clock adapter.
//!
//! - **`target_os = "espidf"`** — starts SNTP via `EspSntp` and reads the
//!   system clock with `gettimeofday`.
//! - **`not(target_os = "espidf")`** — uses `std::time::SystemTime`.
//!
//! The clock is considered synchronised once it reports a year after 2016;
//! before that the RTC is still counting from the epoch.

use std::time::Duration;

use log::{info, warn};

use crate::app::ports::ClockPort;

/// 2016-01-01T00:00:00Z.
pub const EPOCH_2016: i64 = 1_451_606_400;

pub struct ClockAdapter {
    #[cfg(target_os = "espidf")]
    _sntp: Option<esp_idf_svc::sntp::EspSntp<'static>>,
    #[cfg(not(target_os = "espidf"))]
    offset_secs: i64,
}

impl ClockAdapter {
    /// Start SNTP against `server`.
    #[cfg(target_os = "espidf")]
    pub fn start(server: &str) -> Self {
        use esp_idf_svc::sntp::{EspSntp, SntpConf};

        let mut conf = SntpConf::default();
        // esp-idf-svc takes 'static server names; the config lives for the
        // whole process so leaking one copy is fine.
        let server: &'static str = Box::leak(server.to_owned().into_boxed_str());
        conf.servers[0] = server;
        let sntp = match EspSntp::new(&conf) {
            Ok(sntp) => {
                info!("Time: SNTP started ({})", server);
                Some(sntp)
            }
            Err(e) => {
                warn!("Time: SNTP start failed: {:?}", e);
                None
            }
        };
        Self { _sntp: sntp }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn start(server: &str) -> Self {
        info!("Time(sim): using host clock instead of {}", server);
        Self { offset_secs: 0 }
    }

    /// Host clock shifted by `offset_secs`, for tests.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_offset(offset_secs: i64) -> Self {
        Self { offset_secs }
    }

    pub fn is_synchronised(&self) -> bool {
        self.now_unix() >= EPOCH_2016
    }

    /// Poll up to `retries` times, `interval` apart, for a valid clock.
    pub fn wait_for_sync(&self, retries: u8, interval: Duration) -> bool {
        for attempt in 1..=retries {
            if self.is_synchronised() {
                return true;
            }
            info!("Time: waiting for system time to be set... ({}/{})", attempt, retries);
            std::thread::sleep(interval);
        }
        let synced = self.is_synchronised();
        if !synced {
            warn!("Time: not synchronised after {} attempts", retries);
        }
        synced
    }
}

impl ClockPort for ClockAdapter {
    #[cfg(target_os = "espidf")]
    fn now_unix(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-parameter; tz may be null.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_unix(&self) -> i64 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        now + self.offset_secs
    }
}
