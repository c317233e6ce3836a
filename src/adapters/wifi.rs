//! WiFi station-mode adapter.
//!
//! Brings the station up, mirrors link state into the
//! [`ConnectivityMonitor`] and implements [`LinkPort`] for telemetry.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` plus the netif
//!   IPv6 calls from `esp_idf_svc::sys`.
//! - **all other targets**: a controllable simulated link for host tests.
//!
//! ## Link policy
//!
//! [`WifiAdapter::poll`] is called from the control loop.  Once associated
//! it requests an IPv6 link-local address; on loss of association both
//! address flags are cleared and a reconnect is issued immediately.

use core::fmt;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::app::ports::LinkPort;
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    /// No IPv4 address within the connect timeout.
    Timeout,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::Timeout => write!(f, "no IP address before timeout"),
        }
    }
}

impl std::error::Error for LinkError {}

// ───────────────────────────────────────────────────────────────
// Link state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

/// One sample of the platform link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LinkStatus {
    associated: bool,
    ipv4: bool,
    ipv6_link_local: bool,
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), LinkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), LinkError> {
    if !password.is_empty() && !(8..=64).contains(&password.len()) {
        return Err(LinkError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimLink,
}

/// Simulated radio: tests flip the link and read back reconnect requests.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimLink {
    pub up: bool,
    pub rssi: Option<i8>,
    pub connects: u32,
    pub ipv6_requests: u32,
    ipv6: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            sim: SimLink {
                rssi: Some(-60),
                ..SimLink::default()
            },
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| LinkError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| LinkError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    /// Start the station and block until an IPv4 address is up or
    /// `timeout` elapses.
    pub fn connect(&mut self, monitor: &ConnectivityMonitor, timeout: Duration) -> Result<(), LinkError> {
        if self.ssid.is_empty() {
            return Err(LinkError::NoCredentials);
        }
        info!("WiFi: connecting to '{}'", self.ssid);
        self.platform_connect()?;
        self.state = WifiState::Connected;

        let deadline = Instant::now() + timeout;
        loop {
            self.poll(monitor);
            if monitor.contains(ConnectivityState::IP_ACQUIRED) {
                info!("WiFi: connected (RSSI={:?})", self.rssi());
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("WiFi: no IP after {}s", timeout.as_secs());
                return Err(LinkError::Timeout);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Mirror the link into `monitor`; reconnect if association was lost.
    pub fn poll(&mut self, monitor: &ConnectivityMonitor) {
        let mut link = self.platform_link();

        if link.associated && !link.ipv6_link_local {
            self.platform_request_ipv6();
            link = self.platform_link();
        }

        if link.ipv4 {
            monitor.set(ConnectivityState::IP_ACQUIRED);
        }
        if link.ipv6_link_local {
            monitor.set(ConnectivityState::SECONDARY_ADDRESS_ACQUIRED);
        }

        match self.state {
            WifiState::Connected | WifiState::Reconnecting { .. } if link.associated => {
                if self.state != WifiState::Connected {
                    info!("WiFi: reconnected");
                }
                self.state = WifiState::Connected;
            }
            WifiState::Connected | WifiState::Reconnecting { .. } => {
                let attempt = match self.state {
                    WifiState::Reconnecting { attempt } => attempt + 1,
                    _ => {
                        warn!("WiFi: connection lost, reconnecting");
                        0
                    }
                };
                monitor.clear(
                    ConnectivityState::IP_ACQUIRED | ConnectivityState::SECONDARY_ADDRESS_ACQUIRED,
                );
                self.state = WifiState::Reconnecting { attempt };
                if let Err(e) = self.platform_connect() {
                    warn!("WiFi: reconnect attempt {} failed — {}", attempt, e);
                }
            }
            WifiState::Disconnected => {}
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), LinkError> {
        if !self.wifi.is_started().unwrap_or(false) {
            let auth_method = if self.password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            };
            let config = Configuration::Client(ClientConfiguration {
                ssid: self.ssid.as_str().try_into().map_err(|_| LinkError::InvalidSsid)?,
                password: self
                    .password
                    .as_str()
                    .try_into()
                    .map_err(|_| LinkError::InvalidPassword)?,
                auth_method,
                ..Default::default()
            });
            self.wifi.set_configuration(&config).map_err(|e| {
                warn!("WiFi: set_configuration failed: {:?}", e);
                LinkError::ConnectionFailed
            })?;
            self.wifi.start().map_err(|e| {
                warn!("WiFi: start failed: {:?}", e);
                LinkError::ConnectionFailed
            })?;
        }
        // The blocking connect waits for association only; addresses are
        // picked up by poll().
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect failed: {:?}", e);
            LinkError::ConnectionFailed
        })
    }

    #[cfg(target_os = "espidf")]
    fn platform_link(&self) -> LinkStatus {
        use esp_idf_svc::sys::{esp_ip6_addr_t, esp_netif_get_ip6_linklocal, ESP_OK};

        let associated = self.wifi.is_connected().unwrap_or(false);
        let netif = self.wifi.wifi().sta_netif();
        let ipv4 = netif
            .get_ip_info()
            .map(|info| !info.ip.is_unspecified())
            .unwrap_or(false);
        let mut ip6 = esp_ip6_addr_t::default();
        // SAFETY: the handle is owned by `self.wifi` and outlives the call.
        let ipv6_link_local = unsafe { esp_netif_get_ip6_linklocal(netif.handle(), &mut ip6) } == ESP_OK as i32;
        LinkStatus {
            associated,
            ipv4,
            ipv6_link_local,
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_request_ipv6(&mut self) {
        use esp_idf_svc::sys::{esp_netif_create_ip6_linklocal, ESP_OK};

        let netif = self.wifi.wifi().sta_netif();
        // SAFETY: the handle is owned by `self.wifi` and outlives the call.
        let ret = unsafe { esp_netif_create_ip6_linklocal(netif.handle()) };
        if ret != ESP_OK as i32 {
            warn!("WiFi: IPv6 link-local request failed ({})", ret);
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::{esp_wifi_sta_get_ap_info, wifi_ap_record_t, ESP_OK};

        // SAFETY: zeroed record is a valid out-parameter for the query.
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        if unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) } != ESP_OK as i32 {
            return None;
        }
        Some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), LinkError> {
        self.sim.connects += 1;
        self.sim.up = true;
        info!("WiFi(sim): connected to '{}' (attempt {})", self.ssid, self.sim.connects);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_link(&self) -> LinkStatus {
        LinkStatus {
            associated: self.sim.up,
            ipv4: self.sim.up,
            ipv6_link_local: self.sim.up && self.sim.ipv6,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_request_ipv6(&mut self) {
        self.sim.ipv6_requests += 1;
        self.sim.ipv6 = true;
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        if self.sim.up { self.sim.rssi } else { None }
    }

    /// Simulated radio, for host tests.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_mut(&mut self) -> &mut SimLink {
        &mut self.sim
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn sim(&self) -> &SimLink {
        &self.sim
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkPort for WifiAdapter {
    fn rssi(&self) -> Option<i8> {
        self.platform_rssi()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
