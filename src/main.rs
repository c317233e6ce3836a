//! Jura controller firmware — main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter   ClockAdapter   NvsAdapter   FlashAdapter        │
//! │  (LinkPort)    (ClockPort)    (ConfigPort) (FlashPort)         │
//! │  MqttAdapter + MqttEventPump (MessagePort, event thread)       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  mqtt-events ──mpsc──▶ ┌──────────────────────────────────┐    │
//! │                        │ Controller: CommandRouter ·      │    │
//! │                        │ OtaEngine          (controller)  │    │
//! │                        └──────────────────────────────────┘    │
//! │                                                                │
//! │  MessageChannel · ConnectivityMonitor · TelemetryPublisher     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::mpsc;

use anyhow::Result;
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

use jura::adapters::device_id::{self, DeviceIdentity};
use jura::adapters::flash::{self, FlashAdapter};
use jura::adapters::mqtt::{MqttAdapter, MqttEventPump};
use jura::adapters::nvs::NvsAdapter;
use jura::adapters::time::ClockAdapter;
use jura::adapters::wifi::WifiAdapter;
use jura::app::controller::Controller;
use jura::channel::MessageChannel;
use jura::connectivity::ConnectivityMonitor;
use jura::ota::OtaEngine;
use jura::ota::version::BUILD_TAG;
use jura::telemetry::{TelemetryPublisher, TickOutcome};

/// Flash writes run on the controller thread.
const CONTROLLER_STACK: usize = 8 * 1024;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    // SAFETY: plain getters with no preconditions.
    let free_heap = unsafe { esp_idf_svc::sys::esp_get_free_heap_size() };
    let idf_version = unsafe { core::ffi::CStr::from_ptr(esp_idf_svc::sys::esp_get_idf_version()) };
    info!("╔══════════════════════════════════════╗");
    info!("║  Jura controller {}", BUILD_TAG);
    info!("╚══════════════════════════════════════╝");
    info!("[APP] Free memory: {} bytes", free_heap);
    info!("[APP] IDF version: {}", idf_version.to_str().unwrap_or("?"));

    flash::mark_running_image_valid();

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let config = match NvsAdapter::new() {
        Ok(nvs) => nvs.load_or_default(),
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults", e);
            jura::config::SystemConfig::default()
        }
    };
    let connect_timeout = config.connect_timeout();

    // ── 3. WiFi station ───────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?;
    let mut wifi = WifiAdapter::new(BlockingWifi::wrap(esp_wifi, sysloop)?);
    wifi.set_credentials(&config.wifi_ssid, &config.wifi_password)?;

    let monitor = Arc::new(ConnectivityMonitor::new());
    while let Err(e) = wifi.connect(&monitor, connect_timeout) {
        warn!("WiFi: {} — retrying", e);
    }

    // ── 4. Wall clock ─────────────────────────────────────────
    let clock = ClockAdapter::start(&config.ntp_server);
    clock.wait_for_sync(
        config.time_sync_retries,
        std::time::Duration::from_millis(u64::from(config.time_sync_retry_interval_ms)),
    );

    // ── 5. Device identity + MQTT session ─────────────────────
    let mac = device_id::read_mac();
    let identity = DeviceIdentity::from_mac(&mac);
    info!(
        "Device ID: {} (AP name: {})",
        identity,
        device_id::access_point_name(&mac)
    );

    let (transport, connection) = MqttAdapter::connect(&config.mqtt_uri, identity.as_str())
        .map_err(|e| anyhow::anyhow!("mqtt: {}", e))?;
    let channel = Arc::new(MessageChannel::new(identity, transport, monitor.clone()));

    // esp-ota handles stay on the thread that created them.
    let (events_tx, events_rx) = mpsc::channel();
    let controller_channel = channel.clone();
    std::thread::Builder::new()
        .name("controller".into())
        .stack_size(CONTROLLER_STACK)
        .spawn(move || {
            let ota = OtaEngine::new(FlashAdapter::new(), BUILD_TAG);
            Controller::new(controller_channel, ota).run(events_rx);
        })?;
    MqttEventPump::spawn(connection, events_tx)?;

    if !channel.wait_established(connect_timeout) {
        warn!("MQTT: no session after {}s, continuing", connect_timeout.as_secs());
    }

    // ── 6. Control loop ───────────────────────────────────────
    let mut telemetry = TelemetryPublisher::new(channel.clone(), wifi, clock, BUILD_TAG);
    let interval = config.telemetry_interval();
    info!("Control loop started (telemetry every {}s)", interval.as_secs());

    loop {
        telemetry.link_mut().poll(&monitor);
        if telemetry.run_once(connect_timeout) == TickOutcome::SessionDown {
            continue;
        }
        std::thread::sleep(interval);
    }
}
