//! Telemetry publishing against a mock transport.

use std::time::Duration;

use jura::telemetry::{TelemetryPublisher, TickOutcome};

use crate::mocks::*;

#[test]
fn tick_publishes_time_rssi_and_version() {
    let transport = MockTransport::default();
    let ch = channel(transport.clone());
    ch.on_connected().unwrap();
    let mut telemetry = TelemetryPublisher::new(ch, MockLink(Some(-67)), MockClock(1_700_000_000), "1.0.0");

    assert_eq!(telemetry.tick(), TickOutcome::Published { failures: 0 });
    assert_eq!(
        transport.published_payload(&format!("{}/time", ID)).as_deref(),
        Some("Tue Nov 14 22:13:20 2023")
    );
    assert_eq!(transport.published_payload(&format!("{}/rssi", ID)).as_deref(), Some("-67.0"));
    assert_eq!(transport.published_payload(&format!("{}/version", ID)).as_deref(), Some("1.0.0"));
}

#[test]
fn unknown_rssi_publishes_nan() {
    let transport = MockTransport::default();
    let ch = channel(transport.clone());
    ch.on_connected().unwrap();
    let mut telemetry = TelemetryPublisher::new(ch, MockLink(None), MockClock(0), "1.0.0");
    telemetry.tick();
    assert_eq!(transport.published_payload(&format!("{}/rssi", ID)).as_deref(), Some("nan"));
}

#[test]
fn session_down_publishes_nothing_and_reestablish_nudges() {
    let transport = MockTransport::default();
    let ch = channel(transport.clone());
    let mut telemetry = TelemetryPublisher::new(ch.clone(), MockLink(Some(-50)), MockClock(0), "1.0.0");

    assert_eq!(telemetry.tick(), TickOutcome::SessionDown);
    assert!(transport.log().published.is_empty());

    assert!(!ch.reestablish(Duration::from_millis(20)));
    assert_eq!(transport.log().reconnects, 1);
}

#[test]
fn reestablish_returns_once_session_comes_up() {
    let transport = MockTransport::default();
    let ch = channel(transport.clone());
    let remote = ch.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        remote.on_connected().unwrap();
    });
    assert!(ch.reestablish(Duration::from_secs(5)));
    handle.join().unwrap();
}

#[test]
fn run_once_with_session_down_reestablishes_and_publishes_nothing() {
    let transport = MockTransport::default();
    let ch = channel(transport.clone());
    let mut telemetry = TelemetryPublisher::new(ch.clone(), MockLink(Some(-50)), MockClock(0), "1.0.0");

    assert_eq!(telemetry.run_once(Duration::from_millis(20)), TickOutcome::SessionDown);
    assert_eq!(transport.log().reconnects, 1);
    assert!(transport.log().published.is_empty());
}

#[test]
fn run_once_with_session_up_publishes_without_reconnecting() {
    let transport = MockTransport::default();
    let ch = channel(transport.clone());
    ch.on_connected().unwrap();
    let mut telemetry = TelemetryPublisher::new(ch, MockLink(Some(-50)), MockClock(0), "1.0.0");

    assert_eq!(
        telemetry.run_once(Duration::from_millis(20)),
        TickOutcome::Published { failures: 0 }
    );
    assert_eq!(transport.log().reconnects, 0);
    assert_eq!(transport.log().published.len(), 3);
}

#[test]
fn run_once_publishes_during_an_update() {
    let (mut ctl, transport) = controller();
    handshake(&mut ctl);
    ctl.handle_event(firmware_fragment(0, &image(100), 250)).unwrap();
    assert!(ctl.ota().is_active());

    let mut telemetry = TelemetryPublisher::new(ctl.channel().clone(), MockLink(None), MockClock(0), "1.0.0");
    assert_eq!(
        telemetry.run_once(Duration::from_millis(20)),
        TickOutcome::Published { failures: 0 }
    );
    assert!(transport.published_payload(&format!("{}/version", ID)).is_some());
}
