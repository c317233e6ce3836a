//! Routing and session handling through the controller.

use jura::app::events::{ChannelEvent, InboundFragment};
use jura::app::ports::ChannelError;
use jura::error::Error;
use jura::ota::OtaState;
use jura::router::RouteError;

use crate::mocks::*;

#[test]
fn connect_subscribes_namespaced_topics() {
    let (mut ctl, transport) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    assert_eq!(
        transport.log().subscribed,
        vec![
            format!("{}/pump/#", ID),
            format!("{}/config/#", ID),
            format!("{}/ota/version", ID),
        ]
    );
    assert!(ctl.channel().is_established());
}

#[test]
fn reconnect_resubscribes() {
    let (mut ctl, transport) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    ctl.handle_event(ChannelEvent::Disconnected).unwrap();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    assert_eq!(transport.log().subscribed.len(), 6);
}

#[test]
fn foreign_device_topic_is_dropped() {
    let (mut ctl, _t) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    let event = ChannelEvent::Message(InboundFragment::complete("0123456789ab/ota/version", b"9.9.9"));
    assert_eq!(ctl.handle_event(event), Err(Error::Route(RouteError::ForeignNamespace)));
    assert_eq!(ctl.ota().state(), OtaState::AwaitingVersionReply);
}

#[test]
fn bare_identity_topic_is_too_short() {
    let (mut ctl, _t) = controller();
    let event = ChannelEvent::Message(InboundFragment::complete(ID, b"x"));
    assert_eq!(ctl.handle_event(event), Err(Error::Route(RouteError::TooFewSegments(1))));
}

#[test]
fn pump_config_and_unknown_are_accepted_without_effect() {
    let (mut ctl, transport) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    for sub in ["pump/1/on", "config/grind", "ota", "ota/rollback", "milk/foam"] {
        ctl.handle_event(message(sub, b"1")).unwrap();
    }
    assert_eq!(ctl.ota().state(), OtaState::AwaitingVersionReply);
    assert!(transport.log().published.is_empty());
    assert_eq!(transport.log().subscribed.len(), 3);
}

#[test]
fn orphan_continuation_is_rejected() {
    let (mut ctl, _t) = controller();
    let event = ChannelEvent::Message(InboundFragment {
        topic: None,
        data: vec![0; 10],
        offset: 10,
        total_len: 20,
    });
    assert_eq!(ctl.handle_event(event), Err(Error::Route(RouteError::NoPendingTopic)));
}

#[test]
fn failed_firmware_subscription_abandons_update() {
    let (mut ctl, transport) = controller();
    transport.log().fail_subscribe_suffix = Some("/ota/firmware");
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    assert_eq!(
        ctl.handle_event(message("ota/version", b"1.0.1")),
        Err(Error::Channel(ChannelError::SubscribeFailed))
    );
    assert_eq!(ctl.ota().state(), OtaState::Idle);
}

#[test]
fn transport_error_event_is_harmless() {
    let (mut ctl, _t) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    ctl.handle_event(ChannelEvent::Error).unwrap();
    assert!(ctl.channel().is_established());
}

#[test]
fn run_drains_queued_events_from_another_thread() {
    let (mut ctl, transport) = controller();
    let img = image(250);
    let (tx, rx) = std::sync::mpsc::channel();

    let producer = std::thread::spawn(move || {
        tx.send(ChannelEvent::Connected).unwrap();
        // Unroutable: the error is logged and the loop keeps going.
        tx.send(ChannelEvent::Message(InboundFragment::complete("stray", b"x"))).unwrap();
        tx.send(message("ota/version", b"1.0.1")).unwrap();
        for (start, end) in [(0, 100), (100, 200), (200, 250)] {
            tx.send(firmware_fragment(start, &img[start..end], img.len())).unwrap();
        }
    });

    ctl.run(rx);
    producer.join().unwrap();

    assert!(transport.log().subscribed.contains(&format!("{}/ota/firmware", ID)));
    assert_eq!(ctl.ota().state(), OtaState::Committing);
    assert_eq!(ctl.ota().flash().boot_slot(), 1);
}
