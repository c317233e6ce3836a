//! End-to-end OTA flows driven through the controller.

use jura::adapters::flash::{FlashAdapter, FlashStep};
use jura::app::events::ChannelEvent;
use jura::error::Error;
use jura::ota::{OtaError, OtaState};

use crate::mocks::*;

fn stream(ctl: &mut TestController, img: &[u8], sizes: &[usize]) -> Vec<Result<(), Error>> {
    let mut offset = 0;
    let mut results = Vec::new();
    for &size in sizes {
        let end = (offset + size).min(img.len());
        results.push(ctl.handle_event(firmware_fragment(offset, &img[offset..end], img.len())));
        offset = end;
    }
    results
}

#[test]
fn newer_remote_requests_firmware() {
    let (mut ctl, transport) = controller();
    handshake(&mut ctl);
    assert_eq!(ctl.ota().state(), OtaState::Streaming);
    assert!(transport.log().subscribed.contains(&format!("{}/ota/firmware", ID)));
}

#[test]
fn matching_remote_requests_nothing() {
    let (mut ctl, transport) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    ctl.handle_event(message("ota/version", LOCAL_VERSION.as_bytes())).unwrap();
    assert_eq!(ctl.ota().state(), OtaState::AwaitingVersionReply);
    assert_eq!(transport.log().subscribed.len(), 3);
}

#[test]
fn three_chunk_image_commits_once() {
    let (mut ctl, _t) = controller();
    handshake(&mut ctl);
    let img = image(250);

    for r in stream(&mut ctl, &img, &[100, 100, 50]) {
        r.unwrap();
    }

    let flash = ctl.ota().flash();
    assert_eq!(flash.finalize_calls(), 1);
    assert_eq!(flash.boot_set_calls(), 1);
    assert_eq!(flash.restarts(), 1);
    assert_eq!(flash.boot_slot(), 1);
    assert_eq!(flash.image(1), img.as_slice());
    assert_eq!(ctl.ota().state(), OtaState::Committing);
}

#[test]
fn offset_gap_aborts_without_boot_switch() {
    let (mut ctl, transport) = controller();
    handshake(&mut ctl);
    let img = image(250);

    ctl.handle_event(firmware_fragment(0, &img[..100], 250)).unwrap();
    ctl.handle_event(firmware_fragment(100, &img[100..200], 250)).unwrap();
    assert_eq!(
        ctl.handle_event(firmware_fragment(150, &img[150..250], 250)),
        Err(Error::Ota(OtaError::NonSequential { expected: 200, got: 150 }))
    );

    let flash = ctl.ota().flash();
    assert_eq!(flash.boot_set_calls(), 0);
    assert_eq!(flash.restarts(), 0);
    assert_eq!(flash.boot_slot(), 0);
    assert_eq!(ctl.ota().state(), OtaState::Idle);
    assert!(transport.log().unsubscribed.contains(&format!("{}/ota/firmware", ID)));
}

#[test]
fn every_flash_failure_keeps_running_image() {
    let steps = [
        FlashStep::Select,
        FlashStep::Begin,
        FlashStep::Write(1),
        FlashStep::Write(2),
        FlashStep::Write(3),
        FlashStep::Finalize,
        FlashStep::SetBoot,
    ];
    for step in steps {
        let mut flash = FlashAdapter::new();
        flash.inject_failure(step);
        let (mut ctl, _t) = controller_with(flash);
        handshake(&mut ctl);

        let results = stream(&mut ctl, &image(250), &[100, 100, 50]);
        assert!(results.iter().any(Result::is_err), "{:?} must surface an error", step);

        let flash = ctl.ota().flash();
        assert_eq!(flash.boot_slot(), 0, "{:?} switched boot target", step);
        assert_eq!(flash.restarts(), 0, "{:?} restarted", step);
        assert_eq!(ctl.ota().state(), OtaState::Idle, "{:?}", step);
        assert!(!ctl.ota().is_active());
    }
}

#[test]
fn chunks_before_handshake_are_refused() {
    let (mut ctl, _t) = controller();
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    assert_eq!(
        ctl.handle_event(firmware_fragment(0, &image(10), 10)),
        Err(Error::Ota(OtaError::NotStreaming))
    );
    assert_eq!(ctl.ota().flash().begin_calls(), 0);
}

#[test]
fn second_stream_does_not_disturb_the_first() {
    let (mut ctl, _t) = controller();
    handshake(&mut ctl);
    let img = image(250);

    ctl.handle_event(firmware_fragment(0, &img[..100], 250)).unwrap();
    assert_eq!(
        ctl.handle_event(firmware_fragment(0, &[0xEE; 50], 50)),
        Err(Error::Ota(OtaError::AlreadyInProgress))
    );

    let ota = ctl.ota();
    assert_eq!(ota.state(), OtaState::Streaming);
    assert_eq!(ota.session().map(|s| s.bytes_written), Some(100));
    assert_eq!(ota.flash().begin_calls(), 1);
    assert_eq!(ota.flash().aborts(), 0);
}

#[test]
fn session_loss_mid_stream_needs_new_handshake() {
    let (mut ctl, _t) = controller();
    handshake(&mut ctl);
    let img = image(250);
    ctl.handle_event(firmware_fragment(0, &img[..100], 250)).unwrap();

    ctl.handle_event(ChannelEvent::Disconnected).unwrap();
    assert_eq!(ctl.ota().state(), OtaState::Idle);
    assert_eq!(ctl.ota().flash().aborts(), 1);

    ctl.handle_event(ChannelEvent::Connected).unwrap();
    assert_eq!(
        ctl.handle_event(firmware_fragment(0, &img[..100], 250)),
        Err(Error::Ota(OtaError::NotStreaming))
    );

    ctl.handle_event(message("ota/version", b"1.0.1")).unwrap();
    for r in stream(&mut ctl, &img, &[100, 100, 50]) {
        r.unwrap();
    }
    assert_eq!(ctl.ota().flash().boot_slot(), 1);
}

#[test]
fn oversized_image_is_refused_up_front() {
    let (mut ctl, _t) = controller();
    handshake(&mut ctl);
    let total = 4 * 1024 * 1024 + 1;
    assert_eq!(
        ctl.handle_event(firmware_fragment(0, &[0u8; 16], total)),
        Err(Error::Ota(OtaError::InvalidSize(total as u32)))
    );
    assert_eq!(ctl.ota().flash().begin_calls(), 0);
}

#[test]
fn version_reply_while_streaming_is_ignored() {
    let (mut ctl, _t) = controller();
    handshake(&mut ctl);
    ctl.handle_event(firmware_fragment(0, &image(100), 250)).unwrap();
    ctl.handle_event(message("ota/version", b"2.0.0")).unwrap();
    assert_eq!(ctl.ota().state(), OtaState::Streaming);
    assert_eq!(ctl.ota().session().map(|s| s.bytes_written), Some(100));
}

#[test]
fn fragments_after_abort_are_dropped_without_error() {
    let mut flash = FlashAdapter::new();
    flash.inject_failure(FlashStep::Write(2));
    let (mut ctl, transport) = controller_with(flash);
    handshake(&mut ctl);
    let img = image(400);

    let results = stream(&mut ctl, &img, &[100, 100, 100, 100]);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert!(results[2].is_ok(), "remaining fragments must not surface errors");
    assert!(results[3].is_ok());

    assert_eq!(ctl.ota().state(), OtaState::Idle);
    assert_eq!(ctl.ota().flash().aborts(), 1);
    assert_eq!(transport.log().unsubscribed.len(), 1);
}
