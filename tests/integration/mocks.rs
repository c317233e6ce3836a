//! Mock adapters for integration tests.
//!
//! The transport records every call into a shared [`TransportLog`] so
//! tests can assert on the full history after handing the transport to a
//! channel.

use std::sync::{Arc, Mutex, MutexGuard};

use jura::adapters::device_id::DeviceIdentity;
use jura::adapters::flash::FlashAdapter;
use jura::app::controller::Controller;
use jura::app::events::{ChannelEvent, InboundFragment};
use jura::app::ports::{ChannelError, ClockPort, LinkPort, MessagePort};
use jura::channel::MessageChannel;
use jura::connectivity::ConnectivityMonitor;
use jura::ota::OtaEngine;

pub const MAC: [u8; 6] = [0xA4, 0xCF, 0x12, 0xB3, 0xC4, 0xD5];
pub const ID: &str = "a4cf12b3c4d5";
pub const LOCAL_VERSION: &str = "1.0.0";

// ── Transport ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct TransportLog {
    pub published: Vec<(String, Vec<u8>)>,
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub reconnects: u32,
    /// Subscriptions to topics ending with this suffix fail.
    pub fail_subscribe_suffix: Option<&'static str>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub log: Arc<Mutex<TransportLog>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn log(&self) -> MutexGuard<'_, TransportLog> {
        self.log.lock().unwrap()
    }

    pub fn published_payload(&self, topic: &str) -> Option<String> {
        self.log()
            .published
            .iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
    }
}

impl MessagePort for MockTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ChannelError> {
        self.log().published.push((topic.into(), payload.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        let mut log = self.log();
        if log.fail_subscribe_suffix.is_some_and(|s| topic.ends_with(s)) {
            return Err(ChannelError::SubscribeFailed);
        }
        log.subscribed.push(topic.into());
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        self.log().unsubscribed.push(topic.into());
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), ChannelError> {
        self.log().reconnects += 1;
        Ok(())
    }
}

// ── Link / clock ──────────────────────────────────────────────

pub struct MockLink(pub Option<i8>);

impl LinkPort for MockLink {
    fn rssi(&self) -> Option<i8> {
        self.0
    }
}

pub struct MockClock(pub i64);

impl ClockPort for MockClock {
    fn now_unix(&self) -> i64 {
        self.0
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type TestController = Controller<MockTransport, FlashAdapter>;

pub fn channel(transport: MockTransport) -> Arc<MessageChannel<MockTransport>> {
    Arc::new(MessageChannel::new(
        DeviceIdentity::from_mac(&MAC),
        transport,
        Arc::new(ConnectivityMonitor::new()),
    ))
}

pub fn controller_with(flash: FlashAdapter) -> (TestController, MockTransport) {
    let transport = MockTransport::default();
    let ctl = Controller::new(channel(transport.clone()), OtaEngine::new(flash, LOCAL_VERSION));
    (ctl, transport)
}

pub fn controller() -> (TestController, MockTransport) {
    controller_with(FlashAdapter::new())
}

/// Single-fragment message under the device namespace.
pub fn message(subtopic: &str, payload: &[u8]) -> ChannelEvent {
    ChannelEvent::Message(InboundFragment::complete(&format!("{}/{}", ID, subtopic), payload))
}

/// One fragment of a firmware message; only offset 0 carries the topic.
pub fn firmware_fragment(offset: usize, data: &[u8], total: usize) -> ChannelEvent {
    ChannelEvent::Message(InboundFragment {
        topic: (offset == 0).then(|| format!("{}/ota/firmware", ID)),
        data: data.to_vec(),
        offset,
        total_len: total,
    })
}

/// Deterministic image of `len` bytes.
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Connect and complete a version handshake that requests firmware.
pub fn handshake(ctl: &mut TestController) {
    ctl.handle_event(ChannelEvent::Connected).unwrap();
    ctl.handle_event(message("ota/version", b"1.0.1")).unwrap();
}
