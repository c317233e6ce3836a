//! Periodic status reports.
//!
//! Every tick publishes three retained values under the device namespace:
//!
//! | Subtopic  | Payload                                  |
//! |-----------|------------------------------------------|
//! | `time`    | ctime-style UTC time, no trailing `\n`   |
//! | `rssi`    | dBm with one decimal, `nan` if unknown   |
//! | `version` | build tag of the running image           |
//!
//! Each publish is independent; a failure is logged and the next one still
//! runs.  With no session the tick reports [`TickOutcome::SessionDown`] and
//! the caller re-establishes the channel instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use log::{debug, warn};

use crate::app::ports::{ClockPort, LinkPort, MessagePort};
use crate::channel::MessageChannel;

pub const TIME_TOPIC: &str = "time";
pub const RSSI_TOPIC: &str = "rssi";
pub const VERSION_TOPIC: &str = "version";

/// `Thu Jan  1 00:00:00 1970`
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Session was up; `failures` publishes were refused by the transport.
    Published { failures: u8 },
    SessionDown,
}

pub struct TelemetryPublisher<T, L, C> {
    channel: Arc<MessageChannel<T>>,
    link: L,
    clock: C,
    version: &'static str,
}

impl<T: MessagePort, L: LinkPort, C: ClockPort> TelemetryPublisher<T, L, C> {
    pub fn new(channel: Arc<MessageChannel<T>>, link: L, clock: C, version: &'static str) -> Self {
        Self {
            channel,
            link,
            clock,
            version,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Publish one round of status values.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.channel.is_established() {
            return TickOutcome::SessionDown;
        }

        let time = format_ctime(self.clock.now_unix());
        let rssi = format_rssi(self.link.rssi());
        let reports = [
            (TIME_TOPIC, time.as_bytes()),
            (RSSI_TOPIC, rssi.as_bytes()),
            (VERSION_TOPIC, self.version.as_bytes()),
        ];

        let mut failures = 0;
        for (subtopic, payload) in reports {
            match self.channel.publish(subtopic, payload) {
                Ok(true) => debug!("Telemetry: {} published", subtopic),
                Ok(false) => {
                    warn!("Telemetry: session dropped before '{}'", subtopic);
                    failures += 1;
                }
                Err(e) => {
                    warn!("Telemetry: publish '{}' failed — {}", subtopic, e);
                    failures += 1;
                }
            }
        }
        TickOutcome::Published { failures }
    }

    /// One control-loop step: publish if the session is up, otherwise
    /// re-establish the channel (waiting up to `timeout`) and publish nothing.
    pub fn run_once(&mut self, timeout: Duration) -> TickOutcome {
        let outcome = self.tick();
        match outcome {
            TickOutcome::Published { failures: 0 } => {}
            TickOutcome::Published { failures } => warn!("Telemetry: {} publishes failed", failures),
            TickOutcome::SessionDown => {
                debug!("Telemetry: no session, re-establishing");
                self.channel.reestablish(timeout);
            }
        }
        outcome
    }
}

/// ctime(3) layout without the trailing newline.  Out-of-range input
/// formats as the epoch.
pub fn format_ctime(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .format(CTIME_FORMAT)
        .to_string()
}

/// dBm with one decimal place; `nan` when the link is down.
pub fn format_rssi(rssi: Option<i8>) -> String {
    match rssi {
        Some(dbm) => format!("{:.1}", f32::from(dbm)),
        None => "nan".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::device_id::DeviceIdentity;
    use crate::app::ports::ChannelError;
    use crate::connectivity::ConnectivityMonitor;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<(String, String)>>>);

    impl MessagePort for Sink {
        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ChannelError> {
            if topic.ends_with("/rssi") {
                return Err(ChannelError::PublishFailed);
            }
            let payload = String::from_utf8_lossy(payload).into_owned();
            self.0.lock().unwrap().push((topic.into(), payload));
            Ok(())
        }
        fn subscribe(&mut self, _topic: &str) -> Result<(), ChannelError> {
            Ok(())
        }
        fn unsubscribe(&mut self, _topic: &str) -> Result<(), ChannelError> {
            Ok(())
        }
        fn reconnect(&mut self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    struct Link(Option<i8>);
    impl LinkPort for Link {
        fn rssi(&self) -> Option<i8> {
            self.0
        }
    }

    struct Clock(i64);
    impl ClockPort for Clock {
        fn now_unix(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn ctime_matches_libc_layout() {
        assert_eq!(format_ctime(0), "Thu Jan  1 00:00:00 1970");
        assert_eq!(format_ctime(1_700_000_000), "Tue Nov 14 22:13:20 2023");
    }

    #[test]
    fn rssi_formatting() {
        assert_eq!(format_rssi(Some(-61)), "-61.0");
        assert_eq!(format_rssi(None), "nan");
    }

    #[test]
    fn tick_without_session_reports_down() {
        let sink = Sink::default();
        let id = DeviceIdentity::from_mac(&[0, 1, 2, 3, 4, 5]);
        let ch = Arc::new(MessageChannel::new(id, sink.clone(), Arc::new(ConnectivityMonitor::new())));
        let mut t = TelemetryPublisher::new(ch, Link(Some(-50)), Clock(0), "1.0.0");
        assert_eq!(t.tick(), TickOutcome::SessionDown);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_publish_does_not_stop_the_rest() {
        let sink = Sink::default();
        let id = DeviceIdentity::from_mac(&[0, 1, 2, 3, 4, 5]);
        let ch = Arc::new(MessageChannel::new(id, sink.clone(), Arc::new(ConnectivityMonitor::new())));
        ch.on_connected().unwrap();
        let mut t = TelemetryPublisher::new(ch, Link(Some(-50)), Clock(0), "1.0.0");

        assert_eq!(t.tick(), TickOutcome::Published { failures: 1 });
        let published = sink.0.lock().unwrap();
        assert_eq!(
            *published,
            vec![
                ("000102030405/time".to_string(), "Thu Jan  1 00:00:00 1970".to_string()),
                ("000102030405/version".to_string(), "1.0.0".to_string()),
            ]
        );
    }
}
