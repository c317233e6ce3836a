//! MQTT message channel session.
//!
//! Owns the broker transport and namespaces every topic under the device
//! identity.  Shared between the control-loop thread (telemetry publishes,
//! reconnection) and the MQTT event thread (subscriptions on connect).
//!
//! Publishing without a session is a silent no-op: telemetry is
//! best-effort and must never block or queue.

use core::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{info, warn};

use crate::adapters::device_id::DeviceIdentity;
use crate::app::ports::{ChannelError, MessagePort};
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};

/// Fixed topic buffer size (`<identity>/<subtopic>`).
pub const MAX_TOPIC_LEN: usize = 128;

pub type TopicString = heapless::String<MAX_TOPIC_LEN>;

/// Subtopics subscribed on every session establishment.
pub const SESSION_SUBSCRIPTIONS: [&str; 3] = ["pump/#", "config/#", "ota/version"];

/// One broker connection plus the device namespace.
pub struct MessageChannel<T> {
    identity: DeviceIdentity,
    transport: Mutex<T>,
    monitor: Arc<ConnectivityMonitor>,
}

impl<T: MessagePort> MessageChannel<T> {
    pub fn new(identity: DeviceIdentity, transport: T, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self {
            identity,
            transport: Mutex::new(transport),
            monitor,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn is_established(&self) -> bool {
        self.monitor.contains(ConnectivityState::SESSION_ESTABLISHED)
    }

    /// `<identity>/<subtopic>`.
    pub fn topic(&self, subtopic: &str) -> Result<TopicString, ChannelError> {
        let mut topic = TopicString::new();
        write!(topic, "{}/{}", self.identity, subtopic).map_err(|_| ChannelError::TopicTooLong)?;
        Ok(topic)
    }

    // ── Session lifecycle ─────────────────────────────────────

    /// Broker accepted the connection: raise the flag, then subscribe the
    /// fixed set.  Every subscription is attempted even if one fails; the
    /// first failure is returned.
    pub fn on_connected(&self) -> Result<(), ChannelError> {
        info!("MQTT: session established");
        self.monitor.set(ConnectivityState::SESSION_ESTABLISHED);

        let mut result = Ok(());
        for sub in SESSION_SUBSCRIPTIONS {
            if let Err(e) = self.subscribe(sub) {
                warn!("MQTT: subscribe '{}' failed — {}", sub, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    /// Broker connection dropped.
    pub fn on_disconnected(&self) {
        self.monitor.clear(ConnectivityState::SESSION_ESTABLISHED);
        info!("MQTT: session lost");
    }

    /// Block until the session is up or `timeout` elapses.
    pub fn wait_established(&self, timeout: Duration) -> bool {
        !self
            .monitor
            .wait(ConnectivityState::SESSION_ESTABLISHED, true, timeout)
            .is_empty()
    }

    /// Nudge the transport to reconnect, then wait for the session.
    pub fn reestablish(&self, timeout: Duration) -> bool {
        if self.is_established() {
            return true;
        }
        if let Err(e) = self.transport().reconnect() {
            warn!("MQTT: reconnect request failed — {}", e);
        }
        let up = self.wait_established(timeout);
        if !up {
            warn!("MQTT: no session after {}s", timeout.as_secs());
        }
        up
    }

    // ── Messaging ─────────────────────────────────────────────

    /// Publish under the device namespace.
    ///
    /// Returns `Ok(false)` without touching the transport if there is no
    /// session.
    pub fn publish(&self, subtopic: &str, payload: &[u8]) -> Result<bool, ChannelError> {
        if !self.is_established() {
            return Ok(false);
        }
        let topic = self.topic(subtopic)?;
        self.transport().publish(&topic, payload)?;
        Ok(true)
    }

    /// Subscribe under the device namespace.  Re-subscribing is harmless.
    pub fn subscribe(&self, subtopic: &str) -> Result<(), ChannelError> {
        let topic = self.topic(subtopic)?;
        self.transport().subscribe(&topic)?;
        info!("MQTT: subscribed {}", topic);
        Ok(())
    }

    pub fn unsubscribe(&self, subtopic: &str) -> Result<(), ChannelError> {
        let topic = self.topic(subtopic)?;
        self.transport().unsubscribe(&topic)?;
        info!("MQTT: unsubscribed {}", topic);
        Ok(())
    }

    fn transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
