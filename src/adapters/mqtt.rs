//! MQTT client adapter (ESP-IDF only).
//!
//! [`MqttAdapter`] implements [`MessagePort`] over `EspMqttClient`.
//! [`MqttEventPump`] drains the matching `EspMqttConnection` on its own
//! thread and forwards owned [`ChannelEvent`]s into a queue.
//!
//! esp-mqtt holds its API lock until the borrowed event is released, so
//! nothing on the pump thread may call the client.  The pump converts,
//! drops the event, sends, and goes straight back to `next()`; the
//! controller drains the queue on its own thread.
//!
//! All publishes are QoS 0 and retained; subscriptions are QoS 0.

use std::sync::mpsc::Sender;

use log::{info, warn};

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration, QoS,
};

use crate::app::events::{ChannelEvent, InboundFragment};
use crate::app::ports::{ChannelError, MessagePort};

const EVENT_THREAD_NAME: &str = "mqtt-events";
const EVENT_THREAD_STACK: usize = 4 * 1024;

pub struct MqttAdapter {
    client: EspMqttClient<'static>,
}

impl MqttAdapter {
    /// Create the client.  esp-mqtt connects and reconnects on its own; the
    /// returned connection must be handed to [`MqttEventPump::spawn`].
    pub fn connect(uri: &str, client_id: &str) -> Result<(Self, EspMqttConnection), ChannelError> {
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            ..Default::default()
        };
        let (client, connection) = EspMqttClient::new(uri, &conf).map_err(|e| {
            warn!("MQTT: client init failed: {:?}", e);
            ChannelError::ReconnectFailed
        })?;
        info!("MQTT: client started ({}, id={})", uri, client_id);
        Ok((Self { client }, connection))
    }
}

impl MessagePort for MqttAdapter {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ChannelError> {
        self.client
            .publish(topic, QoS::AtMostOnce, true, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: publish {} failed: {:?}", topic, e);
                ChannelError::PublishFailed
            })
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        self.client
            .subscribe(topic, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: subscribe {} failed: {:?}", topic, e);
                ChannelError::SubscribeFailed
            })
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), ChannelError> {
        self.client.unsubscribe(topic).map(|_| ()).map_err(|e| {
            warn!("MQTT: unsubscribe {} failed: {:?}", topic, e);
            ChannelError::UnsubscribeFailed
        })
    }

    fn reconnect(&mut self) -> Result<(), ChannelError> {
        // esp-mqtt retries on its own schedule; nothing to nudge.
        info!("MQTT: waiting for client auto-reconnect");
        Ok(())
    }
}

pub struct MqttEventPump;

impl MqttEventPump {
    /// Drain `connection` on a dedicated thread, forwarding each event in
    /// arrival order.  The queue must be unbounded: a full queue would block
    /// the pump while the controller waits on the client.  Returns when the
    /// client is dropped or the receiver hangs up.
    pub fn spawn(
        mut connection: EspMqttConnection,
        events: Sender<ChannelEvent>,
    ) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name(EVENT_THREAD_NAME.into())
            .stack_size(EVENT_THREAD_STACK)
            .spawn(move || {
                info!("MQTT: event thread running");
                while let Ok(event) = connection.next() {
                    let converted = to_channel_event(event.payload());
                    drop(event);
                    if let Some(ev) = converted {
                        if events.send(ev).is_err() {
                            warn!("MQTT: controller gone, event thread exiting");
                            return;
                        }
                    }
                }
                info!("MQTT: connection closed, event thread exiting");
            })
    }
}

fn to_channel_event(payload: EventPayload<'_, esp_idf_svc::sys::EspError>) -> Option<ChannelEvent> {
    match payload {
        EventPayload::Connected(_) => Some(ChannelEvent::Connected),
        EventPayload::Disconnected => Some(ChannelEvent::Disconnected),
        EventPayload::Received {
            topic, data, details, ..
        } => {
            let (offset, total_len) = match details {
                Details::Complete => (0, data.len()),
                Details::InitialChunk(chunk) => (0, chunk.total_data_size),
                Details::SubsequentChunk(chunk) => (chunk.current_data_offset, chunk.total_data_size),
            };
            Some(ChannelEvent::Message(InboundFragment {
                topic: topic.map(Into::into),
                data: data.to_vec(),
                offset,
                total_len,
            }))
        }
        EventPayload::Error(e) => {
            warn!("MQTT: client error: {:?}", e);
            Some(ChannelEvent::Error)
        }
        _ => None,
    }
}
