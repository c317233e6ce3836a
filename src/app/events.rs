//! Inbound channel events.
//!
//! The MQTT adapter converts every broker event into an owned
//! [`ChannelEvent`] and hands it to the
//! [`Controller`](super::controller::Controller).  Owning the data lets the
//! adapter release the broker's event buffer before the controller does
//! blocking work (subscriptions, flash writes).

/// Events delivered serially from the MQTT event thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Broker session established.
    Connected,

    /// Broker session lost.
    Disconnected,

    /// One fragment of an inbound message.
    Message(InboundFragment),

    /// Transport-level error reported by the client.
    Error,
}

/// One fragment of a logical inbound message.
///
/// Messages larger than the transport buffer arrive as several fragments;
/// only the first carries the topic.  `total_len` is the length of the
/// whole logical message and `offset` where this fragment starts in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFragment {
    pub topic: Option<String>,
    pub data: Vec<u8>,
    pub offset: usize,
    pub total_len: usize,
}

impl InboundFragment {
    /// A message that fits in one fragment.
    pub fn complete(topic: &str, data: &[u8]) -> Self {
        Self {
            topic: Some(topic.into()),
            data: data.to_vec(),
            offset: 0,
            total_len: data.len(),
        }
    }

    /// Whether this fragment finishes its logical message.
    pub fn is_terminal(&self) -> bool {
        self.offset + self.data.len() >= self.total_len
    }
}
