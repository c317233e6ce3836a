//! Controller — the single owner of per-event state.
//!
//! Runs on its own thread, draining the queue the MQTT event pump fills.
//! Every broker event passes through [`Controller::handle_event`], which
//! routes messages and drives the OTA engine.  The message channel is shared
//! with the control loop; the router and engine belong to the controller
//! alone.
//!
//! ```text
//!  ChannelEvent ──▶ ┌──────────────────────────┐ ──▶ MessageChannel (subscribe)
//!                   │        Controller        │
//!                   │  CommandRouter · OtaEngine│ ──▶ FlashPort
//!                   └──────────────────────────┘
//! ```

use std::sync::Arc;
use std::sync::mpsc::Receiver;

use log::{debug, info, warn};

use crate::channel::MessageChannel;
use crate::error::Result;
use crate::ota::{Chunk, ChunkOutcome, OtaEngine, OtaError, VersionDecision};
use crate::router::{CommandRouter, OtaTopic, Route};

use super::events::{ChannelEvent, InboundFragment};
use super::ports::{FlashPort, MessagePort};

/// Subtopic the firmware image streams on.
pub const FIRMWARE_TOPIC: &str = "ota/firmware";

pub struct Controller<T, F: FlashPort> {
    channel: Arc<MessageChannel<T>>,
    router: CommandRouter,
    ota: OtaEngine<F>,
}

impl<T: MessagePort, F: FlashPort> Controller<T, F> {
    pub fn new(channel: Arc<MessageChannel<T>>, ota: OtaEngine<F>) -> Self {
        let router = CommandRouter::new(channel.identity().clone());
        Self {
            channel,
            router,
            ota,
        }
    }

    pub fn ota(&self) -> &OtaEngine<F> {
        &self.ota
    }

    pub fn router(&self) -> &CommandRouter {
        &self.router
    }

    pub fn channel(&self) -> &Arc<MessageChannel<T>> {
        &self.channel
    }

    /// Handle queued events until every sender has hung up.  Failures are
    /// logged and the next event is still handled.
    pub fn run(&mut self, events: Receiver<ChannelEvent>) {
        for event in events {
            if let Err(e) = self.handle_event(event) {
                warn!("Controller: {}", e);
            }
        }
        info!("Controller: event queue closed");
    }

    /// Dispatch one channel event.
    pub fn handle_event(&mut self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::Connected => {
                // Arm first: a failed subscription still leaves the others live.
                self.ota.arm();
                self.channel.on_connected()?;
            }
            ChannelEvent::Disconnected => {
                self.channel.on_disconnected();
                self.router.reset();
                self.ota.on_session_lost();
            }
            ChannelEvent::Message(fragment) => self.handle_message(&fragment)?,
            ChannelEvent::Error => warn!("MQTT: transport error reported"),
        }
        Ok(())
    }

    fn handle_message(&mut self, fragment: &InboundFragment) -> Result<()> {
        match self.router.route(fragment)? {
            Route::Ota(OtaTopic::Version) => self.handle_version(&fragment.data)?,
            Route::Ota(OtaTopic::Firmware) => self.handle_firmware(fragment)?,
            Route::Ota(OtaTopic::Missing) => warn!("OTA: too few components"),
            Route::Ota(OtaTopic::Unknown) => {
                warn!("OTA: unknown subtopic {}", fragment.topic.as_deref().unwrap_or("<continuation>"));
            }
            Route::Config => debug!("Config: message ignored ({} bytes)", fragment.data.len()),
            Route::Pump | Route::Unhandled => {}
        }
        Ok(())
    }

    fn handle_version(&mut self, payload: &[u8]) -> Result<()> {
        if self.ota.handle_version(payload) != VersionDecision::RequestFirmware {
            return Ok(());
        }
        if let Err(e) = self.channel.subscribe(FIRMWARE_TOPIC) {
            self.ota.abandon("firmware subscription failed");
            return Err(e.into());
        }
        Ok(())
    }

    fn handle_firmware(&mut self, fragment: &InboundFragment) -> Result<()> {
        let chunk = Chunk {
            offset: u32::try_from(fragment.offset).unwrap_or(u32::MAX),
            total_len: u32::try_from(fragment.total_len).unwrap_or(u32::MAX),
            data: &fragment.data,
        };
        match self.ota.handle_chunk(chunk) {
            Ok(ChunkOutcome::Accepted {
                bytes_written,
                total,
            }) => {
                debug!("OTA: {}/{} bytes", bytes_written, total);
                Ok(())
            }
            Ok(ChunkOutcome::Discarded) => Ok(()),
            Ok(ChunkOutcome::Restarting) => {
                info!("OTA: update committed");
                Ok(())
            }
            Err(e @ (OtaError::NotStreaming | OtaError::AlreadyInProgress)) => Err(e.into()),
            Err(e) => {
                // Aborted: stop the rest of the stream until the next handshake.
                if let Err(u) = self.channel.unsubscribe(FIRMWARE_TOPIC) {
                    warn!("MQTT: unsubscribe '{}' failed — {}", FIRMWARE_TOPIC, u);
                }
                Err(e.into())
            }
        }
    }
}
