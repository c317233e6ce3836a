//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (flash partitions, MQTT client, Wi-Fi, clock, NVS)
//! implement these traits.  The [`Controller`](super::controller::Controller),
//! [`OtaEngine`](crate::ota::OtaEngine) and
//! [`MessageChannel`](crate::channel::MessageChannel) consume them via
//! generics, so the domain core never touches ESP-IDF directly.
//!
//! ## Safety notes
//!
//! - **FlashPort** primitives are fail-fast: every call either fully
//!   succeeds or reports an error, and the engine never retries.
//! - **ConfigPort** implementations MUST validate before persisting.

use crate::config::SystemConfig;

// ───────────────────────────────────────────────────────────────
// Flash port (driven adapter: domain → OTA partitions)
// ───────────────────────────────────────────────────────────────

/// Partition manager used by the OTA engine.
///
/// `Partition` is an opaque handle to the inactive OTA slot and `Writer`
/// an open write session against it.  Dropping or [`abort`](Self::abort)ing
/// a writer discards the partial image; the boot target only ever changes
/// through [`set_boot_target`](Self::set_boot_target).
pub trait FlashPort {
    type Partition;
    type Writer;

    /// Pick the partition the next image will be written to.
    fn select_inactive_partition(&mut self) -> Result<Self::Partition, FlashError>;

    /// Open a write session against `partition`.
    fn begin_write(&mut self, partition: &Self::Partition) -> Result<Self::Writer, FlashError>;

    /// Append `data` to the open session.
    fn write(&mut self, writer: &mut Self::Writer, data: &[u8]) -> Result<(), FlashError>;

    /// Close the session and validate the written image.
    fn finalize(&mut self, writer: Self::Writer) -> Result<(), FlashError>;

    /// Make `partition` the image the bootloader loads on next start.
    fn set_boot_target(&mut self, partition: &Self::Partition) -> Result<(), FlashError>;

    /// Discard an open session without touching the boot target.
    fn abort(&mut self, writer: Self::Writer) {
        drop(writer);
    }

    /// Controlled device restart.  Never returns on real hardware.
    fn restart(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Message port (driven adapter: domain ↔ MQTT broker)
// ───────────────────────────────────────────────────────────────

/// Raw publish/subscribe transport.  Topics passed here are fully
/// qualified (`<device>/<subtopic>`); namespacing is the channel's job.
pub trait MessagePort {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), ChannelError>;

    fn subscribe(&mut self, topic: &str) -> Result<(), ChannelError>;

    fn unsubscribe(&mut self, topic: &str) -> Result<(), ChannelError>;

    /// Ask the transport to re-establish a dropped session.
    fn reconnect(&mut self) -> Result<(), ChannelError>;
}

// ───────────────────────────────────────────────────────────────
// Link / clock ports (read-only environment queries)
// ───────────────────────────────────────────────────────────────

/// Radio link quality, used only for telemetry.
pub trait LinkPort {
    /// Signal strength of the associated AP in dBm, `None` if not associated.
    fn rssi(&self) -> Option<i8>;
}

/// Wall-clock source, used only for telemetry formatting.
pub trait ClockPort {
    /// Seconds since the Unix epoch.
    fn now_unix(&self) -> i64;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ConfigError::NotFound`] if nothing has been stored yet.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FlashPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// No inactive OTA partition is available.
    NoPartition,
    /// The partition could not be opened for writing.
    BeginFailed,
    /// A write to the open session failed.
    WriteFailed,
    /// The image failed validation when the session was closed.
    FinalizeFailed,
    /// The boot partition could not be switched.
    BootSetFailed,
}

/// Errors from [`MessagePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// No broker session is established.
    NotConnected,
    /// Topic did not fit the fixed topic buffer.
    TopicTooLong,
    PublishFailed,
    SubscribeFailed,
    UnsubscribeFailed,
    ReconnectFailed,
}

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for FlashError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoPartition => write!(f, "no inactive OTA partition available"),
            Self::BeginFailed => write!(f, "partition write begin failed"),
            Self::WriteFailed => write!(f, "partition write failed"),
            Self::FinalizeFailed => write!(f, "image finalize failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
        }
    }
}

impl core::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no MQTT session"),
            Self::TopicTooLong => write!(f, "topic too long"),
            Self::PublishFailed => write!(f, "publish failed"),
            Self::SubscribeFailed => write!(f, "subscribe failed"),
            Self::UnsubscribeFailed => write!(f, "unsubscribe failed"),
            Self::ReconnectFailed => write!(f, "reconnect failed"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
