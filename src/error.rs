//! Unified error type for the controller.
//!
//! Every subsystem error converts into [`Error`], so the event handler and
//! the control loop handle failures uniformly.  All variants are `Copy`.

use core::fmt;

use crate::app::ports::{ChannelError, ConfigError, FlashError};
use crate::ota::OtaError;
use crate::router::RouteError;

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// OTA partition primitive failed.
    Flash(FlashError),
    /// MQTT transport failed.
    Channel(ChannelError),
    /// Inbound topic could not be routed.
    Route(RouteError),
    /// Firmware update was refused or aborted.
    Ota(OtaError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flash(e) => write!(f, "flash: {e}"),
            Self::Channel(e) => write!(f, "mqtt: {e}"),
            Self::Route(e) => write!(f, "route: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<FlashError> for Error {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

impl From<RouteError> for Error {
    fn from(e: RouteError) -> Self {
        Self::Route(e)
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
