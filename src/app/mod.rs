//! Application core — event dispatch with no direct I/O.
//!
//! The [`controller`] routes inbound channel events to the OTA engine.
//! All interaction with hardware and the network happens through
//! **port traits** defined in [`ports`], keeping this layer testable
//! without real peripherals.

pub mod controller;
pub mod events;
pub mod ports;
