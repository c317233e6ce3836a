//! Command router — topic parsing and dispatch.
//!
//! ```text
//!   <device>/ota/version    ──▶ Route::Ota(OtaTopic::Version)
//!   <device>/ota/firmware   ──▶ Route::Ota(OtaTopic::Firmware)
//!   <device>/config/...     ──▶ Route::Config   (reserved, no-op)
//!   <device>/pump/...       ──▶ Route::Pump     (out of scope, ignored)
//!   <device>/<other>/...    ──▶ Route::Unhandled
//! ```
//!
//! A topic is parsed only on the first fragment of a logical message and
//! the result is cached in the router until the terminal fragment has been
//! routed.  The cache belongs to the router instance; parsing itself is a
//! pure function of the topic string.

use core::fmt;

use crate::adapters::device_id::DeviceIdentity;
use crate::app::events::InboundFragment;

/// Maximum number of topic segments.
pub const MAX_SEGMENTS: usize = 16;

/// Maximum bytes per topic segment.
pub const MAX_SEGMENT_LEN: usize = 64;

/// Fewest segments a routable topic can have (`<device>/<command>`).
pub const MIN_ROUTABLE_SEGMENTS: usize = 2;

pub type Segment = heapless::String<MAX_SEGMENT_LEN>;

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// First fragment carried no topic.
    MissingTopic,
    /// Fewer than [`MIN_ROUTABLE_SEGMENTS`] segments.
    TooFewSegments(usize),
    /// More than [`MAX_SEGMENTS`] segments.
    TooManySegments,
    /// A segment longer than [`MAX_SEGMENT_LEN`].
    SegmentTooLong,
    /// Segment 0 is not this device's identity.
    ForeignNamespace,
    /// Continuation fragment with no cached topic (first fragment rejected).
    NoPendingTopic,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTopic => write!(f, "message has no topic"),
            Self::TooFewSegments(n) => write!(f, "too few components ({})", n),
            Self::TooManySegments => write!(f, "too many components (max {})", MAX_SEGMENTS),
            Self::SegmentTooLong => write!(f, "component longer than {} bytes", MAX_SEGMENT_LEN),
            Self::ForeignNamespace => write!(f, "topic outside device namespace"),
            Self::NoPendingTopic => write!(f, "continuation fragment without topic"),
        }
    }
}

// ── Topic ─────────────────────────────────────────────────────

/// Ordered, non-empty `/`-separated topic segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    segments: heapless::Vec<Segment, MAX_SEGMENTS>,
}

impl Topic {
    /// Split on `/`, skipping empty segments.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let mut segments = heapless::Vec::new();
        for part in raw.split('/').filter(|s| !s.is_empty()) {
            let seg = Segment::try_from(part).map_err(|_| RouteError::SegmentTooLong)?;
            segments
                .push(seg)
                .map_err(|_| RouteError::TooManySegments)?;
        }
        Ok(Self { segments })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(Segment::as_str)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(Segment::as_str)
    }
}

// ── Routes ────────────────────────────────────────────────────

/// `ota/<segment 2>` sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaTopic {
    Version,
    Firmware,
    /// Unrecognised third segment.
    Unknown,
    /// `<device>/ota` with nothing after it.
    Missing,
}

/// Where a message goes, decided by segment 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Ota(OtaTopic),
    Config,
    Pump,
    Unhandled,
}

impl Route {
    /// Route for an already-validated topic (at least 2 segments).
    pub fn for_topic(topic: &Topic) -> Self {
        match topic.segment(1) {
            Some("ota") => Self::Ota(match topic.segment(2) {
                Some("version") => OtaTopic::Version,
                Some("firmware") => OtaTopic::Firmware,
                Some(_) => OtaTopic::Unknown,
                None => OtaTopic::Missing,
            }),
            Some("config") => Self::Config,
            Some("pump") => Self::Pump,
            _ => Self::Unhandled,
        }
    }
}

// ── Router ────────────────────────────────────────────────────

pub struct CommandRouter {
    identity: DeviceIdentity,
    pending: Option<Topic>,
}

impl CommandRouter {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            pending: None,
        }
    }

    /// Route one fragment.
    ///
    /// On offset zero the topic is parsed and validated; continuation
    /// fragments reuse the cached result.  The cache is dropped after the
    /// terminal fragment, and also when a first fragment is rejected so its
    /// continuations are rejected too.
    pub fn route(&mut self, fragment: &InboundFragment) -> Result<Route, RouteError> {
        if fragment.offset == 0 {
            self.pending = None;
            let raw = fragment.topic.as_deref().ok_or(RouteError::MissingTopic)?;
            self.pending = Some(self.validate(Topic::parse(raw)?)?);
        }

        let route = self
            .pending
            .as_ref()
            .map(Route::for_topic)
            .ok_or(RouteError::NoPendingTopic)?;

        if fragment.is_terminal() {
            self.pending = None;
        }
        Ok(route)
    }

    /// Drop any half-delivered message (session lost mid-message).
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Topic cached for the message currently being delivered.
    pub fn pending(&self) -> Option<&Topic> {
        self.pending.as_ref()
    }

    fn validate(&self, topic: Topic) -> Result<Topic, RouteError> {
        if topic.len() < MIN_ROUTABLE_SEGMENTS {
            return Err(RouteError::TooFewSegments(topic.len()));
        }
        if topic.segment(0) != Some(self.identity.as_str()) {
            return Err(RouteError::ForeignNamespace);
        }
        Ok(topic)
    }
}
