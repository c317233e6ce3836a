//! MQTT-driven OTA firmware update engine.
//!
//! Flow: session up → `ota/version` reply → (versions differ) subscribe
//! `ota/firmware` → N × chunk → finalize → set boot partition → restart
//!
//! ```text
//!   Idle ──arm──▶ AwaitingVersionReply ──differs──▶ Streaming ──last chunk──▶ Committing ──▶ restart
//!    ▲                                                  │                         │
//!    └──────────────── abort / session lost ────────────┴─────────────────────────┘
//! ```
//!
//! Every failure aborts the whole update and returns to `Idle`.  The boot
//! partition is only switched after the complete image has been written
//! and finalized, so the running firmware stays bootable on every failure
//! path.  Nothing is retried.

pub mod version;

use core::fmt;

use log::{info, warn};

use crate::app::ports::{FlashError, FlashPort};
use version::VersionCheck;

/// Largest image accepted (4 MB, the OTA slot size).
pub const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024;

/// Longest remote version string retained for logging.
pub const MAX_VERSION_LEN: usize = 64;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// Firmware chunk arrived without a version handshake.
    NotStreaming,
    /// A second stream started while one is active.
    AlreadyInProgress,
    /// Declared image size is zero or larger than the OTA slot.
    InvalidSize(u32),
    /// Chunk offset does not continue the bytes written so far.
    NonSequential { expected: u32, got: u32 },
    /// Chunk declares a different total than the session began with.
    TotalMismatch { expected: u32, got: u32 },
    /// Partition manager primitive failed.
    Flash(FlashError),
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStreaming => write!(f, "firmware chunk without version handshake"),
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::InvalidSize(n) => write!(f, "firmware size {} out of range (max 4 MB)", n),
            Self::NonSequential { expected, got } => {
                write!(f, "chunk offset {} does not match expected {}", got, expected)
            }
            Self::TotalMismatch { expected, got } => {
                write!(f, "chunk declares total {} but session expects {}", got, expected)
            }
            Self::Flash(e) => write!(f, "{}", e),
        }
    }
}

impl From<FlashError> for OtaError {
    fn from(e: FlashError) -> Self {
        Self::Flash(e)
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    AwaitingVersionReply,
    Streaming,
    Committing,
}

/// Result of a version reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionDecision {
    /// Remote differs: subscribe to the firmware stream.
    RequestFirmware,
    UpToDate,
    /// A stream is already underway; reply ignored.
    Busy,
}

/// Result of an accepted (or silently dropped) chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Accepted { bytes_written: u32, total: u32 },
    /// Fragment of a rejected or aborted message, or input after restart
    /// was requested.
    Discarded,
    /// Image committed and restart requested.
    Restarting,
}

/// One fragment of the firmware stream.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub offset: u32,
    pub total_len: u32,
    pub data: &'a [u8],
}

impl Chunk<'_> {
    pub fn is_terminal(&self) -> bool {
        u64::from(self.offset) + self.data.len() as u64 >= u64::from(self.total_len)
    }
}

/// The single in-progress update.
pub struct OtaSession<P, W> {
    pub target_partition: P,
    writer: W,
    pub bytes_written: u32,
    pub total_expected_bytes: u32,
    pub current_offset: u32,
}

// ── Engine ────────────────────────────────────────────────────

pub struct OtaEngine<F: FlashPort> {
    flash: F,
    state: OtaState,
    local_version: &'static str,
    remote_version: Option<heapless::String<MAX_VERSION_LEN>>,
    session: Option<OtaSession<F::Partition, F::Writer>>,
    /// Dropping the remaining fragments of a rejected or aborted message.
    discarding: bool,
}

impl<F: FlashPort> OtaEngine<F> {
    pub fn new(flash: F, local_version: &'static str) -> Self {
        Self {
            flash,
            state: OtaState::Idle,
            local_version,
            remote_version: None,
            session: None,
            discarding: false,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&OtaSession<F::Partition, F::Writer>> {
        self.session.as_ref()
    }

    pub fn remote_version(&self) -> Option<&str> {
        self.remote_version.as_deref()
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Session established: start listening for version replies.
    pub fn arm(&mut self) {
        if self.state == OtaState::Idle {
            self.state = OtaState::AwaitingVersionReply;
            info!("OTA: awaiting version reply (local={})", self.local_version);
        }
    }

    /// Handle a payload from `ota/version`.
    pub fn handle_version(&mut self, payload: &[u8]) -> VersionDecision {
        if matches!(self.state, OtaState::Streaming | OtaState::Committing) {
            info!("OTA: version reply ignored while {:?}", self.state);
            return VersionDecision::Busy;
        }

        let mut remote = heapless::String::new();
        for c in String::from_utf8_lossy(payload).chars() {
            if remote.push(c).is_err() {
                break;
            }
        }
        info!("OTA: version={} (local={})", remote, self.local_version);
        self.remote_version = Some(remote);

        match version::compare(self.local_version.as_bytes(), payload) {
            VersionCheck::RemoteDiffers => {
                info!("OTA: firmware outdated, requesting update");
                self.state = OtaState::Streaming;
                VersionDecision::RequestFirmware
            }
            VersionCheck::UpToDate => {
                self.state = OtaState::AwaitingVersionReply;
                VersionDecision::UpToDate
            }
        }
    }

    /// Handle one fragment from `ota/firmware`.
    ///
    /// `Err` means the chunk was refused.  For [`OtaError::NotStreaming`]
    /// and [`OtaError::AlreadyInProgress`] nothing else changes; every
    /// other error has aborted the session and the engine is `Idle`.
    /// Later fragments of a refused or aborted message come back as
    /// [`ChunkOutcome::Discarded`].
    pub fn handle_chunk(&mut self, chunk: Chunk<'_>) -> Result<ChunkOutcome, OtaError> {
        if chunk.offset == 0 {
            self.discarding = false;
        } else if self.discarding {
            if chunk.is_terminal() {
                self.discarding = false;
            }
            return Ok(ChunkOutcome::Discarded);
        }

        match self.state {
            OtaState::Streaming => {}
            OtaState::Committing => return Ok(ChunkOutcome::Discarded),
            OtaState::Idle | OtaState::AwaitingVersionReply => {
                return Err(OtaError::NotStreaming);
            }
        }

        if chunk.offset == 0 {
            if self.session.is_some() {
                warn!("OTA: new stream while session active, keeping current session");
                self.discarding = !chunk.is_terminal();
                return Err(OtaError::AlreadyInProgress);
            }
            if let Err(e) = self.open_session(chunk.total_len) {
                return Err(self.abort_message(e, &chunk));
            }
        }

        let (bytes_written, total) = match self.append(&chunk) {
            Ok(progress) => progress,
            Err(e) => return Err(self.abort_message(e, &chunk)),
        };

        if bytes_written >= total {
            return self.commit();
        }
        Ok(ChunkOutcome::Accepted {
            bytes_written,
            total,
        })
    }

    /// Drop any in-progress update and return to `Idle`.
    pub fn abandon(&mut self, reason: &str) {
        if self.state != OtaState::Idle {
            warn!("OTA: abandoned ({})", reason);
        }
        self.reset();
    }

    /// Message channel dropped: the stream cannot be resumed.
    pub fn on_session_lost(&mut self) {
        self.abandon("session lost");
    }

    // ── Internal ──────────────────────────────────────────────

    fn open_session(&mut self, total_len: u32) -> Result<(), OtaError> {
        if total_len == 0 || total_len > MAX_FIRMWARE_SIZE {
            return Err(OtaError::InvalidSize(total_len));
        }
        let target_partition = self.flash.select_inactive_partition()?;
        let writer = self.flash.begin_write(&target_partition)?;
        self.session = Some(OtaSession {
            target_partition,
            writer,
            bytes_written: 0,
            total_expected_bytes: total_len,
            current_offset: 0,
        });
        info!("OTA: receiving firmware image ({} bytes)", total_len);
        Ok(())
    }

    fn append(&mut self, chunk: &Chunk<'_>) -> Result<(u32, u32), OtaError> {
        let Some(session) = self.session.as_mut() else {
            return Err(OtaError::NonSequential {
                expected: 0,
                got: chunk.offset,
            });
        };
        if chunk.total_len != session.total_expected_bytes {
            return Err(OtaError::TotalMismatch {
                expected: session.total_expected_bytes,
                got: chunk.total_len,
            });
        }
        if chunk.offset != session.bytes_written {
            return Err(OtaError::NonSequential {
                expected: session.bytes_written,
                got: chunk.offset,
            });
        }

        self.flash.write(&mut session.writer, chunk.data)?;
        session.current_offset = chunk.offset;
        session.bytes_written = session.bytes_written.saturating_add(chunk.data.len() as u32);
        Ok((session.bytes_written, session.total_expected_bytes))
    }

    fn commit(&mut self) -> Result<ChunkOutcome, OtaError> {
        let Some(session) = self.session.take() else {
            return Err(self.abort(OtaError::NotStreaming));
        };
        self.state = OtaState::Committing;
        info!("OTA: image complete ({} bytes), finalizing", session.bytes_written);

        if let Err(e) = self.flash.finalize(session.writer) {
            return Err(self.abort(e.into()));
        }
        if let Err(e) = self.flash.set_boot_target(&session.target_partition) {
            return Err(self.abort(e.into()));
        }

        info!("OTA: boot partition switched, prepare to restart system");
        self.flash.restart();
        Ok(ChunkOutcome::Restarting)
    }

    fn abort(&mut self, cause: OtaError) -> OtaError {
        warn!("OTA: aborted — {}", cause);
        self.reset();
        cause
    }

    /// Abort, then drop whatever is left of the message `chunk` belongs to.
    fn abort_message(&mut self, cause: OtaError, chunk: &Chunk<'_>) -> OtaError {
        let cause = self.abort(cause);
        self.discarding = !chunk.is_terminal();
        cause
    }

    fn reset(&mut self) {
        if let Some(session) = self.session.take() {
            self.flash.abort(session.writer);
        }
        self.discarding = false;
        self.state = OtaState::Idle;
    }
}

// ── Tests ─────────────────────────────────────────────────────
