//! Connectivity monitor — link and session state as independent flags.
//!
//! The Wi-Fi adapter sets / clears the address flags, the message channel
//! owns [`ConnectivityState::SESSION_ESTABLISHED`].  Everyone else only
//! reads or waits.
//!
//! ```text
//!  Wi-Fi adapter ──set/clear──▶ ┌─────────────────────┐ ◀──wait── control loop
//!  MessageChannel ─set/clear──▶ │ Mutex<flags>+Condvar│ ◀──read── telemetry
//!                               └─────────────────────┘
//! ```

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bitflags::bitflags;
use log::debug;

bitflags! {
    /// Link / session flags.  All clear at boot, never persisted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConnectivityState: u8 {
        /// Station has an IPv4 lease.
        const IP_ACQUIRED = 1 << 0;
        /// IPv6 link-local address is up.
        const SECONDARY_ADDRESS_ACQUIRED = 1 << 1;
        /// MQTT broker session is established.
        const SESSION_ESTABLISHED = 1 << 2;
    }
}

/// Thread-safe flag group with blocking waits.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: Mutex<ConnectivityState>,
    changed: Condvar,
}

impl ConnectivityMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectivityState::empty()),
            changed: Condvar::new(),
        }
    }

    /// Raise `flags` and wake every waiter.
    pub fn set(&self, flags: ConnectivityState) {
        let mut state = self.lock();
        state.insert(flags);
        debug!("Connectivity: set {:?} -> {:?}", flags, *state);
        self.changed.notify_all();
    }

    /// Drop `flags` and wake every waiter.
    pub fn clear(&self, flags: ConnectivityState) {
        let mut state = self.lock();
        state.remove(flags);
        debug!("Connectivity: clear {:?} -> {:?}", flags, *state);
        self.changed.notify_all();
    }

    /// Snapshot of all flags.
    pub fn current(&self) -> ConnectivityState {
        *self.lock()
    }

    pub fn contains(&self, flags: ConnectivityState) -> bool {
        self.lock().contains(flags)
    }

    /// Block until `mask` is satisfied or `timeout` elapses.
    ///
    /// With `all_required` every bit in `mask` must be set, otherwise any
    /// one of them is enough.  Returns the bits of `mask` that were set
    /// when the wait resolved; on timeout this may be a subset (or empty).
    pub fn wait(
        &self,
        mask: ConnectivityState,
        all_required: bool,
        timeout: Duration,
    ) -> ConnectivityState {
        let satisfied = |s: &ConnectivityState| {
            if all_required {
                s.contains(mask)
            } else {
                s.intersects(mask)
            }
        };

        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while !satisfied(&state) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        *state & mask
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
