//! [`CommandArbiter`] – debounced active-command state.
//!
//! Exactly one directional command may be live at a time, and a command that
//! is not refreshed expires on its own, so the gimbal never keeps jogging on
//! stale input (silence means stop).
//!
//! # Algorithm
//!
//! The arbiter holds the most recent intent together with the [`Instant`] it
//! was set. [`CommandArbiter::set`] unconditionally replaces the intent (last
//! writer wins) and restarts its expiry window. [`CommandArbiter::active`]
//! applies lazy expiry on every call: once more time than the configured
//! timeout has passed since the last `set`, the intent is removed in place
//! and `None` is returned. There is no background timer.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use swivel_kernel::arbiter::CommandArbiter;
//! use swivel_types::Direction;
//!
//! let arbiter = CommandArbiter::new(Duration::from_millis(500));
//!
//! arbiter.set(Direction::Left);
//! assert_eq!(arbiter.active(), Some(Direction::Left));
//!
//! // A "stop" command maps to clear.
//! arbiter.clear();
//! assert_eq!(arbiter.active(), None);
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use swivel_types::Direction;
use tracing::info;

/// Expiry window applied by [`CommandArbiter::default`].
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

// ─────────────────────────────────────────────────────────────────────────────
// CommandArbiter
// ─────────────────────────────────────────────────────────────────────────────

/// The single live directional intent.
#[derive(Debug, Clone, Copy)]
struct ActiveIntent {
    direction: Direction,
    started_at: Instant,
}

/// Debounced holder of the one command the delivery loop may forward.
///
/// Shared between the intake task (writer) and the delivery loop (reader);
/// every operation takes `&self` and serializes on an internal mutex. No I/O
/// happens under the lock.
pub struct CommandArbiter {
    /// Window after which an unrefreshed intent expires.
    timeout: Duration,
    /// The live intent, if any. `None` after `clear` or expiry.
    intent: Mutex<Option<ActiveIntent>>,
}

impl CommandArbiter {
    /// Create an arbiter whose intents expire `timeout` after the last `set`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            intent: Mutex::new(None),
        }
    }

    /// Make `direction` the live intent, replacing whatever was live before
    /// and restarting the expiry window.
    pub fn set(&self, direction: Direction) {
        let mut intent = self.lock();
        info!(command = %direction, "command started");
        *intent = Some(ActiveIntent {
            direction,
            started_at: Instant::now(),
        });
    }

    /// Remove the live intent. Safe to call when nothing is live.
    pub fn clear(&self) {
        let mut intent = self.lock();
        if let Some(previous) = intent.take() {
            info!(command = %previous.direction, "command cleared");
        }
    }

    /// The live direction, after applying lazy expiry.
    ///
    /// Elapsed time is measured on the monotonic clock, and an expired intent
    /// is removed under the same lock acquisition that observed it, so two
    /// racing callers can neither expire it twice nor resurrect it.
    pub fn active(&self) -> Option<Direction> {
        let mut intent = self.lock();
        match *intent {
            None => None,
            Some(live) if live.started_at.elapsed() > self.timeout => {
                info!(command = %live.direction, "command timeout");
                *intent = None;
                None
            }
            Some(live) => Some(live.direction),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveIntent>> {
        // A poisoned lock only means another thread panicked mid-update; the
        // intent is a plain value and stays coherent.
        self.intent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shift the live intent's start time `by` into the past.
    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        if let Some(live) = self.lock().as_mut() {
            live.started_at -= by;
        }
    }
}

impl Default for CommandArbiter {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}
