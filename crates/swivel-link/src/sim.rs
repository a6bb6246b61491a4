//! In-process gimbal transport for tests and the `sim` transport mode.
//!
//! [`SimRadio`] implements [`GimbalRadio`] entirely in memory: it records
//! every open, resolve, write, and close, and can be scripted to fail or
//! stall on demand. The full bridge can run headless in CI against it,
//! without a BLE gateway or a physical gimbal.
//!
//! # Example
//!
//! ```rust
//! use swivel_link::sim::SimRadio;
//!
//! let radio = SimRadio::new();
//! radio.fail_next_connects(2); // the first two opens will fail
//! assert_eq!(radio.open_count(), 0);
//! assert!(radio.written().is_empty());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use swivel_types::SwivelError;

use crate::radio::{GimbalRadio, RadioLink, WriteTarget};

/// Handle value every simulated resolve returns.
const SIM_WRITE_HANDLE: u16 = 0x2a;

#[derive(Debug, Default)]
struct SimState {
    open_calls: u32,
    resolve_calls: u32,
    close_calls: u32,
    written: Vec<Vec<u8>>,
    connect_failures_remaining: u32,
    write_failures_remaining: u32,
    write_stalls_remaining: u32,
    close_stalls_remaining: u32,
    missing_service: bool,
    open_delay: Option<Duration>,
}

// ────────────────────────────────────────────────────────────────────────────
// SimRadio
// ────────────────────────────────────────────────────────────────────────────

/// A simulated gimbal radio that records every interaction. Succeeds unless
/// scripted otherwise.
///
/// Clones share state, so a test keeps one handle for scripting and
/// assertions while the session owns another.
#[derive(Clone, Default)]
pub struct SimRadio {
    state: Arc<Mutex<SimState>>,
}

impl SimRadio {
    /// Create a radio with no scripted failures.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Scripting ───────────────────────────────────────────────────────────

    /// Fail the next `n` open attempts with a link error.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().connect_failures_remaining = n;
    }

    /// Fail the next `n` writes with a write error.
    pub fn fail_next_writes(&self, n: u32) {
        self.lock().write_failures_remaining = n;
    }

    /// Make the next `n` writes hang without ever completing, like a
    /// gateway that stops replying. Exercises write deadlines.
    pub fn stall_next_writes(&self, n: u32) {
        self.lock().write_stalls_remaining = n;
    }

    /// Make the next `n` closes hang without ever completing. Exercises
    /// the bounded close handshake.
    pub fn stall_next_closes(&self, n: u32) {
        self.lock().close_stalls_remaining = n;
    }

    /// Make capability resolution report the control service as missing.
    pub fn set_missing_service(&self, missing: bool) {
        self.lock().missing_service = missing;
    }

    /// Delay every open by `delay` before it completes. Exercises connect
    /// deadlines.
    pub fn set_open_delay(&self, delay: Duration) {
        self.lock().open_delay = Some(delay);
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    /// Number of open attempts so far, failed ones included.
    pub fn open_count(&self) -> u32 {
        self.lock().open_calls
    }

    /// Number of close calls so far.
    pub fn close_count(&self) -> u32 {
        self.lock().close_calls
    }

    /// Every frame successfully written, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl GimbalRadio for SimRadio {
    async fn open(&self, address: &str) -> Result<Box<dyn RadioLink>, SwivelError> {
        let delay = {
            let mut state = self.lock();
            state.open_calls += 1;
            state.open_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        {
            let mut state = self.lock();
            if state.connect_failures_remaining > 0 {
                state.connect_failures_remaining -= 1;
                return Err(SwivelError::Link {
                    device: address.to_string(),
                    details: "simulated connect failure".to_string(),
                });
            }
        }
        Ok(Box::new(SimLink {
            state: Arc::clone(&self.state),
            device: address.to_string(),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimLink
// ────────────────────────────────────────────────────────────────────────────

/// One simulated connection. All recording goes through the shared state of
/// the [`SimRadio`] that opened it.
struct SimLink {
    state: Arc<Mutex<SimState>>,
    device: String,
}

impl SimLink {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RadioLink for SimLink {
    async fn resolve_write_target(
        &mut self,
        service_id: &str,
        _characteristic_id: &str,
    ) -> Result<WriteTarget, SwivelError> {
        let mut state = self.lock();
        state.resolve_calls += 1;
        if state.missing_service {
            return Err(SwivelError::CapabilityNotFound {
                device: self.device.clone(),
                capability: service_id.to_string(),
            });
        }
        Ok(WriteTarget(SIM_WRITE_HANDLE))
    }

    async fn write(&mut self, _target: WriteTarget, payload: &[u8]) -> Result<(), SwivelError> {
        let stalled = {
            let mut state = self.lock();
            if state.write_stalls_remaining > 0 {
                state.write_stalls_remaining -= 1;
                true
            } else {
                false
            }
        };
        if stalled {
            // The caller's deadline is the only way out of a stalled write.
            std::future::pending::<()>().await;
        }
        let mut state = self.lock();
        if state.write_failures_remaining > 0 {
            state.write_failures_remaining -= 1;
            return Err(SwivelError::WriteFailed {
                device: self.device.clone(),
                details: "simulated write failure".to_string(),
            });
        }
        state.written.push(payload.to_vec());
        Ok(())
    }

    async fn close(&mut self) {
        let stalled = {
            let mut state = self.lock();
            if state.close_stalls_remaining > 0 {
                state.close_stalls_remaining -= 1;
                true
            } else {
                false
            }
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        self.lock().close_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_written_frames() {
        let radio = SimRadio::new();
        let mut link = radio.open("C8:47:8C:12:34:56").await.unwrap();
        let target = link.resolve_write_target("svc", "chr").await.unwrap();
        link.write(target, &[0x24, 0x3a]).await.unwrap();

        assert_eq!(radio.open_count(), 1);
        assert_eq!(radio.written(), vec![vec![0x24, 0x3a]]);
    }

    #[tokio::test]
    async fn scripted_connect_failures_burn_down() {
        let radio = SimRadio::new();
        radio.fail_next_connects(1);

        assert!(radio.open("dev").await.is_err());
        assert!(radio.open("dev").await.is_ok());
        assert_eq!(radio.open_count(), 2);
    }

    #[tokio::test]
    async fn missing_service_is_a_capability_error() {
        let radio = SimRadio::new();
        radio.set_missing_service(true);

        let mut link = radio.open("dev").await.unwrap();
        let result = link.resolve_write_target("svc", "chr").await;
        assert!(
            matches!(result, Err(SwivelError::CapabilityNotFound { .. })),
            "expected CapabilityNotFound, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn scripted_write_failure_then_recovery() {
        let radio = SimRadio::new();
        radio.fail_next_writes(1);

        let mut link = radio.open("dev").await.unwrap();
        let target = link.resolve_write_target("svc", "chr").await.unwrap();

        let first = link.write(target, &[0x01]).await;
        assert!(
            matches!(first, Err(SwivelError::WriteFailed { .. })),
            "expected WriteFailed, got: {first:?}"
        );
        link.write(target, &[0x02]).await.unwrap();

        // Only the successful frame was recorded.
        assert_eq!(radio.written(), vec![vec![0x02]]);
    }

    #[tokio::test]
    async fn stalled_write_never_completes() {
        let radio = SimRadio::new();
        radio.stall_next_writes(1);

        let mut link = radio.open("dev").await.unwrap();
        let target = link.resolve_write_target("svc", "chr").await.unwrap();

        let stalled =
            tokio::time::timeout(Duration::from_millis(50), link.write(target, &[0x01])).await;
        assert!(stalled.is_err(), "stalled write must outlive the timeout");

        // The stall burns off; the next write lands.
        link.write(target, &[0x02]).await.unwrap();
        assert_eq!(radio.written(), vec![vec![0x02]]);
    }
}
