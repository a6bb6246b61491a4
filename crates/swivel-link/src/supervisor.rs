//! [`ReconnectSupervisor`] – background link repair.
//!
//! A periodic watchdog over one [`GimbalSession`]. Every check interval it
//! looks at the cached link state; when the link is down it runs one repair
//! cycle of bounded reconnect attempts with a fixed backoff between them,
//! then goes back to watching. Shutdown is observed at every sleep and races
//! the in-flight connect, so the stop signal never waits on a slow device.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::session::GimbalSession;

/// Timing knobs for the repair loop.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How often the link state is checked.
    pub check_interval: Duration,
    /// Reconnect attempts per repair cycle before yielding back to the
    /// check loop.
    pub attempts_per_cycle: u32,
    /// Pause between attempts within one cycle.
    pub retry_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            attempts_per_cycle: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ReconnectSupervisor
// ────────────────────────────────────────────────────────────────────────────

/// Handle to the spawned repair task.
pub struct ReconnectSupervisor {
    handle: JoinHandle<()>,
}

impl ReconnectSupervisor {
    /// Spawn the repair loop over `session`.
    pub fn spawn(
        session: Arc<GimbalSession>,
        config: SupervisorConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let handle = tokio::spawn(supervise(session, config, shutdown));
        Self { handle }
    }

    /// Wait for the loop to exit. The loop leaves on its own once the
    /// shutdown channel fires; an `Err` from the join only means the task
    /// was already gone.
    pub async fn stop(self) {
        let _ = self.handle.await;
    }
}

async fn supervise(
    session: Arc<GimbalSession>,
    config: SupervisorConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!(
        check_interval_secs = config.check_interval.as_secs(),
        attempts_per_cycle = config.attempts_per_cycle,
        "reconnect supervisor running"
    );
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = sleep(config.check_interval) => {}
        }
        if session.is_connected().await {
            continue;
        }
        warn!(device = %session.address(), "link down, starting repair cycle");
        if !repair_cycle(&session, &config, &mut shutdown).await {
            break;
        }
    }
    debug!("reconnect supervisor stopped");
}

/// One bounded burst of reconnect attempts. Returns `false` when shutdown
/// arrived mid-cycle, an in-flight attempt included; the session repairs an
/// abandoned `Connecting` state on its next transition.
async fn repair_cycle(
    session: &GimbalSession,
    config: &SupervisorConfig,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    for attempt in 1..=config.attempts_per_cycle {
        let outcome = tokio::select! {
            _ = shutdown.recv() => return false,
            outcome = session.connect() => outcome,
        };
        match outcome {
            Ok(()) => {
                info!(attempt, "link repaired");
                return true;
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts = config.attempts_per_cycle,
                    error = %e,
                    "repair attempt failed"
                );
            }
        }
        if attempt < config.attempts_per_cycle {
            tokio::select! {
                _ = shutdown.recv() => return false,
                _ = sleep(config.retry_backoff) => {}
            }
        }
    }
    true
}
