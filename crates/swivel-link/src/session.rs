//! [`GimbalSession`] – connection lifecycle for one gimbal.
//!
//! Owns the `Disconnected → Connecting → Connected` state machine on top of a
//! [`GimbalRadio`] transport. There is no terminal fault state: every failure
//! returns the session to `Disconnected`, from which the reconnect supervisor
//! (or the next `send`) may try again.

use std::time::{Duration, Instant};

use swivel_types::{SwivelError, hex_string};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::radio::{GimbalRadio, RadioLink, WriteTarget};

/// Connection parameters for one device.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Address the transport dials, e.g. `"C8:47:8C:12:34:56"`.
    pub address: String,
    /// UUID of the vendor control service.
    pub service_id: String,
    /// UUID of the write characteristic inside the control service.
    pub write_characteristic_id: String,
    /// Overall deadline for one connect attempt (open plus resolve).
    pub connect_timeout: Duration,
    /// Deadline for one write round trip. Also bounds the close handshake.
    pub write_timeout: Duration,
}

/// Lifecycle states of the device link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

struct LinkInner {
    state: LinkState,
    link: Option<Box<dyn RadioLink>>,
    write_target: Option<WriteTarget>,
    connected_at: Option<Instant>,
}

// ────────────────────────────────────────────────────────────────────────────
// GimbalSession
// ────────────────────────────────────────────────────────────────────────────

/// The one shared handle to the device link.
///
/// All mutation happens under a single async mutex that is held across the
/// transport awaits, so a supervisor `connect` and a delivery `send` always
/// serialize instead of interleaving half-open states. Every transport await
/// runs under a deadline, so a peer that stops replying cannot wedge the
/// lock and take `is_connected`/`connect`/`disconnect` down with it.
pub struct GimbalSession {
    radio: Box<dyn GimbalRadio>,
    config: LinkConfig,
    inner: Mutex<LinkInner>,
}

impl GimbalSession {
    /// Create a session over `radio`. No connection is attempted yet.
    pub fn new(radio: Box<dyn GimbalRadio>, config: LinkConfig) -> Self {
        Self {
            radio,
            config,
            inner: Mutex::new(LinkInner {
                state: LinkState::Disconnected,
                link: None,
                write_target: None,
                connected_at: None,
            }),
        }
    }

    /// Device address this session dials.
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Establish the link. A no-op when already connected.
    ///
    /// One attempt means: open the transport, then resolve the control
    /// service and write characteristic, all inside the configured deadline.
    /// On any failure the session is back in `Disconnected` with both handles
    /// cleared. A link that failed resolution is closed before the error is
    /// reported; a deadline hit abandons the attempt wherever it was.
    ///
    /// # Errors
    ///
    /// [`SwivelError::ConnectTimeout`] when the deadline expires,
    /// [`SwivelError::CapabilityNotFound`] when the device lacks the
    /// configured service or characteristic, [`SwivelError::Link`] for
    /// transport failures.
    pub async fn connect(&self) -> Result<(), SwivelError> {
        let mut inner = self.inner.lock().await;
        if inner.state == LinkState::Connected {
            info!(device = %self.config.address, "already connected");
            return Ok(());
        }
        inner.state = LinkState::Connecting;
        info!(device = %self.config.address, "connecting to gimbal");

        let attempt = async {
            let mut link = self.radio.open(&self.config.address).await?;
            match link
                .resolve_write_target(
                    &self.config.service_id,
                    &self.config.write_characteristic_id,
                )
                .await
            {
                Ok(target) => Ok((link, target)),
                Err(e) => {
                    // Half-open link; close it before reporting.
                    link.close().await;
                    Err(e)
                }
            }
        };

        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok((link, target))) => {
                inner.link = Some(link);
                inner.write_target = Some(target);
                inner.state = LinkState::Connected;
                inner.connected_at = Some(Instant::now());
                info!(device = %self.config.address, "gimbal connected");
                Ok(())
            }
            Ok(Err(e)) => {
                Self::reset(&mut inner);
                error!(device = %self.config.address, error = %e, "connect attempt failed");
                Err(e)
            }
            Err(_elapsed) => {
                Self::reset(&mut inner);
                let seconds = self.config.connect_timeout.as_secs();
                error!(device = %self.config.address, seconds, "connect attempt timed out");
                Err(SwivelError::ConnectTimeout {
                    device: self.config.address.clone(),
                    seconds,
                })
            }
        }
    }

    /// Tear the link down. Idempotent and infallible; transport close errors
    /// are swallowed, and a close that hangs is abandoned at the write
    /// deadline.
    pub async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(link) = inner.link.take() {
            self.close_bounded(link).await;
            let uptime_secs = inner
                .connected_at
                .map(|t| t.elapsed().as_secs())
                .unwrap_or(0);
            info!(device = %self.config.address, uptime_secs, "gimbal disconnected");
        }
        Self::reset(&mut inner);
    }

    /// Whether the session currently believes the link is up. Reads cached
    /// state only; no transport round trip.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.state == LinkState::Connected
    }

    /// Connect only when the link is down. The explicit first half of
    /// [`send`][GimbalSession::send]'s lazy reconnect.
    pub async fn ensure_connected(&self) -> Result<(), SwivelError> {
        if self.is_connected().await {
            return Ok(());
        }
        self.connect().await
    }

    /// Write one frame through the established link.
    ///
    /// Never connects implicitly: a session that is not connected, or has no
    /// resolved write target, yields [`SwivelError::NotReady`]. The round
    /// trip runs under the write deadline; a deadline hit counts as
    /// [`SwivelError::WriteFailed`]. Either way a failed write
    /// force-disconnects the session so the next attempt starts from a clean
    /// state, then propagates.
    pub async fn write(&self, payload: &[u8]) -> Result<(), SwivelError> {
        let mut inner = self.inner.lock().await;
        if inner.state != LinkState::Connected {
            return Err(SwivelError::NotReady("link is not connected".to_string()));
        }
        let Some(target) = inner.write_target else {
            return Err(SwivelError::NotReady(
                "write target not resolved".to_string(),
            ));
        };
        let Some(link) = inner.link.as_mut() else {
            return Err(SwivelError::NotReady("link handle missing".to_string()));
        };
        let outcome = match tokio::time::timeout(
            self.config.write_timeout,
            link.write(target, payload),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(SwivelError::WriteFailed {
                device: self.config.address.clone(),
                details: format!(
                    "no reply within {} ms",
                    self.config.write_timeout.as_millis()
                ),
            }),
        };
        match outcome {
            Ok(()) => {
                debug!(payload = %hex_string(payload), "frame written");
                Ok(())
            }
            Err(e) => {
                error!(device = %self.config.address, error = %e, "write failed, dropping link");
                if let Some(link) = inner.link.take() {
                    self.close_bounded(link).await;
                }
                Self::reset(&mut inner);
                Err(e)
            }
        }
    }

    /// Write `payload`, connecting first when the link is down.
    ///
    /// # Errors
    ///
    /// When the lazy connect fails its error propagates unchanged and no
    /// write is attempted; otherwise whatever [`write`][GimbalSession::write]
    /// returns.
    pub async fn send(&self, payload: &[u8]) -> Result<(), SwivelError> {
        self.ensure_connected().await?;
        self.write(payload).await
    }

    fn reset(inner: &mut LinkInner) {
        inner.link = None;
        inner.write_target = None;
        inner.state = LinkState::Disconnected;
        inner.connected_at = None;
    }

    /// Close a link without letting the handshake outlive the write deadline.
    async fn close_bounded(&self, mut link: Box<dyn RadioLink>) {
        if tokio::time::timeout(self.config.write_timeout, link.close())
            .await
            .is_err()
        {
            warn!(device = %self.config.address, "close handshake abandoned at the deadline");
        }
    }

    /// Forget the resolved write target while staying `Connected`.
    #[cfg(test)]
    async fn drop_write_target(&self) {
        self.inner.lock().await.write_target = None;
    }
}
