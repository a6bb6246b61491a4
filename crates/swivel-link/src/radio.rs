//! Transport traits between [`GimbalSession`][crate::session::GimbalSession]
//! and whatever actually moves frames to the device.
//!
//! Transports implement [`GimbalRadio`] (how to reach a device) and
//! [`RadioLink`] (one established connection). The session only ever talks to
//! the traits, so the production gateway transport and the in-process
//! simulator can be swapped without touching arbitration or delivery logic.

use async_trait::async_trait;
use swivel_types::SwivelError;

/// Opaque handle to the resolved write characteristic on an open link.
///
/// Produced by [`RadioLink::resolve_write_target`] and handed back to
/// [`RadioLink::write`]; only the transport knows what the number means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTarget(pub u16);

/// A way of opening connections to a gimbal.
#[async_trait]
pub trait GimbalRadio: Send + Sync {
    /// Open a fresh connection to the device at `address`.
    ///
    /// One call per connection attempt. The returned link lives until the
    /// session closes it (or drops it when a connect attempt is abandoned).
    ///
    /// # Errors
    ///
    /// Returns [`SwivelError::Link`] when the device, or the transport in
    /// front of it, cannot be reached.
    async fn open(&self, address: &str) -> Result<Box<dyn RadioLink>, SwivelError>;
}

/// One established connection to a gimbal.
#[async_trait]
pub trait RadioLink: Send + Sync {
    /// Locate the vendor control service and its write characteristic.
    ///
    /// # Errors
    ///
    /// Returns [`SwivelError::CapabilityNotFound`] when the device does not
    /// expose `service_id` or `characteristic_id`, or [`SwivelError::Link`]
    /// on transport failure.
    async fn resolve_write_target(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<WriteTarget, SwivelError>;

    /// Write one vendor frame through the resolved target.
    ///
    /// # Errors
    ///
    /// Returns [`SwivelError::WriteFailed`] when the device rejects or drops
    /// the frame.
    async fn write(&mut self, target: WriteTarget, payload: &[u8]) -> Result<(), SwivelError>;

    /// Close the connection. Best effort; transports swallow close errors.
    async fn close(&mut self);
}
