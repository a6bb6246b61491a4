//! `swivel-link` – Device Link
//!
//! Everything between the delivery loop and the gimbal: the transport seam,
//! the connection state machine, and the task that repairs a dropped link.
//!
//! # Modules
//!
//! - [`radio`] – [`GimbalRadio`][radio::GimbalRadio] / [`RadioLink`][radio::RadioLink]:
//!   the transport traits the rest of the crate is written against, plus the
//!   opaque [`WriteTarget`][radio::WriteTarget] handle produced by capability
//!   resolution.
//! - [`gateway`] – [`GatewayRadio`][gateway::GatewayRadio]:
//!   production transport that speaks a small JSON request/reply dialect over
//!   a WebSocket to the companion BLE gateway process.
//! - [`sim`] – [`SimRadio`][sim::SimRadio]:
//!   in-memory transport that records every interaction and can be scripted
//!   to fail, for tests and the `sim` transport mode.
//! - [`session`] – [`GimbalSession`][session::GimbalSession]:
//!   the `Disconnected → Connecting → Connected` state machine with idempotent
//!   connect/disconnect and lazy reconnect-on-send.
//! - [`supervisor`] – [`ReconnectSupervisor`][supervisor::ReconnectSupervisor]:
//!   spawned task that checks the link on an interval and repairs it in
//!   bounded bursts.

pub mod gateway;
pub mod radio;
pub mod session;
pub mod sim;
pub mod supervisor;

pub use gateway::GatewayRadio;
pub use radio::{GimbalRadio, RadioLink, WriteTarget};
pub use session::{GimbalSession, LinkConfig, LinkState};
pub use sim::SimRadio;
pub use supervisor::{ReconnectSupervisor, SupervisorConfig};
