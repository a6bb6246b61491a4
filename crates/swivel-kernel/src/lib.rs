//! `swivel-kernel` – Command Arbitration
//!
//! The decision core of Swivel. It does not talk to hardware; it decides
//! which single command, if any, the delivery loop is allowed to forward
//! right now.
//!
//! # Modules
//!
//! - [`arbiter`] – [`CommandArbiter`][arbiter::CommandArbiter]:
//!   debounced, last-writer-wins holder of the active directional command,
//!   with lazy expiry so stale input stops the gimbal instead of wedging it.

pub mod arbiter;

pub use arbiter::{CommandArbiter, DEFAULT_COMMAND_TIMEOUT};
