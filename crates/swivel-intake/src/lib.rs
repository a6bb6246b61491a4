//! `swivel-intake` – Command Intake
//!
//! The inbound half of Swivel: a WebSocket subscription to the command
//! broker, normalization of the free-text payloads riding on it, and the
//! hand-off into the arbiter.
//!
//! # Modules
//!
//! - [`codec`] – [`DecodedCommand`][codec::DecodedCommand]:
//!   normalization and classification of one inbound payload.
//! - [`client`] – [`IntakeClient`][client::IntakeClient]:
//!   long-running subscriber that retries the broker forever and feeds
//!   decoded commands to the arbiter.

pub mod client;
pub mod codec;

pub use client::{IntakeClient, IntakeConfig, MAX_PAYLOAD_BYTES};
pub use codec::{DecodedCommand, decode};
