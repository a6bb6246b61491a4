//! `swivel-runtime` – Delivery & Telemetry
//!
//! The outbound half of Swivel plus process observability: the loop that
//! turns the arbiter's verdict into vendor frames on the wire, and the
//! tracing pipeline the daemon boots with.
//!
//! # Modules
//!
//! - [`delivery`] – [`delivery_tick`][delivery::delivery_tick] /
//!   [`run_delivery`][delivery::run_delivery]: the fixed-cadence forwarding
//!   loop between arbiter, command table and gimbal session.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   `tracing-subscriber` setup with an optional OTLP span exporter.

pub mod delivery;
pub mod telemetry;

pub use delivery::{DeliveryConfig, delivery_tick, run_delivery};
pub use telemetry::{TelemetryGuard, init_tracing};
