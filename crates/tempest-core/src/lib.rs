//! # Overview
//!
//! `tempest-core` holds the ambient stack every other Tempest crate leans
//! on: the tunable [`config::TempestConfig`] (spec.md §6), the
//! [`disconnect::DisconnectReason`] enum carried on the wire and in every
//! `Disconnected` event (spec.md §6), and [`telemetry::init`] which installs
//! the workspace's `tracing` subscriber.
//!
//! Nothing in this crate talks to a socket or touches the wire format
//! directly; it is pure shared vocabulary, the way the teacher repo's
//! `core` crate carries branding and version constants for every binary in
//! its workspace without knowing about transfer engines itself.

pub mod config;
pub mod disconnect;
pub mod telemetry;

pub use config::TempestConfig;
pub use disconnect::DisconnectReason;
