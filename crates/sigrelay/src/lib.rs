//! Pin-based WebRTC signaling relay.
//!
//! A camera registers a pin, a dashboard joins it, and the relay forwards
//! offer/answer/ICE messages between the two. Media never passes through.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// CLI argument parsing and server configuration.
pub mod config;
mod connection;
/// Per-connection role and pin tracking.
pub mod context;
/// Error types for signaling server operations.
pub mod error;
/// Health, introspection and metrics HTTP endpoint.
pub mod http;
/// Session teardown on connection close.
pub mod lifecycle;
/// Metric names and recording helpers.
pub mod metrics;
/// Pin → session table holding the camera and dashboard slots.
pub mod registry;
/// Signaling message routing between paired peers.
pub mod router;
/// Accept loop and shared server state.
pub mod server;

pub use server::{run, run_with_shutdown, ServerState};
