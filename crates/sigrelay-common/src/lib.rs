//! Wire types shared across the sigrelay signaling stack.
//!
//! This crate provides:
//! - Pin and role definitions ([`types`])
//! - Tagged JSON messages exchanged with the relay and the boundary
//!   decoder that rejects malformed input ([`message`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod message;
pub mod types;

pub use message::{ClientMessage, DecodeError, ServerMessage};
pub use types::{Pin, Role};
