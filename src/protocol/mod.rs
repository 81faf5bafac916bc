//! Wire protocol for the simulator server.
//!
//! The server speaks a line-oriented text protocol over WebSocket. Inbound
//! frames wrap a single pipe-delimited message; outbound frames wrap a
//! single `room|command` string in a one-element JSON array.

pub mod commands;
pub mod message;

pub use message::{decode_frame, encode_frame, unescape_payload, ServerMessage};
