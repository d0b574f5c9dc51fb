//! # upsock Core
//!
//! Core WebSocket protocol implementation for upsock.
//!
//! This crate holds everything that does not depend on a runtime or a socket:
//!
//! - Error handling and types
//! - WebSocket frame parsing and generation against a [`TransportStream`]
//! - Opening handshake helpers
//! - Protocol constants and utilities
//! - The transport contract shared by raw streams and upgraded connections

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod addr;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod protocol;
pub mod transport;

pub mod prelude;

// Re-export key types for convenience
pub use addr::Address;
pub use error::{Error, Result};
pub use frame::{Frame, FrameCodec, LengthClass};
pub use protocol::Opcode;
pub use transport::{Transport, TransportStream};
