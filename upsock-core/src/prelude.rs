//! Prelude module for upsock Core
//!
//! This module re-exports commonly used types and traits to make them
//! easily accessible for users of the library.

pub use crate::addr::Address;
pub use crate::error::{ConfigError, Error, FrameError, ProtocolError, Result};
pub use crate::frame::{Frame, FrameCodec};
pub use crate::protocol::Opcode;
pub use crate::transport::{Transport, TransportStream};

// Re-export commonly used external dependencies
pub use bytes::{Bytes, BytesMut};
