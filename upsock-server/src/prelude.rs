//! Prelude module with common imports
//!
//! This module re-exports the most commonly used types and traits
//! from the upsock-server crate for ergonomic imports.

pub use crate::config::{ServerBuilder, ServerConfig};
pub use crate::connection::{Connection, ConnectionMetadata};
pub use crate::host::UpgradeHost;
pub use crate::listener::{HijackableResponse, Hijacked, Listener};

// Re-export core types
pub use upsock_core::prelude::*;
