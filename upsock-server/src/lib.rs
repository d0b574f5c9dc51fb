//! upsock Server
//!
//! Accept WebSocket upgrades out of an HTTP server and use them as plain
//! byte-stream connections.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upsock_server::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> upsock_core::Result<()> {
//!     let config = ServerBuilder::new().bind("0.0.0.0:8080")?.build()?;
//!     let listener = Listener::with_config(&config);
//!     tokio::spawn(UpgradeHost::new(config, listener.clone()).serve());
//!
//!     let mut conn = listener.accept().await?;
//!     let mut buf = [0u8; 1024];
//!     let n = conn.read(&mut buf).await?;
//!     conn.write(&buf[..n]).await?;
//!     conn.close().await
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

// Public modules
pub mod config;
pub mod connection;
pub mod host;
pub mod listener;
pub mod logging;

// Prelude module with common imports
pub mod prelude;

// Re-export key types for convenience
pub use config::{ServerBuilder, ServerConfig};
pub use connection::{Connection, ConnectionMetadata};
pub use host::{RawResponse, UpgradeHost};
pub use listener::{HijackableResponse, Hijacked, Listener};
pub use logging::init_logging;
