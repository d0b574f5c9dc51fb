//! # upsock
//!
//! WebSocket as a transport: upgrade an HTTP connection once, then read and
//! write it like any other byte stream.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upsock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ServerBuilder::new().bind("127.0.0.1:8080")?.build()?;
//!     let listener = Listener::with_config(&config);
//!     tokio::spawn(UpgradeHost::new(config, listener.clone()).serve());
//!
//!     loop {
//!         let mut conn = listener.accept().await?;
//!         tokio::spawn(async move {
//!             let mut buf = [0u8; 4096];
//!             while let Ok(n) = conn.read(&mut buf).await {
//!                 if conn.write(&buf[..n]).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

// Re-export core components
pub use upsock_core::*;

#[cfg(feature = "transport-tcp")]
pub use upsock_transport_tcp as transport_tcp;

#[cfg(feature = "server")]
pub use upsock_server as server;

#[cfg(feature = "server")]
pub use upsock_server::{Connection, Listener, UpgradeHost};

/// Prelude module with common imports
pub mod prelude {
    pub use upsock_core::prelude::*;

    #[cfg(feature = "server")]
    pub use upsock_server::prelude::*;

    #[cfg(feature = "transport-tcp")]
    pub use upsock_transport_tcp::prelude::*;
}
