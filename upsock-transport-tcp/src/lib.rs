//! TCP Transport for upsock
//!
//! Tokio-backed implementation of the upsock transport contract, with native
//! read and write deadlines.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

#[cfg(feature = "tokio-runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio-runtime")))]
pub mod tcp;

// Re-export TCP transport types
#[cfg(feature = "tokio-runtime")]
pub use tcp::{TcpStream, TcpTransport};

/// Prelude module
pub mod prelude {
    #[cfg(feature = "tokio-runtime")]
    pub use crate::tcp::{TcpStream, TcpTransport};
    pub use upsock_core::transport::{Transport, TransportStream};
}
