//! Transport layer abstraction
//!
//! [`TransportStream`] is the stream contract of upsock: blocking-style read,
//! write and close, endpoint addresses and deadlines. Raw byte transports
//! implement it, and so does the WebSocket connection built on top of one, so
//! code written against the contract does not care which layer it talks to.

use crate::addr::Address;
use crate::error::{Error, Result};
use std::time::Instant;

/// Transport trait for sources of inbound streams (bound listeners)
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// The stream type produced by this transport
    type Stream: TransportStream;

    /// Accept an incoming connection
    async fn accept(&self) -> Result<Self::Stream>;

    /// Get the local address
    fn local_addr(&self) -> Result<Address>;
}

/// Trait for bidirectional byte streams
///
/// A stream has a single reader and a single writer at a time; every I/O method
/// takes `&mut self`.
#[async_trait::async_trait]
pub trait TransportStream: Send {
    /// Read data from the stream; `Ok(0)` signals end of stream
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the stream, returning how many bytes were accepted
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf).await?;
            if n == 0 {
                return Err(Error::Io(std::io::ErrorKind::WriteZero.into()));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Flush the stream
    async fn flush(&mut self) -> Result<()>;

    /// Close the stream
    async fn close(&mut self) -> Result<()>;

    /// Get the local address
    fn local_addr(&self) -> Result<Address>;

    /// Get the remote address
    fn remote_addr(&self) -> Result<Address>;

    /// Set the instant after which pending and future reads fail; `None` clears it
    fn set_read_deadline(&mut self, _deadline: Option<Instant>) -> Result<()> {
        Err(Error::Unsupported("set_read_deadline"))
    }

    /// Set the instant after which pending and future writes fail; `None` clears it
    fn set_write_deadline(&mut self, _deadline: Option<Instant>) -> Result<()> {
        Err(Error::Unsupported("set_write_deadline"))
    }

    /// Set both the read and the write deadline
    fn set_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.set_read_deadline(deadline)?;
        self.set_write_deadline(deadline)
    }
}
