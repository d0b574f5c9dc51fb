//! WebSocket connection handling
//!
//! A [`Connection`] owns the stream hijacked out of an upgrade request and
//! speaks frames over it. Writes become single unfragmented Binary frames;
//! reads reassemble fragmented messages, answer pings and surface a peer's
//! Close as [`Error::Closed`]. The connection implements
//! [`TransportStream`] itself, so it can stand in wherever a plain byte stream
//! is expected.

use bytes::{Buf, Bytes, BytesMut};
use std::time::Instant;
use upsock_core::frame::{Frame, FrameCodec};
use upsock_core::protocol::Opcode;
use upsock_core::{Address, Error, Result, TransportStream};

/// A message-oriented WebSocket connection over a byte stream
pub struct Connection {
    /// Transport stream, owned for the lifetime of the connection
    stream: Box<dyn TransportStream>,
    /// Codec used for every frame on this connection
    codec: FrameCodec,
    /// Undelivered tail of the last reassembled message
    residue: Bytes,
    /// Connection metadata
    pub metadata: ConnectionMetadata,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("codec", &self.codec)
            .field("residue", &self.residue.len())
            .field("metadata", &self.metadata)
            .field("stream", &"<stream>")
            .finish()
    }
}

/// Connection metadata
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Connection established time
    pub established_at: Instant,
    /// When the last Pong frame arrived
    pub last_pong_at: Option<Instant>,
    /// Messages sent count
    pub messages_sent: u64,
    /// Messages received count
    pub messages_received: u64,
    /// Bytes sent count
    pub bytes_sent: u64,
    /// Bytes received count
    pub bytes_received: u64,
}

impl ConnectionMetadata {
    fn new() -> Self {
        Self {
            established_at: Instant::now(),
            last_pong_at: None,
            messages_sent: 0,
            messages_received: 0,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }
}

impl Connection {
    /// Create a connection over `stream` using the default codec
    pub fn new(stream: Box<dyn TransportStream>) -> Self {
        Self::with_codec(stream, FrameCodec::default())
    }

    /// Create a connection over `stream` using `codec`
    pub fn with_codec(stream: Box<dyn TransportStream>, codec: FrameCodec) -> Self {
        Self {
            stream,
            codec,
            residue: Bytes::new(),
            metadata: ConnectionMetadata::new(),
        }
    }

    /// Create a connection over any concrete stream
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: TransportStream + 'static,
    {
        Self::new(Box::new(stream))
    }

    /// Get the connection metadata
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// When the last Pong frame arrived, if any
    pub fn last_pong(&self) -> Option<Instant> {
        self.metadata.last_pong_at
    }

    /// Number of received bytes not yet handed to a reader
    pub fn buffered_len(&self) -> usize {
        self.residue.len()
    }

    /// Read the next whole message
    ///
    /// Bytes left over from a previous [`read`](TransportStream::read) are
    /// returned first, as their own message.
    pub async fn read_message(&mut self) -> Result<Bytes> {
        if !self.residue.is_empty() {
            return Ok(std::mem::take(&mut self.residue));
        }
        self.next_message().await
    }

    /// Decode frames until a data message is complete
    async fn next_message(&mut self) -> Result<Bytes> {
        let mut message = BytesMut::new();

        loop {
            let frame = self.codec.decode(self.stream.as_mut()).await?;
            match frame.opcode {
                Opcode::Ping => {
                    crate::log_debug!("ping received ({} bytes), sending pong", frame.len());
                    self.codec
                        .encode(&Frame::pong(Bytes::new()), self.stream.as_mut())
                        .await?;
                }
                Opcode::Pong => {
                    crate::log_debug!("pong received ({} bytes)", frame.len());
                    self.metadata.last_pong_at = Some(Instant::now());
                }
                Opcode::Close => {
                    crate::log_debug!("close frame received ({} bytes)", frame.len());
                    let _ = TransportStream::close(self).await;
                    return Err(Error::Closed {
                        payload: frame.payload,
                    });
                }
                Opcode::Binary | Opcode::Continuation => {
                    message.extend_from_slice(&frame.payload);
                    if frame.fin {
                        break;
                    }
                }
                other if other.is_reserved() => {
                    crate::log_warn!("unhandled frame type: {} (reserved opcode)", other);
                }
                other => {
                    crate::log_warn!("unhandled frame type: {}", other);
                }
            }
        }

        self.metadata.messages_received += 1;
        self.metadata.bytes_received += message.len() as u64;

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("upsock_messages_received_total").increment(1);
            metrics::counter!("upsock_bytes_received_total").increment(message.len() as u64);
        }

        Ok(message.freeze())
    }
}

#[async_trait::async_trait]
impl TransportStream for Connection {
    /// Read message bytes
    ///
    /// Buffered bytes of a partly delivered message are served without
    /// touching the transport. Unlike a plain message read, zero-length
    /// messages are skipped rather than reported as a 0-byte read, since
    /// `Ok(0)` would read as end of stream; `Ok(0)` is only returned for an
    /// empty `buf`. Use [`Connection::read_message`] to observe them.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.residue.is_empty() {
            self.residue = self.next_message().await?;
        }

        let n = buf.len().min(self.residue.len());
        buf[..n].copy_from_slice(&self.residue[..n]);
        self.residue.advance(n);
        Ok(n)
    }

    /// Send `buf` as one final, unmasked Binary frame
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let frame = Frame::binary(Bytes::copy_from_slice(buf));
        self.codec.encode(&frame, self.stream.as_mut()).await?;

        self.metadata.messages_sent += 1;
        self.metadata.bytes_sent += buf.len() as u64;

        #[cfg(feature = "metrics")]
        {
            metrics::counter!("upsock_messages_sent_total").increment(1);
            metrics::counter!("upsock_bytes_sent_total").increment(buf.len() as u64);
        }

        Ok(buf.len())
    }

    /// Each `write` is one message; the whole buffer goes out as one frame
    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.write(buf).await.map(|_| ())
    }

    async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await
    }

    /// Send an empty Close frame (best effort) and close the transport
    async fn close(&mut self) -> Result<()> {
        let _ = self
            .codec
            .encode(&Frame::close(Bytes::new()), self.stream.as_mut())
            .await;
        self.stream.close().await
    }

    fn local_addr(&self) -> Result<Address> {
        self.stream.local_addr()
    }

    fn remote_addr(&self) -> Result<Address> {
        self.stream.remote_addr()
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.stream.set_read_deadline(deadline)
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.stream.set_write_deadline(deadline)
    }

    fn set_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.stream.set_deadline(deadline)
    }
}
