//! TCP transport implementation for upsock
//!
//! [`TcpTransport`] accepts inbound connections; [`TcpStream`] implements
//! [`TransportStream`] over a tokio socket and honours deadlines by racing
//! each read or write against `tokio::time::timeout_at`.

use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream as TokioTcpStream};
use upsock_core::{
    transport::{Transport, TransportStream},
    Address, Error, Result,
};

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Create a new TCP transport bound to the given address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The bound socket address
    pub fn socket_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> Result<Self::Stream> {
        let (stream, remote_addr) = self.listener.accept().await?;
        Ok(TcpStream::with_peer(stream, remote_addr))
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(self.local_addr.into())
    }
}

/// TCP stream implementation
#[derive(Debug)]
pub struct TcpStream {
    stream: Option<TokioTcpStream>,
    remote_addr: Option<SocketAddr>,
    read_deadline: Option<Instant>,
    write_deadline: Option<Instant>,
}

impl TcpStream {
    /// Create a new TCP stream from a tokio TCP stream
    pub fn from_tokio(stream: TokioTcpStream) -> Self {
        let remote_addr = stream.peer_addr().ok();
        Self {
            stream: Some(stream),
            remote_addr,
            read_deadline: None,
            write_deadline: None,
        }
    }

    fn with_peer(stream: TokioTcpStream, remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr: Some(remote_addr),
            ..Self::from_tokio(stream)
        }
    }

    /// Connect to a remote address
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TokioTcpStream::connect(addr).await?;
        Ok(Self::from_tokio(stream))
    }

    /// Check whether the stream is still open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn socket(&mut self) -> Result<&mut TokioTcpStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

/// Run `operation` to completion or until `deadline`, whichever comes first
async fn with_deadline<F, T>(deadline: Option<Instant>, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match deadline {
        None => Ok(fut.await?),
        Some(deadline) if deadline <= Instant::now() => Err(Error::DeadlineExceeded { operation }),
        Some(deadline) => {
            let deadline = tokio::time::Instant::from_std(deadline);
            match tokio::time::timeout_at(deadline, fut).await {
                Ok(result) => Ok(result?),
                Err(_) => Err(Error::DeadlineExceeded { operation }),
            }
        }
    }
}

#[async_trait]
impl TransportStream for TcpStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let deadline = self.read_deadline;
        let stream = self.socket()?;
        with_deadline(deadline, "read", stream.read(buf)).await
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let deadline = self.write_deadline;
        let stream = self.socket()?;
        with_deadline(deadline, "write", stream.write(buf)).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let deadline = self.write_deadline;
        let stream = self.socket()?;
        with_deadline(deadline, "write", stream.write_all(buf)).await
    }

    async fn flush(&mut self) -> Result<()> {
        let deadline = self.write_deadline;
        let stream = self.socket()?;
        with_deadline(deadline, "flush", stream.flush()).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    fn local_addr(&self) -> Result<Address> {
        let stream = self.stream.as_ref().ok_or(Error::NotConnected)?;
        Ok(stream.local_addr()?.into())
    }

    fn remote_addr(&self) -> Result<Address> {
        self.remote_addr.map(Address::from).ok_or(Error::NotConnected)
    }

    fn set_read_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.read_deadline = deadline;
        Ok(())
    }

    fn set_write_deadline(&mut self, deadline: Option<Instant>) -> Result<()> {
        self.write_deadline = deadline;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn pair() -> (TcpStream, TcpStream) {
        let transport = TcpTransport::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let client = TcpStream::connect(transport.socket_addr());
        let (client, server) = tokio::join!(client, transport.accept());
        (client.unwrap(), server.unwrap())
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let (mut client, mut server) = pair().await;

        client.write_all(b"hello").await.unwrap();
        client.flush().await.unwrap();

        let mut buf = [0u8; 5];
        let mut have = 0;
        while have < buf.len() {
            have += server.read(&mut buf[have..]).await.unwrap();
        }
        assert_eq!(&buf, b"hello");

        assert_eq!(server.remote_addr().unwrap(), client.local_addr().unwrap());
        assert_eq!(server.local_addr().unwrap().network(), "tcp");
    }

    #[tokio::test]
    async fn test_read_deadline_elapses() {
        let (_client, mut server) = pair().await;

        server
            .set_read_deadline(Some(Instant::now() + Duration::from_millis(50)))
            .unwrap();
        let mut buf = [0u8; 1];
        let err = server.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded { operation: "read" }));

        // Past deadlines fail without touching the socket
        server
            .set_deadline(Some(Instant::now() - Duration::from_millis(1)))
            .unwrap();
        assert!(matches!(
            server.write(b"x").await,
            Err(Error::DeadlineExceeded { operation: "write" })
        ));

        server.set_deadline(None).unwrap();
        assert_eq!(server.write(b"x").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close() {
        let (mut client, mut server) = pair().await;

        server.close().await.unwrap();
        assert!(!server.is_connected());
        assert!(matches!(server.read(&mut [0u8; 4]).await, Err(Error::NotConnected)));
        assert!(server.close().await.is_ok());

        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    }
}
