//! Minimal HTTP/1.1 upgrade host
//!
//! [`UpgradeHost`] accepts connections from a [`Transport`], reads one request
//! head per connection and passes it to a [`Listener`] together with a
//! [`RawResponse`] that can be hijacked. It understands just enough HTTP to
//! drive the handshake: no bodies, no keep-alive, no routing.

use crate::config::ServerConfig;
use crate::listener::{HijackableResponse, Hijacked, Listener};
use bytes::{Bytes, BytesMut};
use http::{Method, Request, StatusCode, Version};
use std::time::Duration;
use upsock_core::error::ProtocolError;
use upsock_core::{Error, Result, Transport, TransportStream};

const READ_CHUNK: usize = 1024;
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);
const MAX_HEADERS: usize = 64;

/// Serves upgrade requests for a [`Listener`]
#[derive(Debug, Clone)]
pub struct UpgradeHost {
    config: ServerConfig,
    listener: Listener,
}

impl UpgradeHost {
    /// Create a host feeding `listener`
    pub fn new(config: ServerConfig, listener: Listener) -> Self {
        Self { config, listener }
    }

    /// The host configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The listener upgraded connections are handed to
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Bind the configured address and serve until the listener closes
    #[cfg(feature = "tcp-transport")]
    pub async fn serve(self) -> Result<()> {
        let transport = upsock_transport_tcp::TcpTransport::bind(self.config.bind_address).await?;
        self.serve_transport(transport).await
    }

    /// Serve connections from `transport` until the listener closes
    ///
    /// Every connection is handled on its own task.
    pub async fn serve_transport<T>(self, transport: T) -> Result<()>
    where
        T: Transport,
        T::Stream: 'static,
    {
        crate::log_info!(
            "upgrade host listening on {}",
            transport
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string())
        );

        let mut backoff = None;
        loop {
            tokio::select! {
                result = transport.accept() => match result {
                    Ok(stream) => {
                        backoff = None;
                        let host = self.clone();
                        tokio::spawn(async move {
                            if let Err(err) = host.serve_connection(stream).await {
                                crate::log_debug!("upgrade request failed: {}", err);
                            }
                        });
                    }
                    Err(err) => {
                        let delay = next_backoff(backoff);
                        backoff = Some(delay);
                        crate::log_error!("Accept error: {}, retrying in {:?}", err, delay);
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = self.listener.closed() => {}
                        }
                    }
                },
                _ = self.listener.closed() => {
                    crate::log_info!("listener closed, upgrade host stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Read one request head from `stream` and hand it to the listener
    pub async fn serve_connection<S>(&self, mut stream: S) -> Result<()>
    where
        S: TransportStream + 'static,
    {
        let head = tokio::time::timeout(
            self.config.handshake_timeout,
            read_request_head(&mut stream, self.config.max_request_head_size),
        )
        .await;

        let (request, buffered) = match head {
            Ok(Ok(head)) => head,
            Ok(Err(Error::Protocol(err))) => {
                let mut response = RawResponse::new(stream, Bytes::new());
                let _ = response.write_status(err.status()).await;
                response.shutdown().await;
                return Err(err.into());
            }
            Ok(Err(err)) => {
                let _ = stream.close().await;
                return Err(err);
            }
            Err(_) => {
                let _ = stream.close().await;
                return Err(Error::DeadlineExceeded {
                    operation: "read request head",
                });
            }
        };

        let mut response = RawResponse::new(stream, buffered);
        let result = self.listener.handle(&request, &mut response).await;
        response.shutdown().await;
        result
    }
}

/// Delay after a failed accept, doubling up to [`ACCEPT_BACKOFF_MAX`]
fn next_backoff(previous: Option<Duration>) -> Duration {
    match previous {
        Some(delay) => (delay * 2).min(ACCEPT_BACKOFF_MAX),
        None => ACCEPT_BACKOFF_MIN,
    }
}

/// Read and parse a request head; returns it with any bytes that followed it
async fn read_request_head<S>(stream: &mut S, limit: usize) -> Result<(Request<()>, Bytes)>
where
    S: TransportStream + ?Sized,
{
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some((request, head_len)) = parse_request_head(&buffer)? {
            if head_len > limit {
                return Err(ProtocolError::RequestHeadTooLarge { limit }.into());
            }
            let buffered = buffer.split_off(head_len).freeze();
            return Ok((request, buffered));
        }

        if buffer.len() > limit {
            return Err(ProtocolError::RequestHeadTooLarge { limit }.into());
        }
    }
}

/// Parse a complete request head; `None` while more bytes are needed
fn parse_request_head(buf: &[u8]) -> Result<Option<(Request<()>, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);

    let head_len = match parsed.parse(buf).map_err(malformed)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let method = parsed
        .method
        .ok_or_else(|| malformed("missing method"))
        .and_then(|method| Method::from_bytes(method.as_bytes()).map_err(malformed))?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut builder = Request::builder()
        .method(method)
        .uri(parsed.path.unwrap_or_default())
        .version(version);
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }

    let request = builder.body(()).map_err(malformed)?;
    Ok(Some((request, head_len)))
}

fn malformed(err: impl ToString) -> Error {
    ProtocolError::MalformedRequest(err.to_string()).into()
}

/// Response half of a request read by [`UpgradeHost`]
pub struct RawResponse<S> {
    stream: Option<S>,
    buffered: Bytes,
}

impl<S> std::fmt::Debug for RawResponse<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("hijacked", &self.stream.is_none())
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

impl<S> RawResponse<S>
where
    S: TransportStream + 'static,
{
    /// Wrap `stream`; `buffered` holds bytes read past the request head
    pub fn new(stream: S, buffered: Bytes) -> Self {
        Self {
            stream: Some(stream),
            buffered,
        }
    }

    /// Check whether the stream has been hijacked
    pub fn is_hijacked(&self) -> bool {
        self.stream.is_none()
    }

    /// Close the stream unless it was hijacked
    pub async fn shutdown(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close().await;
        }
    }
}

#[async_trait::async_trait]
impl<S> HijackableResponse for RawResponse<S>
where
    S: TransportStream + 'static,
{
    async fn write_status(&mut self, status: StatusCode) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn hijack(&mut self) -> Result<Hijacked> {
        let stream = self.stream.take().ok_or(Error::NotConnected)?;
        Ok(Hijacked {
            stream: Box::new(stream),
            buffered: std::mem::take(&mut self.buffered),
        })
    }
}

#[async_trait::async_trait]
impl<R> HijackableResponse for &mut R
where
    R: HijackableResponse + ?Sized,
{
    async fn write_status(&mut self, status: StatusCode) -> Result<()> {
        (**self).write_status(status).await
    }

    async fn hijack(&mut self) -> Result<Hijacked> {
        (**self).hijack().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header;

    const UPGRADE: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: example.com\r\n\
        Connection: Upgrade\r\n\
        Upgrade: websocket\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    #[test]
    fn test_parse_request_head() {
        let (request, len) = parse_request_head(UPGRADE).unwrap().unwrap();
        assert_eq!(len, UPGRADE.len());
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.uri(), "/chat");
        assert_eq!(request.version(), Version::HTTP_11);
        assert_eq!(request.headers()[header::UPGRADE], "websocket");
    }

    #[test]
    fn test_parse_partial_and_malformed() {
        assert!(parse_request_head(&UPGRADE[..20]).unwrap().is_none());

        let err = parse_request_head(b"GET /\x01 HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_accept_backoff() {
        let mut delay = next_backoff(None);
        assert_eq!(delay, ACCEPT_BACKOFF_MIN);
        delay = next_backoff(Some(delay));
        assert_eq!(delay, Duration::from_millis(10));
        for _ in 0..20 {
            delay = next_backoff(Some(delay));
        }
        assert_eq!(delay, ACCEPT_BACKOFF_MAX);
    }

    #[test]
    fn test_http10_version() {
        let (request, _) = parse_request_head(b"GET / HTTP/1.0\r\n\r\n").unwrap().unwrap();
        assert_eq!(request.version(), Version::HTTP_10);
    }
}
