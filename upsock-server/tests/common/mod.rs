//! Test doubles shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use http::{Request, StatusCode};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use upsock_core::{Address, Frame, Result, TransportStream};
use upsock_server::{HijackableResponse, Hijacked};

#[derive(Debug, Default)]
struct StreamState {
    reads: VecDeque<Vec<u8>>,
    reads_performed: usize,
    written: Vec<u8>,
    closed: bool,
}

/// In-memory stream whose state stays observable after it is boxed away
#[derive(Debug, Clone)]
pub struct MockStream {
    label: &'static str,
    state: Arc<Mutex<StreamState>>,
}

impl MockStream {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: Arc::default(),
        }
    }

    /// Queue bytes for a future read
    pub fn push_read(&self, bytes: impl Into<Vec<u8>>) {
        self.state.lock().unwrap().reads.push_back(bytes.into());
    }

    /// Queue a frame for a future read
    pub fn push_frame(&self, frame: Frame) {
        self.push_read(frame.to_bytes().to_vec());
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn reads_performed(&self) -> usize {
        self.state.lock().unwrap().reads_performed
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

#[async_trait::async_trait]
impl TransportStream for MockStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.reads_performed += 1;
        let Some(chunk) = state.reads.front_mut() else {
            return Ok(0);
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        chunk.drain(..n);
        if chunk.is_empty() {
            state.reads.pop_front();
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.state.lock().unwrap().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }

    fn local_addr(&self) -> Result<Address> {
        Ok(Address::from_static("mock", "server"))
    }

    fn remote_addr(&self) -> Result<Address> {
        Ok(Address::from_static("mock", self.label))
    }
}

/// Response double recording the statuses written to it
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    stream: Option<MockStream>,
    buffered: Bytes,
    statuses: Arc<Mutex<Vec<StatusCode>>>,
}

impl MockResponse {
    pub fn new(stream: MockStream) -> Self {
        Self {
            stream: Some(stream),
            ..Default::default()
        }
    }

    /// Pretend the host already read `bytes` past the request head
    pub fn with_buffered(mut self, bytes: &'static [u8]) -> Self {
        self.buffered = Bytes::from_static(bytes);
        self
    }

    pub fn statuses(&self) -> Vec<StatusCode> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HijackableResponse for MockResponse {
    async fn write_status(&mut self, status: StatusCode) -> Result<()> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }

    async fn hijack(&mut self) -> Result<Hijacked> {
        let stream = self.stream.take().ok_or(upsock_core::Error::NotConnected)?;
        Ok(Hijacked {
            stream: Box::new(stream),
            buffered: std::mem::take(&mut self.buffered),
        })
    }
}

/// A response from a host that cannot hand out its connection
#[derive(Debug, Clone, Default)]
pub struct PlainResponse {
    statuses: Arc<Mutex<Vec<StatusCode>>>,
}

impl PlainResponse {
    pub fn statuses(&self) -> Vec<StatusCode> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HijackableResponse for PlainResponse {
    async fn write_status(&mut self, status: StatusCode) -> Result<()> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }
}

pub const CLIENT_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";
pub const ACCEPT_KEY: &str = "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=";

pub fn upgrade_request() -> Request<()> {
    Request::builder()
        .method("GET")
        .uri("/socket")
        .header("Host", "example.com")
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", CLIENT_KEY)
        .body(())
        .unwrap()
}

pub fn switching_protocols() -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {ACCEPT_KEY}\r\n\r\n"
    )
}
