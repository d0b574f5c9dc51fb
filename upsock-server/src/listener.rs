//! Upgrade listener
//!
//! [`Listener::handle`] turns an HTTP upgrade request into a hijacked stream
//! and hands it to [`Listener::accept`] through a capacity-one slot. The host
//! HTTP server only has to provide a [`HijackableResponse`].

use crate::config::ServerConfig;
use crate::connection::Connection;
use bytes::Bytes;
use http::{Request, StatusCode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use upsock_core::error::ProtocolError;
use upsock_core::frame::FrameCodec;
use upsock_core::handshake::{
    compute_accept_key, switching_protocols_response, validate_upgrade_request,
};
use upsock_core::{Address, Error, Result, TransportStream};

/// A raw stream taken over from the host HTTP server
pub struct Hijacked {
    /// The connection to the client
    pub stream: Box<dyn TransportStream>,
    /// Bytes the host read from the client past the request head
    pub buffered: Bytes,
}

impl std::fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hijacked")
            .field("stream", &"<stream>")
            .field("buffered", &self.buffered.len())
            .finish()
    }
}

/// The response side of a host HTTP server's request
#[async_trait::async_trait]
pub trait HijackableResponse: Send {
    /// Reply with a bodiless status response
    async fn write_status(&mut self, status: StatusCode) -> Result<()>;

    /// Take the connection out of normal HTTP handling
    async fn hijack(&mut self) -> Result<Hijacked> {
        Err(Error::Unsupported("hijack"))
    }
}

/// Hands upgraded connections from request handlers to `accept` callers
#[derive(Debug, Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

#[derive(Debug)]
struct ListenerInner {
    slot: Slot<Box<dyn TransportStream>>,
    codec: FrameCodec,
}

impl Default for Listener {
    fn default() -> Self {
        Self::new(FrameCodec::default())
    }
}

impl Listener {
    /// Create an open listener whose connections use `codec`
    pub fn new(codec: FrameCodec) -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                slot: Slot::new(),
                codec,
            }),
        }
    }

    /// Create a listener using the codec settings of `config`
    pub fn with_config(config: &ServerConfig) -> Self {
        Self::new(config.codec())
    }

    /// Perform the server side of the opening handshake
    ///
    /// A rejected request gets an HTTP error status on `response` and never
    /// reaches `accept`. On success the `101 Switching Protocols` response is
    /// written to the hijacked stream, which is then queued for `accept`; this
    /// waits while an earlier connection is still waiting to be accepted.
    pub async fn handle<B, R>(&self, request: &Request<B>, mut response: R) -> Result<()>
    where
        R: HijackableResponse,
    {
        let key = match validate_upgrade_request(request) {
            Ok(key) => key,
            Err(Error::Protocol(err)) => return Err(reject(&mut response, err).await),
            Err(err) => return Err(err),
        };

        if self.is_closed() {
            crate::log_warn!("upgrade request for {} after listener close", request.uri());
            if let Err(err) = response.write_status(StatusCode::SERVICE_UNAVAILABLE).await {
                crate::log_debug!("failed to write rejection: {}", err);
            }
            return Err(Error::ListenerClosed);
        }

        let accept_key = compute_accept_key(key);
        crate::log_debug!("accepting upgrade for {}", request.uri());

        let Hijacked {
            mut stream,
            buffered,
        } = match response.hijack().await {
            Ok(hijacked) => hijacked,
            Err(err) => {
                crate::log_error!("cannot hijack upgrade connection: {}", err);
                return Err(err);
            }
        };

        if !buffered.is_empty() {
            crate::log_error!("client sent {} bytes before the handshake completed", buffered.len());
            let _ = stream.close().await;
            return Err(ProtocolError::EarlyClientData {
                len: buffered.len(),
            }
            .into());
        }

        let reply = switching_protocols_response(request.version(), &accept_key);
        let sent = match stream.write_all(reply.as_bytes()).await {
            Ok(()) => stream.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            crate::log_error!("failed to send handshake response: {}", err);
            let _ = stream.close().await;
            return Err(err);
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("upsock_handshakes_total").increment(1);

        match self.inner.slot.put(stream).await {
            Ok(()) => Ok(()),
            Err(mut stream) => {
                crate::log_warn!("listener closed before the connection was accepted");
                let _ = stream.close().await;
                Err(Error::ListenerClosed)
            }
        }
    }

    /// Wait for the next upgraded connection
    ///
    /// Fails with [`Error::ListenerClosed`] once the listener is closed and
    /// no connection is left waiting.
    pub async fn accept(&self) -> Result<Connection> {
        let stream = self.inner.slot.take().await.ok_or(Error::ListenerClosed)?;
        Ok(Connection::with_codec(stream, self.inner.codec))
    }

    /// Close the listener and wake every blocked caller
    ///
    /// A connection already waiting stays available to one more `accept`.
    pub fn close(&self) -> Result<()> {
        if self.inner.slot.close() {
            crate::log_debug!("listener closed");
            Ok(())
        } else {
            Err(Error::ListenerClosed)
        }
    }

    /// Check whether the listener has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.slot.is_closed()
    }

    /// Resolves once the listener is closed
    pub async fn closed(&self) {
        self.inner.slot.wait_closed().await
    }

    /// The logical address shared by all upgraded connections
    pub fn local_addr(&self) -> Address {
        Address::LOGICAL
    }
}

async fn reject<R: HijackableResponse>(response: &mut R, err: ProtocolError) -> Error {
    let status = err.status();
    crate::log_warn!("rejecting upgrade request with {}: {}", status, err);

    #[cfg(feature = "metrics")]
    metrics::counter!("upsock_handshakes_rejected_total").increment(1);

    if let Err(write_err) = response.write_status(status).await {
        crate::log_debug!("failed to write rejection: {}", write_err);
    }
    err.into()
}

/// Capacity-one hand-off between producers and consumers
struct Slot<T> {
    state: Mutex<SlotState<T>>,
    changed: Notify,
}

struct SlotState<T> {
    value: Option<T>,
    closed: bool,
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Slot")
            .field("occupied", &state.value.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                value: None,
                closed: false,
            }),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` once the slot is empty; hands it back if the slot closes first
    async fn put(&self, value: T) -> std::result::Result<(), T> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(value);
                }
                if state.value.is_none() {
                    state.value = Some(value);
                    drop(state);
                    self.changed.notify_waiters();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Take the stored value, waiting for one; `None` once closed and empty
    async fn take(&self) -> Option<T> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(value) = state.value.take() {
                    drop(state);
                    self.changed.notify_waiters();
                    return Some(value);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Returns false if the slot was already closed
    fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.changed.notify_waiters();
        true
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    async fn wait_closed(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_slot_hand_off() {
        let slot = Arc::new(Slot::new());
        slot.put(1).await.unwrap();

        // Second put waits until the first value is taken
        let producer = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.put(2).await })
        };
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());

        assert_eq!(slot.take().await, Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(slot.take().await, Some(2));
    }

    #[tokio::test]
    async fn test_slot_close_keeps_pending_value() {
        let slot = Slot::new();
        slot.put("pending").await.unwrap();
        assert!(slot.close());
        assert!(!slot.close());

        assert_eq!(slot.take().await, Some("pending"));
        assert_eq!(slot.take().await, None);
        assert_eq!(slot.put("late").await, Err("late"));
    }

    #[tokio::test]
    async fn test_slot_close_wakes_waiters() {
        let slot = Arc::new(Slot::<u8>::new());
        let consumer = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.take().await })
        };
        let watcher = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.wait_closed().await })
        };
        tokio::task::yield_now().await;

        slot.close();
        let taken = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(taken, None);
        timeout(Duration::from_secs(1), watcher).await.unwrap().unwrap();
    }

    #[test]
    fn test_local_addr() {
        let listener = Listener::default();
        assert_eq!(listener.local_addr(), Address::LOGICAL);
        assert_eq!(listener.local_addr().to_string(), "[WebSocket]");
    }

    #[test]
    fn test_close_twice() {
        let listener = Listener::default();
        assert!(listener.close().is_ok());
        assert!(listener.is_closed());
        assert!(matches!(listener.close(), Err(Error::ListenerClosed)));
    }
}
