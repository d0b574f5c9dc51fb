//! Server configuration
//!
//! [`ServerConfig`] collects the settings of the bundled upgrade host and the
//! frame codec used by every accepted connection.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use upsock_core::error::{ConfigError, Error};
use upsock_core::protocol::constants::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_PAYLOAD_LEN, DEFAULT_UNMASK_CHUNK_SIZE, MAX_HEADER_SIZE,
};
use upsock_core::protocol::frame::MASKING_KEY_LEN;
use upsock_core::{FrameCodec, Result};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address of the upgrade host
    pub bind_address: SocketAddr,
    /// Time allowed for a client to send its request head
    pub handshake_timeout: Duration,
    /// Largest request head the upgrade host reads
    pub max_request_head_size: usize,
    /// Masked payloads of at least this many bytes are unmasked in parallel
    pub parallel_unmask_threshold: Option<usize>,
    /// Chunk size for parallel unmasking
    pub unmask_chunk_size: usize,
    /// Largest frame payload a connection accepts
    pub max_payload_len: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_request_head_size: MAX_HEADER_SIZE,
            parallel_unmask_threshold: None,
            unmask_chunk_size: DEFAULT_UNMASK_CHUNK_SIZE,
            max_payload_len: Some(DEFAULT_MAX_PAYLOAD_LEN),
        }
    }
}

impl ServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout.is_zero() {
            return Err(Error::Config(ConfigError::Validation(
                "handshake_timeout must be greater than 0".to_string(),
            )));
        }

        if self.max_request_head_size == 0 {
            return Err(Error::Config(ConfigError::Validation(
                "max_request_head_size must be greater than 0".to_string(),
            )));
        }

        if self.unmask_chunk_size < MASKING_KEY_LEN || self.unmask_chunk_size % MASKING_KEY_LEN != 0 {
            return Err(Error::Config(ConfigError::InvalidValue {
                field: "unmask_chunk_size".to_string(),
                value: self.unmask_chunk_size.to_string(),
            }));
        }

        if self.parallel_unmask_threshold == Some(0) {
            return Err(Error::Config(ConfigError::InvalidValue {
                field: "parallel_unmask_threshold".to_string(),
                value: "0".to_string(),
            }));
        }

        if self.max_payload_len == Some(0) {
            return Err(Error::Config(ConfigError::InvalidValue {
                field: "max_payload_len".to_string(),
                value: "0".to_string(),
            }));
        }

        Ok(())
    }

    /// The frame codec connections are created with
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::new()
            .parallel_unmask(self.parallel_unmask_threshold, self.unmask_chunk_size)
            .max_payload_len(self.max_payload_len)
    }
}

/// Builder for [`ServerConfig`]
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to the given address
    pub fn bind<A: ToSocketAddrs>(mut self, addr: A) -> Result<Self> {
        self.config.bind_address = addr.to_socket_addrs()?.next().ok_or_else(|| {
            Error::Config(ConfigError::Validation("Invalid bind address".to_string()))
        })?;
        Ok(self)
    }

    /// Set handshake timeout
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Set the largest request head the host reads
    pub fn max_request_head_size(mut self, size: usize) -> Self {
        self.config.max_request_head_size = size;
        self
    }

    /// Unmask payloads of at least `threshold` bytes in `chunk_size` chunks
    pub fn parallel_unmask(mut self, threshold: usize, chunk_size: usize) -> Self {
        self.config.parallel_unmask_threshold = Some(threshold);
        self.config.unmask_chunk_size = chunk_size;
        self
    }

    /// Reject frames announcing more than `max` payload bytes
    pub fn max_payload_len(mut self, max: u64) -> Self {
        self.config.max_payload_len = Some(max);
        self
    }

    /// Accept frames of any announced length
    pub fn unlimited_payload(mut self) -> Self {
        self.config.max_payload_len = None;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
