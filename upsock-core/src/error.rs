//! Error types for upsock
//!
//! This module defines the error taxonomy shared by the frame codec, the
//! connection read loop and the upgrade handshake. A reader can tell three
//! outcomes apart: data (`Ok`), a peer-initiated close ([`Error::Closed`]) and
//! everything else (transport or protocol failure).

#![allow(missing_docs)]

use bytes::Bytes;
use http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Result type alias for upsock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for upsock operations
#[derive(Error, Debug)]
pub enum Error {
    /// Frame encoding/decoding errors
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// WebSocket protocol violations
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O errors from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The peer sent a Close frame
    #[error("Connection closed by peer ({} byte close payload)", payload.len())]
    Closed {
        /// Raw payload of the peer's Close frame
        payload: Bytes,
    },

    /// The transport does not support this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A read or write deadline elapsed
    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// The operation that timed out
        operation: &'static str,
    },

    /// The listener was closed
    #[error("Listener closed")]
    ListenerClosed,

    /// The transport stream is no longer usable
    #[error("Transport not connected")]
    NotConnected,
}

impl Error {
    /// Returns the peer's close payload if this error is a peer-initiated close
    pub fn close_payload(&self) -> Option<&Bytes> {
        match self {
            Error::Closed { payload } => Some(payload),
            _ => None,
        }
    }

    /// Check if this error is a peer-initiated close
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed { .. })
    }

    /// Check if this error reports a truncated frame
    pub fn is_incomplete_frame(&self) -> bool {
        matches!(self, Error::Frame(FrameError::Incomplete { .. }))
    }

    /// Check if this error reports a protocol violation
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }
}

/// The part of a frame an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSegment {
    /// The fixed two-byte header
    Header,
    /// The 16 or 64 bit extended payload length
    ExtendedLength,
    /// The four-byte masking key
    MaskKey,
    /// The payload data
    Payload,
}

impl fmt::Display for FrameSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameSegment::Header => "header",
            FrameSegment::ExtendedLength => "extended length",
            FrameSegment::MaskKey => "mask key",
            FrameSegment::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// Frame parsing and serialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The stream ended before a frame segment was complete
    #[error("Incomplete frame {segment}: need {needed} bytes, have {have}")]
    Incomplete {
        segment: FrameSegment,
        needed: usize,
        have: usize,
    },

    /// The transport accepted fewer bytes than a frame segment holds
    #[error("Partial {segment} write: wrote {written} of {expected} bytes")]
    PartialWrite {
        segment: FrameSegment,
        written: usize,
        expected: usize,
    },

    /// Announced payload exceeds the configured limit
    #[error("Frame too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },
}

/// WebSocket protocol violations, on the wire or during the upgrade handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Reserved bits set in a frame header
    #[error("Reserved bits set in frame header: {bits:#05b}")]
    ReservedBitsSet { bits: u8 },

    /// A 64-bit payload length with the most significant bit set
    #[error("Invalid payload length: {len:#x}")]
    InvalidPayloadLength { len: u64 },

    /// Upgrade request used a method other than GET
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Upgrade request had no request target
    #[error("Missing request target")]
    MissingRequestTarget,

    /// A required handshake header is absent
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),

    /// A handshake header carries the wrong value
    #[error("Invalid header value for {header}: {value}")]
    InvalidHeaderValue { header: &'static str, value: String },

    /// The client sent data before the handshake completed
    #[error("Client sent {len} bytes before the handshake completed")]
    EarlyClientData { len: usize },

    /// The HTTP request head could not be parsed
    #[error("Malformed HTTP request: {0}")]
    MalformedRequest(String),

    /// The HTTP request head exceeded the configured limit
    #[error("HTTP request head exceeds {limit} bytes")]
    RequestHeadTooLarge { limit: usize },
}

impl ProtocolError {
    /// HTTP status used to reject an upgrade request failing with this error
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::InvalidMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProtocolError::MissingRequestTarget => StatusCode::NOT_ACCEPTABLE,
            ProtocolError::MissingHeader(header)
            | ProtocolError::InvalidHeaderValue { header, .. }
                if header.eq_ignore_ascii_case("sec-websocket-key") =>
            {
                StatusCode::BAD_REQUEST
            }
            ProtocolError::MissingHeader(_) | ProtocolError::InvalidHeaderValue { .. } => {
                StatusCode::UPGRADE_REQUIRED
            }
            ProtocolError::ReservedBitsSet { .. }
            | ProtocolError::InvalidPayloadLength { .. }
            | ProtocolError::EarlyClientData { .. }
            | ProtocolError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ProtocolError::RequestHeadTooLarge { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
        }
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}
