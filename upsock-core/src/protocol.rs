//! RFC 6455 vocabulary shared by the codec and the handshake
//!
//! This module contains the protocol definitions from RFC 6455 used by the
//! codec and the upgrade handshake: opcodes, frame header bits and the header
//! names of the opening handshake.

use std::fmt;

/// Frame opcode (RFC 6455 section 5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation frame
    Continuation,
    /// Text frame
    Text,
    /// Binary frame
    Binary,
    /// Close frame
    Close,
    /// Ping frame
    Ping,
    /// Pong frame
    Pong,
    /// One of the reserved values 0x3-0x7 or 0xB-0xF
    Reserved(u8),
}

impl Opcode {
    /// Create an Opcode from the low four bits of a header byte
    pub fn from_u8(value: u8) -> Self {
        match value & frame::OPCODE_MASK {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }

    /// Wire value in the low nibble of the first header byte
    pub fn value(&self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(value) => *value & frame::OPCODE_MASK,
        }
    }

    /// Close, Ping or Pong
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }

    /// True for the unassigned opcode values
    pub fn is_reserved(&self) -> bool {
        matches!(self, Opcode::Reserved(_))
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        Opcode::from_u8(value)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Reserved(value) => write!(f, "reserved({:#x})", value),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Handshake and engine defaults
pub mod constants {
    /// The only protocol version accepted
    pub const WEBSOCKET_VERSION: &str = "13";

    /// GUID appended to the client key before hashing
    pub const WEBSOCKET_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

    /// Network name of the logical endpoint of an upgraded connection
    pub const LOGICAL_NETWORK: &str = "ws";

    /// Address string of the logical endpoint of an upgraded connection
    pub const LOGICAL_ADDRESS: &str = "[WebSocket]";

    /// Default chunk size for parallel unmasking
    pub const DEFAULT_UNMASK_CHUNK_SIZE: usize = 64 * 1024;

    /// Default payload limit of server connections
    pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 16 * 1024 * 1024;

    /// Maximum request head accepted by the bundled upgrade host
    pub const MAX_HEADER_SIZE: usize = 8192;

    /// Default handshake timeout for the bundled upgrade host
    pub const DEFAULT_HANDSHAKE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
}

/// Bits of the two fixed header bytes
pub mod frame {
    /// FIN bit position
    pub const FIN_BIT: u8 = 0x80;

    /// RSV1, RSV2 and RSV3 bits
    pub const RSV_BITS: u8 = 0x70;

    /// Opcode mask
    pub const OPCODE_MASK: u8 = 0x0F;

    /// MASK bit position
    pub const MASK_BIT: u8 = 0x80;

    /// Inline length bits of the second header byte
    pub const PAYLOAD_LEN_MASK: u8 = 0x7F;

    /// Inline length announcing a 2-byte extension
    pub const PAYLOAD_LEN_16: u8 = 126;

    /// Inline length announcing an 8-byte extension
    pub const PAYLOAD_LEN_64: u8 = 127;

    /// Largest payload encoded inline
    pub const MAX_INLINE_LEN: u64 = 125;

    /// Largest payload encoded with the 16-bit extension
    pub const MAX_LEN_16: u64 = u16::MAX as u64;

    /// Masking key length
    pub const MASKING_KEY_LEN: usize = 4;
}

/// HTTP header names of the opening handshake (lowercase for consistency)
pub mod http_header {
    /// Connection header
    pub const CONNECTION: &str = "connection";

    /// Upgrade header
    pub const UPGRADE: &str = "upgrade";

    /// Carries the client nonce
    pub const SEC_WEBSOCKET_KEY: &str = "sec-websocket-key";

    /// Carries the protocol version the client speaks
    pub const SEC_WEBSOCKET_VERSION: &str = "sec-websocket-version";
}

/// HTTP header values
pub mod http_value {
    /// Required value of the Upgrade header
    pub const WEBSOCKET: &str = "websocket";

    /// Token required in the Connection header
    pub const UPGRADE: &str = "Upgrade";
}
