//! WebSocket frame parsing and serialization
//!
//! [`FrameCodec`] reads and writes single RFC 6455 frames directly against a
//! [`TransportStream`]. Payloads are always held unmasked in a [`Frame`]; the
//! codec removes the mask on decode and applies it on encode.

use crate::{
    error::{Error, FrameError, FrameSegment, ProtocolError, Result},
    protocol::{constants::DEFAULT_UNMASK_CHUNK_SIZE, frame::*, Opcode},
    transport::TransportStream,
};
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;

const PAYLOAD_READ_STEP: usize = 64 * 1024;

/// Represents a WebSocket frame according to RFC 6455
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Indicates if this is the final frame in a message
    pub fin: bool,
    /// Frame opcode
    pub opcode: Opcode,
    /// Masking key, present iff the MASK bit is set
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload data
    pub payload: Bytes,
}

impl Frame {
    /// Create a final, unmasked frame with the given opcode and payload
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a continuation frame
    pub fn continuation(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, payload)
    }

    /// Create a text frame
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// Create a binary frame
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, payload)
    }

    /// Create a close frame carrying a raw payload
    pub fn close(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Close, payload)
    }

    /// Create a ping frame
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, payload)
    }

    /// Create a pong frame
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, payload)
    }

    /// Set the FIN bit
    pub fn fin(mut self, fin: bool) -> Self {
        self.fin = fin;
        self
    }

    /// Mask the frame with the given key when it is encoded
    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Mask the frame with a random key (what clients must do)
    pub fn with_random_mask(self) -> Self {
        self.with_mask(rand::random::<[u8; 4]>())
    }

    /// Check if the MASK bit is set
    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Payload length as carried in the header
    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Check if this is a control frame
    pub fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Check if this is the final frame
    pub fn is_final(&self) -> bool {
        self.fin
    }

    /// The two fixed header bytes
    pub fn header(&self) -> [u8; 2] {
        let first = ((self.fin as u8) << 7) | self.opcode.value();
        let second = ((self.is_masked() as u8) << 7) | LengthClass::for_len(self.len()).sentinel();
        [first, second]
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(encoded_len(self.len(), self.is_masked()));
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Write the frame to a buffer
    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.header());

        let mut ext = [0u8; 8];
        let ext_len = LengthClass::for_len(self.len()).write_extension(&mut ext);
        buf.put_slice(&ext[..ext_len]);

        match self.mask {
            Some(key) => {
                buf.put_slice(&key);
                let start = buf.len();
                buf.put_slice(&self.payload);
                apply_mask(&mut buf[start..], key);
            }
            None => buf.put_slice(&self.payload),
        }
    }
}

/// How a payload length is carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthClass {
    /// Seven bits inside the second header byte (0..=125)
    Inline(u8),
    /// Sentinel 126 followed by a big-endian u16
    Extended16(u16),
    /// Sentinel 127 followed by a big-endian u64
    Extended64(u64),
}

impl LengthClass {
    /// Select the length class for a payload length
    pub fn for_len(len: u64) -> Self {
        if len <= MAX_INLINE_LEN {
            LengthClass::Inline(len as u8)
        } else if len <= MAX_LEN_16 {
            LengthClass::Extended16(len as u16)
        } else {
            LengthClass::Extended64(len)
        }
    }

    /// The seven-bit value stored in the second header byte
    pub fn sentinel(&self) -> u8 {
        match self {
            LengthClass::Inline(len) => *len,
            LengthClass::Extended16(_) => PAYLOAD_LEN_16,
            LengthClass::Extended64(_) => PAYLOAD_LEN_64,
        }
    }

    /// Number of extension bytes following the fixed header
    pub fn extension_len(&self) -> usize {
        match self {
            LengthClass::Inline(_) => 0,
            LengthClass::Extended16(_) => 2,
            LengthClass::Extended64(_) => 8,
        }
    }

    fn write_extension(&self, out: &mut [u8; 8]) -> usize {
        match self {
            LengthClass::Inline(_) => 0,
            LengthClass::Extended16(len) => {
                out[..2].copy_from_slice(&len.to_be_bytes());
                2
            }
            LengthClass::Extended64(len) => {
                out.copy_from_slice(&len.to_be_bytes());
                8
            }
        }
    }
}

/// Total encoded size of a frame with the given payload length
pub fn encoded_len(payload_len: u64, masked: bool) -> usize {
    let mask_len = if masked { MASKING_KEY_LEN } else { 0 };
    2 + LengthClass::for_len(payload_len).extension_len() + mask_len + payload_len as usize
}

/// Apply (or remove) a mask in place
///
/// XOR with `key[i % 4]` is its own inverse.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Remove a mask using one scoped thread per chunk
///
/// Every chunk starts at a multiple of four, so each one is masked with the
/// key unrotated. The chunk size grows so that no more chunks than available
/// cores are spawned. The scope joins all threads before returning.
pub fn apply_mask_parallel(buf: &mut [u8], key: [u8; 4], chunk_size: usize) {
    let workers = std::thread::available_parallelism().map_or(1, |n| n.get());
    let chunk_size = parallel_chunk_size(buf.len(), chunk_size, workers);
    if buf.len() <= chunk_size {
        apply_mask(buf, key);
        return;
    }

    std::thread::scope(|scope| {
        for chunk in buf.chunks_mut(chunk_size) {
            scope.spawn(move || apply_mask(chunk, key));
        }
    });
}

/// Chunk size for `len` bytes: a multiple of four, at least `requested`, and
/// large enough that at most `workers` chunks are produced
fn parallel_chunk_size(len: usize, requested: usize, workers: usize) -> usize {
    let per_worker = len.div_ceil(workers.max(1));
    let chunk_size = requested.max(per_worker).max(MASKING_KEY_LEN);
    chunk_size.div_ceil(MASKING_KEY_LEN) * MASKING_KEY_LEN
}

/// Reads and writes single frames against a transport stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    /// Payloads at least this long are unmasked in parallel chunks
    parallel_unmask_threshold: Option<usize>,
    /// Chunk size for parallel unmasking
    unmask_chunk_size: usize,
    /// Largest payload accepted on decode
    max_payload_len: Option<u64>,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self {
            parallel_unmask_threshold: None,
            unmask_chunk_size: DEFAULT_UNMASK_CHUNK_SIZE,
            max_payload_len: None,
        }
    }
}

impl FrameCodec {
    /// Create a codec with sequential unmasking and no payload limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Unmask payloads of at least `threshold` bytes in parallel chunks
    pub fn parallel_unmask(mut self, threshold: Option<usize>, chunk_size: usize) -> Self {
        self.parallel_unmask_threshold = threshold;
        self.unmask_chunk_size = chunk_size;
        self
    }

    /// Reject frames announcing more than `max` payload bytes
    pub fn max_payload_len(mut self, max: Option<u64>) -> Self {
        self.max_payload_len = max;
        self
    }

    /// Read one frame from the stream
    pub async fn decode<S>(&self, stream: &mut S) -> Result<Frame>
    where
        S: TransportStream + ?Sized,
    {
        let mut head = [0u8; 2];
        read_segment(stream, &mut head, FrameSegment::Header).await?;

        let fin = (head[0] & FIN_BIT) != 0;
        let rsv = head[0] & RSV_BITS;
        if rsv != 0 {
            return Err(ProtocolError::ReservedBitsSet { bits: rsv >> 4 }.into());
        }
        let opcode = Opcode::from_u8(head[0]);
        let masked = (head[1] & MASK_BIT) != 0;

        let len = match head[1] & PAYLOAD_LEN_MASK {
            PAYLOAD_LEN_16 => {
                let mut ext = [0u8; 2];
                read_segment(stream, &mut ext, FrameSegment::ExtendedLength).await?;
                u16::from_be_bytes(ext) as u64
            }
            PAYLOAD_LEN_64 => {
                let mut ext = [0u8; 8];
                read_segment(stream, &mut ext, FrameSegment::ExtendedLength).await?;
                let len = u64::from_be_bytes(ext);
                if len & (1 << 63) != 0 {
                    return Err(ProtocolError::InvalidPayloadLength { len }.into());
                }
                len
            }
            inline => inline as u64,
        };

        let mask = if masked {
            let mut key = [0u8; MASKING_KEY_LEN];
            read_segment(stream, &mut key, FrameSegment::MaskKey).await?;
            Some(key)
        } else {
            None
        };

        if let Some(max) = self.max_payload_len {
            if len > max {
                return Err(FrameError::TooLarge { size: len, max }.into());
            }
        }
        let payload_len = usize::try_from(len).map_err(|_| FrameError::TooLarge {
            size: len,
            max: usize::MAX as u64,
        })?;

        let mut payload = read_payload(stream, payload_len).await?;

        if let Some(key) = mask {
            match self.parallel_unmask_threshold {
                Some(threshold) if payload_len >= threshold => {
                    apply_mask_parallel(&mut payload, key, self.unmask_chunk_size)
                }
                _ => apply_mask(&mut payload, key),
            }
        }

        Ok(Frame {
            fin,
            opcode,
            mask,
            payload: payload.freeze(),
        })
    }

    /// Write one frame to the stream and flush it
    pub async fn encode<S>(&self, frame: &Frame, stream: &mut S) -> Result<()>
    where
        S: TransportStream + ?Sized,
    {
        write_segment(stream, &frame.header(), FrameSegment::Header).await?;

        let mut ext = [0u8; 8];
        let ext_len = LengthClass::for_len(frame.len()).write_extension(&mut ext);
        if ext_len > 0 {
            write_segment(stream, &ext[..ext_len], FrameSegment::ExtendedLength).await?;
        }

        let payload: Cow<'_, [u8]> = match frame.mask {
            Some(key) => {
                write_segment(stream, &key, FrameSegment::MaskKey).await?;
                let mut masked = frame.payload.to_vec();
                apply_mask(&mut masked, key);
                Cow::Owned(masked)
            }
            None => Cow::Borrowed(&frame.payload[..]),
        };

        let mut written = 0;
        while written < payload.len() {
            let n = stream.write(&payload[written..]).await?;
            if n == 0 {
                return Err(FrameError::PartialWrite {
                    segment: FrameSegment::Payload,
                    written,
                    expected: payload.len(),
                }
                .into());
            }
            written += n;
        }

        stream.flush().await
    }
}

/// Read one frame with the default codec
pub async fn decode<S>(stream: &mut S) -> Result<Frame>
where
    S: TransportStream + ?Sized,
{
    FrameCodec::default().decode(stream).await
}

/// Write one frame with the default codec
pub async fn encode<S>(frame: &Frame, stream: &mut S) -> Result<()>
where
    S: TransportStream + ?Sized,
{
    FrameCodec::default().encode(frame, stream).await
}

/// Fill `buf` completely, retrying partial reads
async fn read_segment<S>(stream: &mut S, buf: &mut [u8], segment: FrameSegment) -> Result<()>
where
    S: TransportStream + ?Sized,
{
    let mut have = 0;
    while have < buf.len() {
        let n = stream.read(&mut buf[have..]).await?;
        if n == 0 {
            return Err(Error::Frame(FrameError::Incomplete {
                segment,
                needed: buf.len(),
                have,
            }));
        }
        have += n;
    }
    Ok(())
}

/// Read `len` payload bytes, growing the buffer only as data arrives
async fn read_payload<S>(stream: &mut S, len: usize) -> Result<BytesMut>
where
    S: TransportStream + ?Sized,
{
    let mut payload = BytesMut::with_capacity(len.min(PAYLOAD_READ_STEP));
    while payload.len() < len {
        let have = payload.len();
        let step = (len - have).min(PAYLOAD_READ_STEP);
        payload.resize(have + step, 0);

        let n = stream.read(&mut payload[have..]).await?;
        payload.truncate(have + n);
        if n == 0 {
            return Err(Error::Frame(FrameError::Incomplete {
                segment: FrameSegment::Payload,
                needed: len,
                have,
            }));
        }
    }
    Ok(payload)
}

/// Write a header segment in a single write
async fn write_segment<S>(stream: &mut S, bytes: &[u8], segment: FrameSegment) -> Result<()>
where
    S: TransportStream + ?Sized,
{
    let written = stream.write(bytes).await?;
    if written != bytes.len() {
        return Err(FrameError::PartialWrite {
            segment,
            written,
            expected: bytes.len(),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockStream;
    use proptest::prelude::*;

    async fn round_trip(frame: &Frame) -> Frame {
        let mut out = MockStream::default();
        encode(frame, &mut out).await.unwrap();
        let mut input = MockStream::new(out.written);
        decode(&mut input).await.unwrap()
    }

    #[test]
    fn test_binary_frame_serialization() {
        let bytes = Frame::binary("hello").to_bytes();

        assert_eq!(bytes[0], 0x82); // FIN=1, RSV=000, Opcode=0010
        assert_eq!(bytes[1], 0x05); // MASK=0, Length=5
        assert_eq!(&bytes[2..], b"hello");
    }

    #[test]
    fn test_masked_frame_serialization() {
        let key = [0x37, 0xfa, 0x21, 0x3d];
        let bytes = Frame::text("Hello").with_mask(key).to_bytes();

        // RFC 6455 section 5.7, single-frame masked text message
        assert_eq!(
            &bytes[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_length_class_boundaries() {
        let cases = [
            (0u64, LengthClass::Inline(0), 0usize),
            (125, LengthClass::Inline(125), 0),
            (126, LengthClass::Extended16(126), 2),
            (65535, LengthClass::Extended16(65535), 2),
            (65536, LengthClass::Extended64(65536), 8),
        ];
        for (len, class, ext) in cases {
            assert_eq!(LengthClass::for_len(len), class);
            assert_eq!(class.extension_len(), ext);

            let bytes = Frame::binary(vec![0u8; len as usize]).to_bytes();
            assert_eq!(bytes.len(), encoded_len(len, false));
            assert_eq!(bytes[1] & PAYLOAD_LEN_MASK, class.sentinel());
        }

        let bytes = Frame::binary(vec![0u8; 65536]).to_bytes();
        assert_eq!(bytes[1], 127);
        assert_eq!(bytes[2..10], 65536u64.to_be_bytes());

        let bytes = Frame::binary(vec![0u8; 126]).to_bytes();
        assert_eq!(bytes[1], 126);
        assert_eq!(bytes[2..4], 126u16.to_be_bytes());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let frames = [
            Frame::binary("payload"),
            Frame::continuation("tail").fin(false),
            Frame::ping(Bytes::new()).with_mask([1, 2, 3, 4]),
            Frame::text(vec![7u8; 300]).with_mask([0xde, 0xad, 0xbe, 0xef]),
            Frame::close("bye"),
            Frame::new(Opcode::Reserved(0x5), "odd"),
        ];
        for frame in &frames {
            assert_eq!(&round_trip(frame).await, frame);
        }
    }

    #[tokio::test]
    async fn test_decode_across_partial_reads() {
        let bytes = Frame::binary(vec![9u8; 1000]).with_mask([4, 3, 2, 1]).to_bytes();
        let chunks = bytes.chunks(7).map(<[u8]>::to_vec).collect();
        let mut stream = MockStream::chunked(chunks);

        let frame = decode(&mut stream).await.unwrap();
        assert_eq!(frame.payload, vec![9u8; 1000]);
        assert_eq!(frame.mask, Some([4, 3, 2, 1]));
    }

    #[tokio::test]
    async fn test_reserved_bits_rejected() {
        let mut stream = MockStream::new(vec![0x82 | 0x40, 0x00]);
        let err = decode(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ReservedBitsSet { bits: 0b100 })
        ));
    }

    #[tokio::test]
    async fn test_incomplete_segments() {
        let cases: [(Vec<u8>, FrameSegment, usize); 4] = [
            (vec![0x82], FrameSegment::Header, 1),
            (vec![0x82, 126, 0x01], FrameSegment::ExtendedLength, 1),
            (vec![0x82, 0x85, 1, 2], FrameSegment::MaskKey, 2),
            (vec![0x82, 0x05, b'h', b'e'], FrameSegment::Payload, 2),
        ];
        for (bytes, segment, have) in cases {
            let mut stream = MockStream::new(bytes);
            match decode(&mut stream).await.unwrap_err() {
                Error::Frame(FrameError::Incomplete {
                    segment: got,
                    have: got_have,
                    ..
                }) => {
                    assert_eq!(got, segment);
                    assert_eq!(got_have, have);
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_payload_limit() {
        let codec = FrameCodec::new().max_payload_len(Some(16));
        let mut stream = MockStream::new(Frame::binary(vec![0u8; 17]).to_bytes().to_vec());
        let err = codec.decode(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::TooLarge { size: 17, max: 16 })
        ));
    }

    #[tokio::test]
    async fn test_length_msb_rejected() {
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&u64::MAX.to_be_bytes());
        let mut stream = MockStream::new(bytes);
        let err = decode(&mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::InvalidPayloadLength { len: u64::MAX })
        ));
    }

    #[tokio::test]
    async fn test_huge_announced_length_without_payload() {
        // 64 TiB announced, 3 bytes delivered
        let mut bytes = vec![0x82, 127];
        bytes.extend_from_slice(&(1u64 << 46).to_be_bytes());
        bytes.extend_from_slice(b"abc");
        let mut stream = MockStream::new(bytes);
        match decode(&mut stream).await.unwrap_err() {
            Error::Frame(FrameError::Incomplete {
                segment: FrameSegment::Payload,
                have: 3,
                ..
            }) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parallel_chunk_size_caps_fan_out() {
        let len = 1usize << 30;
        let chunk = parallel_chunk_size(len, 1 << 16, 8);
        assert_eq!(chunk % MASKING_KEY_LEN, 0);
        assert!(len.div_ceil(chunk) <= 8);

        // small payloads keep the requested size
        assert_eq!(parallel_chunk_size(1000, 64, 4), 252);
        assert_eq!(parallel_chunk_size(100, 64, 4), 64);
        assert_eq!(parallel_chunk_size(10, 1, 0), 12);
    }

    #[tokio::test]
    async fn test_partial_header_write() {
        let mut stream = MockStream::default();
        stream.write_limit = Some(1);
        let err = encode(&Frame::binary("x"), &mut stream).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::PartialWrite {
                segment: FrameSegment::Header,
                written: 1,
                expected: 2,
            })
        ));
    }

    #[tokio::test]
    async fn test_parallel_unmask_decode() {
        let payload: Vec<u8> = (0..10_007u32).map(|i| (i % 251) as u8).collect();
        let frame = Frame::binary(payload.clone()).with_mask([0x11, 0x22, 0x33, 0x44]);
        let codec = FrameCodec::new().parallel_unmask(Some(1024), 1000);

        let mut stream = MockStream::new(frame.to_bytes().to_vec());
        let decoded = codec.decode(&mut stream).await.unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_parallel_mask_matches_sequential() {
        let key = [0xa1, 0x5c, 0x03, 0xfe];
        for len in [0usize, 1, 3, 4, 5, 63, 64, 65, 4097] {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let mut sequential = data.clone();
            apply_mask(&mut sequential, key);
            let mut parallel = data.clone();
            apply_mask_parallel(&mut parallel, key, 7);
            assert_eq!(sequential, parallel, "len {len}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_mask_is_self_inverse(data in proptest::collection::vec(any::<u8>(), 0..512), key in any::<[u8; 4]>()) {
            let mut buf = data.clone();
            apply_mask(&mut buf, key);
            apply_mask(&mut buf, key);
            prop_assert_eq!(buf, data);
        }

        #[test]
        fn prop_encode_decode_round_trip(
            fin in any::<bool>(),
            op in prop_oneof![Just(0x0u8), Just(0x1), Just(0x2), Just(0x8), Just(0x9), Just(0xA)],
            key in proptest::option::of(any::<[u8; 4]>()),
            data in proptest::collection::vec(any::<u8>(), 0..70_000),
        ) {
            let frame = Frame { fin, opcode: Opcode::from_u8(op), mask: key, payload: Bytes::from(data) };
            let decoded = tokio_test::block_on(round_trip(&frame));
            prop_assert_eq!(decoded, frame);
        }
    }
}
