//! ZMP frame codec.
//!
//! Wire format (bit-exact, see the protocol design for the authoritative
//! description):
//!
//! ```text
//! byte 0   magic        0x5A
//! byte 1   version      0x02
//! byte 2   flags        bit0 MORE, bit1 CONTROL, bit2 IDENTITY,
//!                        bit3 SUBSCRIBE, bit4 CANCEL, bits 5-7 reserved (0)
//! byte 3   reserved     must be 0
//! bytes 4-7 body length  big-endian u32
//! bytes 8..  body        opaque, `body length` bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use thiserror::Error;

use zlink_core::config::STAGING_BUF_INITIAL_CAP;
use zlink_core::buffer::SegmentedBuffer;

/// Header size in bytes: magic + version + flags + reserved + u32 body length.
pub const HEADER_LEN: usize = 8;

pub const MAGIC: u8 = 0x5A;
pub const VERSION: u8 = 0x02;

pub const FLAG_MORE: u8 = 0x01;
pub const FLAG_CONTROL: u8 = 0x02;
pub const FLAG_IDENTITY: u8 = 0x04;
pub const FLAG_SUBSCRIBE: u8 = 0x08;
pub const FLAG_CANCEL: u8 = 0x10;
/// Bits 5-7 must be zero on send; receipt with any set is a protocol error.
const FLAG_RESERVED_MASK: u8 = 0xE0;

/// ERROR control-message codes (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZmpErrorCode {
    InvalidMagic = 0x01,
    VersionMismatch = 0x02,
    FlagsInvalid = 0x03,
    BodyTooLarge = 0x04,
    SocketTypeMismatch = 0x05,
    HandshakeTimeout = 0x06,
    Internal = 0x7F,
}

impl ZmpErrorCode {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(Self::InvalidMagic),
            0x02 => Some(Self::VersionMismatch),
            0x03 => Some(Self::FlagsInvalid),
            0x04 => Some(Self::BodyTooLarge),
            0x05 => Some(Self::SocketTypeMismatch),
            0x06 => Some(Self::HandshakeTimeout),
            0x7F => Some(Self::Internal),
            _ => None,
        }
    }
}

/// ZMP protocol errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ZmpError {
    #[error("incomplete frame")]
    Incomplete,

    #[error("invalid magic byte")]
    InvalidMagic,

    #[error("unsupported protocol version")]
    VersionMismatch,

    #[error("reserved flag bits set")]
    ReservedBits,

    #[error("reserved header byte is non-zero")]
    ReservedByte,

    #[error("body exceeds configured max-message-size")]
    BodyTooLarge,

    #[error("protocol violation")]
    Protocol,
}

impl ZmpError {
    /// Map a decode error to the ERROR control-message code the decoder
    /// should emit before terminating the connection.
    #[must_use]
    pub const fn to_error_code(self) -> ZmpErrorCode {
        match self {
            Self::InvalidMagic => ZmpErrorCode::InvalidMagic,
            Self::VersionMismatch => ZmpErrorCode::VersionMismatch,
            Self::ReservedBits | Self::ReservedByte | Self::Protocol => ZmpErrorCode::FlagsInvalid,
            Self::BodyTooLarge => ZmpErrorCode::BodyTooLarge,
            Self::Incomplete => ZmpErrorCode::Internal,
        }
    }
}

impl From<ZmpError> for io::Error {
    fn from(err: ZmpError) -> Self {
        Self::new(io::ErrorKind::InvalidData, err)
    }
}

impl From<io::Error> for ZmpError {
    fn from(_err: io::Error) -> Self {
        Self::Protocol
    }
}

pub type Result<T> = std::result::Result<T, ZmpError>;

/// A decoded ZMP frame: flags + opaque body.
#[derive(Debug, Clone)]
pub struct ZmpFrame {
    pub flags: u8,
    pub payload: Bytes,
}

impl ZmpFrame {
    #[inline]
    pub const fn more(&self) -> bool {
        (self.flags & FLAG_MORE) != 0
    }

    #[inline]
    pub const fn is_control(&self) -> bool {
        (self.flags & FLAG_CONTROL) != 0
    }

    #[inline]
    pub const fn is_identity(&self) -> bool {
        (self.flags & FLAG_IDENTITY) != 0
    }

    #[inline]
    pub const fn is_subscribe(&self) -> bool {
        (self.flags & FLAG_SUBSCRIBE) != 0
    }

    #[inline]
    pub const fn is_cancel(&self) -> bool {
        (self.flags & FLAG_CANCEL) != 0
    }

    /// Build a data frame.
    #[must_use]
    pub const fn data(payload: Bytes, more: bool) -> Self {
        let flags = if more { FLAG_MORE } else { 0 };
        Self { flags, payload }
    }

    /// Build a SUBSCRIBE/CANCEL control-ish frame (SUB->PUB management).
    /// These are not CONTROL frames in the ZMP sense (HELLO/READY/HEARTBEAT/
    /// ERROR) — they carry application-visible prefixes and are tagged with
    /// their own dedicated flag bit instead.
    #[must_use]
    pub const fn subscribe(prefix: Bytes, cancel: bool) -> Self {
        let flags = if cancel { FLAG_CANCEL } else { FLAG_SUBSCRIBE };
        Self {
            flags,
            payload: prefix,
        }
    }

    /// Build an IDENTITY frame (unsolicited routing-id advertisement).
    #[must_use]
    pub const fn identity(routing_id: Bytes) -> Self {
        Self {
            flags: FLAG_IDENTITY,
            payload: routing_id,
        }
    }

    /// Build a CONTROL frame (HELLO/READY/HEARTBEAT/HEARTBEAT_ACK/ERROR body).
    #[must_use]
    pub const fn control(body: Bytes) -> Self {
        Self {
            flags: FLAG_CONTROL,
            payload: body,
        }
    }

    /// Encode this frame's 8-byte header + body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        write_header(&mut out, self.flags, self.payload.len() as u32);
        out.extend_from_slice(&self.payload);
        out.freeze()
    }

    /// Encode header and body as two independent buffers (scatter-gather),
    /// so that large bodies never get copied into a merged buffer.
    #[must_use]
    pub fn encode_gather(&self) -> (Bytes, Bytes) {
        let mut header = BytesMut::with_capacity(HEADER_LEN);
        write_header(&mut header, self.flags, self.payload.len() as u32);
        (header.freeze(), self.payload.clone())
    }
}

#[inline]
fn write_header(out: &mut BytesMut, flags: u8, body_len: u32) {
    out.put_u8(MAGIC);
    out.put_u8(VERSION);
    out.put_u8(flags);
    out.put_u8(0); // reserved
    out.put_u32(body_len);
}

/// Stateful ZMP decoder.
///
/// Fast path: entire frame already buffered → zero-copy slice.
/// Slow path: frame fragmented across reads → reassembled into a staging
/// buffer that is resumable across `decode` calls without losing or
/// duplicating bytes.
pub struct ZmpDecoder {
    pending_flags: Option<u8>,
    expected_body_len: usize,
    staging: BytesMut,
    max_message_size: Option<usize>,
}

impl ZmpDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending_flags: None,
            expected_body_len: 0,
            staging: BytesMut::with_capacity(STAGING_BUF_INITIAL_CAP),
            max_message_size: None,
        }
    }

    #[must_use]
    pub fn with_max_message_size(max: Option<usize>) -> Self {
        Self {
            max_message_size: max,
            ..Self::new()
        }
    }

    /// True while a multipart message (MORE flag) is still being assembled.
    #[inline]
    pub const fn has_more(&self) -> bool {
        self.pending_flags.is_some()
    }

    /// Decode a single frame from `src`.
    ///
    /// - `Ok(Some(frame))` — frame decoded.
    /// - `Ok(None)` — need more data.
    /// - `Err(e)` — protocol violation; caller should emit ERROR(e.to_error_code())
    ///   and terminate the connection.
    pub fn decode(&mut self, src: &mut SegmentedBuffer) -> Result<Option<ZmpFrame>> {
        // === Reassembly mode ===
        if let Some(flags) = self.pending_flags {
            let needed = self.expected_body_len - self.staging.len();
            let take = needed.min(src.len());
            if let Some(bytes) = src.take_bytes(take) {
                self.staging.extend_from_slice(&bytes);
            }

            if self.staging.len() < self.expected_body_len {
                return Ok(None);
            }

            let payload = self.staging.split().freeze();
            self.pending_flags = None;
            self.expected_body_len = 0;

            return Ok(Some(ZmpFrame { flags, payload }));
        }

        // === Header parsing ===
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut hdr = [0u8; HEADER_LEN];
        if !src.copy_prefix(HEADER_LEN, &mut hdr) {
            return Ok(None);
        }

        if hdr[0] != MAGIC {
            return Err(ZmpError::InvalidMagic);
        }
        if hdr[1] != VERSION {
            return Err(ZmpError::VersionMismatch);
        }

        let flags = hdr[2];
        if (flags & FLAG_RESERVED_MASK) != 0 {
            return Err(ZmpError::ReservedBits);
        }
        if hdr[3] != 0 {
            return Err(ZmpError::ReservedByte);
        }

        let mut len_buf = &hdr[4..8];
        let body_len = len_buf.get_u32() as usize;

        if let Some(max) = self.max_message_size {
            if body_len > max {
                return Err(ZmpError::BodyTooLarge);
            }
        }

        let total_len = HEADER_LEN + body_len;

        // === Fast path: entire frame present ===
        if src.len() >= total_len {
            src.advance(HEADER_LEN);
            let payload = src
                .take_bytes(body_len)
                .expect("len check ensures body is available");
            return Ok(Some(ZmpFrame { flags, payload }));
        }

        // === Slow path: fragmentation, resumable across calls ===
        src.advance(HEADER_LEN);
        self.pending_flags = Some(flags);
        self.expected_body_len = body_len;
        self.staging.clear();
        self.staging.reserve(body_len);

        let available = src.len().min(body_len);
        if let Some(bytes) = src.take_bytes(available) {
            self.staging.extend_from_slice(&bytes);
        }

        Ok(None)
    }
}

impl Default for ZmpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a multipart message directly into a buffer, avoiding intermediate
/// `ZmpFrame` allocations on the hot path.
pub fn encode_multipart(msg: &[Bytes], buf: &mut BytesMut) {
    for (i, part) in msg.iter().enumerate() {
        let more = i < msg.len() - 1;
        let flags = if more { FLAG_MORE } else { 0 };

        buf.reserve(HEADER_LEN + part.len());
        write_header(buf, flags, part.len() as u32);
        buf.extend_from_slice(part);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut SegmentedBuffer, bytes: &[u8]) {
        buf.push(Bytes::copy_from_slice(bytes));
    }

    #[test]
    fn round_trips_single_frame() {
        let frame = ZmpFrame::data(Bytes::from_static(b"hello"), false);
        let encoded = frame.encode();

        let mut src = SegmentedBuffer::new();
        feed(&mut src, &encoded);

        let mut dec = ZmpDecoder::new();
        let decoded = dec.decode(&mut src).unwrap().unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"hello"));
        assert!(!decoded.more());
    }

    #[test]
    fn round_trips_multipart() {
        let mut buf = BytesMut::new();
        let parts = vec![Bytes::from_static(b"a"), Bytes::from_static(b"bb")];
        encode_multipart(&parts, &mut buf);

        let mut src = SegmentedBuffer::new();
        feed(&mut src, &buf);

        let mut dec = ZmpDecoder::new();
        let f1 = dec.decode(&mut src).unwrap().unwrap();
        assert!(f1.more());
        let f2 = dec.decode(&mut src).unwrap().unwrap();
        assert!(!f2.more());
        assert_eq!(f2.payload, Bytes::from_static(b"bb"));
    }

    #[test]
    fn resumes_across_fragmented_reads() {
        let frame = ZmpFrame::data(Bytes::from_static(b"0123456789"), false);
        let encoded = frame.encode();

        let mut src = SegmentedBuffer::new();
        let mut dec = ZmpDecoder::new();

        feed(&mut src, &encoded[..5]);
        assert!(dec.decode(&mut src).unwrap().is_none());

        feed(&mut src, &encoded[5..]);
        let decoded = dec.decode(&mut src).unwrap().unwrap();
        assert_eq!(decoded.payload, Bytes::from_static(b"0123456789"));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ZmpFrame::data(Bytes::from_static(b"x"), false).encode().to_vec();
        bytes[0] = 0x00;

        let mut src = SegmentedBuffer::new();
        feed(&mut src, &bytes);

        let mut dec = ZmpDecoder::new();
        assert_eq!(dec.decode(&mut src).unwrap_err(), ZmpError::InvalidMagic);
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut bytes = ZmpFrame::data(Bytes::from_static(b"x"), false).encode().to_vec();
        bytes[1] = 0x01;

        let mut src = SegmentedBuffer::new();
        feed(&mut src, &bytes);

        let mut dec = ZmpDecoder::new();
        assert_eq!(dec.decode(&mut src).unwrap_err(), ZmpError::VersionMismatch);
    }

    #[test]
    fn rejects_reserved_flag_bits() {
        let mut bytes = ZmpFrame::data(Bytes::from_static(b"x"), false).encode().to_vec();
        bytes[2] |= 0x80;

        let mut src = SegmentedBuffer::new();
        feed(&mut src, &bytes);

        let mut dec = ZmpDecoder::new();
        assert_eq!(dec.decode(&mut src).unwrap_err(), ZmpError::ReservedBits);
    }

    #[test]
    fn enforces_max_message_size() {
        let frame = ZmpFrame::data(Bytes::from_static(b"0123456789"), false);
        let encoded = frame.encode();

        let mut src = SegmentedBuffer::new();
        feed(&mut src, &encoded);

        let mut dec = ZmpDecoder::with_max_message_size(Some(4));
        assert_eq!(dec.decode(&mut src).unwrap_err(), ZmpError::BodyTooLarge);
    }
}
