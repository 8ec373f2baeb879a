//! WebSocket transport adapter (`ws://`, and the inner leg of `wss://`).
//!
//! Mirrors `tls.rs`'s shape: [`WsStream<S>`] wraps an inner byte stream
//! (a `compio::net::TcpStream` for `ws://`, a [`crate::tls::TlsStream`] for
//! `wss://`) and presents the same `AsyncRead`/`AsyncWrite` contract
//! `SocketBase<S>` expects from every transport. ZMP already carries its
//! own length-prefixed framing in-band (§4.2), so this adapter does not
//! need to preserve WS message boundaries for correctness — it treats the
//! WebSocket connection as a continuous byte stream, the same way `tls.rs`
//! treats the TLS record layer: outgoing writes are packed into binary WS
//! frames, incoming frames are unwrapped back into a flat byte queue.
//!
//! The opening HTTP/1.1 Upgrade handshake is driven by hand (this crate
//! has no bundled HTTP client/server), reusing `tungstenite`'s
//! `derive_accept_key` for the `Sec-WebSocket-Accept` computation so the
//! handshake matches RFC 6455 bit-for-bit.

use bytes::{Buf, BytesMut};
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use rand::RngCore;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use tracing::trace;

/// Which side of the handshake a [`WsStream`] played; controls masking
/// (client→server frames MUST be masked, server→client frames MUST NOT).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Client,
    Server,
}

const OPCODE_CONTINUATION: u8 = 0x0;
const OPCODE_TEXT: u8 = 0x1;
const OPCODE_BINARY: u8 = 0x2;
const OPCODE_CLOSE: u8 = 0x8;
const OPCODE_PING: u8 = 0x9;
const OPCODE_PONG: u8 = 0xA;

/// A WebSocket-framed byte stream implementing the same `AsyncRead`/
/// `AsyncWrite` contract every other transport in this crate presents to
/// `SocketBase`.
pub struct WsStream<S> {
    inner: S,
    role: Role,
    /// Raw bytes read from `inner`, not yet parsed into frames.
    net_in: BytesMut,
    /// Decoded application payload (binary/text frame bodies), ready for
    /// `poll_read` to hand back.
    payload_in: VecDeque<u8>,
    /// Encoded WS frame bytes staged for `inner`.
    net_out: BytesMut,
    closed: bool,
}

impl<S> WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(inner: S, role: Role) -> Self {
        Self {
            inner,
            role,
            net_in: BytesMut::new(),
            payload_in: VecDeque::new(),
            net_out: BytesMut::new(),
            closed: false,
        }
    }

    /// Drain whatever frame bytes are queued for send out to `inner`.
    fn poll_drain_net_out(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<io::Result<()>> {
        while !self.net_out.is_empty() {
            let this = &mut *self;
            match Pin::new(&mut this.inner).poll_write(cx, &this.net_out) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "WS transport: inner stream wrote zero bytes",
                    )));
                }
                Poll::Ready(Ok(n)) => {
                    let _ = this.net_out.split_to(n);
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Pull one chunk of bytes from `inner` into `net_in`, then parse as
    /// many complete frames out of it as are available. Returns `Ok(true)`
    /// if any bytes were read, `Ok(false)` on clean EOF.
    fn poll_pump_net_in(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<io::Result<bool>> {
        let mut scratch = [0u8; 8192];
        let this = &mut *self;
        match Pin::new(&mut this.inner).poll_read(cx, &mut scratch) {
            Poll::Ready(Ok(0)) => Poll::Ready(Ok(false)),
            Poll::Ready(Ok(n)) => {
                this.net_in.extend_from_slice(&scratch[..n]);
                self.as_mut().parse_frames()?;
                Poll::Ready(Ok(true))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Parse as many complete frames as `net_in` holds, appending data
    /// payloads to `payload_in` and queuing control-frame responses
    /// (PONG for PING, echo-close for CLOSE) into `net_out`.
    fn parse_frames(mut self: Pin<&mut Self>) -> io::Result<()> {
        loop {
            let this = &mut *self;
            let Some(frame) = try_parse_frame(&this.net_in)? else {
                break;
            };
            this.net_in.advance(frame.consumed);
            match frame.opcode {
                OPCODE_BINARY | OPCODE_TEXT | OPCODE_CONTINUATION => {
                    this.payload_in.extend(frame.payload);
                }
                OPCODE_PING => {
                    let pong = encode_frame(self.role, OPCODE_PONG, &frame.payload);
                    self.net_out.extend_from_slice(&pong);
                }
                OPCODE_PONG => {}
                OPCODE_CLOSE => {
                    let echo = encode_frame(self.role, OPCODE_CLOSE, &frame.payload);
                    self.net_out.extend_from_slice(&echo);
                    self.closed = true;
                }
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "WS transport: unsupported opcode",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<S> AsyncRead for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            if !self.payload_in.is_empty() {
                let n = buf.len().min(self.payload_in.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = self.payload_in.pop_front().expect("checked non-empty");
                }
                return Poll::Ready(Ok(n));
            }
            if self.closed {
                return Poll::Ready(Ok(0));
            }
            match self.as_mut().poll_drain_net_out(cx) {
                Poll::Ready(Ok(())) => {}
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
            match self.as_mut().poll_pump_net_in(cx) {
                Poll::Ready(Ok(true)) => continue,
                Poll::Ready(Ok(false)) => return Poll::Ready(Ok(0)),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for WsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.as_mut().poll_drain_net_out(cx) {
            Poll::Ready(Ok(())) => {}
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Pending => return Poll::Pending,
        }
        let frame = encode_frame(self.role, OPCODE_BINARY, buf);
        self.net_out.extend_from_slice(&frame);
        let _ = self.as_mut().poll_drain_net_out(cx);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.as_mut().poll_drain_net_out(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut self.inner).poll_flush(cx),
            other => other,
        }
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        match self.as_mut().poll_flush(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut self.inner).poll_close(cx),
            other => other,
        }
    }
}

struct ParsedFrame {
    opcode: u8,
    payload: Vec<u8>,
    consumed: usize,
}

/// Parse one RFC 6455 frame out of `buf`, returning `None` if it holds
/// fewer than a complete frame's worth of bytes.
fn try_parse_frame(buf: &BytesMut) -> io::Result<Option<ParsedFrame>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let b0 = buf[0];
    let b1 = buf[1];
    let opcode = b0 & 0x0F;
    let masked = b1 & 0x80 != 0;
    let len_field = b1 & 0x7F;

    let mut pos = 2usize;
    let payload_len: usize = match len_field {
        126 => {
            if buf.len() < pos + 2 {
                return Ok(None);
            }
            let n = u16::from_be_bytes([buf[pos], buf[pos + 1]]) as usize;
            pos += 2;
            n
        }
        127 => {
            if buf.len() < pos + 8 {
                return Ok(None);
            }
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&buf[pos..pos + 8]);
            let n = u64::from_be_bytes(arr);
            pos += 8;
            usize::try_from(n).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "WS frame too large for this platform")
            })?
        }
        n => n as usize,
    };

    let mask_key = if masked {
        if buf.len() < pos + 4 {
            return Ok(None);
        }
        let key = [buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]];
        pos += 4;
        Some(key)
    } else {
        None
    };

    if buf.len() < pos + payload_len {
        return Ok(None);
    }

    let mut payload = buf[pos..pos + payload_len].to_vec();
    if let Some(key) = mask_key {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }
    pos += payload_len;

    trace!(opcode, len = payload_len, masked, "[ws] parsed frame");

    Ok(Some(ParsedFrame {
        opcode,
        payload,
        consumed: pos,
    }))
}

/// Encode one complete (FIN=1), unfragmented RFC 6455 frame. Client-role
/// frames are masked with a random key per the spec; server-role frames
/// are sent unmasked.
fn encode_frame(role: Role, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    out.push(0x80 | opcode); // FIN=1, RSV=0

    let masked = role == Role::Client;
    let mask_bit = if masked { 0x80 } else { 0x00 };
    let len = payload.len();
    if len < 126 {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    if masked {
        let mut key = [0u8; 4];
        rand::thread_rng().fill_bytes(&mut key);
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    } else {
        out.extend_from_slice(payload);
    }
    out
}

/// Perform the client side of the WS opening handshake (HTTP/1.1 GET with
/// `Upgrade: websocket`) over `inner`, then return the framed stream ready
/// for ZMP traffic.
pub async fn connect<S>(mut inner: S, host: &str, path: &str) -> io::Result<WsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut key_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    let key = base64_encode(&key_bytes);

    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
    let BufResult(res, _) = inner.write_all(request.into_bytes()).await;
    res?;

    let response = read_http_head(&mut inner).await?;
    let status_line = response
        .lines()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty WS handshake response"))?;
    if !status_line.contains("101") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("WS handshake rejected: {status_line}"),
        ));
    }
    let expected_accept = tungstenite::handshake::derive_accept_key(key.as_bytes());
    let got_accept = header_value(&response, "sec-websocket-accept").ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing Sec-WebSocket-Accept")
    })?;
    if got_accept.trim() != expected_accept {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "WS handshake: Sec-WebSocket-Accept mismatch",
        ));
    }

    trace!(host, path, "[ws] client handshake complete");
    Ok(WsStream::new(inner, Role::Client))
}

/// Perform the server side of the WS opening handshake over `inner`: read
/// the client's upgrade request, validate it, and respond with `101
/// Switching Protocols`.
pub async fn accept<S>(mut inner: S) -> io::Result<WsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = read_http_head(&mut inner).await?;
    let key = header_value(&request, "sec-websocket-key")
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing Sec-WebSocket-Key"))?;
    let accept = tungstenite::handshake::derive_accept_key(key.trim().as_bytes());

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    );
    let BufResult(res, _) = inner.write_all(response.into_bytes()).await;
    res?;

    trace!("[ws] server handshake complete");
    Ok(WsStream::new(inner, Role::Server))
}

/// Read bytes from `stream` one chunk at a time until the `\r\n\r\n` that
/// terminates an HTTP header block is seen, returning the head as a
/// lossily-decoded `String` (header values here are ASCII).
async fn read_http_head<S>(stream: &mut S) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut acc = Vec::new();
    loop {
        if let Some(pos) = find_subslice(&acc, b"\r\n\r\n") {
            acc.truncate(pos);
            return Ok(String::from_utf8_lossy(&acc).into_owned());
        }
        let scratch = vec![0u8; 512];
        let BufResult(res, scratch) = stream.read(scratch).await;
        let n = res?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "WS handshake: peer closed before header terminator",
            ));
        }
        acc.extend_from_slice(&scratch[..n]);
        if acc.len() > 16 * 1024 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "WS handshake: header block too large",
            ));
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

/// Minimal base64 (standard alphabet, padded) encoder for the
/// `Sec-WebSocket-Key` header; avoids pulling in a dedicated base64 crate
/// for sixteen random bytes.
fn base64_encode(input: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((input.len() + 2) / 3 * 4);
    for chunk in input.chunks(3) {
        let b0 = chunk[0];
        let b1 = chunk.get(1).copied();
        let b2 = chunk.get(2).copied();
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1.unwrap_or(0) >> 4)) as usize] as char);
        if let Some(b1) = b1 {
            out.push(ALPHABET[(((b1 & 0x0F) << 2) | (b2.unwrap_or(0) >> 6)) as usize] as char);
        } else {
            out.push('=');
        }
        if let Some(b2) = b2 {
            out.push(ALPHABET[(b2 & 0x3F) as usize] as char);
        } else {
            out.push('=');
        }
    }
    out
}

impl<S> std::fmt::Debug for WsStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsStream")
            .field("role", &self.role)
            .field("net_in_len", &self.net_in.len())
            .field("payload_in_len", &self.payload_in.len())
            .field("net_out_len", &self.net_out.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip_small_unmasked() {
        let payload = b"hello";
        let encoded = encode_frame(Role::Server, OPCODE_BINARY, payload);
        let buf = BytesMut::from(&encoded[..]);
        let parsed = try_parse_frame(&buf).unwrap().unwrap();
        assert_eq!(parsed.opcode, OPCODE_BINARY);
        assert_eq!(parsed.payload, payload);
        assert_eq!(parsed.consumed, encoded.len());
    }

    #[test]
    fn frame_roundtrip_masked_client() {
        let payload = vec![7u8; 300];
        let encoded = encode_frame(Role::Client, OPCODE_BINARY, &payload);
        // Masked frames set the mask bit and carry a 4-byte key.
        assert_eq!(encoded[1] & 0x80, 0x80);
        let buf = BytesMut::from(&encoded[..]);
        let parsed = try_parse_frame(&buf).unwrap().unwrap();
        assert_eq!(parsed.payload, payload);
    }

    #[test]
    fn frame_parse_needs_more_data() {
        let payload = b"partial";
        let encoded = encode_frame(Role::Server, OPCODE_BINARY, payload);
        let buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(try_parse_frame(&buf).unwrap().is_none());
    }

    #[test]
    fn base64_matches_known_vector() {
        assert_eq!(base64_encode(b"any carnal pleasure."), "YW55IGNhcm5hbCBwbGVhc3VyZS4=");
        assert_eq!(base64_encode(b"pleasure."), "cGxlYXN1cmUu");
    }

    #[test]
    fn header_value_lookup_is_case_insensitive() {
        let head = "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: abc123==";
        assert_eq!(header_value(head, "sec-websocket-accept"), Some("abc123=="));
        assert_eq!(header_value(head, "SEC-WEBSOCKET-ACCEPT"), Some("abc123=="));
    }
}
