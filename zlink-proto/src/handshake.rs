//! Synchronous HELLO/READY handshake that completes before a socket is
//! handed to its steady-state actor.
//!
//! Unlike ZMTP there is no preceding greeting exchange: the handshake is
//! just two CONTROL-flagged ZMP frames (HELLO, then READY) in each
//! direction. Completing both synchronously, before spawning background
//! tasks, avoids races where application data could otherwise race ahead
//! of the handshake.

use bytes::Bytes;
use compio::buf::BufResult;
use compio::io::{AsyncRead, AsyncWrite};
use std::time::Duration;
use tracing::debug;

use zlink_core::socket_type::SocketType;
use zlink_core::timeout::{read_exact_with_timeout, write_all_with_timeout};

use crate::codec::{ZmpError, HEADER_LEN, MAGIC, VERSION};
use crate::command::ControlMessage;

/// Result of a successful handshake.
#[derive(Debug)]
pub struct HandshakeResult {
    pub peer_socket_type: SocketType,
}

/// Perform the HELLO/READY handshake with no timeout.
///
/// Generic over any transport presenting the `AsyncRead`/`AsyncWrite`
/// contract `SocketBase<S>` is built on — TCP, IPC, in-process, TLS, and
/// WS/WSS streams all use this same handshake path.
pub async fn perform_handshake<S>(
    stream: &mut S,
    local_socket_type: SocketType,
) -> Result<HandshakeResult, ZmpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    perform_handshake_with_timeout(stream, local_socket_type, None).await
}

/// Perform the HELLO/READY handshake, optionally bounded by `timeout`.
///
/// On timeout this returns `ZmpError::Protocol`; callers that need to
/// surface the ERROR(handshake_timeout) control message and the matching
/// monitor event should catch the elapsed case themselves (the
/// [`super::session::ZmpSession`] sans-IO state machine does this for the
/// steady-state heartbeat timer; this synchronous helper is only used for
/// the initial connect-time handshake).
pub async fn perform_handshake_with_timeout<S>(
    stream: &mut S,
    local_socket_type: SocketType,
    timeout: Option<Duration>,
) -> Result<HandshakeResult, ZmpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(socket_type = %local_socket_type, "starting HELLO/READY handshake");

    // Send HELLO
    let hello = ControlMessage::Hello {
        socket_type: local_socket_type.to_wire(),
        options: 0,
        metadata: vec![],
    }
    .encode();
    send_control(stream, &hello, timeout).await?;

    // Receive peer HELLO
    let peer_hello_body = recv_control(stream, timeout).await?;
    let peer_hello = ControlMessage::decode(&peer_hello_body)?;
    let peer_socket_type = match peer_hello {
        ControlMessage::Hello { socket_type, .. } => {
            SocketType::from_wire(socket_type).ok_or(ZmpError::Protocol)?
        }
        _ => return Err(ZmpError::Protocol),
    };

    if !local_socket_type.is_compatible(peer_socket_type) {
        debug!(
            local = %local_socket_type,
            peer = %peer_socket_type,
            "socket type mismatch during handshake"
        );
        return Err(ZmpError::Protocol);
    }

    // Send READY
    let ready = ControlMessage::Ready.encode();
    send_control(stream, &ready, timeout).await?;

    // Receive peer READY
    let peer_ready_body = recv_control(stream, timeout).await?;
    match ControlMessage::decode(&peer_ready_body)? {
        ControlMessage::Ready => {}
        _ => return Err(ZmpError::Protocol),
    }

    debug!(peer = %peer_socket_type, "handshake complete");

    Ok(HandshakeResult { peer_socket_type })
}

async fn send_control<S>(
    stream: &mut S,
    body: &Bytes,
    timeout: Option<Duration>,
) -> Result<(), ZmpError>
where
    S: AsyncWrite + Unpin,
{
    use crate::codec::ZmpFrame;
    let frame = ZmpFrame::control(body.clone()).encode();
    let BufResult(res, _) = write_all_with_timeout(stream, frame.to_vec(), timeout)
        .await
        .map_err(|_| ZmpError::Protocol)?;
    res.map_err(|_| ZmpError::Protocol)
}

async fn recv_control<S>(stream: &mut S, timeout: Option<Duration>) -> Result<Bytes, ZmpError>
where
    S: AsyncRead + Unpin,
{
    let hdr = [0u8; HEADER_LEN];
    let BufResult(res, hdr) = read_exact_with_timeout(stream, hdr.to_vec(), timeout)
        .await
        .map_err(|_| ZmpError::Protocol)?;
    res.map_err(|_| ZmpError::Protocol)?;

    if hdr[0] != MAGIC {
        return Err(ZmpError::InvalidMagic);
    }
    if hdr[1] != VERSION {
        return Err(ZmpError::VersionMismatch);
    }
    const FLAG_CONTROL: u8 = 0x02;
    if hdr[2] & FLAG_CONTROL == 0 {
        return Err(ZmpError::Protocol);
    }
    if hdr[3] != 0 {
        return Err(ZmpError::ReservedByte);
    }

    let body_len = u32::from_be_bytes([hdr[4], hdr[5], hdr[6], hdr[7]]) as usize;
    const MAX_HANDSHAKE_BODY: usize = 4096;
    if body_len > MAX_HANDSHAKE_BODY {
        return Err(ZmpError::BodyTooLarge);
    }

    let body_buf = vec![0u8; body_len];
    let BufResult(res, body_buf) = read_exact_with_timeout(stream, body_buf, timeout)
        .await
        .map_err(|_| ZmpError::Protocol)?;
    res.map_err(|_| ZmpError::Protocol)?;

    Ok(Bytes::from(body_buf))
}
