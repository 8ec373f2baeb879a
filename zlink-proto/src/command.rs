//! ZMP control-message bodies: HELLO, READY, HEARTBEAT, HEARTBEAT_ACK, ERROR.
//!
//! These are carried as the body of a CONTROL-flagged `ZmpFrame` (§4.2).
//! Byte 0 of the body is the control type; the remaining layout is
//! type-specific.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{ZmpError, ZmpErrorCode, Result};

pub const CTL_HELLO: u8 = 0x01;
pub const CTL_HEARTBEAT: u8 = 0x02;
pub const CTL_HEARTBEAT_ACK: u8 = 0x03;
pub const CTL_READY: u8 = 0x04;
pub const CTL_ERROR: u8 = 0x05;

/// HELLO's `options` bitmap: bit0 = metadata TLVs follow (`zmp_metadata`).
pub const HELLO_OPT_METADATA: u8 = 0x01;

/// A parsed control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Hello {
        socket_type: u8,
        options: u8,
        /// key -> value TLV metadata (only present when `HELLO_OPT_METADATA` is set).
        metadata: Vec<(Bytes, Bytes)>,
    },
    Ready,
    Heartbeat {
        ttl_ds: u16,
        id: Bytes,
    },
    HeartbeatAck {
        id: Bytes,
    },
    Error {
        code: ZmpErrorCode,
        reason: Bytes,
    },
}

impl ControlMessage {
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::new();
        match self {
            Self::Hello {
                socket_type,
                options,
                metadata,
            } => {
                body.put_u8(CTL_HELLO);
                body.put_u8(*socket_type);
                body.put_u8(*options);
                for (key, value) in metadata {
                    body.put_u8(key.len() as u8);
                    body.extend_from_slice(key);
                    body.put_u32(value.len() as u32);
                    body.extend_from_slice(value);
                }
            }
            Self::Ready => {
                body.put_u8(CTL_READY);
            }
            Self::Heartbeat { ttl_ds, id } => {
                body.put_u8(CTL_HEARTBEAT);
                body.put_u16(*ttl_ds);
                body.put_u8(id.len() as u8);
                body.extend_from_slice(id);
            }
            Self::HeartbeatAck { id } => {
                body.put_u8(CTL_HEARTBEAT_ACK);
                body.put_u8(id.len() as u8);
                body.extend_from_slice(id);
            }
            Self::Error { code, reason } => {
                body.put_u8(CTL_ERROR);
                body.put_u8(code.code());
                body.put_u8(reason.len() as u8);
                body.extend_from_slice(reason);
            }
        }
        body.freeze()
    }

    /// Parse a CONTROL frame's body.
    pub fn decode(body: &Bytes) -> Result<Self> {
        if body.is_empty() {
            return Err(ZmpError::Protocol);
        }
        let ctl_type = body[0];
        let rest = body.slice(1..);

        match ctl_type {
            CTL_HELLO => decode_hello(&rest),
            CTL_READY => Ok(Self::Ready),
            CTL_HEARTBEAT => decode_heartbeat(&rest),
            CTL_HEARTBEAT_ACK => decode_heartbeat_ack(&rest),
            CTL_ERROR => decode_error(&rest),
            _ => Err(ZmpError::Protocol),
        }
    }
}

fn decode_hello(rest: &Bytes) -> Result<ControlMessage> {
    if rest.len() < 2 {
        return Err(ZmpError::Protocol);
    }
    let socket_type = rest[0];
    let options = rest[1];
    let mut metadata = Vec::new();

    if options & HELLO_OPT_METADATA != 0 {
        let mut buf = rest.slice(2..);
        while !buf.is_empty() {
            if buf.is_empty() {
                return Err(ZmpError::Protocol);
            }
            let key_len = buf[0] as usize;
            if buf.len() < 1 + key_len + 4 {
                return Err(ZmpError::Protocol);
            }
            let key = buf.slice(1..1 + key_len);
            let mut val_len_buf = buf.slice(1 + key_len..1 + key_len + 4);
            let val_len = val_len_buf.get_u32() as usize;
            let val_start = 1 + key_len + 4;
            if buf.len() < val_start + val_len {
                return Err(ZmpError::Protocol);
            }
            let value = buf.slice(val_start..val_start + val_len);
            metadata.push((key, value));
            buf = buf.slice(val_start + val_len..);
        }
    }

    Ok(ControlMessage::Hello {
        socket_type,
        options,
        metadata,
    })
}

fn decode_heartbeat(rest: &Bytes) -> Result<ControlMessage> {
    if rest.len() < 3 {
        return Err(ZmpError::Protocol);
    }
    let mut ttl_buf = rest.slice(0..2);
    let ttl_ds = ttl_buf.get_u16();
    let id_len = rest[2] as usize;
    if rest.len() < 3 + id_len {
        return Err(ZmpError::Protocol);
    }
    let id = rest.slice(3..3 + id_len);
    Ok(ControlMessage::Heartbeat { ttl_ds, id })
}

fn decode_heartbeat_ack(rest: &Bytes) -> Result<ControlMessage> {
    if rest.is_empty() {
        return Err(ZmpError::Protocol);
    }
    let id_len = rest[0] as usize;
    if rest.len() < 1 + id_len {
        return Err(ZmpError::Protocol);
    }
    let id = rest.slice(1..1 + id_len);
    Ok(ControlMessage::HeartbeatAck { id })
}

fn decode_error(rest: &Bytes) -> Result<ControlMessage> {
    if rest.len() < 2 {
        return Err(ZmpError::Protocol);
    }
    let code = ZmpErrorCode::from_code(rest[0]).unwrap_or(ZmpErrorCode::Internal);
    let reason_len = rest[1] as usize;
    if rest.len() < 2 + reason_len {
        return Err(ZmpError::Protocol);
    }
    let reason = rest.slice(2..2 + reason_len);
    Ok(ControlMessage::Error { code, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips_without_metadata() {
        let msg = ControlMessage::Hello {
            socket_type: 5,
            options: 0,
            metadata: vec![],
        };
        let body = msg.encode();
        assert_eq!(ControlMessage::decode(&body).unwrap(), msg);
    }

    #[test]
    fn hello_round_trips_with_metadata() {
        let msg = ControlMessage::Hello {
            socket_type: 6,
            options: HELLO_OPT_METADATA,
            metadata: vec![(Bytes::from_static(b"X-App"), Bytes::from_static(b"zlink"))],
        };
        let body = msg.encode();
        assert_eq!(ControlMessage::decode(&body).unwrap(), msg);
    }

    #[test]
    fn heartbeat_round_trips() {
        let msg = ControlMessage::Heartbeat {
            ttl_ds: 50,
            id: Bytes::from_static(b"abc"),
        };
        let body = msg.encode();
        assert_eq!(ControlMessage::decode(&body).unwrap(), msg);
    }

    #[test]
    fn error_round_trips() {
        let msg = ControlMessage::Error {
            code: ZmpErrorCode::VersionMismatch,
            reason: Bytes::from_static(b"bad version"),
        };
        let body = msg.encode();
        assert_eq!(ControlMessage::decode(&body).unwrap(), msg);
    }

    #[test]
    fn ready_round_trips() {
        let msg = ControlMessage::Ready;
        let body = msg.encode();
        assert_eq!(ControlMessage::decode(&body).unwrap(), msg);
    }
}
