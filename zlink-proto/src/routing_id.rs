//! Auto-generated routing IDs for ROUTER/DEALER/STREAM peers.
//!
//! ZMP's HELLO carries no identity frame of its own (§4.2); unlike ZMTP's
//! socket-type+identity negotiation, a ROUTER-family hub always mints its
//! own routing id for each accepted peer. Per the protocol's routing-id
//! normalization, an auto-generated id is the reserved `0x00` byte followed
//! by a 4-byte little-endian process-unique counter (not random bytes):
//! this keeps ids compact and trivially non-colliding within a process
//! without depending on an RNG. `SocketOptions::validate_router_identity`
//! rejects any user-supplied identity that starts with the reserved byte,
//! so auto and explicit ids never collide.

use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Generate a 5-byte auto routing id: `0x00` followed by a 4-byte
/// little-endian unique counter value.
#[must_use]
pub fn generate() -> Bytes {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let mut buf = [0u8; 5];
    buf[1..].copy_from_slice(&n.to_le_bytes());
    Bytes::copy_from_slice(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_reserved_null_byte() {
        let id = generate();
        assert_eq!(id.len(), 5);
        assert_eq!(id[0], 0x00);
    }

    #[test]
    fn ids_are_not_trivially_equal() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }

    #[test]
    fn counter_is_little_endian_and_monotonic() {
        let a = generate();
        let b = generate();
        let a_n = u32::from_le_bytes(a[1..].try_into().unwrap());
        let b_n = u32::from_le_bytes(b[1..].try_into().unwrap());
        assert!(b_n > a_n);
    }
}
