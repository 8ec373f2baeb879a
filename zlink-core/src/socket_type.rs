//! Socket type enumeration and the HELLO-time compatibility table (§4.4).

use std::fmt;

/// zlink socket types.
///
/// Carried as the `socket_type` byte of the HELLO control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketType {
    /// Exclusive bidirectional pipe between exactly two peers.
    Pair = 0,
    /// Publisher: broadcasts to subscribers matching the subscription trie.
    Pub = 1,
    /// Subscriber: filters received messages by local subscription prefixes.
    Sub = 2,
    /// Extended publisher: also surfaces subscribe/cancel notifications.
    XPub = 3,
    /// Extended subscriber: forwards raw subscribe/cancel frames upstream.
    XSub = 4,
    /// Fair-queue inbound, load-balance outbound.
    Dealer = 5,
    /// Routes by peer routing id; prepends/consumes a routing-id frame.
    Router = 6,
    /// Raw per-peer byte stream with connect/disconnect framing.
    Stream = 7,
}

impl SocketType {
    /// Get the socket type as its wire/display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::XPub => "XPUB",
            Self::XSub => "XSUB",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
            Self::Stream => "STREAM",
        }
    }

    /// Decode the `socket_type` byte carried in a HELLO control message.
    #[must_use]
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Pair),
            1 => Some(Self::Pub),
            2 => Some(Self::Sub),
            3 => Some(Self::XPub),
            4 => Some(Self::XSub),
            5 => Some(Self::Dealer),
            6 => Some(Self::Router),
            7 => Some(Self::Stream),
            _ => None,
        }
    }

    /// The `socket_type` byte to carry in a HELLO control message.
    #[must_use]
    pub const fn to_wire(self) -> u8 {
        self as u8
    }

    /// Check if this socket type may handshake with `peer` (§4.4 compat
    /// table: `PUB↔SUB`, `XPUB↔XSUB`, `PAIR↔PAIR`, `DEALER↔DEALER/ROUTER`,
    /// `ROUTER↔DEALER/ROUTER`, `STREAM↔STREAM`).
    #[must_use]
    pub fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair)
                | (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::XPub, Self::XSub)
                | (Self::XSub, Self::XPub)
                | (Self::Dealer, Self::Dealer)
                | (Self::Dealer, Self::Router)
                | (Self::Router, Self::Dealer)
                | (Self::Router, Self::Router)
                | (Self::Stream, Self::Stream)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_type_display() {
        assert_eq!(SocketType::Dealer.to_string(), "DEALER");
        assert_eq!(SocketType::Router.to_string(), "ROUTER");
        assert_eq!(SocketType::Pub.to_string(), "PUB");
    }

    #[test]
    fn test_wire_round_trip() {
        for st in [
            SocketType::Pair,
            SocketType::Pub,
            SocketType::Sub,
            SocketType::XPub,
            SocketType::XSub,
            SocketType::Dealer,
            SocketType::Router,
            SocketType::Stream,
        ] {
            assert_eq!(SocketType::from_wire(st.to_wire()), Some(st));
        }
    }

    #[test]
    fn test_socket_compatibility() {
        assert!(SocketType::Dealer.is_compatible(SocketType::Router));
        assert!(SocketType::Router.is_compatible(SocketType::Dealer));
        assert!(SocketType::Dealer.is_compatible(SocketType::Dealer));
        assert!(SocketType::Router.is_compatible(SocketType::Router));
        assert!(SocketType::Pub.is_compatible(SocketType::Sub));
        assert!(SocketType::XPub.is_compatible(SocketType::XSub));
        assert!(SocketType::Pair.is_compatible(SocketType::Pair));
        assert!(SocketType::Stream.is_compatible(SocketType::Stream));

        // Incompatible pairs
        assert!(!SocketType::Pub.is_compatible(SocketType::Dealer));
        assert!(!SocketType::Pair.is_compatible(SocketType::Dealer));
        assert!(!SocketType::Stream.is_compatible(SocketType::Pair));
    }
}
