use std::fmt;

/// A 6-byte IPX node address (MAC-style), naming one endpoint inside a
/// virtual segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpxAddr(pub [u8; 6]);

impl IpxAddr {
    /// The all-zero address. Never assigned to a node; a registration
    /// packet carries it as its destination node.
    pub const NULL: IpxAddr = IpxAddr([0x00; 6]);

    /// The all-ones broadcast address.
    pub const BROADCAST: IpxAddr = IpxAddr([0xff; 6]);

    /// Pseudo-address keepalive pings are sent from. Pinging from `NULL`
    /// would make the client's reply indistinguishable from a fresh
    /// registration.
    pub const PING_REPLY: IpxAddr = IpxAddr([0x02, 0xff, 0xff, 0xff, 0x00, 0x00]);

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// True for addresses a segment must never assign to a node.
    pub fn is_reserved(&self) -> bool {
        self.is_null() || self.is_broadcast() || *self == Self::PING_REPLY
    }
}

impl From<[u8; 6]> for IpxAddr {
    fn from(bytes: [u8; 6]) -> Self {
        IpxAddr(bytes)
    }
}

impl fmt::Display for IpxAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}
