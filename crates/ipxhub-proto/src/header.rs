use crate::{
    addr::IpxAddr,
    constants::{HEADER_LEN, REGISTRATION_SOCKET},
    error::ProtoError,
};

/// One address triple in an IPX header: network, node, socket.
///
/// 12 bytes on the wire. The socket number is held host-endian in memory
/// and written big-endian, like every other multi-byte field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderAddr {
    pub network: [u8; 4],
    pub addr: IpxAddr,
    pub socket: u16,
}

impl HeaderAddr {
    /// Address triple size in bytes for the wire layout.
    pub const LEN: usize = 12;

    fn encode_into(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.network);
        out[4..10].copy_from_slice(&self.addr.0);
        out[10..12].copy_from_slice(&self.socket.to_be_bytes());
    }

    fn decode(buf: &[u8]) -> HeaderAddr {
        let mut network = [0u8; 4];
        network.copy_from_slice(&buf[0..4]);
        let mut node = [0u8; 6];
        node.copy_from_slice(&buf[4..10]);
        HeaderAddr {
            network,
            addr: IpxAddr(node),
            socket: u16::from_be_bytes([buf[10], buf[11]]),
        }
    }
}

/// IPX packet header (wire format).
///
/// Encoding rules:
/// - Fixed size: exactly `HEADER_LEN` bytes.
/// - Every multi-byte field is big-endian.
/// - Layout is defined by `encode_into()` / `decode()` offsets below.
///
/// Decode rules:
/// - Requires `buf.len() >= HEADER_LEN`.
/// - The `length` field is advisory: it is decoded but never checked
///   against the datagram size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Always `0xFFFF` on the wire; IPX checksumming is unused.
    pub checksum: u16,

    /// Total packet length including the header. Advisory on ingress;
    /// the server sets it to the real length on packets it synthesizes.
    pub length: u16,

    /// Hop count. The server always writes 0.
    pub trans_control: u8,

    /// IPX packet type. Stored only; routing never inspects it.
    pub packet_type: u8,

    pub dest: HeaderAddr,
    pub src: HeaderAddr,
}

impl Header {
    /// Header size in bytes for the wire layout.
    pub const LEN: usize = HEADER_LEN;

    /// Encode this header into `out` using the fixed wire layout.
    ///
    /// Offsets (bytes):
    /// - 0..2   checksum (u16 BE)
    /// - 2..4   length (u16 BE)
    /// - 4      transport control
    /// - 5      packet type
    /// - 6..18  destination (network 4, node 6, socket u16 BE)
    /// - 18..30 source (same shape)
    pub fn encode_into(&self, out: &mut [u8; HEADER_LEN]) {
        out[0..2].copy_from_slice(&self.checksum.to_be_bytes());
        out[2..4].copy_from_slice(&self.length.to_be_bytes());
        out[4] = self.trans_control;
        out[5] = self.packet_type;
        self.dest.encode_into(&mut out[6..18]);
        self.src.encode_into(&mut out[18..30]);
    }

    /// Decode the header at the front of `buf`, returning it together
    /// with the payload slice that follows it.
    ///
    /// Fails only when `buf` cannot hold a whole header. The `length`
    /// field is not validated against `buf.len()`.
    pub fn decode(buf: &[u8]) -> Result<(Header, &[u8]), ProtoError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtoError::TooShort);
        }

        let header = Header {
            checksum: u16::from_be_bytes([buf[0], buf[1]]),
            length: u16::from_be_bytes([buf[2], buf[3]]),
            trans_control: buf[4],
            packet_type: buf[5],
            dest: HeaderAddr::decode(&buf[6..18]),
            src: HeaderAddr::decode(&buf[18..30]),
        };

        Ok((header, &buf[HEADER_LEN..]))
    }

    /// True for the handshake packet a new client sends: destination
    /// socket 2 with the null destination node.
    pub fn is_registration(&self) -> bool {
        self.dest.socket == REGISTRATION_SOCKET && self.dest.addr.is_null()
    }

    /// True when the destination node is the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        self.dest.addr.is_broadcast()
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, HeaderAddr};
    use crate::addr::IpxAddr;
    use crate::constants::HEADER_LEN;

    fn sample_header() -> Header {
        Header {
            checksum: 0xffff,
            length: 0x1234,
            trans_control: 0x01,
            packet_type: 0x04,
            dest: HeaderAddr {
                network: [0x11, 0x22, 0x33, 0x44],
                addr: IpxAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
                socket: 0x4002,
            },
            src: HeaderAddr {
                network: [0x55, 0x66, 0x77, 0x88],
                addr: IpxAddr([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
                socket: 0x869c,
            },
        }
    }

    #[test]
    fn header_len_is_locked() {
        assert_eq!(Header::LEN, HEADER_LEN);
        assert_eq!(Header::LEN, 30);
        assert_eq!(HeaderAddr::LEN, 12);
    }

    #[test]
    fn header_encode_offsets_are_locked() {
        let h = sample_header();
        let mut buf = [0u8; HEADER_LEN];
        h.encode_into(&mut buf);

        assert_eq!(&buf[0..2], &[0xff, 0xff]);
        assert_eq!(&buf[2..4], &[0x12, 0x34]);
        assert_eq!(buf[4], 0x01);
        assert_eq!(buf[5], 0x04);

        assert_eq!(&buf[6..10], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(&buf[10..16], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(&buf[16..18], &[0x40, 0x02]);

        assert_eq!(&buf[18..22], &[0x55, 0x66, 0x77, 0x88]);
        assert_eq!(&buf[22..28], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(&buf[28..30], &[0x86, 0x9c]);
    }

    #[test]
    fn decode_round_trips_and_slices_payload() {
        let h = sample_header();
        let mut datagram = vec![0u8; HEADER_LEN];
        let mut hbuf = [0u8; HEADER_LEN];
        h.encode_into(&mut hbuf);
        datagram.copy_from_slice(&hbuf);
        datagram.extend_from_slice(b"payload");

        let (decoded, payload) = Header::decode(&datagram).unwrap();
        assert_eq!(decoded, h);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn decode_rejects_short_input() {
        assert!(Header::decode(&[0u8; HEADER_LEN - 1]).is_err());
        assert!(Header::decode(&[]).is_err());

        // Exactly one header with no payload is fine.
        let (_, payload) = Header::decode(&[0u8; HEADER_LEN]).unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn decode_ignores_the_length_field() {
        let mut h = sample_header();
        h.length = 9999;
        let mut buf = [0u8; HEADER_LEN];
        h.encode_into(&mut buf);

        let (decoded, payload) = Header::decode(&buf).unwrap();
        assert_eq!(decoded.length, 9999);
        assert!(payload.is_empty());
    }

    #[test]
    fn registration_predicate() {
        let mut h = sample_header();
        assert!(!h.is_registration());

        h.dest.addr = IpxAddr::NULL;
        h.dest.socket = 2;
        assert!(h.is_registration());

        h.dest.socket = 3;
        assert!(!h.is_registration());
    }

    #[test]
    fn broadcast_predicate() {
        let mut h = sample_header();
        assert!(!h.is_broadcast());
        h.dest.addr = IpxAddr::BROADCAST;
        assert!(h.is_broadcast());
    }
}
