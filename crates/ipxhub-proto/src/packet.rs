use bytes::{BufMut, Bytes, BytesMut};

use crate::{constants::HEADER_LEN, error::ProtoError, header::Header};

/// A single decoded IPX packet that owns its payload bytes.
///
/// Cloning is cheap: the payload is refcounted, so fanning a broadcast
/// out to many receivers never copies it.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Decode a whole datagram into an owned packet, copying the payload
    /// out of the receive buffer.
    pub fn from_wire(datagram: &[u8]) -> Result<Packet, ProtoError> {
        let (header, payload) = Header::decode(datagram)?;
        Ok(Packet {
            header,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Wire size of this packet: header plus payload.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Append the wire form of this packet to `out`.
    pub fn encode_into(&self, out: &mut BytesMut) {
        let mut hbuf = [0u8; HEADER_LEN];
        self.header.encode_into(&mut hbuf);
        out.put_slice(&hbuf);
        out.put_slice(&self.payload);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = BytesMut::with_capacity(self.wire_len());
        self.encode_into(&mut out);
        out.to_vec()
    }
}
