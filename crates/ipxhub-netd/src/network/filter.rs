//! A `Network` decorator that blocks NetBIOS traffic.
//!
//! DOS-era machines broadcast NetBIOS name chatter on IPX socket 0x455,
//! which floods a shared segment and leaks machine names between
//! unrelated players. The daemon drops it in both directions unless
//! started with `--allow-netbios`.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use ipxhub_proto::addr::IpxAddr;
use ipxhub_proto::constants::NETBIOS_SOCKET;
use ipxhub_proto::packet::Packet;

use super::{Network, NetworkError, Node};

fn is_filtered(packet: &Packet) -> bool {
    packet.header.dest.socket == NETBIOS_SOCKET || packet.header.src.socket == NETBIOS_SOCKET
}

/// Wraps a network so that NetBIOS packets never enter or leave its
/// nodes.
pub struct FilterNetwork {
    inner: Arc<dyn Network>,
}

impl FilterNetwork {
    pub fn new(inner: Arc<dyn Network>) -> Self {
        Self { inner }
    }
}

impl Network for FilterNetwork {
    fn new_node(&self) -> Arc<dyn Node> {
        Arc::new(FilterNode {
            inner: self.inner.new_node(),
        })
    }
}

struct FilterNode {
    inner: Arc<dyn Node>,
}

#[async_trait]
impl Node for FilterNode {
    fn address(&self) -> IpxAddr {
        self.inner.address()
    }

    async fn read_packet(&self) -> Option<Packet> {
        loop {
            let packet = self.inner.read_packet().await?;
            if !is_filtered(&packet) {
                return Some(packet);
            }
        }
    }

    fn write_packet(&self, packet: Packet) -> Result<(), NetworkError> {
        if is_filtered(&packet) {
            return Ok(());
        }
        self.inner.write_packet(packet)
    }

    fn close(&self) {
        self.inner.close()
    }

    fn get_property(&self, sink: &mut dyn Any) -> bool {
        self.inner.get_property(sink)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use ipxhub_proto::addr::IpxAddr;
    use ipxhub_proto::constants::NETBIOS_SOCKET;
    use ipxhub_proto::header::{Header, HeaderAddr};
    use ipxhub_proto::packet::Packet;
    use tokio::time::timeout;

    use super::FilterNetwork;
    use crate::network::hub::Hub;
    use crate::network::stats::{probe, StatsNetwork};
    use crate::network::{Network, Node};

    fn packet(src: IpxAddr, dest: IpxAddr, socket: u16, payload: &[u8]) -> Packet {
        let header = Header {
            checksum: 0xffff,
            length: (Header::LEN + payload.len()) as u16,
            trans_control: 0,
            packet_type: 0,
            dest: HeaderAddr {
                network: [0; 4],
                addr: dest,
                socket,
            },
            src: HeaderAddr {
                network: [0; 4],
                addr: src,
                socket,
            },
        };
        Packet::new(header, Bytes::copy_from_slice(payload))
    }

    #[tokio::test]
    async fn netbios_is_dropped_on_write() {
        let hub = Hub::new();
        let filtered = FilterNetwork::new(Arc::new(hub.clone()));
        let a = filtered.new_node();
        let b = hub.new_node();

        a.write_packet(packet(a.address(), b.address(), NETBIOS_SOCKET, b"name"))
            .unwrap();
        assert!(timeout(Duration::from_millis(50), b.read_packet())
            .await
            .is_err());

        a.write_packet(packet(a.address(), b.address(), 0x4002, b"game"))
            .unwrap();
        let got = timeout(Duration::from_secs(1), b.read_packet())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.payload, &b"game"[..]);
    }

    #[tokio::test]
    async fn netbios_is_dropped_on_read() {
        let hub = Hub::new();
        let filtered = FilterNetwork::new(Arc::new(hub.clone()));
        let a = hub.new_node();
        let b = filtered.new_node();

        a.write_packet(packet(a.address(), b.address(), NETBIOS_SOCKET, b"name"))
            .unwrap();
        a.write_packet(packet(a.address(), b.address(), 0x4002, b"game"))
            .unwrap();

        // The NetBIOS packet is consumed and discarded; the next clean
        // packet comes straight through.
        let got = timeout(Duration::from_secs(1), b.read_packet())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.payload, &b"game"[..]);
    }

    #[tokio::test]
    async fn property_probes_pass_through_the_filter() {
        let stats_inside = StatsNetwork::new(Arc::new(Hub::new()));
        let network = FilterNetwork::new(Arc::new(stats_inside));
        let node = network.new_node();

        assert!(probe(node.as_ref()).is_some());
    }

    #[tokio::test]
    async fn plain_chain_has_no_statistics() {
        let network = FilterNetwork::new(Arc::new(Hub::new()));
        let node = network.new_node();

        assert!(probe(node.as_ref()).is_none());
    }
}
