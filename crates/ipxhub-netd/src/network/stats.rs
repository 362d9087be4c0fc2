//! A `Network` decorator that counts per-node traffic statistics.
//!
//! Counters are fetched through `Node::get_property` with an
//! `Option<Statistics>` sink, so callers reach them through an arbitrary
//! decorator chain without naming this layer.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use ipxhub_proto::addr::IpxAddr;
use ipxhub_proto::packet::Packet;

use super::{Network, NetworkError, Node};

/// Snapshot of one node's traffic counters.
///
/// Orientation is the server's point of view: reading a packet from a
/// node means transmitting it to the client, writing a packet into a
/// node means the client sent it to us.
#[derive(Debug, Clone, Copy)]
pub struct Statistics {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub connect_time: Instant,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connected for {:.1?}; received {} packets ({} bytes), sent {} packets ({} bytes)",
            self.connect_time.elapsed(),
            self.rx_packets,
            self.rx_bytes,
            self.tx_packets,
            self.tx_bytes
        )
    }
}

/// Fetch statistics through an arbitrary decorator chain, if any layer
/// provides them.
pub fn probe(node: &dyn Node) -> Option<Statistics> {
    let mut sink: Option<Statistics> = None;
    node.get_property(&mut sink);
    sink
}

/// Wraps a network so that every node it hands out counts its own
/// traffic.
pub struct StatsNetwork {
    inner: Arc<dyn Network>,
}

impl StatsNetwork {
    pub fn new(inner: Arc<dyn Network>) -> Self {
        Self { inner }
    }
}

impl Network for StatsNetwork {
    fn new_node(&self) -> Arc<dyn Node> {
        Arc::new(StatsNode {
            inner: self.inner.new_node(),
            counters: Counters::new(),
        })
    }
}

struct Counters {
    rx_packets: AtomicU64,
    tx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    connect_time: Instant,
}

impl Counters {
    fn new() -> Self {
        Self {
            rx_packets: AtomicU64::new(0),
            tx_packets: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
            connect_time: Instant::now(),
        }
    }

    fn snapshot(&self) -> Statistics {
        Statistics {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            tx_bytes: self.tx_bytes.load(Ordering::Relaxed),
            connect_time: self.connect_time,
        }
    }
}

struct StatsNode {
    inner: Arc<dyn Node>,
    counters: Counters,
}

#[async_trait]
impl Node for StatsNode {
    fn address(&self) -> IpxAddr {
        self.inner.address()
    }

    async fn read_packet(&self) -> Option<Packet> {
        let packet = self.inner.read_packet().await?;
        // A read is a transmit to the client, not a receive from it.
        self.counters.tx_packets.fetch_add(1, Ordering::Relaxed);
        self.counters
            .tx_bytes
            .fetch_add(packet.wire_len() as u64, Ordering::Relaxed);
        Some(packet)
    }

    fn write_packet(&self, packet: Packet) -> Result<(), NetworkError> {
        let len = packet.wire_len() as u64;
        self.inner.write_packet(packet)?;
        self.counters.rx_packets.fetch_add(1, Ordering::Relaxed);
        self.counters.rx_bytes.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    fn close(&self) {
        self.inner.close()
    }

    fn get_property(&self, sink: &mut dyn Any) -> bool {
        match sink.downcast_mut::<Option<Statistics>>() {
            Some(slot) => {
                *slot = Some(self.counters.snapshot());
                true
            }
            None => self.inner.get_property(sink),
        }
    }
}
