//! The virtual segment contract: a `Network` manufactures `Node`s, a
//! `Node` reads and writes IPX packets and owns one node address.
//!
//! The UDP server consumes exactly this interface, as do out-of-tree
//! bridges. Decorators wrap it without the core knowing they exist; the
//! only out-of-band channel is the `get_property` capability probe.

pub mod filter;
pub mod hub;
pub mod stats;

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use ipxhub_proto::addr::IpxAddr;
use ipxhub_proto::packet::Packet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    /// The node this packet was written through has already been closed.
    #[error("node is closed")]
    Closed,
}

/// A virtual IPX segment.
pub trait Network: Send + Sync {
    /// Allocate a fresh node with an address unique within this segment.
    /// Safe to call concurrently.
    fn new_node(&self) -> Arc<dyn Node>;
}

/// One endpoint in a virtual segment.
///
/// Current behavior:
/// - `read_packet` pends until a packet addressed to this node arrives
///   or the node is closed; after close it returns `None`.
/// - `write_packet` never blocks. Routing drops (unknown destination,
///   closed destination, full delivery queue) are silent successes.
/// - `close` is idempotent and promptly wakes a pending reader.
#[async_trait]
pub trait Node: Send + Sync {
    /// The node's address. Constant for the node's lifetime.
    fn address(&self) -> IpxAddr;

    /// Next packet destined to this node, or `None` after close.
    /// Dropping the returned future is the caller's cancellation.
    async fn read_packet(&self) -> Option<Packet>;

    /// Inject `packet` into the segment as if sent by this node. The
    /// segment forwards the header as written; in particular the source
    /// address is not rewritten.
    fn write_packet(&self, packet: Packet) -> Result<(), NetworkError>;

    /// Unregister the node from its segment. Packets still queued for
    /// delivery may be discarded.
    fn close(&self);

    /// Capability probe for decorators: a layer that recognises the
    /// concrete type behind `sink` fills it and returns true, otherwise
    /// it delegates inward. The innermost layer returns false.
    fn get_property(&self, sink: &mut dyn Any) -> bool;
}
