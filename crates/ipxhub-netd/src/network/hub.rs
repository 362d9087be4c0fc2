//! The in-memory hub: the concrete `Network` that wires nodes together.
//!
//! Routing keys on the destination *node* address only; the network
//! field of the header is ignored, including for broadcasts. There is no
//! multi-network routing on a segment.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ipxhub_proto::addr::IpxAddr;
use ipxhub_proto::packet::Packet;
use rand::Rng;
use tokio::sync::Notify;

use super::{Network, NetworkError, Node};

/// Per-node delivery queue depth. When the queue is full the oldest
/// packet is discarded: IPX is lossy, and one slow peer must not stall
/// the segment.
const QUEUE_DEPTH: usize = 32;

/// In-memory `Network`. Cloning yields another handle to the same
/// segment.
#[derive(Clone, Default)]
pub struct Hub {
    shared: Arc<HubShared>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Network for Hub {
    fn new_node(&self) -> Arc<dyn Node> {
        let mailbox = Arc::new(Mailbox::new());
        let addr = self.shared.allocate(mailbox.clone());
        Arc::new(HubNode {
            addr,
            mailbox,
            hub: self.shared.clone(),
        })
    }
}

#[derive(Default)]
struct HubShared {
    /// Live nodes keyed by node address. Locked for table mutation and
    /// fan-out snapshots only, never across an await.
    nodes: Mutex<HashMap<IpxAddr, Arc<Mailbox>>>,
}

impl HubShared {
    /// Pick a random unused, non-reserved address and register the
    /// mailbox under it. The address bytes carry no structure.
    fn allocate(&self, mailbox: Arc<Mailbox>) -> IpxAddr {
        let mut nodes = self.nodes.lock().unwrap();
        let mut bytes = [0u8; 6];
        loop {
            rand::thread_rng().fill(&mut bytes);
            let addr = IpxAddr(bytes);
            if !addr.is_reserved() && !nodes.contains_key(&addr) {
                nodes.insert(addr, mailbox);
                return addr;
            }
        }
    }

    /// Route a packet written by the node at `src`.
    fn route(&self, src: IpxAddr, packet: Packet) {
        if packet.header.is_broadcast() {
            // Snapshot the live set, then enqueue outside the table
            // lock. Enqueueing never blocks either way.
            let targets: Vec<Arc<Mailbox>> = {
                let nodes = self.nodes.lock().unwrap();
                nodes
                    .iter()
                    .filter(|(addr, _)| **addr != src)
                    .map(|(_, mailbox)| mailbox.clone())
                    .collect()
            };
            for target in targets {
                target.push(packet.clone());
            }
        } else {
            let dest = packet.header.dest.addr;
            if dest == src {
                return;
            }
            let target = self.nodes.lock().unwrap().get(&dest).cloned();
            if let Some(target) = target {
                target.push(packet);
            }
        }
    }

    fn remove(&self, addr: IpxAddr) {
        self.nodes.lock().unwrap().remove(&addr);
    }
}

/// Receive side of one node: a bounded queue plus its reader wakeup.
struct Mailbox {
    queue: Mutex<VecDeque<Packet>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(QUEUE_DEPTH)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Non-blocking enqueue; a full queue drops its oldest entry.
    fn push(&self, packet: Packet) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() == QUEUE_DEPTH {
                queue.pop_front();
            }
            queue.push_back(packet);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Packet> {
        self.queue.lock().unwrap().pop_front()
    }
}

struct HubNode {
    addr: IpxAddr,
    mailbox: Arc<Mailbox>,
    hub: Arc<HubShared>,
}

#[async_trait]
impl Node for HubNode {
    fn address(&self) -> IpxAddr {
        self.addr
    }

    async fn read_packet(&self) -> Option<Packet> {
        loop {
            // Closing discards anything still queued.
            if self.mailbox.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(packet) = self.mailbox.pop() {
                return Some(packet);
            }
            // `Notify` stores a permit, so a push between the check
            // above and this await still wakes us.
            self.mailbox.notify.notified().await;
        }
    }

    fn write_packet(&self, packet: Packet) -> Result<(), NetworkError> {
        if self.mailbox.closed.load(Ordering::Acquire) {
            return Err(NetworkError::Closed);
        }
        self.hub.route(self.addr, packet);
        Ok(())
    }

    fn close(&self) {
        if self.mailbox.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.hub.remove(self.addr);
        self.mailbox.notify.notify_one();
    }

    fn get_property(&self, _sink: &mut dyn Any) -> bool {
        false
    }
}

impl Drop for HubNode {
    fn drop(&mut self) {
        self.close();
    }
}
