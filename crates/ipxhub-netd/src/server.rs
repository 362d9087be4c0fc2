//! The UDP front-end: one socket speaking the DOSBox IPX-over-UDP
//! dialect, a client table, and the liveness machinery around it.
//!
//! The receive task owns the client table outright and doubles as the
//! timer task by putting a deadline on the socket read. Each client gets
//! one sender task that drains its hub node back out to the UDP peer.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{Bytes, BytesMut};
use ipxhub_proto::addr::IpxAddr;
use ipxhub_proto::constants::{MAX_DATAGRAM, REGISTRATION_SOCKET};
use ipxhub_proto::header::{Header, HeaderAddr};
use ipxhub_proto::packet::Packet;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::network::{stats, Network, Node};

/// Absolute cap on how long the receive loop may wait before running a
/// timeout sweep; a new client may have connected in the meantime.
const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Client liveness tunables.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Clients are dropped if nothing is received from them for this
    /// long.
    pub client_timeout: Duration,

    /// Send at least one packet to every client this often. Some NAT
    /// gateways and firewalls are quick to forget a UDP flow that goes
    /// quiet, after which the client can no longer hear us.
    pub keepalive_time: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(600),
            keepalive_time: Duration::from_secs(5),
        }
    }
}

/// Wall-clock of the most recent datagram sent to one peer, shared
/// between the receive loop and the client's sender task as milliseconds
/// past the server epoch.
struct LastSend {
    epoch: Instant,
    millis: AtomicU64,
}

impl LastSend {
    fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            millis: AtomicU64::new(epoch.elapsed().as_millis() as u64),
        }
    }

    fn touch(&self) {
        self.millis
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn get(&self) -> Instant {
        self.epoch + Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }
}

/// One registered UDP peer and its hub node.
struct Client {
    node: Arc<dyn Node>,
    last_rx: Instant,
    last_tx: Arc<LastSend>,
}

/// Handle for stopping a running server from another task. Cloneable;
/// signalling more than once is harmless.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.try_send(());
    }
}

enum Event {
    Shutdown,
    Datagram(usize, SocketAddr),
    Fatal(io::Error),
    Deadline,
}

/// An IPX hub server listening on one UDP port.
pub struct Server {
    socket: Arc<UdpSocket>,
    network: Arc<dyn Network>,
    config: Config,
    clients: HashMap<SocketAddr, Client>,
    epoch: Instant,
    next_check: Instant,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Server {
    /// Bind the server socket. Startup errors (bad address, port in use)
    /// surface here; once running, per-packet errors never do.
    pub async fn bind(
        bind: SocketAddr,
        network: Arc<dyn Network>,
        config: Config,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(bind)
            .await
            .with_context(|| format!("binding UDP socket on {bind}"))?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let epoch = Instant::now();
        Ok(Self {
            socket: Arc::new(socket),
            network,
            config,
            clients: HashMap::new(),
            epoch,
            next_check: epoch + MAX_CHECK_INTERVAL,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the receive loop until the socket fails or a
    /// [`ShutdownHandle`] fires. Either way every client node is closed
    /// on the way out, which ends the sender tasks.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(addr = %self.socket.local_addr()?, "IPX hub listening");
        let mut buf = [0u8; MAX_DATAGRAM];

        let result = loop {
            let event = tokio::select! {
                _ = self.shutdown_rx.recv() => Event::Shutdown,
                recv = timeout_at(self.next_check, self.socket.recv_from(&mut buf)) => {
                    match recv {
                        Ok(Ok((len, peer))) => Event::Datagram(len, peer),
                        Ok(Err(e)) => Event::Fatal(e),
                        Err(_) => Event::Deadline,
                    }
                }
            };

            match event {
                Event::Shutdown => break Ok(()),
                Event::Datagram(len, peer) => self.process_datagram(&buf[..len], peer).await,
                Event::Fatal(e) => break Err(anyhow::Error::new(e).context("UDP receive failed")),
                Event::Deadline => {}
            }

            if Instant::now() >= self.next_check {
                self.next_check = self.check_client_timeouts().await;
            }
        };

        self.close_all();
        result
    }

    /// Decode one ingress datagram and either register its sender or
    /// forward it into the segment. All failure modes drop the datagram
    /// and keep the loop running.
    async fn process_datagram(&mut self, datagram: &[u8], peer: SocketAddr) {
        let (header, payload) = match Header::decode(datagram) {
            Ok(decoded) => decoded,
            Err(_) => return,
        };

        if header.is_registration() {
            self.register_client(peer).await;
            return;
        }

        let Some(client) = self.clients.get_mut(&peer) else {
            // Unregistered peers are ignored.
            return;
        };
        // Clients can only send from their own address.
        if header.src.addr != client.node.address() {
            debug!(%peer, claimed = %header.src.addr, "dropping spoofed source address");
            return;
        }
        client.last_rx = Instant::now();

        let packet = Packet::new(header, Bytes::copy_from_slice(payload));
        // Routing drops are the hub's business; per-packet errors never
        // propagate out of the packet path.
        let _ = client.node.write_packet(packet);
    }

    /// Handle a registration packet, allocating a node for the peer on
    /// first contact. New or duplicate, the peer always gets an ack; it
    /// learns its assigned address from the ack's destination.
    async fn register_client(&mut self, peer: SocketAddr) {
        let now = Instant::now();
        if !self.clients.contains_key(&peer) {
            let node = self.network.new_node();
            let last_tx = Arc::new(LastSend::new(self.epoch));
            spawn_client_sender(self.socket.clone(), node.clone(), peer, last_tx.clone());
            info!(%peer, ipx = %node.address(), "new client");
            self.clients.insert(
                peer,
                Client {
                    node,
                    last_rx: now,
                    last_tx,
                },
            );
            // Don't let a fresh client's first keepalive or timeout wait
            // on a stale sweep deadline.
            let horizon = self.config.keepalive_time.min(self.config.client_timeout);
            self.next_check = self.next_check.min(now + horizon);
        }

        let client = &self.clients[&peer];
        let mut wire = [0u8; Header::LEN];
        registration_ack(client.node.address()).encode_into(&mut wire);
        client.last_tx.touch();
        if let Err(e) = self.socket.send_to(&wire, peer).await {
            warn!(%peer, error = %e, "failed to send registration reply");
        }
    }

    /// Ping idle clients, evict dead ones, and return the next sweep
    /// time.
    async fn check_client_timeouts(&mut self) -> Instant {
        let now = Instant::now();
        let mut next_check = now + MAX_CHECK_INTERVAL;
        let mut dead = Vec::new();

        for (peer, client) in &self.clients {
            // Nothing sent in a while? Ping the client so it answers
            // and the NAT mapping stays warm. Some games run a quiet
            // server that only listens for client broadcasts (Warcraft 2
            // is one), so without this the flow can go silent for good.
            let mut keepalive_at = client.last_tx.get() + self.config.keepalive_time;
            if now >= keepalive_at {
                self.send_ping(*peer, client).await;
                keepalive_at = client.last_tx.get() + self.config.keepalive_time;
            }

            // Nothing received in a long time? The client is gone.
            let timeout_time = client.last_rx + self.config.client_timeout;
            if now >= timeout_time {
                dead.push(*peer);
                continue;
            }

            next_check = next_check.min(keepalive_at).min(timeout_time);
        }

        for peer in dead {
            if let Some(client) = self.clients.remove(&peer) {
                match stats::probe(client.node.as_ref()) {
                    Some(stats) => {
                        info!(%peer, ipx = %client.node.address(), %stats, "client timed out")
                    }
                    None => info!(%peer, ipx = %client.node.address(), "client timed out"),
                }
                client.node.close();
            }
        }

        next_check
    }

    /// Send a keepalive ping. DOSBox clients answer broadcasts to socket
    /// 2, which refreshes our receive clock for the peer as a side
    /// effect.
    async fn send_ping(&self, peer: SocketAddr, client: &Client) {
        let mut wire = [0u8; Header::LEN];
        keepalive_ping().encode_into(&mut wire);
        client.last_tx.touch();
        if let Err(e) = self.socket.send_to(&wire, peer).await {
            debug!(%peer, error = %e, "keepalive send failed");
        }
    }

    /// Close every client node; the sender tasks exit on the resulting
    /// end-of-stream.
    fn close_all(&mut self) {
        for (peer, client) in self.clients.drain() {
            debug!(%peer, "closing client");
            client.node.close();
        }
    }
}

/// Copy packets from the client's node to its UDP peer until the node
/// closes. A failed send is logged and skipped; one lost datagram is not
/// a reason to drop the client.
fn spawn_client_sender(
    socket: Arc<UdpSocket>,
    node: Arc<dyn Node>,
    peer: SocketAddr,
    last_tx: Arc<LastSend>,
) {
    tokio::spawn(async move {
        let mut wire = BytesMut::with_capacity(MAX_DATAGRAM);
        while let Some(packet) = node.read_packet().await {
            wire.clear();
            packet.encode_into(&mut wire);
            last_tx.touch();
            if let Err(e) = socket.send_to(&wire, peer).await {
                debug!(%peer, error = %e, "UDP send failed");
            }
        }
        debug!(%peer, "sender task finished");
    });
}

/// Reply to a registration packet. The assigned node address rides in
/// the destination triple; the source is the broadcast address on
/// network 1 so the reply cannot collide with segment traffic.
fn registration_ack(addr: IpxAddr) -> Header {
    Header {
        checksum: 0xffff,
        length: Header::LEN as u16,
        trans_control: 0,
        packet_type: 0,
        dest: HeaderAddr {
            network: [0, 0, 0, 0],
            addr,
            socket: REGISTRATION_SOCKET,
        },
        src: HeaderAddr {
            network: [0, 0, 0, 1],
            addr: IpxAddr::BROADCAST,
            socket: REGISTRATION_SOCKET,
        },
    }
}

/// Keepalive broadcast on socket 2. The source is the ping-reply
/// pseudo-address: pinging from `NULL` would make the client's answer
/// look like a fresh registration.
fn keepalive_ping() -> Header {
    Header {
        checksum: 0xffff,
        length: Header::LEN as u16,
        trans_control: 0,
        packet_type: 0,
        dest: HeaderAddr {
            network: [0; 4],
            addr: IpxAddr::BROADCAST,
            socket: REGISTRATION_SOCKET,
        },
        src: HeaderAddr {
            network: [0; 4],
            addr: IpxAddr::PING_REPLY,
            socket: 0,
        },
    }
}
