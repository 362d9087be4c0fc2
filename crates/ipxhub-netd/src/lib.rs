//! Hub server library - core logic exposed for integration tests and
//! out-of-tree bridges (pcap, PPTP, game proxies) that consume the
//! `Network`/`Node` contract.

pub mod network;
pub mod server;
