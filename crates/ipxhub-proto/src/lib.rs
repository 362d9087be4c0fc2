//! Wire format for the DOSBox IPX-over-UDP dialect.
//!
//! Every UDP datagram carries one IPX packet: a fixed 30-byte header
//! followed by the payload. The layout must match DOSBox byte for byte;
//! there is no version negotiation.

pub mod addr;
pub mod constants;
pub mod error;
pub mod header;
pub mod packet;
