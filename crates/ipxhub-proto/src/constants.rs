/// IPX header length in bytes (wire format).
pub const HEADER_LEN: usize = 30;

/// Largest UDP datagram the server reads or writes (header + payload).
pub const MAX_DATAGRAM: usize = 1500;

/// IPX socket number used for the registration handshake and for
/// keepalive pings. DOSBox clients watch broadcasts to this socket.
pub const REGISTRATION_SOCKET: u16 = 2;

/// IPX socket number used by NetBIOS over IPX.
pub const NETBIOS_SOCKET: u16 = 0x455;
