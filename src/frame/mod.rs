pub mod checksum;
pub mod serial;

/// Kind of a reliable-channel packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReliableKind {
    /// A fragment of a user message. `more` is set on every fragment but the last.
    Data { more: bool },
    /// Handshake token, always the first segment a side sends.
    Hello,
    /// Graceful close.
    Goodbye,
    /// Cumulative acknowledgement; the sequence names the highest contiguous segment received.
    Ack,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReliableHeader {
    pub kind: ReliableKind,
    pub sequence: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketHeader {
    Unreliable,
    Reliable(ReliableHeader),
}

#[derive(Debug, Eq, PartialEq)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}
