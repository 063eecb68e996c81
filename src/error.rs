use std::io;

/// Errors produced when submitting a message to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection has closed. The message was not queued.
    #[error("connection is closed")]
    SendAfterClose,
    /// The reliable send window has no room for the message at present.
    #[error("send window is full")]
    WouldBlock,
    /// The message can never be sent on the requested channel.
    #[error("message of {len} bytes exceeds the {max}-byte limit")]
    MessageTooLarge { len: usize, max: usize },
}

/// Reasons an inbound datagram is discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet of {len} bytes is shorter than the {min}-byte header")]
    Truncated { len: usize, min: usize },
    #[error("unknown channel id 0x{0:02X}")]
    UnknownChannel(u8),
    #[error("unknown reliable packet kind 0x{0:02X}")]
    UnknownKind(u8),
    #[error("control packet carries {0} unexpected payload bytes")]
    UnexpectedPayload(usize),
    #[error("checksum mismatch (received {received:016X}, computed {computed:016X})")]
    Corrupt { received: u64, computed: u64 },
}

impl PacketError {
    /// Returns true if the packet failed its integrity check, false if it was merely malformed.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Errors returned when creating a server or client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
