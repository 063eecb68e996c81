/*

https://datatracker.ietf.org/doc/html/rfc6298
https://intronetworks.cs.luc.edu/current/html/reno.html

Skiff carries two kinds of traffic between a client and a server over a single UDP socket: reliable
messages, which arrive exactly once and in order, and unreliable messages, which are sent once and
may be lost, duplicated or reordered.

# Packet layout

Every datagram begins with a 64-bit CRC (CRC-64/ECMA-182) computed over everything that follows
it. A datagram whose checksum does not match is discarded and counted. Corruption is expected on an
unreliable medium, so it is never reported to the application.

  [u64 checksum][u8 channel]                       unreliable: payload follows
  [u64 checksum][u8 channel][u8 kind][u32 seq]     reliable

The reliable kind byte distinguishes data, Hello, Goodbye and Ack. The top bit marks a data segment
which is followed by further fragments of the same message.

# Reliable channel

Messages are split into segments of at most (mtu - 14) bytes, each of which takes the next
sequence number. A message is either queued entirely or not at all, so the send window never holds
more than `send_window_size` segments. When the window is full, senders block until an
acknowledgement frees space.

The receiver buffers segments within its receive window and releases them strictly in sequence
order. Every received segment schedules a cumulative acknowledgement naming the highest contiguous
sequence received, which is sent on the next tick. Acks are batched this way so that a burst of
segments costs one ack.

Each transmitted segment carries its own retransmission timeout. When it elapses, the segment is
resent and its timeout doubled, up to `rto_max_ms`. A segment resent more than `max_retransmits`
times fails the connection. Round trip times are sampled only from segments which were never
resent (Karn's rule), and feed an RFC 6298 estimator.

The number of segments in flight is limited by a congestion window. In slow start, each ack grows
the window by one segment:

  cwnd <- cwnd + 1

In congestion avoidance, each ack grows it by:

  cwnd <- cwnd + 1/cwnd

A retransmission timeout collapses the window to 2 segments and restarts slow start with a
threshold of half the previous window. Duplicate acks (when fast retransmission is enabled) resend
the oldest segment and halve the window, at most once per window.

# Handshake

Both sides queue a Hello as reliable segment 0 as soon as the connection is created. A side becomes
connected when the peer's Hello is delivered, which is the only way a connection becomes
connected. Since application data is sequenced after the Hello on the same ordered channel, it
can never be mistaken for the handshake, nor delivered before it.

A server only creates a connection for an unknown address when the first datagram is an intact
Hello.

# Teardown

A local disconnect sends a single Goodbye, which takes the next reliable sequence number but is
never retransmitted. The receiver orders it like any other segment and closes once everything sent
before it has been delivered. If the Goodbye or anything before it is lost, the peer closes after
`idle_timeout_ms` without traffic.

Every connection closes exactly once and reports a [`DisconnectCause`].

*/

use std::io;

mod buffer;
pub mod client;
mod connection;
mod endpoint;
mod epoch;
mod error;
mod frame;
pub mod server;
mod socket;
mod ticker;

/// Identifies one of the two channels of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Ordered, exactly-once delivery.
    Reliable,
    /// Best-effort delivery.
    Unreliable,
}

/// The reason a connection closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DisconnectCause {
    /// Closed by the local application.
    #[error("closed locally")]
    Local,
    /// The peer sent a Goodbye.
    #[error("closed by peer")]
    PeerClosed,
    /// Nothing was received from the peer within the idle timeout.
    #[error("peer timed out")]
    Timeout,
    /// A reliable segment went unacknowledged despite repeated retransmission.
    #[error("retransmission limit exceeded")]
    RetransmitExhausted,
    /// The socket failed to send a datagram.
    #[error("socket error: {0:?}")]
    Socket(io::ErrorKind),
}

pub use connection::Connection;
pub use endpoint::Config as ConnectionConfig;
pub use endpoint::DelayMode;
pub use endpoint::State as ConnectionState;
pub use endpoint::Stats as ConnectionStats;
pub use error::{Error, PacketError, Result, SendError};

pub type Client = client::Client;
pub type ClientEvent = client::Event;
pub type Server = server::Server;
pub type ServerEvent = server::Event;
