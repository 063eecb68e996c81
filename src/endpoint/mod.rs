use std::io;

use crate::buffer::{Delivery, Receipt};
use crate::error::{Error, SendError};
use crate::frame::{checksum, serial, PacketHeader, ReliableHeader, ReliableKind};
use crate::{Channel, DisconnectCause};

mod cc;
mod liveness;
mod reliable;
mod rtt;
mod state;
mod unreliable;

use liveness::Liveness;
use reliable::ReliableChannel;
use state::{Action, Input, Latch};
use unreliable::UnreliableChannel;

pub use state::State;

/// Ticks are never scheduled closer together than this.
pub const MIN_TICK_INTERVAL_MS: u64 = 10;

const MTU_DEFAULT: usize = 1200;
const MTU_MIN: usize = 64;
// Largest UDP payload over IPv4
const MTU_MAX: usize = 65_507;

const WINDOW_SIZE_DEFAULT: u32 = 128;
const WINDOW_SIZE_MAX: u32 = 65_536;

const IDLE_TIMEOUT_DEFAULT_MS: u64 = 15_000;
const IDLE_TIMEOUT_MIN_MS: u64 = 100;

const TICK_INTERVAL_DEFAULT_MS: u64 = 40;
const TICK_INTERVAL_MAX_MS: u64 = 5_000;

const RTO_MIN_DEFAULT_MS: u64 = 100;
const RTO_MAX_DEFAULT_MS: u64 = 60_000;
const INITIAL_RTO_DEFAULT_MS: u64 = 200;

const MAX_RETRANSMITS_DEFAULT: u32 = 20;

pub trait HostContext {
    // Called to send a datagram to the remote host.
    fn send_datagram(&mut self, bytes: &[u8]) -> io::Result<()>;

    // Called once, when the handshake completes
    fn on_connect(&mut self);

    // Called once, when the connection closes for any reason
    fn on_disconnect(&mut self, cause: DisconnectCause);

    // Called when a message has been received from the remote host
    fn on_receive(&mut self, channel: Channel, payload: Box<[u8]>);
}

/// Latency presets trading bandwidth for responsiveness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayMode {
    /// Conservative timers with congestion control.
    Normal,
    /// Shorter ticks, fast retransmission after 2 duplicate acks, no congestion control.
    Fast,
    /// As `Fast`, with a 20 ms tick and a 30 ms minimum retransmission timeout.
    Fast2,
    /// As `Fast2`, with a 10 ms tick.
    Fast3,
}

/// Per-connection configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum size of a datagram, in bytes. Both peers must use the same value.
    ///
    /// Minimum value: 64 \
    /// Maximum value: 65,507 \
    /// Default value: 1,200
    pub mtu: usize,

    /// Maximum number of unacknowledged reliable segments.
    ///
    /// Minimum value: 1 \
    /// Maximum value: 65,536 \
    /// Default value: 128
    pub send_window_size: u32,

    /// Maximum number of reliable segments buffered for reordering.
    ///
    /// Minimum value: 1 \
    /// Maximum value: 65,536 \
    /// Default value: 128
    pub receive_window_size: u32,

    /// Time without receiving anything after which the peer is considered lost, in milliseconds.
    ///
    /// Minimum value: 100 \
    /// Default value: 15,000
    pub idle_timeout_ms: u64,

    /// Longest interval between ticks, in milliseconds. Bounds acknowledgement latency.
    ///
    /// Minimum value: 10 \
    /// Maximum value: 5,000 \
    /// Default value: 40
    pub tick_interval_ms: u64,

    /// Lower bound of the retransmission timeout, in milliseconds.
    ///
    /// Minimum value: 1 \
    /// Default value: 100
    pub rto_min_ms: u64,

    /// Upper bound of the retransmission timeout, including backoff, in milliseconds.
    ///
    /// Default value: 60,000
    pub rto_max_ms: u64,

    /// Retransmission timeout used before any round trip has been measured, in milliseconds.
    ///
    /// Default value: 200
    pub initial_rto_ms: u64,

    /// Number of times a segment may be retransmitted before the connection is failed.
    ///
    /// Minimum value: 1 \
    /// Default value: 20
    pub max_retransmits: u32,

    /// Number of duplicate acknowledgements which trigger an immediate retransmission. Zero
    /// disables fast retransmission.
    ///
    /// Default value: 0
    pub fast_resend: u32,

    /// Whether the number of segments in flight follows an AIMD congestion window, or is bounded
    /// only by the send window.
    ///
    /// Default value: true
    pub congestion_control: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mtu: MTU_DEFAULT,
            send_window_size: WINDOW_SIZE_DEFAULT,
            receive_window_size: WINDOW_SIZE_DEFAULT,
            idle_timeout_ms: IDLE_TIMEOUT_DEFAULT_MS,
            tick_interval_ms: TICK_INTERVAL_DEFAULT_MS,
            rto_min_ms: RTO_MIN_DEFAULT_MS,
            rto_max_ms: RTO_MAX_DEFAULT_MS,
            initial_rto_ms: INITIAL_RTO_DEFAULT_MS,
            max_retransmits: MAX_RETRANSMITS_DEFAULT,
            fast_resend: 0,
            congestion_control: true,
        }
    }
}

impl Config {
    /// Applies the timer settings of a latency preset.
    pub fn with_delay_mode(self, mode: DelayMode) -> Self {
        let (tick_interval_ms, rto_min_ms, fast_resend, congestion_control) = match mode {
            DelayMode::Normal => (40, 100, 0, true),
            DelayMode::Fast => (30, 100, 2, false),
            DelayMode::Fast2 => (20, 30, 2, false),
            DelayMode::Fast3 => (10, 30, 2, false),
        };

        Self {
            tick_interval_ms,
            rto_min_ms,
            fast_resend,
            congestion_control,
            initial_rto_ms: self.initial_rto_ms.max(rto_min_ms),
            ..self
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if !(MTU_MIN..=MTU_MAX).contains(&self.mtu) {
            return invalid(format!("mtu must lie within {}..={}", MTU_MIN, MTU_MAX));
        }
        if !(1..=WINDOW_SIZE_MAX).contains(&self.send_window_size) {
            return invalid(format!(
                "send_window_size must lie within 1..={}",
                WINDOW_SIZE_MAX
            ));
        }
        if !(1..=WINDOW_SIZE_MAX).contains(&self.receive_window_size) {
            return invalid(format!(
                "receive_window_size must lie within 1..={}",
                WINDOW_SIZE_MAX
            ));
        }
        if self.idle_timeout_ms < IDLE_TIMEOUT_MIN_MS {
            return invalid(format!("idle_timeout_ms < {}", IDLE_TIMEOUT_MIN_MS));
        }
        if !(MIN_TICK_INTERVAL_MS..=TICK_INTERVAL_MAX_MS).contains(&self.tick_interval_ms) {
            return invalid(format!(
                "tick_interval_ms must lie within {}..={}",
                MIN_TICK_INTERVAL_MS, TICK_INTERVAL_MAX_MS
            ));
        }
        if self.rto_min_ms == 0 || self.rto_min_ms > self.rto_max_ms {
            return invalid("rto_min_ms must lie within 1..=rto_max_ms".into());
        }
        if !(self.rto_min_ms..=self.rto_max_ms).contains(&self.initial_rto_ms) {
            return invalid("initial_rto_ms must lie within rto_min_ms..=rto_max_ms".into());
        }
        if self.max_retransmits == 0 {
            return invalid("max_retransmits must be nonzero".into());
        }

        Ok(())
    }
}

/// Traffic counters for a single connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Reliable segments sent more than once
    pub retransmits: u64,
    /// Datagrams discarded due to a checksum mismatch
    pub corrupt_dropped: u64,
    /// Datagrams discarded because they could not be parsed
    pub malformed_dropped: u64,
    /// Reliable segments discarded as duplicates or outside the receive window
    pub segments_discarded: u64,
}

// Frames, seals and sends packets on behalf of the endpoint, remembering the first socket error
struct Transmitter<'a, C> {
    buffer: &'a mut [u8],
    stats: &'a mut Stats,
    ctx: &'a mut C,
    error: Option<io::ErrorKind>,
}

impl<'a, C> Transmitter<'a, C>
where
    C: HostContext,
{
    fn new(buffer: &'a mut [u8], stats: &'a mut Stats, ctx: &'a mut C) -> Self {
        Self {
            buffer,
            stats,
            ctx,
            error: None,
        }
    }

    fn send(&mut self, header: &PacketHeader, payload: &[u8]) {
        let len = serial::encode(header, payload, self.buffer);
        let packet = &mut self.buffer[..len];

        checksum::seal(packet);

        match self.ctx.send_datagram(packet) {
            Ok(()) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += len as u64;
            }
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err.kind());
                }
            }
        }
    }

    fn send_reliable(&mut self, header: &ReliableHeader, payload: &[u8]) {
        self.send(&PacketHeader::Reliable(*header), payload);
    }
}

/// The protocol engine for one connection. Performs no I/O and keeps no clock of its own: every
/// entry point takes the current time, and output is passed to a [`HostContext`].
pub struct Endpoint {
    state: State,
    reliable: ReliableChannel,
    unreliable: UnreliableChannel,
    liveness: Liveness,
    connect_latch: Latch,
    disconnect_latch: Latch,
    tick_interval_ms: u64,
    tx_buffer: Box<[u8]>,
    stats: Stats,
}

impl Endpoint {
    /// Creates an endpoint in the `Connecting` state. `config` must be valid.
    pub fn new(config: &Config, now_ms: u64) -> Self {
        Self {
            state: State::Connecting,
            reliable: ReliableChannel::new(config),
            unreliable: UnreliableChannel::new(config.mtu, config.send_window_size as usize),
            liveness: Liveness::new(now_ms, config.idle_timeout_ms),
            connect_latch: Latch::default(),
            disconnect_latch: Latch::default(),
            tick_interval_ms: config.tick_interval_ms,
            tx_buffer: vec![0; config.mtu].into_boxed_slice(),
            stats: Stats::default(),
        }
    }

    /// Begins the handshake by sending a Hello.
    pub fn open<C>(&mut self, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        debug_assert_eq!(self.state, State::Connecting);

        self.reliable.send_hello();
        self.flush(now_ms, ctx);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn stats(&self) -> Stats {
        Stats {
            retransmits: self.reliable.retransmit_count(),
            ..self.stats
        }
    }

    /// Current retransmission timeout, in milliseconds.
    pub fn rto_ms(&self) -> u64 {
        self.reliable.rto_ms()
    }

    /// Number of reliable segments awaiting acknowledgement.
    #[cfg(test)]
    pub fn unacknowledged(&self) -> usize {
        self.reliable.unacknowledged()
    }

    /// Sequence number of the next reliable segment expected from the peer.
    #[cfg(test)]
    pub fn next_expected(&self) -> u32 {
        self.reliable.next_expected()
    }

    /// Validates and processes a datagram received from the peer. Invalid datagrams are counted
    /// and otherwise ignored.
    pub fn handle_datagram<C>(&mut self, bytes: &[u8], now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        if self.state.is_closed() {
            return;
        }

        if let Err(err) = checksum::verify(bytes) {
            if err.is_corrupt() {
                self.stats.corrupt_dropped += 1;
            } else {
                self.stats.malformed_dropped += 1;
            }
            tracing::trace!("dropping datagram: {}", err);
            return;
        }

        let packet = match serial::decode(bytes) {
            Ok((packet, _)) => packet,
            Err(err) => {
                self.stats.malformed_dropped += 1;
                tracing::trace!("dropping datagram: {}", err);
                return;
            }
        };

        self.stats.packets_received += 1;
        self.stats.bytes_received += bytes.len() as u64;
        self.liveness.on_receive(now_ms);

        match packet.header {
            PacketHeader::Unreliable => {
                if self.state == State::Connected {
                    ctx.on_receive(Channel::Unreliable, packet.payload.into());
                } else {
                    tracing::trace!("dropping unreliable message received before handshake");
                }
            }
            PacketHeader::Reliable(ReliableHeader {
                kind: ReliableKind::Ack,
                sequence,
            }) => {
                let mut tx = Transmitter::new(&mut self.tx_buffer, &mut self.stats, ctx);

                self.reliable
                    .on_ack_received(sequence, now_ms, &mut |h, p| tx.send_reliable(h, p));
                self.reliable.flush(now_ms, &mut |h, p| tx.send_reliable(h, p));

                let error = tx.error;
                self.handle_send_error(error, ctx);
            }
            PacketHeader::Reliable(header) => {
                let mut deliveries = Vec::new();

                let receipt = self
                    .reliable
                    .on_segment_received(&header, packet.payload, |d| deliveries.push(d));

                if receipt != Receipt::Accepted {
                    self.stats.segments_discarded += 1;
                    tracing::trace!("discarding segment {}: {:?}", header.sequence, receipt);
                }

                for delivery in deliveries {
                    if self.state.is_closed() {
                        break;
                    }

                    match delivery {
                        Delivery::Hello => self.apply(Input::HelloReceived, ctx),
                        Delivery::Goodbye => self.apply(Input::GoodbyeReceived, ctx),
                        Delivery::Message(payload) => {
                            if self.state == State::Connected {
                                ctx.on_receive(Channel::Reliable, payload);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Queues a reliable message and transmits as much as the windows allow.
    pub fn send_reliable<C>(
        &mut self,
        payload: &[u8],
        now_ms: u64,
        ctx: &mut C,
    ) -> Result<(), SendError>
    where
        C: HostContext,
    {
        if self.state.is_closed() {
            return Err(SendError::SendAfterClose);
        }

        self.reliable.send(payload)?;
        self.flush(now_ms, ctx);

        Ok(())
    }

    /// Sends an unreliable message immediately, or holds it until the handshake completes.
    pub fn send_unreliable<C>(&mut self, payload: &[u8], ctx: &mut C) -> Result<(), SendError>
    where
        C: HostContext,
    {
        if self.state.is_closed() {
            return Err(SendError::SendAfterClose);
        }

        self.unreliable.validate(payload)?;

        if self.state == State::Connecting {
            self.unreliable.hold(payload);
            return Ok(());
        }

        let mut tx = Transmitter::new(&mut self.tx_buffer, &mut self.stats, ctx);
        tx.send(&PacketHeader::Unreliable, payload);

        let error = tx.error;
        self.handle_send_error(error, ctx);

        Ok(())
    }

    /// Drives retransmission, acknowledgement and liveness. Does nothing once closed.
    pub fn tick<C>(&mut self, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        if self.state.is_closed() {
            return;
        }

        if self.liveness.is_expired(now_ms) {
            tracing::debug!(
                "no traffic since {} ms, connection timed out",
                self.liveness.last_received_ms()
            );
            self.apply(Input::IdleTimeout, ctx);
            return;
        }

        let mut tx = Transmitter::new(&mut self.tx_buffer, &mut self.stats, ctx);

        let result = self.reliable.tick(now_ms, &mut |h, p| tx.send_reliable(h, p));

        if result.is_ok() {
            self.reliable.flush(now_ms, &mut |h, p| tx.send_reliable(h, p));
        }

        let error = tx.error;

        if result.is_err() {
            tracing::debug!("retransmission limit reached");
            self.apply(Input::RetransmitExhausted, ctx);
            return;
        }

        self.handle_send_error(error, ctx);
    }

    /// Closes the connection, sending a Goodbye on a best-effort basis.
    pub fn disconnect<C>(&mut self, ctx: &mut C)
    where
        C: HostContext,
    {
        self.apply(Input::Disconnect, ctx);
    }

    /// Returns the time until [`Endpoint::tick`] should next be called, or `None` once closed.
    pub fn next_tick_delay_ms(&self, now_ms: u64) -> Option<u64> {
        if self.state.is_closed() {
            return None;
        }

        if self.reliable.ack_pending() {
            return Some(MIN_TICK_INTERVAL_MS);
        }

        let mut deadline_ms = self.liveness.deadline_ms();

        if let Some(rto_deadline_ms) = self.reliable.next_deadline_ms() {
            deadline_ms = deadline_ms.min(rto_deadline_ms);
        }

        let delay_ms = deadline_ms.saturating_sub(now_ms).min(self.tick_interval_ms);

        Some(delay_ms.max(MIN_TICK_INTERVAL_MS))
    }

    fn flush<C>(&mut self, now_ms: u64, ctx: &mut C)
    where
        C: HostContext,
    {
        let mut tx = Transmitter::new(&mut self.tx_buffer, &mut self.stats, ctx);

        self.reliable.flush(now_ms, &mut |h, p| tx.send_reliable(h, p));

        let error = tx.error;
        self.handle_send_error(error, ctx);
    }

    fn handle_send_error<C>(&mut self, error: Option<io::ErrorKind>, ctx: &mut C)
    where
        C: HostContext,
    {
        if let Some(kind) = error {
            tracing::debug!("socket send failed: {:?}", kind);
            self.apply(Input::SocketError(kind), ctx);
        }
    }

    fn apply<C>(&mut self, input: Input, ctx: &mut C)
    where
        C: HostContext,
    {
        let (state, actions) = state::transition(self.state, input);

        self.state = state;

        for action in actions {
            match action {
                Action::NotifyConnect => {
                    if self.connect_latch.fire() {
                        tracing::debug!("connection established");
                        ctx.on_connect();
                        self.flush_held_unreliable(ctx);
                    }
                }
                Action::SendGoodbye => {
                    let header = self.reliable.goodbye_header();

                    // Send errors are ignored, the peer will time out instead
                    let mut tx = Transmitter::new(&mut self.tx_buffer, &mut self.stats, ctx);
                    tx.send_reliable(&header, &[]);
                }
                Action::DiscardBuffers => {
                    self.reliable.clear();
                    self.unreliable.clear();
                }
                Action::NotifyDisconnect(cause) => {
                    if self.disconnect_latch.fire() {
                        tracing::debug!("connection closed: {}", cause);
                        ctx.on_disconnect(cause);
                    }
                }
            }
        }
    }

    fn flush_held_unreliable<C>(&mut self, ctx: &mut C)
    where
        C: HostContext,
    {
        let held = self.unreliable.take_pending();

        if held.is_empty() {
            return;
        }

        let mut tx = Transmitter::new(&mut self.tx_buffer, &mut self.stats, ctx);

        for payload in held.iter() {
            tx.send(&PacketHeader::Unreliable, payload);
        }

        let error = tx.error;
        self.handle_send_error(error, ctx);
    }
}
