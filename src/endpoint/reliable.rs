use super::cc::AimdReno;
use super::rtt::RttEstimator;
use super::Config;
use crate::buffer::{Delivery, Receipt, ReceiveWindow, SendWindow};
use crate::error::SendError;
use crate::frame::{serial, ReliableHeader, ReliableKind};

/// Raised when a segment has been retransmitted more than the configured maximum.
#[derive(Debug, PartialEq, Eq)]
pub struct RetransmitExhausted;

/// Sliding-window ARQ: sequencing, cumulative acknowledgement, retransmission and reordering.
pub struct ReliableChannel {
    send: SendWindow,
    receive: ReceiveWindow,
    rtt: RttEstimator,
    cc: AimdReno,
    congestion_control: bool,
    segment_size_max: usize,
    max_retransmits: u32,
    fast_resend: u32,
    duplicate_acks: u32,
    ack_pending: bool,
    // Set after warning about a full window, until the window drains
    saturated: bool,
    // Set from a retransmission timeout until no transmitted segment remains expired
    recovering: bool,
    retransmit_count: u64,
}

impl ReliableChannel {
    pub fn new(config: &Config) -> Self {
        let segment_size_max = config.mtu - serial::RELIABLE_HEADER_SIZE;
        let window_max = config.send_window_size.max(config.receive_window_size) as usize;

        Self {
            send: SendWindow::new(config.send_window_size as usize),
            receive: ReceiveWindow::new(config.receive_window_size, window_max * segment_size_max),
            rtt: RttEstimator::new(config.initial_rto_ms, config.rto_min_ms, config.rto_max_ms),
            cc: AimdReno::new(config.send_window_size as usize),
            congestion_control: config.congestion_control,
            segment_size_max,
            max_retransmits: config.max_retransmits,
            fast_resend: config.fast_resend,
            duplicate_acks: 0,
            ack_pending: false,
            saturated: false,
            recovering: false,
            retransmit_count: 0,
        }
    }

    /// Largest message accepted by [`ReliableChannel::send`].
    pub fn message_size_max(&self) -> usize {
        self.send.capacity() * self.segment_size_max
    }

    fn segment_count(&self, len: usize) -> usize {
        len.div_ceil(self.segment_size_max).max(1)
    }

    /// Queues the handshake token. Must be the first segment sent.
    pub fn send_hello(&mut self) {
        debug_assert!(self.send.is_empty());
        self.send.push(ReliableKind::Hello, Box::new([]));
    }

    /// Splits `payload` into segments and appends them to the send window. Either the whole
    /// message is queued, or none of it.
    pub fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let count = self.segment_count(payload.len());

        if count > self.send.capacity() {
            return Err(SendError::MessageTooLarge {
                len: payload.len(),
                max: self.message_size_max(),
            });
        }

        if !self.has_room_for(payload.len()) {
            if !self.saturated {
                self.saturated = true;
                tracing::warn!(
                    "send window saturated ({} segments unacknowledged); sender will block",
                    self.send.len()
                );
            }
            return Err(SendError::WouldBlock);
        }

        if payload.is_empty() {
            self.send.push(ReliableKind::Data { more: false }, Box::new([]));
        } else {
            for (idx, chunk) in payload.chunks(self.segment_size_max).enumerate() {
                let more = idx + 1 < count;
                self.send.push(ReliableKind::Data { more }, chunk.into());
            }
        }

        Ok(())
    }

    /// Returns true if a message of `len` bytes would be accepted by [`ReliableChannel::send`]
    /// right now.
    pub fn has_room_for(&self, len: usize) -> bool {
        self.segment_count(len) <= self.send.free()
    }

    fn send_limit(&self) -> usize {
        if self.congestion_control {
            self.cc.cwnd().clamp(1, self.send.capacity())
        } else {
            self.send.capacity()
        }
    }

    /// Transmits segments which have never been sent, as far as the congestion window allows.
    pub fn flush<F>(&mut self, now_ms: u64, emit: &mut F)
    where
        F: FnMut(&ReliableHeader, &[u8]),
    {
        let in_flight = self.send.transmitted_count();
        let budget = self.send_limit().saturating_sub(in_flight);
        let rto_ms = self.rtt.rto_ms();

        for segment in self.send.iter_mut().skip(in_flight).take(budget) {
            segment.transmitted = true;
            segment.sent_ms = now_ms;
            segment.rto_ms = rto_ms;

            let header = ReliableHeader {
                kind: segment.kind,
                sequence: segment.sequence,
            };
            emit(&header, &segment.payload[..]);
        }
    }

    /// Processes a cumulative acknowledgement.
    pub fn on_ack_received<F>(&mut self, ack_sequence: u32, now_ms: u64, emit: &mut F)
    where
        F: FnMut(&ReliableHeader, &[u8]),
    {
        match self.send.acknowledge(ack_sequence, now_ms) {
            Some(acked) => {
                self.duplicate_acks = 0;

                if let Some(rtt_ms) = acked.rtt_sample_ms {
                    self.rtt.sample(rtt_ms);
                }

                for _ in 0..acked.count {
                    self.cc.handle_ack();
                }

                if self.send.is_empty() {
                    self.saturated = false;
                }
            }
            None => {
                let in_flight = self.send.transmitted_count() > 0;
                let duplicate = ack_sequence == self.send.base_sequence().wrapping_sub(1);

                if self.fast_resend > 0 && in_flight && duplicate {
                    self.duplicate_acks += 1;

                    if self.duplicate_acks >= self.fast_resend {
                        self.duplicate_acks = 0;
                        self.fast_retransmit(now_ms, emit);
                    }
                }
            }
        }
    }

    fn fast_retransmit<F>(&mut self, now_ms: u64, emit: &mut F)
    where
        F: FnMut(&ReliableHeader, &[u8]),
    {
        if let Some(segment) = self.send.front_mut() {
            segment.retransmits += 1;
            segment.sent_ms = now_ms;

            tracing::trace!("fast retransmit of segment {}", segment.sequence);

            let header = ReliableHeader {
                kind: segment.kind,
                sequence: segment.sequence,
            };
            emit(&header, &segment.payload[..]);

            self.retransmit_count += 1;
            self.cc.handle_drop();
        }
    }

    /// Accepts an inbound sequenced segment. An acknowledgement is scheduled regardless of
    /// whether the segment was new.
    pub fn on_segment_received<F>(
        &mut self,
        header: &ReliableHeader,
        payload: &[u8],
        deliver: F,
    ) -> Receipt
    where
        F: FnMut(Delivery),
    {
        self.ack_pending = true;
        self.receive.receive(header.sequence, header.kind, payload, deliver)
    }

    /// Retransmits segments whose timeout has elapsed and sends any pending acknowledgement.
    ///
    /// Expired segments are considered lost. Those still awaiting their timeout count against the
    /// congestion window, and expired segments are resent only as far as the window allows. The
    /// rest remain expired and are resent on later ticks.
    pub fn tick<F>(&mut self, now_ms: u64, emit: &mut F) -> Result<(), RetransmitExhausted>
    where
        F: FnMut(&ReliableHeader, &[u8]),
    {
        let mut outstanding = 0;
        let mut expired = 0;

        for segment in self.send.iter().take_while(|segment| segment.transmitted) {
            if segment.is_expired(now_ms) {
                expired += 1;
            } else {
                outstanding += 1;
            }
        }

        if expired == 0 {
            self.recovering = false;
        } else if !self.recovering {
            self.recovering = true;
            self.cc.handle_timeout();
        }

        let budget = self.send_limit().saturating_sub(outstanding);
        let max_retransmits = self.max_retransmits;
        let rto_max_ms = self.rtt.rto_max_ms();

        let due = self
            .send
            .iter_mut()
            .take_while(|segment| segment.transmitted)
            .filter(|segment| segment.is_expired(now_ms))
            .take(budget);

        for segment in due {
            segment.retransmits += 1;

            if segment.retransmits > max_retransmits {
                return Err(RetransmitExhausted);
            }

            segment.sent_ms = now_ms;
            segment.rto_ms = segment.rto_ms.saturating_mul(2).min(rto_max_ms);

            tracing::trace!(
                "retransmit {} of segment {}, next timeout {} ms",
                segment.retransmits,
                segment.sequence,
                segment.rto_ms
            );

            let header = ReliableHeader {
                kind: segment.kind,
                sequence: segment.sequence,
            };
            emit(&header, &segment.payload[..]);

            self.retransmit_count += 1;
        }

        self.flush_ack(emit);

        Ok(())
    }

    /// Sends a cumulative acknowledgement if one is pending.
    pub fn flush_ack<F>(&mut self, emit: &mut F)
    where
        F: FnMut(&ReliableHeader, &[u8]),
    {
        if self.ack_pending {
            self.ack_pending = false;

            let header = ReliableHeader {
                kind: ReliableKind::Ack,
                sequence: self.receive.cumulative_ack(),
            };
            emit(&header, &[]);
        }
    }

    pub fn ack_pending(&self) -> bool {
        self.ack_pending
    }

    /// The earliest time at which a retransmission will be due.
    pub fn next_deadline_ms(&self) -> Option<u64> {
        self.send
            .iter()
            .take_while(|segment| segment.transmitted)
            .map(|segment| segment.expiry_ms())
            .min()
    }

    /// Allocates a sequence number for a Goodbye. The Goodbye is sent once and never stored, since
    /// nothing is retransmitted after close.
    pub fn goodbye_header(&mut self) -> ReliableHeader {
        ReliableHeader {
            kind: ReliableKind::Goodbye,
            sequence: self.send.allocate_sequence(),
        }
    }

    pub fn clear(&mut self) {
        self.send.clear();
        self.receive.clear();
        self.ack_pending = false;
    }

    #[cfg(test)]
    pub fn unacknowledged(&self) -> usize {
        self.send.len()
    }

    #[cfg(test)]
    pub fn next_expected(&self) -> u32 {
        self.receive.next_expected()
    }

    pub fn retransmit_count(&self) -> u64 {
        self.retransmit_count
    }

    pub fn rto_ms(&self) -> u64 {
        self.rtt.rto_ms()
    }
}
