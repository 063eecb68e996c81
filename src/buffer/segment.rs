use crate::frame::ReliableKind;

/// A sequenced unit of the reliable channel, held by the sender until acknowledged.
#[derive(Debug)]
pub struct Segment {
    pub sequence: u32,
    pub kind: ReliableKind,
    pub payload: Box<[u8]>,
    // Set once the segment has been placed on the wire
    pub transmitted: bool,
    // Time of the most recent (re)transmission
    pub sent_ms: u64,
    // Timeout for this segment, doubled on each retransmission
    pub rto_ms: u64,
    pub retransmits: u32,
}

impl Segment {
    pub fn new(sequence: u32, kind: ReliableKind, payload: Box<[u8]>) -> Self {
        Self {
            sequence,
            kind,
            payload,
            transmitted: false,
            sent_ms: 0,
            rto_ms: 0,
            retransmits: 0,
        }
    }

    /// Returns true if the segment has been sent and its timeout has elapsed.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.transmitted && now_ms.saturating_sub(self.sent_ms) > self.rto_ms
    }

    /// The earliest time at which [`Segment::is_expired`] becomes true.
    pub fn expiry_ms(&self) -> u64 {
        self.sent_ms + self.rto_ms + 1
    }
}
