use std::collections::VecDeque;

use super::Segment;
use crate::frame::ReliableKind;

/// Result of a cumulative acknowledgement which advanced the window.
#[derive(Debug, PartialEq, Eq)]
pub struct Acknowledged {
    /// Number of segments removed from the window
    pub count: usize,
    /// Round trip time of the acknowledged segment, if it was never retransmitted
    pub rtt_sample_ms: Option<u64>,
}

/// Unacknowledged reliable segments, in sequence order. Transmitted segments always form a prefix
/// of the window.
pub struct SendWindow {
    segments: VecDeque<Segment>,
    next_sequence: u32,
    capacity: usize,
}

impl SendWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            segments: VecDeque::new(),
            next_sequence: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments which may be pushed at present.
    pub fn free(&self) -> usize {
        self.capacity - self.segments.len()
    }

    /// Sequence number of the oldest unacknowledged segment, or of the next segment to be pushed
    /// if the window is empty.
    pub fn base_sequence(&self) -> u32 {
        self.segments
            .front()
            .map_or(self.next_sequence, |segment| segment.sequence)
    }

    /// Number of segments which have been sent at least once.
    pub fn transmitted_count(&self) -> usize {
        self.segments.partition_point(|segment| segment.transmitted)
    }

    /// Appends a new segment and returns its sequence number.
    ///
    /// Panics if the window is full.
    pub fn push(&mut self, kind: ReliableKind, payload: Box<[u8]>) -> u32 {
        assert!(self.segments.len() < self.capacity, "send window overflow");

        let sequence = self.allocate_sequence();
        self.segments.push_back(Segment::new(sequence, kind, payload));
        sequence
    }

    /// Consumes a sequence number without storing a segment for it.
    pub fn allocate_sequence(&mut self) -> u32 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    /// Removes every segment up to and including `ack_sequence`. Returns `None` if the ack does
    /// not name a transmitted segment in the window.
    pub fn acknowledge(&mut self, ack_sequence: u32, now_ms: u64) -> Option<Acknowledged> {
        let delta = ack_sequence.wrapping_sub(self.base_sequence()) as usize;

        if delta >= self.transmitted_count() {
            return None;
        }

        let matched = &self.segments[delta];
        let rtt_sample_ms = if matched.retransmits == 0 {
            Some(now_ms.saturating_sub(matched.sent_ms))
        } else {
            None
        };

        let count = delta + 1;
        self.segments.drain(..count);

        Some(Acknowledged {
            count,
            rtt_sample_ms,
        })
    }

    pub fn front_mut(&mut self) -> Option<&mut Segment> {
        self.segments.front_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Segment> {
        self.segments.iter_mut()
    }

    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: ReliableKind = ReliableKind::Data { more: false };

    fn transmit_all(window: &mut SendWindow, now_ms: u64) {
        for segment in window.iter_mut() {
            segment.transmitted = true;
            segment.sent_ms = now_ms;
        }
    }

    #[test]
    fn capacity() {
        let mut window = SendWindow::new(4);

        for i in 0..4u32 {
            assert_eq!(window.push(DATA, Box::new([i as u8])), i);
        }

        assert_eq!(window.free(), 0);
        assert_eq!(window.base_sequence(), 0);
    }

    #[test]
    #[should_panic]
    fn overflow() {
        let mut window = SendWindow::new(1);
        window.push(DATA, Box::new([]));
        window.push(DATA, Box::new([]));
    }

    #[test]
    fn cumulative_ack() {
        let mut window = SendWindow::new(8);

        for _ in 0..5 {
            window.push(DATA, Box::new([]));
        }
        transmit_all(&mut window, 100);

        assert_eq!(
            window.acknowledge(2, 130),
            Some(Acknowledged {
                count: 3,
                rtt_sample_ms: Some(30)
            })
        );
        assert_eq!(window.len(), 2);
        assert_eq!(window.base_sequence(), 3);

        // Duplicate and stale acks change nothing
        assert_eq!(window.acknowledge(2, 140), None);
        assert_eq!(window.acknowledge(0, 140), None);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn ack_of_untransmitted_segment_ignored() {
        let mut window = SendWindow::new(8);

        window.push(DATA, Box::new([]));
        window.push(DATA, Box::new([]));
        window.front_mut().unwrap().transmitted = true;

        assert_eq!(window.transmitted_count(), 1);
        assert_eq!(window.acknowledge(1, 0), None);
        assert!(window.acknowledge(0, 0).is_some());
    }

    #[test]
    fn retransmitted_segment_yields_no_sample() {
        let mut window = SendWindow::new(8);

        window.push(DATA, Box::new([]));
        transmit_all(&mut window, 0);
        window.front_mut().unwrap().retransmits = 1;

        assert_eq!(
            window.acknowledge(0, 500),
            Some(Acknowledged {
                count: 1,
                rtt_sample_ms: None
            })
        );
    }

    #[test]
    fn wrapping_sequences() {
        let mut window = SendWindow::new(8);
        window.next_sequence = u32::MAX - 1;

        for _ in 0..4 {
            window.push(DATA, Box::new([]));
        }
        transmit_all(&mut window, 0);

        assert_eq!(window.acknowledge(0, 0).map(|a| a.count), Some(3));
        assert_eq!(window.base_sequence(), 1);
    }
}
