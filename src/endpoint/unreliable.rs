use std::collections::VecDeque;

use crate::error::SendError;
use crate::frame::serial;

/// Best-effort messages. No sequencing, acknowledgement or retransmission.
pub struct UnreliableChannel {
    payload_size_max: usize,
    // Messages submitted before the handshake completed
    pending: VecDeque<Box<[u8]>>,
    pending_max: usize,
}

impl UnreliableChannel {
    pub fn new(mtu: usize, pending_max: usize) -> Self {
        Self {
            payload_size_max: mtu - serial::UNRELIABLE_HEADER_SIZE,
            pending: VecDeque::new(),
            pending_max,
        }
    }

    #[cfg(test)]
    pub fn payload_size_max(&self) -> usize {
        self.payload_size_max
    }

    pub fn validate(&self, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > self.payload_size_max {
            return Err(SendError::MessageTooLarge {
                len: payload.len(),
                max: self.payload_size_max,
            });
        }
        Ok(())
    }

    /// Holds a message until the connection is established. The oldest message is dropped if the
    /// queue is full, as it would have been stale by the time it arrived.
    pub fn hold(&mut self, payload: &[u8]) {
        if self.pending.len() >= self.pending_max {
            self.pending.pop_front();
        }
        self.pending.push_back(payload.into());
    }

    pub fn take_pending(&mut self) -> VecDeque<Box<[u8]>> {
        std::mem::take(&mut self.pending)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_limit() {
        let channel = UnreliableChannel::new(100, 4);

        assert_eq!(channel.payload_size_max(), 91);
        assert_eq!(channel.validate(&[0; 91]), Ok(()));
        assert_eq!(
            channel.validate(&[0; 92]),
            Err(SendError::MessageTooLarge { len: 92, max: 91 })
        );
    }

    #[test]
    fn hold_drops_oldest() {
        let mut channel = UnreliableChannel::new(100, 2);

        channel.hold(&[1]);
        channel.hold(&[2]);
        channel.hold(&[3]);

        let pending: Vec<_> = channel.take_pending().into_iter().collect();
        assert_eq!(
            pending,
            vec![vec![2u8].into_boxed_slice(), vec![3u8].into_boxed_slice()]
        );
        assert!(channel.take_pending().is_empty());
    }
}
