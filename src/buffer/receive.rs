use std::collections::VecDeque;

use super::Window;
use crate::frame::ReliableKind;

/// An in-order event produced by the reliable receive path.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Hello,
    Goodbye,
    Message(Box<[u8]>),
}

/// Disposition of a received segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Receipt {
    Accepted,
    Duplicate,
    OutOfWindow,
}

struct Entry {
    kind: ReliableKind,
    payload: Box<[u8]>,
}

/// Reorder buffer for reliable segments. Holds segments in `[next_expected, next_expected +
/// size)` and releases them strictly in sequence order, reassembling fragmented messages.
pub struct ReceiveWindow {
    window: Window,
    // Index 0 corresponds to window.base_id
    slots: VecDeque<Option<Entry>>,
    reassembly: Vec<u8>,
    // Set while dropping the remainder of an oversized message
    discarding: bool,
    message_size_max: usize,
}

impl ReceiveWindow {
    pub fn new(size: u32, message_size_max: usize) -> Self {
        Self {
            window: Window::new(0, size),
            slots: VecDeque::new(),
            reassembly: Vec::new(),
            discarding: false,
            message_size_max,
        }
    }

    #[cfg(test)]
    pub fn next_expected(&self) -> u32 {
        self.window.base_id
    }

    /// The sequence number named by a cumulative acknowledgement: the highest contiguous
    /// sequence received.
    pub fn cumulative_ack(&self) -> u32 {
        self.window.base_id.wrapping_sub(1)
    }

    /// Number of out-of-order segments currently buffered.
    #[cfg(test)]
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Accepts a segment, invoking `deliver` for every event which becomes deliverable in order.
    /// A `Goodbye` is ordered like any other segment, so everything sent before it is delivered
    /// first.
    pub fn receive<F>(
        &mut self,
        sequence: u32,
        kind: ReliableKind,
        payload: &[u8],
        mut deliver: F,
    ) -> Receipt
    where
        F: FnMut(Delivery),
    {
        if !self.window.contains(sequence) {
            if self.window.precedes(sequence) {
                return Receipt::Duplicate;
            } else {
                return Receipt::OutOfWindow;
            }
        }

        let idx = sequence.wrapping_sub(self.window.base_id) as usize;

        if self.slots.len() <= idx {
            self.slots.resize_with(idx + 1, || None);
        }

        if self.slots[idx].is_some() {
            return Receipt::Duplicate;
        }

        self.slots[idx] = Some(Entry {
            kind,
            payload: payload.into(),
        });

        // Release the contiguous run at the front of the window
        while let Some(Some(_)) = self.slots.front() {
            if let Some(Some(entry)) = self.slots.pop_front() {
                self.window.base_id = self.window.base_id.wrapping_add(1);
                self.release(entry, &mut deliver);
            }
        }

        Receipt::Accepted
    }

    fn release<F>(&mut self, entry: Entry, deliver: &mut F)
    where
        F: FnMut(Delivery),
    {
        match entry.kind {
            ReliableKind::Hello => deliver(Delivery::Hello),
            ReliableKind::Goodbye => deliver(Delivery::Goodbye),
            ReliableKind::Data { more } => {
                if !self.discarding {
                    self.reassembly.extend_from_slice(&entry.payload);

                    if self.reassembly.len() > self.message_size_max {
                        tracing::warn!(
                            "discarding reassembled message exceeding {} bytes",
                            self.message_size_max
                        );
                        self.reassembly = Vec::new();
                        self.discarding = true;
                    }
                }

                if !more {
                    if self.discarding {
                        self.discarding = false;
                    } else {
                        let message = std::mem::take(&mut self.reassembly);
                        deliver(Delivery::Message(message.into_boxed_slice()));
                    }
                }
            }
            // Never buffered
            ReliableKind::Ack => {}
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.reassembly = Vec::new();
        self.discarding = false;
    }
}
