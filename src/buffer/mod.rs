mod receive;
mod segment;
mod send;

/// A range of `size` sequence numbers beginning at `base_id`, compared with wrapping arithmetic.
#[derive(Clone, Copy, Debug)]
pub struct Window {
    pub base_id: u32,
    pub size: u32,
}

impl Window {
    pub fn new(base_id: u32, size: u32) -> Self {
        Self { base_id, size }
    }

    pub fn contains(&self, id: u32) -> bool {
        let delta = id.wrapping_sub(self.base_id);
        return delta < self.size;
    }

    /// Returns true if `id` precedes the window, i.e. lies within the half of the sequence space
    /// behind `base_id`.
    pub fn precedes(&self, id: u32) -> bool {
        let delta = self.base_id.wrapping_sub(id);
        return delta != 0 && delta <= u32::MAX / 2;
    }
}

pub use receive::Delivery;
pub use receive::Receipt;
pub use receive::ReceiveWindow;
pub use segment::Segment;
pub use send::SendWindow;
