use std::time::Instant;

/// Shared time base. Engine timestamps are whole milliseconds elapsed since the epoch was created,
/// so every connection of a server agrees on the clock.
#[derive(Clone, Copy, Debug)]
pub struct Epoch {
    time_base: Instant,
}

impl Default for Epoch {
    fn default() -> Self {
        Self {
            time_base: Instant::now(),
        }
    }
}

impl Epoch {
    pub fn now_ms(&self) -> u64 {
        self.time_base.elapsed().as_millis() as u64
    }
}
