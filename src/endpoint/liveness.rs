/// Detects a peer which has gone silent.
pub struct Liveness {
    last_received_ms: u64,
    idle_timeout_ms: u64,
}

impl Liveness {
    pub fn new(now_ms: u64, idle_timeout_ms: u64) -> Self {
        Self {
            last_received_ms: now_ms,
            idle_timeout_ms,
        }
    }

    /// Records receipt of a valid packet.
    pub fn on_receive(&mut self, now_ms: u64) {
        self.last_received_ms = self.last_received_ms.max(now_ms);
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_received_ms) > self.idle_timeout_ms
    }

    /// The earliest time at which the peer will be considered lost.
    pub fn deadline_ms(&self) -> u64 {
        self.last_received_ms + self.idle_timeout_ms + 1
    }

    pub fn last_received_ms(&self) -> u64 {
        self.last_received_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry() {
        let liveness = Liveness::new(1000, 500);

        assert!(!liveness.is_expired(1000));
        assert!(!liveness.is_expired(1500));
        assert!(liveness.is_expired(1501));
        assert_eq!(liveness.deadline_ms(), 1501);
    }

    #[test]
    fn late_packet_resets_timer() {
        let mut liveness = Liveness::new(0, 1000);

        // 90% of the timeout has elapsed
        liveness.on_receive(900);

        assert!(!liveness.is_expired(1001));
        assert!(!liveness.is_expired(1900));
        assert!(liveness.is_expired(1901));
    }
}
