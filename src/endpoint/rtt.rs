// Retransmission timeout estimation as described in RFC 6298

/// Smoothed round-trip time and the retransmission timeout derived from it, in milliseconds.
#[derive(Clone, Debug)]
pub struct RttEstimator {
    smoothed_ms: Option<u64>,
    var_ms: u64,
    rto_ms: u64,
    rto_min_ms: u64,
    rto_max_ms: u64,
}

impl RttEstimator {
    pub fn new(initial_rto_ms: u64, rto_min_ms: u64, rto_max_ms: u64) -> Self {
        debug_assert!(rto_min_ms <= rto_max_ms);

        Self {
            smoothed_ms: None,
            var_ms: 0,
            rto_ms: initial_rto_ms.clamp(rto_min_ms, rto_max_ms),
            rto_min_ms,
            rto_max_ms,
        }
    }

    /// Incorporates a round-trip sample. Samples must not be taken from retransmitted segments.
    pub fn sample(&mut self, rtt_ms: u64) {
        let smoothed_ms = match self.smoothed_ms {
            None => {
                // First measurement [2.2]
                self.var_ms = rtt_ms / 2;
                rtt_ms
            }
            Some(smoothed_ms) => {
                // Subsequent measurements, alpha = 1/8, beta = 1/4 [2.3]
                self.var_ms = (3 * self.var_ms + smoothed_ms.abs_diff(rtt_ms)) / 4;
                (7 * smoothed_ms + rtt_ms) / 8
            }
        };

        self.smoothed_ms = Some(smoothed_ms);

        // Clock granularity is one millisecond
        let rto_ms = smoothed_ms.saturating_add((4 * self.var_ms).max(1));
        self.rto_ms = rto_ms.clamp(self.rto_min_ms, self.rto_max_ms);
    }

    pub fn rto_ms(&self) -> u64 {
        self.rto_ms
    }

    #[cfg(test)]
    pub fn smoothed_ms(&self) -> Option<u64> {
        self.smoothed_ms
    }

    pub fn rto_max_ms(&self) -> u64 {
        self.rto_max_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_rto() {
        let rtt = RttEstimator::new(200, 100, 60_000);
        assert_eq!(rtt.rto_ms(), 200);
        assert_eq!(rtt.smoothed_ms(), None);

        let rtt = RttEstimator::new(50, 100, 60_000);
        assert_eq!(rtt.rto_ms(), 100);
    }

    #[test]
    fn first_sample() {
        let mut rtt = RttEstimator::new(200, 10, 60_000);
        rtt.sample(100);

        // srtt + 4 * rttvar = 100 + 4 * 50
        assert_eq!(rtt.smoothed_ms(), Some(100));
        assert_eq!(rtt.rto_ms(), 300);
    }

    #[test]
    fn converges() {
        let mut rtt = RttEstimator::new(200, 10, 60_000);

        for _ in 0..100 {
            rtt.sample(40);
        }

        assert_eq!(rtt.smoothed_ms(), Some(40));
        // Variance decays toward zero, leaving the 1 ms granularity term
        assert!(rtt.rto_ms() <= 45, "rto {} did not converge", rtt.rto_ms());
    }

    #[test]
    fn clamped() {
        let mut rtt = RttEstimator::new(200, 100, 1_000);

        rtt.sample(1);
        assert_eq!(rtt.rto_ms(), 100);

        rtt.sample(5_000);
        assert_eq!(rtt.rto_ms(), 1_000);
    }
}
