// This implementation of TCP-Reno-like congestion control has been informed by:
// https://intronetworks.cs.luc.edu/current/html/reno.html
//
// The window is counted in segments rather than bytes, since every segment but the last of a
// message fills an entire datagram.

const INITIAL_CWND_SEGMENTS: u64 = 10;
const MIN_CWND_SEGMENTS: u64 = 2;

const ONE_Q16: u64 = 1 << 16;

enum Mode {
    UnboundedSlowStart,
    ThresholdSlowStart(u64),
    CongestionAvoidance,
}

pub struct AimdReno {
    mode: Mode,
    cwnd_q16: u64,
    cwnd_max_q16: u64,
    dropcnt_q16: u64,
}

impl AimdReno {
    /// Creates a controller whose window never grows beyond `cwnd_max` segments.
    pub fn new(cwnd_max: usize) -> Self {
        let cwnd_max_q16 = (cwnd_max.max(1) as u64).saturating_mul(ONE_Q16);

        Self {
            mode: Mode::UnboundedSlowStart,
            cwnd_q16: (INITIAL_CWND_SEGMENTS * ONE_Q16).min(cwnd_max_q16),
            cwnd_max_q16,
            dropcnt_q16: 0,
        }
    }

    /// Called once per newly acknowledged segment.
    pub fn handle_ack(&mut self) {
        // Window has advanced, subtract from drop counter
        self.dropcnt_q16 = self.dropcnt_q16.saturating_sub(ONE_Q16);

        match self.mode {
            Mode::UnboundedSlowStart => {
                // Double cwnd each RTT [19.2]
                self.cwnd_q16 = self.cwnd_q16.saturating_add(ONE_Q16);
            }
            Mode::ThresholdSlowStart(ssthresh_q16) => {
                // Double cwnd each RTT, unless we would advance beyond ssthresh [19.2.2]
                let new_cwnd_q16 = self.cwnd_q16.saturating_add(ONE_Q16);
                if new_cwnd_q16 >= ssthresh_q16 {
                    self.cwnd_q16 = ssthresh_q16;
                    self.mode = Mode::CongestionAvoidance;
                } else {
                    self.cwnd_q16 = new_cwnd_q16;
                }
            }
            Mode::CongestionAvoidance => {
                // Add 1/cwnd segments, i.e. one segment per RTT [19.2.1]
                let cwnd_q16 = self.cwnd_q16;
                let cwnd_inv_q16 = (ONE_Q16 * ONE_Q16 + cwnd_q16 / 2) / cwnd_q16;
                self.cwnd_q16 = cwnd_q16.saturating_add(cwnd_inv_q16);
            }
        }

        self.cwnd_q16 = self.cwnd_q16.min(self.cwnd_max_q16);
    }

    /// Called when a retransmission timer expires.
    pub fn handle_timeout(&mut self) {
        let cwnd_q16 = self.cwnd_q16;
        let cwnd_min_q16 = (MIN_CWND_SEGMENTS * ONE_Q16).min(self.cwnd_max_q16);

        // The pipe has drained, reassess connection capacity in threshold slow start [19.2.2]
        self.cwnd_q16 = cwnd_min_q16;
        self.dropcnt_q16 = 0;
        self.mode = Mode::ThresholdSlowStart((cwnd_q16 / 2).max(cwnd_min_q16));
    }

    /// Called when duplicate acknowledgements indicate a single lost segment.
    pub fn handle_drop(&mut self) {
        let cwnd_q16 = self.cwnd_q16;
        let cwnd_min_q16 = (MIN_CWND_SEGMENTS * ONE_Q16).min(self.cwnd_max_q16);

        // Halve cwnd and enter congestion avoidance, provided we haven't seen a drop recently
        if self.dropcnt_q16 == 0 {
            let new_cwnd_q16 = (cwnd_q16 / 2).max(cwnd_min_q16);
            self.cwnd_q16 = new_cwnd_q16;
            self.dropcnt_q16 = new_cwnd_q16;
            self.mode = Mode::CongestionAvoidance;
        }
    }

    /// Current congestion window, in whole segments.
    pub fn cwnd(&self) -> usize {
        let cwnd_int = self.cwnd_q16 >> 16;
        if let Ok(cwnd_int) = cwnd_int.try_into() {
            cwnd_int
        } else {
            usize::MAX
        }
    }
}
