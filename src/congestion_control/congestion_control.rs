// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::str::FromStr;
use std::fmt;
use std::time::Duration;
use std::time::Instant;

use crate::CongestionConfig;
use crate::Error;
use crate::Result;
pub use bbr::Bbr;
pub use bbr::BbrConfig;
pub use bbr::BbrState;
pub use new_reno::NewReno;
pub use new_reno::NewRenoConfig;
pub use new_reno::NewRenoState;
pub use window::CongestionWindow;

/// Available congestion control algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub enum CongestionControlAlgorithm {
    /// NewReno is a loss-based congestion controller. It grows the window
    /// exponentially during slow start and linearly during congestion
    /// avoidance, and halves it at most once per recovery episode.
    #[default]
    NewReno,

    /// BBR uses recent measurements of a transport connection's delivery
    /// rate and round-trip time to build an explicit model of the network
    /// path. The model is then used to control data transmission speed and
    /// the maximum volume of data allowed in flight at any time.
    Bbr,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("newreno") || algor.eq_ignore_ascii_case("new_reno") {
            Ok(CongestionControlAlgorithm::NewReno)
        } else if algor.eq_ignore_ascii_case("bbr") {
            Ok(CongestionControlAlgorithm::Bbr)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Lifetime count of acknowledged packets.
    pub acked_packets: u64,

    /// Lifetime count of lost packets.
    pub lost_packets: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,
}

/// A point-in-time view of an algorithm's state.
///
/// The uniform fields are shared by every algorithm; variant-specific state
/// is carried in [`AlgorithmDetail`].
#[derive(Debug, Clone)]
pub struct AlgorithmStats {
    /// Name of the algorithm, e.g. `"NewReno"` or `"BBR"`.
    pub algorithm: &'static str,

    /// Current congestion window in bytes.
    pub congestion_window: u64,

    /// Current slow start threshold in bytes.
    pub slow_start_threshold: u64,

    /// Lifetime count of acknowledged packets.
    pub acked_packets: u64,

    /// Lifetime count of lost packets.
    pub lost_packets: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,

    /// Observed loss rate.
    ///
    /// NewReno reports a byte ratio (`bytes lost / bytes sent`) while BBR
    /// reports a packet ratio (`lost / (acked + lost)`); the two are not
    /// comparable across algorithms.
    pub loss_rate: f64,

    /// Variant-specific state.
    pub detail: AlgorithmDetail,
}

/// Algorithm-specific statistics.
#[derive(Debug, Clone)]
pub enum AlgorithmDetail {
    /// NewReno state.
    NewReno {
        /// Reported congestion state.
        state: NewRenoState,

        /// Whether a recovery episode is in progress.
        in_recovery: bool,
    },

    /// BBR state.
    Bbr {
        /// Current state machine state.
        state: BbrState,

        /// Working bandwidth estimate in bytes per second.
        bandwidth_estimate: u64,

        /// Maximum bandwidth sample in the filter window, bytes per second.
        max_bandwidth: u64,

        /// Minimum observed round-trip time (zero until sampled).
        min_rtt: Duration,

        /// Round-trip propagation estimate (zero until sampled).
        rt_prop: Duration,

        /// Current pacing rate in bytes per second.
        pacing_rate: u64,

        /// Current index into the ProbeBw gain cycle.
        cycle_index: usize,
    },
}

/// Congestion control interfaces shared by different algorithms.
///
/// Event methods are total: duplicate or unknown packet numbers must be
/// absorbed without failing, whatever the driving controller forwards.
pub trait CongestionAlgorithm {
    /// Name of the congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback after a packet was sent out.
    fn on_sent(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant);

    /// Callback for each acknowledged packet.
    fn on_ack(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant, ack_time: Instant);

    /// Callback for each packet declared lost.
    fn on_loss(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant, loss_time: Instant);

    /// Current congestion window in bytes.
    fn congestion_window(&self) -> u64;

    /// Current slow start threshold in bytes.
    fn ssthresh(&self) -> u64;

    /// Check whether the given number of bytes fits into the window.
    fn can_send(&self, bytes: u64, bytes_in_flight: u64) -> bool {
        bytes_in_flight.saturating_add(bytes) <= self.congestion_window()
    }

    /// Current pacing rate estimated by the algorithm, in bytes per second.
    /// Window-only algorithms return None.
    fn pacing_rate(&self) -> Option<u64> {
        None
    }

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool;

    /// Restore the freshly-constructed state.
    fn reset(&mut self, now: Instant);

    /// Lifetime congestion counters.
    fn stats(&self) -> &CongestionStats;

    /// Build a point-in-time view of the algorithm state.
    fn snapshot(&self) -> AlgorithmStats;
}

impl fmt::Debug for dyn CongestionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion algorithm {}", self.name())
    }
}

/// Build a congestion control algorithm.
pub fn build_congestion_algorithm(
    conf: &CongestionConfig,
    now: Instant,
) -> Box<dyn CongestionAlgorithm> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::NewReno => Box::new(NewReno::new(NewRenoConfig::from(conf))),
        CongestionControlAlgorithm::Bbr => Box::new(Bbr::new(BbrConfig::from(conf), now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("newreno", Ok(CongestionControlAlgorithm::NewReno)),
            ("NewReno", Ok(CongestionControlAlgorithm::NewReno)),
            ("NEWRENO", Ok(CongestionControlAlgorithm::NewReno)),
            ("new_reno", Ok(CongestionControlAlgorithm::NewReno)),
            ("bbr", Ok(CongestionControlAlgorithm::Bbr)),
            ("Bbr", Ok(CongestionControlAlgorithm::Bbr)),
            ("BBR", Ok(CongestionControlAlgorithm::Bbr)),
            ("reno", Err(Error::InvalidConfig("unknown".into()))),
            ("cubic", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
    }

    #[test]
    fn congestion_control_build_algorithm() {
        let now = Instant::now();
        let mut config = CongestionConfig::default();

        let cc = build_congestion_algorithm(&config, now);
        assert_eq!(cc.name(), "NewReno");
        assert_eq!(cc.in_slow_start(), true);
        assert_eq!(cc.congestion_window(), crate::INITIAL_CONGESTION_WINDOW);
        assert_eq!(cc.ssthresh(), crate::MAX_CONGESTION_WINDOW);
        assert_eq!(cc.pacing_rate(), None);
        assert_eq!(cc.can_send(crate::MAX_SEGMENT_SIZE, 0), true);
        assert_eq!(
            format!("{:?}", cc),
            "congestion algorithm NewReno".to_string()
        );

        config.set_congestion_control_algorithm(CongestionControlAlgorithm::Bbr);
        let cc = build_congestion_algorithm(&config, now);
        assert_eq!(cc.name(), "BBR");
        assert_eq!(cc.in_slow_start(), true);
        assert_eq!(cc.ssthresh(), u64::MAX);
        assert_eq!(cc.pacing_rate(), None);
    }
}

mod bbr;
mod new_reno;
mod window;
