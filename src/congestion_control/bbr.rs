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

//! BBR Congestion Control.
//!
//! Instead of backing off on loss, BBR keeps an explicit model of the
//! network path: the highest delivery rate recently observed and the
//! lowest round-trip delay. The congestion window and the pacing rate
//! are both derived from that model, so the flow aims to sit near the
//! bandwidth-delay product rather than at the point where queues
//! overflow.
//!
//! This is a single-flow rendition of BBR v1: bandwidth is sampled per
//! acknowledged packet rather than via a delivery-rate estimator, and the
//! startup exit compares the newest sample against the oldest of the last
//! three.
//!
//! See <https://datatracker.ietf.org/doc/html/draft-cardwell-iccrg-bbr-congestion-control-00>.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::AlgorithmDetail;
use super::AlgorithmStats;
use super::CongestionAlgorithm;
use super::CongestionStats;
use crate::CongestionConfig;
use crate::MAX_CONGESTION_WINDOW;

/// BBRHighGain: A constant specifying the gain used in Startup mode for
/// both BBR.pacing_gain and BBR.cwnd_gain, the minimum value that allows
/// the sending rate to double each round (`2/ln(2)` ~= `2.885`).
const HIGH_GAIN: f64 = 2.885;

/// The gain used in Drain mode, the inverse of the Startup gain, which
/// drains the queue created during Startup in one round.
const DRAIN_GAIN: f64 = 1.0 / HIGH_GAIN;

/// Bandwidth growth ratio below which Startup is considered to have
/// stopped filling the pipe.
const STARTUP_GROWTH_TARGET: f64 = 1.25;

/// The number of recent bandwidth samples needed before the Startup exit
/// heuristic applies.
const STARTUP_GROWTH_SAMPLES: usize = 3;

/// BBRGainCycleLen: the number of phases in the BBR ProbeBW gain cycle.
const GAIN_CYCLE_LEN: usize = 8;

/// Pacing Gain Cycles for the ProbeBW state.
const PACING_GAIN_CYCLE: [f64; GAIN_CYCLE_LEN] = [1.25, 0.75, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

/// BtlBwFilterLen: the capacity of the bandwidth sample window.
const BW_FILTER_LEN: usize = 10;

/// BBRMinPipeCwnd: the minimal cwnd that allows pipelining, in packets.
const MIN_PIPE_CWND_PKTS: u64 = 4;

/// BBR configurable parameters.
#[derive(Debug)]
pub struct BbrConfig {
    /// Initial congestion window in bytes.
    initial_cwnd: u64,

    /// Max datagram size in bytes.
    max_datagram_size: u64,

    /// The minimum duration spent in the ProbeRTT state.
    probe_rtt_duration: Duration,

    /// The duration of one phase of the ProbeBW gain cycle.
    cycle_duration: Duration,

    /// How long the gain cycle may sit idle before ProbeRTT is entered.
    probe_rtt_interval: Duration,
}

impl BbrConfig {
    pub fn from(conf: &CongestionConfig) -> Self {
        let max_datagram_size = conf.max_datagram_size;
        let initial_cwnd = conf
            .initial_congestion_window
            .saturating_mul(max_datagram_size);

        Self {
            initial_cwnd,
            max_datagram_size,
            probe_rtt_duration: conf.bbr_probe_rtt_duration,
            cycle_duration: conf.bbr_cycle_duration,
            probe_rtt_interval: conf.bbr_probe_rtt_interval,
        }
    }

    /// Update the initial congestion window.
    pub fn set_initial_cwnd(&mut self, initial_cwnd: u64) -> &mut Self {
        self.initial_cwnd = initial_cwnd;
        self
    }

    /// Update the max datagram size.
    pub fn set_max_datagram_size(&mut self, max_datagram_size: u64) -> &mut Self {
        self.max_datagram_size = max_datagram_size;
        self
    }

    /// Update the minimum ProbeRTT duration.
    pub fn set_probe_rtt_duration(&mut self, probe_rtt_duration: Duration) -> &mut Self {
        self.probe_rtt_duration = probe_rtt_duration;
        self
    }
}

impl Default for BbrConfig {
    fn default() -> Self {
        Self {
            initial_cwnd: crate::INITIAL_CONGESTION_WINDOW,
            max_datagram_size: crate::MAX_SEGMENT_SIZE,
            probe_rtt_duration: Duration::from_millis(200),
            cycle_duration: Duration::from_secs(1),
            probe_rtt_interval: Duration::from_secs(10),
        }
    }
}

/// BBR State Machine.
///
/// See draft-cardwell-iccrg-bbr-congestion-control-00 Section 3.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BbrState {
    /// Rapidly probe for bandwidth with a high gain.
    Startup,

    /// Drain the queue created during Startup.
    Drain,

    /// Cruise near the estimated BDP, cycling the gain to probe.
    ProbeBw,

    /// Briefly shrink the window to refresh the min RTT estimate.
    ProbeRtt,
}

/// BBR Congestion Control Algorithm.
///
/// See draft-cardwell-iccrg-bbr-congestion-control-00.
#[derive(Debug)]
pub struct Bbr {
    /// Configurable parameters.
    config: BbrConfig,

    /// Statistics.
    stats: CongestionStats,

    /// State.
    state: BbrState,

    /// Cwnd: The transport sender's congestion window, which limits the
    /// amount of data in flight.
    cwnd: u64,

    /// Recent per-ack bandwidth samples, oldest first.
    bw_samples: VecDeque<u64>,

    /// BBR.BtlBw: the maximum bandwidth sample in the window, in bytes
    /// per second. It doubles as the working bandwidth estimate.
    max_bandwidth: u64,

    /// The minimum round-trip time observed so far.
    min_rtt: Option<Duration>,

    /// BBR.RTprop: BBR's estimated two-way round-trip propagation delay
    /// of the path.
    rt_prop: Option<Duration>,

    /// BBR.pacing_rate: The current pacing rate for a BBR flow, which
    /// controls inter-packet spacing. Bytes per second.
    pacing_rate: u64,

    /// BBR.pacing_gain: The dynamic gain factor used to scale BBR.BtlBw to
    /// produce BBR.pacing_rate.
    pacing_gain: f64,

    /// BBR.cwnd_gain: The dynamic gain factor used to scale the estimated
    /// BDP to produce a congestion window.
    cwnd_gain: f64,

    /// Current index of PACING_GAIN_CYCLE.
    cycle_index: usize,

    /// Last time when cycle_index was updated.
    cycle_stamp: Instant,

    /// Cwnd saved at entry to ProbeRTT, restored on exit.
    prior_cwnd: u64,

    /// Time the current ProbeRTT episode started, if any.
    probe_rtt_stamp: Option<Instant>,
}

impl Bbr {
    pub fn new(config: BbrConfig, now: Instant) -> Self {
        let initial_cwnd = config.initial_cwnd;
        Self {
            config,
            stats: Default::default(),
            state: BbrState::Startup,
            cwnd: initial_cwnd,
            bw_samples: VecDeque::with_capacity(BW_FILTER_LEN),
            max_bandwidth: 0,
            min_rtt: None,
            rt_prop: None,
            pacing_rate: 0,
            pacing_gain: HIGH_GAIN,
            cwnd_gain: HIGH_GAIN,
            cycle_index: 0,
            cycle_stamp: now,
            prior_cwnd: 0,
            probe_rtt_stamp: None,
        }
    }

    /// Current bandwidth estimate in bytes per second.
    pub fn bandwidth_estimate(&self) -> u64 {
        self.max_bandwidth
    }

    /// Current state machine state.
    pub fn state(&self) -> BbrState {
        self.state
    }

    /// Take one bandwidth sample from an acknowledged packet and refresh
    /// the path model.
    fn update_model(&mut self, bytes: u64, rtt: Duration) {
        let micros = rtt.as_micros();
        if micros == 0 {
            return;
        }

        if self.bw_samples.len() == BW_FILTER_LEN {
            self.bw_samples.pop_front();
        }
        self.bw_samples
            .push_back((bytes as u128 * 1_000_000 / micros) as u64);
        self.max_bandwidth = self.bw_samples.iter().copied().max().unwrap_or(0);

        self.min_rtt = Some(self.min_rtt.map_or(rtt, |min| min.min(rtt)));
        self.rt_prop = Some(self.rt_prop.map_or(rtt, |rt| rt.min(rtt)));
    }

    /// The minimal cwnd that allows pipelining.
    fn min_pipe_cwnd(&self) -> u64 {
        MIN_PIPE_CWND_PKTS * self.config.max_datagram_size
    }

    /// Calculate the target cwnd, which is the upper bound on the volume
    /// of data BBR allows in flight, scaled by the given gain.
    ///
    /// See draft-cardwell-iccrg-bbr-congestion-control-00 Section 4.2.3.2.
    fn target_cwnd(&self, gain: f64) -> u64 {
        let rt_prop = match self.rt_prop {
            // No valid model yet.
            Some(rt) if self.max_bandwidth > 0 => rt,
            _ => return 10 * self.config.max_datagram_size,
        };

        let estimated_bdp = self.max_bandwidth as u128 * rt_prop.as_micros() / 1_000_000;
        ((estimated_bdp as f64 * gain) as u64).max(self.min_pipe_cwnd())
    }

    /// Estimate whether Startup has stopped growing the bandwidth, by
    /// comparing the newest sample against the oldest of the last three.
    fn startup_growth_stalled(&self) -> bool {
        if self.bw_samples.len() < STARTUP_GROWTH_SAMPLES {
            return false;
        }
        let newest = self.bw_samples[self.bw_samples.len() - 1];
        let oldest = self.bw_samples[self.bw_samples.len() - STARTUP_GROWTH_SAMPLES];
        if oldest == 0 {
            return false;
        }
        (newest as f64) < (oldest as f64) * STARTUP_GROWTH_TARGET
    }

    /// Enter the Drain state.
    ///
    /// In Drain, BBR aims to quickly drain any queue created in Startup by
    /// switching to a gain well below 1.0.
    fn enter_drain(&mut self) {
        self.state = BbrState::Drain;
        self.pacing_gain = DRAIN_GAIN;
        self.cwnd_gain = DRAIN_GAIN;
        trace!(
            "{} ENTER_DRAIN max_bandwidth={}",
            self.name(),
            self.max_bandwidth
        );
    }

    /// Enter the ProbeBW state, where BBR flows spend the vast majority of
    /// their time, probing for bandwidth via gain cycling.
    fn enter_probe_bw(&mut self, now: Instant) {
        self.state = BbrState::ProbeBw;
        self.cycle_index = 0;
        self.cycle_stamp = now;
        self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_index];
        self.cwnd_gain = PACING_GAIN_CYCLE[self.cycle_index];
        trace!("{} ENTER_PROBE_BW cwnd={}", self.name(), self.cwnd);
    }

    /// Advance to the next phase of the gain cycle.
    fn advance_cycle_phase(&mut self, now: Instant) {
        self.cycle_stamp = now;
        self.cycle_index = (self.cycle_index + 1) % GAIN_CYCLE_LEN;
        self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_index];
        self.cwnd_gain = PACING_GAIN_CYCLE[self.cycle_index];
    }

    /// Enter the ProbeRTT state, remembering the last-known good cwnd so
    /// it can be restored on exit.
    fn enter_probe_rtt(&mut self, now: Instant) {
        self.state = BbrState::ProbeRtt;
        self.prior_cwnd = self.cwnd;
        self.probe_rtt_stamp = Some(now);
        self.pacing_gain = 1.0;
        self.cwnd_gain = 1.0;
        trace!("{} ENTER_PROBE_RTT cwnd={}", self.name(), self.cwnd);
    }

    /// Leave ProbeRTT, restoring the saved cwnd and restarting the gain
    /// cycle clock.
    fn exit_probe_rtt(&mut self, now: Instant) {
        self.cwnd = self.prior_cwnd;
        self.probe_rtt_stamp = None;
        self.state = BbrState::ProbeBw;
        self.cycle_stamp = now;
        self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_index];
        self.cwnd_gain = PACING_GAIN_CYCLE[self.cycle_index];
        trace!("{} EXIT_PROBE_RTT cwnd={}", self.name(), self.cwnd);
    }

    /// Evaluate one state machine step. At most one transition per ack.
    fn update_state(&mut self, now: Instant) {
        match self.state {
            BbrState::Startup => {
                if self.startup_growth_stalled() {
                    self.enter_drain();
                }
            }
            BbrState::Drain => {
                if self.cwnd <= self.target_cwnd(1.0) {
                    // The queue is estimated to be drained.
                    self.enter_probe_bw(now);
                }
            }
            BbrState::ProbeBw => {
                // The ProbeRTT check runs against the cycle clock before the
                // phase advance resets it; only a long quiet gap triggers it.
                if now.saturating_duration_since(self.cycle_stamp) > self.config.probe_rtt_interval
                {
                    self.enter_probe_rtt(now);
                } else if now.saturating_duration_since(self.cycle_stamp)
                    > self.config.cycle_duration
                {
                    self.advance_cycle_phase(now);
                }
            }
            BbrState::ProbeRtt => {
                if let Some(probe_rtt_stamp) = self.probe_rtt_stamp {
                    if now.saturating_duration_since(probe_rtt_stamp)
                        >= self.config.probe_rtt_duration
                    {
                        self.exit_probe_rtt(now);
                    }
                }
            }
        }
    }

    /// Adjust the congestion window towards the target.
    ///
    /// See draft-cardwell-iccrg-bbr-congestion-control-00 Section 4.2.3.
    fn update_cwnd(&mut self) {
        let target = self.target_cwnd(self.cwnd_gain);

        // ProbeRTT bounds the window well below the target so the queue
        // drains and the true propagation delay becomes measurable.
        self.cwnd = if self.state == BbrState::ProbeRtt {
            (target / 2).max(self.min_pipe_cwnd())
        } else {
            target
        }
        .min(MAX_CONGESTION_WINDOW);
    }

    /// Refresh the pacing rate from the bandwidth model.
    ///
    /// The pacing rate is positive exactly when the bandwidth estimate is;
    /// a window full of zero-byte samples can drain the estimate back to
    /// zero, and the pacing rate follows it down.
    fn update_pacing_rate(&mut self) {
        if self.max_bandwidth > 0 {
            self.pacing_rate = ((self.max_bandwidth as f64 * self.pacing_gain) as u64).max(1);
        } else {
            self.pacing_rate = 0;
        }
    }
}

impl CongestionAlgorithm for Bbr {
    fn name(&self) -> &str {
        "BBR"
    }

    fn on_sent(&mut self, _pkt_num: u64, bytes: u64, _sent_time: Instant) {
        self.stats.bytes_sent_in_total = self.stats.bytes_sent_in_total.saturating_add(bytes);
    }

    fn on_ack(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant, ack_time: Instant) {
        self.stats.acked_packets = self.stats.acked_packets.saturating_add(1);
        self.stats.bytes_acked_in_total = self.stats.bytes_acked_in_total.saturating_add(bytes);

        let rtt = ack_time.saturating_duration_since(sent_time);
        if !rtt.is_zero() {
            self.update_model(bytes, rtt);
        }

        self.update_state(ack_time);
        self.update_cwnd();
        self.update_pacing_rate();

        trace!(
            "{} ON_ACK pn={} state={:?} cwnd={} bw={} pacing={}",
            self.name(),
            pkt_num,
            self.state,
            self.cwnd,
            self.max_bandwidth,
            self.pacing_rate
        );
    }

    fn on_loss(&mut self, _pkt_num: u64, bytes: u64, _sent_time: Instant, _loss_time: Instant) {
        // BBR does not reduce the window on loss; the model absorbs it.
        self.stats.lost_packets = self.stats.lost_packets.saturating_add(1);
        self.stats.bytes_lost_in_total = self.stats.bytes_lost_in_total.saturating_add(bytes);
    }

    fn congestion_window(&self) -> u64 {
        self.cwnd
    }

    fn ssthresh(&self) -> u64 {
        u64::MAX
    }

    fn pacing_rate(&self) -> Option<u64> {
        if self.pacing_rate > 0 {
            Some(self.pacing_rate)
        } else {
            None
        }
    }

    fn in_slow_start(&self) -> bool {
        self.state == BbrState::Startup
    }

    fn reset(&mut self, now: Instant) {
        self.stats = Default::default();
        self.state = BbrState::Startup;
        self.cwnd = self.config.initial_cwnd;
        self.bw_samples.clear();
        self.max_bandwidth = 0;
        self.min_rtt = None;
        self.rt_prop = None;
        self.pacing_rate = 0;
        self.pacing_gain = HIGH_GAIN;
        self.cwnd_gain = HIGH_GAIN;
        self.cycle_index = 0;
        self.cycle_stamp = now;
        self.prior_cwnd = 0;
        self.probe_rtt_stamp = None;
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }

    fn snapshot(&self) -> AlgorithmStats {
        let terminal_packets = self.stats.acked_packets + self.stats.lost_packets;
        let loss_rate = if terminal_packets == 0 {
            0.0
        } else {
            self.stats.lost_packets as f64 / terminal_packets as f64
        };

        AlgorithmStats {
            algorithm: "BBR",
            congestion_window: self.cwnd,
            slow_start_threshold: u64::MAX,
            acked_packets: self.stats.acked_packets,
            lost_packets: self.stats.lost_packets,
            bytes_sent_in_total: self.stats.bytes_sent_in_total,
            bytes_acked_in_total: self.stats.bytes_acked_in_total,
            bytes_lost_in_total: self.stats.bytes_lost_in_total,
            loss_rate,
            detail: AlgorithmDetail::Bbr {
                state: self.state,
                bandwidth_estimate: self.max_bandwidth,
                max_bandwidth: self.max_bandwidth,
                min_rtt: self.min_rtt.unwrap_or(Duration::ZERO),
                rt_prop: self.rt_prop.unwrap_or(Duration::ZERO),
                pacing_rate: self.pacing_rate,
                cycle_index: self.cycle_index,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INITIAL_CONGESTION_WINDOW;
    use crate::MAX_SEGMENT_SIZE;

    fn bbr(now: Instant) -> Bbr {
        Bbr::new(BbrConfig::default(), now)
    }

    /// Feed one ack worth `bytes` with the given RTT, acked at `ack_time`.
    fn ack(b: &mut Bbr, pn: u64, bytes: u64, rtt: Duration, ack_time: Instant) {
        b.on_ack(pn, bytes, ack_time - rtt, ack_time);
    }

    #[test]
    fn bbr_init() {
        let now = Instant::now();
        let b = bbr(now);
        assert_eq!(b.name(), "BBR");
        assert_eq!(b.state(), BbrState::Startup);
        assert_eq!(b.congestion_window(), INITIAL_CONGESTION_WINDOW);
        assert_eq!(b.ssthresh(), u64::MAX);
        assert_eq!(b.in_slow_start(), true);
        assert_eq!(b.bandwidth_estimate(), 0);
        assert_eq!(b.pacing_rate(), None);
    }

    #[test]
    fn bbr_initial_ack() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        ack(&mut b, 1, MAX_SEGMENT_SIZE, rtt, now + rtt);

        assert_eq!(b.state(), BbrState::Startup);
        assert_eq!(b.bandwidth_estimate(), 12_000);
        assert_eq!(b.min_rtt, Some(rtt));
        assert_eq!(b.rt_prop, Some(rtt));
        // target = max(4 * MSS, BDP * 2.885) = 4800
        assert_eq!(b.congestion_window(), 4 * MAX_SEGMENT_SIZE);
        assert_eq!(b.pacing_rate(), Some(34_620));
    }

    #[test]
    fn bbr_bandwidth_max_filter() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        // Effective bandwidths 24000, 24000, 36000 bytes/s.
        ack(&mut b, 1, 2400, rtt, now + rtt);
        ack(&mut b, 2, 2400, rtt, now + rtt * 2);
        ack(&mut b, 3, 3600, rtt, now + rtt * 3);

        assert_eq!(b.bandwidth_estimate(), 36_000);
        // Growth of 1.5x keeps Startup going.
        assert_eq!(b.state(), BbrState::Startup);
    }

    #[test]
    fn bbr_bandwidth_filter_eviction() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        ack(&mut b, 0, 4800, rtt, now + rtt);
        assert_eq!(b.bandwidth_estimate(), 48_000);

        // Pushing BW_FILTER_LEN smaller samples evicts the old maximum.
        for pn in 1..=(BW_FILTER_LEN as u64) {
            ack(&mut b, pn, 1200, rtt, now + rtt * (pn as u32 + 1));
        }
        assert_eq!(b.bw_samples.len(), BW_FILTER_LEN);
        assert_eq!(b.bandwidth_estimate(), 12_000);
    }

    #[test]
    fn bbr_pacing_follows_bandwidth_to_zero() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        ack(&mut b, 0, MAX_SEGMENT_SIZE, rtt, now + rtt);
        assert_eq!(b.pacing_rate(), Some(34_620));

        // Zero-sized acks with valid RTTs evict every positive sample,
        // and the pacing rate must follow the estimate back to zero.
        for pn in 1..=(BW_FILTER_LEN as u64) {
            ack(&mut b, pn, 0, rtt, now + rtt * (pn as u32 + 1));
        }
        assert_eq!(b.bandwidth_estimate(), 0);
        assert_eq!(b.pacing_rate(), None);
    }

    #[test]
    fn bbr_zero_rtt_sample_skipped() {
        let now = Instant::now();
        let mut b = bbr(now);

        b.on_ack(1, MAX_SEGMENT_SIZE, now, now);
        assert_eq!(b.bandwidth_estimate(), 0);
        assert_eq!(b.min_rtt, None);
        assert_eq!(b.pacing_rate(), None);
        // Without a model the window falls back to the initial cwnd.
        assert_eq!(b.congestion_window(), INITIAL_CONGESTION_WINDOW);
    }

    #[test]
    fn bbr_startup_to_drain_to_probe_bw() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        // Three equal samples: growth ratio 1.0 < 1.25, Startup exits.
        ack(&mut b, 1, 1200, rtt, now + rtt);
        ack(&mut b, 2, 1200, rtt, now + rtt * 2);
        assert_eq!(b.state(), BbrState::Startup);

        ack(&mut b, 3, 1200, rtt, now + rtt * 3);
        assert_eq!(b.state(), BbrState::Drain);
        assert_eq!(b.in_slow_start(), false);
        // Drain gain floors the window at the minimal pipe cwnd.
        assert_eq!(b.congestion_window(), 4 * MAX_SEGMENT_SIZE);

        // cwnd <= target(1.0), the queue is drained.
        ack(&mut b, 4, 1200, rtt, now + rtt * 4);
        assert_eq!(b.state(), BbrState::ProbeBw);
        assert_eq!(b.cycle_index, 0);
    }

    /// Walk a fresh flow into the ProbeBW state.
    fn probe_bw_bbr(now: Instant, rtt: Duration) -> Bbr {
        let mut b = bbr(now);
        for pn in 1..=4 {
            ack(&mut b, pn, 1200, rtt, now + rtt * pn as u32);
        }
        assert_eq!(b.state(), BbrState::ProbeBw);
        b
    }

    #[test]
    fn bbr_gain_cycle_rotation() {
        let now = Instant::now();
        let rtt = Duration::from_millis(100);
        let mut b = probe_bw_bbr(now, rtt);

        let cycle_stamp = b.cycle_stamp;
        assert_eq!(b.pacing_gain, PACING_GAIN_CYCLE[0]);

        // Less than one cycle duration: no rotation.
        ack(
            &mut b,
            10,
            1200,
            rtt,
            cycle_stamp + Duration::from_millis(500),
        );
        assert_eq!(b.cycle_index, 0);

        // Past one cycle duration: advance to the next phase.
        ack(
            &mut b,
            11,
            1200,
            rtt,
            cycle_stamp + Duration::from_millis(1500),
        );
        assert_eq!(b.cycle_index, 1);
        assert_eq!(b.pacing_gain, PACING_GAIN_CYCLE[1]);
        assert_eq!(b.cycle_stamp, cycle_stamp + Duration::from_millis(1500));
    }

    #[test]
    fn bbr_probe_rtt_round_trip() {
        let now = Instant::now();
        let rtt = Duration::from_millis(100);
        let mut b = probe_bw_bbr(now, rtt);

        let cycle_stamp = b.cycle_stamp;
        let cwnd_before = b.congestion_window();

        // A long quiet gap on the cycle clock triggers ProbeRTT.
        let idle_ack = cycle_stamp + Duration::from_secs(11);
        ack(&mut b, 20, 1200, rtt, idle_ack);
        assert_eq!(b.state(), BbrState::ProbeRtt);
        assert_eq!(b.prior_cwnd, cwnd_before);
        // target(1.0) / 2 is below the minimal pipe cwnd here.
        assert_eq!(b.congestion_window(), 4 * MAX_SEGMENT_SIZE);

        // Acks within the probe duration keep the state.
        ack(&mut b, 21, 1200, rtt, idle_ack + Duration::from_millis(100));
        assert_eq!(b.state(), BbrState::ProbeRtt);

        // After 200ms the flow returns to ProbeBW.
        ack(&mut b, 22, 1200, rtt, idle_ack + Duration::from_millis(200));
        assert_eq!(b.state(), BbrState::ProbeBw);
        assert_eq!(b.probe_rtt_stamp, None);
    }

    #[test]
    fn bbr_loss_does_not_reduce_cwnd() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        ack(&mut b, 1, MAX_SEGMENT_SIZE, rtt, now + rtt);
        let cwnd = b.congestion_window();

        b.on_loss(2, MAX_SEGMENT_SIZE, now, now + rtt);
        assert_eq!(b.congestion_window(), cwnd);
        assert_eq!(b.stats().lost_packets, 1);
        assert_eq!(b.stats().bytes_lost_in_total, MAX_SEGMENT_SIZE);
    }

    #[test]
    fn bbr_min_rtt_tracking() {
        let now = Instant::now();
        let mut b = bbr(now);

        ack(
            &mut b,
            1,
            1200,
            Duration::from_millis(100),
            now + Duration::from_millis(100),
        );
        ack(
            &mut b,
            2,
            1200,
            Duration::from_millis(50),
            now + Duration::from_millis(200),
        );
        ack(
            &mut b,
            3,
            1200,
            Duration::from_millis(80),
            now + Duration::from_millis(300),
        );

        assert_eq!(b.min_rtt, Some(Duration::from_millis(50)));
        assert_eq!(b.rt_prop, Some(Duration::from_millis(50)));
    }

    #[test]
    fn bbr_loss_rate() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        assert_eq!(b.snapshot().loss_rate, 0.0);

        ack(&mut b, 1, 1200, rtt, now + rtt);
        ack(&mut b, 2, 1200, rtt, now + rtt);
        ack(&mut b, 3, 1200, rtt, now + rtt);
        b.on_loss(4, 1200, now, now + rtt);
        assert_eq!(b.snapshot().loss_rate, 0.25);
    }

    #[test]
    fn bbr_snapshot() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        ack(&mut b, 1, MAX_SEGMENT_SIZE, rtt, now + rtt);

        let stats = b.snapshot();
        assert_eq!(stats.algorithm, "BBR");
        assert_eq!(stats.slow_start_threshold, u64::MAX);
        match stats.detail {
            AlgorithmDetail::Bbr {
                state,
                bandwidth_estimate,
                max_bandwidth,
                min_rtt,
                rt_prop,
                pacing_rate,
                cycle_index,
            } => {
                assert_eq!(state, BbrState::Startup);
                assert_eq!(bandwidth_estimate, 12_000);
                assert_eq!(max_bandwidth, 12_000);
                assert_eq!(min_rtt, rtt);
                assert_eq!(rt_prop, rtt);
                assert_eq!(pacing_rate, 34_620);
                assert_eq!(cycle_index, 0);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn bbr_reset() {
        let now = Instant::now();
        let mut b = bbr(now);
        let rtt = Duration::from_millis(100);

        ack(&mut b, 1, MAX_SEGMENT_SIZE, rtt, now + rtt);
        b.on_loss(2, MAX_SEGMENT_SIZE, now, now + rtt);
        b.reset(now + rtt);

        assert_eq!(b.state(), BbrState::Startup);
        assert_eq!(b.congestion_window(), INITIAL_CONGESTION_WINDOW);
        assert_eq!(b.bandwidth_estimate(), 0);
        assert_eq!(b.min_rtt, None);
        assert_eq!(b.pacing_rate(), None);
        assert_eq!(b.stats().acked_packets, 0);
        assert_eq!(b.stats().lost_packets, 0);
    }
}
