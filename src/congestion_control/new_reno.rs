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

//! NewReno Congestion Control.
//!
//! NewReno is a loss-based congestion controller. The congestion window
//! grows by the acknowledged bytes during slow start and by roughly one
//! segment per round trip during congestion avoidance. On loss the window
//! is halved and a recovery episode begins; further losses within the same
//! episode do not reduce the window again.
//!
//! See RFC 5681 and RFC 9002 Section 7.

use std::time::Instant;

use log::*;

use super::window::CongestionWindow;
use super::AlgorithmDetail;
use super::AlgorithmStats;
use super::CongestionAlgorithm;
use super::CongestionStats;
use crate::CongestionConfig;
use crate::LOSS_REDUCTION_FACTOR;
use crate::MAX_CONGESTION_WINDOW;

/// NewReno configurable parameters.
#[derive(Debug)]
pub struct NewRenoConfig {
    /// Initial congestion window in bytes.
    initial_cwnd: u64,

    /// Max datagram size in bytes.
    max_datagram_size: u64,
}

impl NewRenoConfig {
    pub fn from(conf: &CongestionConfig) -> Self {
        let max_datagram_size = conf.max_datagram_size;
        let initial_cwnd = conf
            .initial_congestion_window
            .saturating_mul(max_datagram_size);

        Self {
            initial_cwnd,
            max_datagram_size,
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
}

impl Default for NewRenoConfig {
    fn default() -> Self {
        Self {
            initial_cwnd: crate::INITIAL_CONGESTION_WINDOW,
            max_datagram_size: crate::MAX_SEGMENT_SIZE,
        }
    }
}

/// Reported NewReno congestion state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NewRenoState {
    /// The window grows by the acknowledged bytes per ack.
    SlowStart,

    /// The window grows by roughly one segment per round trip.
    CongestionAvoidance,

    /// A loss was detected and the window was reduced; growth is paused
    /// until a packet sent after the loss is acknowledged.
    FastRecovery,
}

/// NewReno congestion control algorithm.
///
/// See RFC 5681 Section 3.
#[derive(Debug)]
pub struct NewReno {
    /// Configurable parameters.
    config: NewRenoConfig,

    /// Congestion window and slow start threshold.
    window: CongestionWindow,

    /// Whether a recovery episode is in progress.
    in_recovery: bool,

    /// The packet number that triggered the current recovery episode.
    /// Only acks of later packet numbers end the episode.
    recovery_pkt_num: u64,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl NewReno {
    pub fn new(config: NewRenoConfig) -> Self {
        let window = CongestionWindow::new(config.initial_cwnd, MAX_CONGESTION_WINDOW);
        Self {
            config,
            window,
            in_recovery: false,
            recovery_pkt_num: 0,
            stats: Default::default(),
        }
    }

    /// Reported congestion state.
    ///
    /// The slow start bound is inclusive here: right after a recovery
    /// episode collapses the window onto the threshold, the state reads
    /// `SlowStart` again.
    pub fn state(&self) -> NewRenoState {
        if self.in_recovery {
            NewRenoState::FastRecovery
        } else if self.window.size() <= self.window.ssthresh() {
            NewRenoState::SlowStart
        } else {
            NewRenoState::CongestionAvoidance
        }
    }
}

impl CongestionAlgorithm for NewReno {
    fn name(&self) -> &str {
        "NewReno"
    }

    fn on_sent(&mut self, _pkt_num: u64, bytes: u64, _sent_time: Instant) {
        self.stats.bytes_sent_in_total = self.stats.bytes_sent_in_total.saturating_add(bytes);
    }

    fn on_ack(&mut self, pkt_num: u64, bytes: u64, _sent_time: Instant, _ack_time: Instant) {
        self.stats.acked_packets = self.stats.acked_packets.saturating_add(1);
        self.stats.bytes_acked_in_total = self.stats.bytes_acked_in_total.saturating_add(bytes);

        if self.in_recovery {
            // Only an ack for a packet sent after the loss ends the episode.
            // The ack itself never grows the window.
            if pkt_num > self.recovery_pkt_num {
                self.in_recovery = false;
                trace!(
                    "{} EXIT_RECOVERY pn={} cwnd={}",
                    self.name(),
                    pkt_num,
                    self.window.size()
                );
            }
            return;
        }

        if self.window.in_slow_start() {
            self.window.slow_start_increase(bytes);
        } else {
            self.window.congestion_avoidance_increase(bytes);
        }
    }

    fn on_loss(&mut self, pkt_num: u64, bytes: u64, _sent_time: Instant, _loss_time: Instant) {
        self.stats.lost_packets = self.stats.lost_packets.saturating_add(1);
        self.stats.bytes_lost_in_total = self.stats.bytes_lost_in_total.saturating_add(bytes);

        // Losses within the current episode belong to the same congestion
        // event; the window is reduced at most once per episode.
        if self.in_recovery && pkt_num <= self.recovery_pkt_num {
            return;
        }

        self.in_recovery = true;
        self.recovery_pkt_num = pkt_num;

        // LOSS_REDUCTION_FACTOR is within (0, 1).
        let _ = self.window.reduce(LOSS_REDUCTION_FACTOR);
        trace!(
            "{} ENTER_RECOVERY pn={} cwnd={} ssthresh={}",
            self.name(),
            pkt_num,
            self.window.size(),
            self.window.ssthresh()
        );
    }

    fn congestion_window(&self) -> u64 {
        self.window.size()
    }

    fn ssthresh(&self) -> u64 {
        self.window.ssthresh()
    }

    fn in_slow_start(&self) -> bool {
        self.window.in_slow_start()
    }

    fn reset(&mut self, _now: Instant) {
        self.window.reset();
        self.in_recovery = false;
        self.recovery_pkt_num = 0;
        self.stats = Default::default();
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }

    fn snapshot(&self) -> AlgorithmStats {
        let loss_rate = if self.stats.bytes_sent_in_total == 0 {
            0.0
        } else {
            self.stats.bytes_lost_in_total as f64 / self.stats.bytes_sent_in_total as f64
        };

        AlgorithmStats {
            algorithm: "NewReno",
            congestion_window: self.window.size(),
            slow_start_threshold: self.window.ssthresh(),
            acked_packets: self.stats.acked_packets,
            lost_packets: self.stats.lost_packets,
            bytes_sent_in_total: self.stats.bytes_sent_in_total,
            bytes_acked_in_total: self.stats.bytes_acked_in_total,
            bytes_lost_in_total: self.stats.bytes_lost_in_total,
            loss_rate,
            detail: AlgorithmDetail::NewReno {
                state: self.state(),
                in_recovery: self.in_recovery,
            },
        }
    }
}
