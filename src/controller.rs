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

//! Per-connection congestion control coordinator.
//!
//! The controller owns the sent-packet ledger and the bytes-in-flight
//! counter, drives RTT estimation, and forwards normalized events to the
//! active congestion control algorithm. It answers the transmit-side
//! question "may I send N bytes now?" and supports hot-swapping the
//! algorithm while the ledger persists.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::*;
use rustc_hash::FxHashMap;

use crate::congestion_control::build_congestion_algorithm;
use crate::congestion_control::AlgorithmStats;
use crate::congestion_control::CongestionAlgorithm;
use crate::congestion_control::CongestionControlAlgorithm;
use crate::rtt::RttEstimator;
use crate::CongestionConfig;

/// Metadata of a sent packet tracked by the controller.
///
/// A record becomes terminal when it is first acknowledged or declared
/// lost; it stops counting towards bytes in flight at that moment and at
/// most once, whichever signal arrives later.
#[derive(Clone, Copy, Debug)]
pub struct SentPacket {
    /// The packet number of the sent packet.
    pub pkt_num: u64,

    /// The number of bytes sent in the packet, not including UDP or IP
    /// overhead.
    pub sent_size: u64,

    /// The time the packet was sent.
    pub time_sent: Instant,

    /// The time the packet was acknowledged, if any.
    pub time_acked: Option<Instant>,

    /// The time the packet was declared lost, if any.
    pub time_lost: Option<Instant>,
}

impl SentPacket {
    /// Whether the packet was acknowledged or declared lost.
    pub fn is_terminal(&self) -> bool {
        self.time_acked.is_some() || self.time_lost.is_some()
    }
}

/// Loss detection driven from the controller's ledger.
///
/// An implementation inspects the outstanding records and decides which
/// packet numbers are to be treated as lost at `now`. Attaching one is
/// optional; without it the embedding reports losses explicitly.
pub trait LossDetector {
    /// Return the packet numbers deemed lost at `now`.
    fn detect_lost_packets(
        &mut self,
        sent_packets: &FxHashMap<u64, SentPacket>,
        now: Instant,
    ) -> Vec<u64>;
}

/// A controller-level statistics snapshot.
#[derive(Debug, Clone)]
pub struct ControllerStats {
    /// Statistics of the active algorithm.
    pub algorithm: AlgorithmStats,

    /// Bytes sent but neither acked nor declared lost.
    pub bytes_in_flight: u64,

    /// Remaining window space in bytes.
    pub available_window: u64,

    /// Records currently kept in the ledger.
    pub sent_packets_count: usize,

    /// Records neither acked nor lost.
    pub unacked_packets: usize,

    /// Records marked lost.
    pub lost_packets_total: usize,

    /// Fraction of the congestion window currently in flight.
    pub utilization: f64,

    /// Minimum RTT observed by the estimator, if any sample was taken.
    pub min_rtt: Option<Duration>,

    /// Smoothed RTT, if any sample was taken.
    pub smoothed_rtt: Option<Duration>,

    /// RTT variance, if any sample was taken.
    pub rtt_var: Option<Duration>,
}

/// An entry of the controller's bounded history.
#[derive(Debug, Clone)]
pub enum HistoryEntry {
    /// A periodic statistics snapshot.
    Snapshot {
        /// Time the snapshot was taken.
        time: Instant,

        /// The snapshot itself.
        stats: ControllerStats,
    },

    /// The algorithm was hot-swapped.
    AlgorithmSwitch {
        /// Time of the switch.
        time: Instant,

        /// Name of the algorithm being replaced.
        old: &'static str,

        /// Name of the replacement.
        new: &'static str,

        /// Final statistics of the replaced algorithm.
        old_stats: AlgorithmStats,
    },
}

/// Per-connection congestion controller.
///
/// All methods are non-blocking arithmetic plus small map updates; the
/// caller drives time by passing timestamps. The controller offers no
/// internal synchronization; one connection is driven from one task.
pub struct CongestionController {
    /// Configuration.
    config: CongestionConfig,

    /// The active congestion control algorithm.
    algorithm: Box<dyn CongestionAlgorithm>,

    /// RTT estimation for the path.
    rtt: RttEstimator,

    /// Optional ledger-driven loss detection.
    loss_detector: Option<Box<dyn LossDetector>>,

    /// Ledger of sent packets, keyed by packet number.
    sent_packets: FxHashMap<u64, SentPacket>,

    /// The sum of the sizes of all sent packets that have not been
    /// acknowledged or declared lost.
    bytes_in_flight: u64,

    /// Bounded history of snapshots and algorithm switches.
    history: VecDeque<HistoryEntry>,

    /// Last time a periodic snapshot was taken.
    last_stats_time: Option<Instant>,

    /// Trace id.
    trace_id: String,
}

impl CongestionController {
    pub fn new(config: CongestionConfig, now: Instant) -> Self {
        let algorithm = build_congestion_algorithm(&config, now);
        Self {
            config,
            algorithm,
            rtt: RttEstimator::new(),
            loss_detector: None,
            sent_packets: FxHashMap::default(),
            bytes_in_flight: 0,
            history: VecDeque::new(),
            last_stats_time: None,
            trace_id: String::from(""),
        }
    }

    /// Set trace id.
    pub fn set_trace_id(&mut self, trace_id: &str) {
        self.trace_id = trace_id.to_string();
    }

    /// Attach a loss detector, invoked on every `on_ack_received()`.
    pub fn set_loss_detector(&mut self, loss_detector: Box<dyn LossDetector>) {
        self.loss_detector = Some(loss_detector);
    }

    /// Handle a packet sent event.
    ///
    /// A packet number already present in the ledger is left untouched.
    /// Zero-sized packets are accepted and recorded.
    pub fn on_packet_sent(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant) {
        if self.sent_packets.contains_key(&pkt_num) {
            return;
        }

        self.sent_packets.insert(
            pkt_num,
            SentPacket {
                pkt_num,
                sent_size: bytes,
                time_sent: sent_time,
                time_acked: None,
                time_lost: None,
            },
        );
        self.bytes_in_flight = self.bytes_in_flight.saturating_add(bytes);
        self.algorithm.on_sent(pkt_num, bytes, sent_time);

        trace!(
            "{} {} ON_SENT pn={} size={} inflight={} cwnd={}",
            self.trace_id,
            self.algorithm.name(),
            pkt_num,
            bytes,
            self.bytes_in_flight,
            self.algorithm.congestion_window()
        );
    }

    /// Handle a packet acknowledgment event.
    ///
    /// Duplicate acks for a recorded packet are ignored. A packet number
    /// the ledger never saw is still forwarded with the caller-provided
    /// size and send time; the controller does not assume it is the only
    /// sender on the path.
    pub fn on_packet_acked(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant, ack_time: Instant) {
        let (bytes, sent_time) = match self.sent_packets.get_mut(&pkt_num) {
            Some(pkt) => {
                if pkt.time_acked.is_some() {
                    return;
                }
                let was_terminal = pkt.is_terminal();
                pkt.time_acked = Some(ack_time);
                let (sent_size, time_sent) = (pkt.sent_size, pkt.time_sent);
                if !was_terminal {
                    self.bytes_in_flight = self.bytes_in_flight.saturating_sub(sent_size);
                }
                (sent_size, time_sent)
            }
            None => (bytes, sent_time),
        };

        if ack_time > sent_time {
            self.rtt.update(ack_time - sent_time);
        }

        self.algorithm.on_ack(pkt_num, bytes, sent_time, ack_time);

        trace!(
            "{} {} ON_ACK pn={} size={} inflight={} cwnd={}",
            self.trace_id,
            self.algorithm.name(),
            pkt_num,
            bytes,
            self.bytes_in_flight,
            self.algorithm.congestion_window()
        );
    }

    /// Handle a packet loss event.
    ///
    /// Duplicate losses for a recorded packet are ignored; a packet that
    /// was already acknowledged keeps its bytes out of the in-flight
    /// counter. Unknown packet numbers are forwarded as-is.
    pub fn on_packet_lost(&mut self, pkt_num: u64, bytes: u64, sent_time: Instant, loss_time: Instant) {
        let (bytes, sent_time) = match self.sent_packets.get_mut(&pkt_num) {
            Some(pkt) => {
                if pkt.time_lost.is_some() {
                    return;
                }
                let was_terminal = pkt.is_terminal();
                pkt.time_lost = Some(loss_time);
                let (sent_size, time_sent) = (pkt.sent_size, pkt.time_sent);
                if !was_terminal {
                    self.bytes_in_flight = self.bytes_in_flight.saturating_sub(sent_size);
                }
                (sent_size, time_sent)
            }
            None => (bytes, sent_time),
        };

        self.algorithm.on_loss(pkt_num, bytes, sent_time, loss_time);

        trace!(
            "{} {} ON_LOST pn={} size={} inflight={} cwnd={}",
            self.trace_id,
            self.algorithm.name(),
            pkt_num,
            bytes,
            self.bytes_in_flight,
            self.algorithm.congestion_window()
        );
    }

    /// Handle a received ACK frame acknowledging the given packet numbers.
    ///
    /// Afterwards the attached loss detector, if any, is consulted and its
    /// verdicts are routed through the loss path.
    pub fn on_ack_received(&mut self, pkt_nums: &[u64], ack_time: Instant) {
        self.batch_ack(pkt_nums, ack_time);

        let lost_packets = match self.loss_detector.as_mut() {
            Some(loss_detector) => loss_detector.detect_lost_packets(&self.sent_packets, ack_time),
            None => return,
        };
        self.batch_loss(&lost_packets, ack_time);
    }

    /// Acknowledge a batch of recorded packets. Unknown packet numbers are
    /// skipped.
    pub fn batch_ack(&mut self, pkt_nums: &[u64], ack_time: Instant) {
        for &pkt_num in pkt_nums {
            if let Some(pkt) = self.sent_packets.get(&pkt_num).copied() {
                self.on_packet_acked(pkt_num, pkt.sent_size, pkt.time_sent, ack_time);
            }
        }
    }

    /// Declare a batch of recorded packets lost at `now`. Unknown packet
    /// numbers are skipped.
    pub fn batch_loss(&mut self, pkt_nums: &[u64], now: Instant) {
        for &pkt_num in pkt_nums {
            if let Some(pkt) = self.sent_packets.get(&pkt_num).copied() {
                self.on_packet_lost(pkt_num, pkt.sent_size, pkt.time_sent, now);
            }
        }
    }

    /// Check whether `bytes` more bytes fit into the congestion window
    /// next to what is currently in flight.
    pub fn can_send(&self, bytes: u64) -> bool {
        self.algorithm.can_send(bytes, self.bytes_in_flight)
    }

    /// Like `can_send()`, with a caller-provided in-flight figure.
    pub fn can_send_with_flight(&self, bytes: u64, bytes_in_flight: u64) -> bool {
        self.algorithm.can_send(bytes, bytes_in_flight)
    }

    /// Remaining congestion window space in bytes.
    pub fn available_window(&self) -> u64 {
        self.algorithm
            .congestion_window()
            .saturating_sub(self.bytes_in_flight)
    }

    /// Bytes sent but neither acked nor declared lost.
    pub fn bytes_in_flight(&self) -> u64 {
        self.bytes_in_flight
    }

    /// Current pacing rate of the algorithm, in bytes per second, if the
    /// algorithm estimates one.
    pub fn sending_rate(&self) -> Option<u64> {
        self.algorithm.pacing_rate()
    }

    /// Check if the algorithm is in slow start.
    pub fn is_in_slow_start(&self) -> bool {
        self.algorithm.in_slow_start()
    }

    /// Name of the active algorithm.
    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    /// The active algorithm.
    pub fn algorithm(&self) -> &dyn CongestionAlgorithm {
        self.algorithm.as_ref()
    }

    /// The RTT estimator.
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// The history of snapshots and algorithm switches, oldest first.
    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    /// Replace the active algorithm.
    ///
    /// The ledger and bytes in flight persist; the new algorithm starts
    /// from its initial window, since algorithm state is incomparable
    /// across variants. The switch is recorded in the history.
    pub fn switch_algorithm(&mut self, algorithm: CongestionControlAlgorithm, now: Instant) {
        let old_stats = self.algorithm.snapshot();

        self.config.congestion_control_algorithm = algorithm;
        let new_algorithm = build_congestion_algorithm(&self.config, now);

        debug!(
            "{} ALGORITHM_SWITCH old={} new={}",
            self.trace_id,
            old_stats.algorithm,
            new_algorithm.name()
        );

        self.push_history(HistoryEntry::AlgorithmSwitch {
            time: now,
            old: old_stats.algorithm,
            new: match algorithm {
                CongestionControlAlgorithm::NewReno => "NewReno",
                CongestionControlAlgorithm::Bbr => "BBR",
            },
            old_stats,
        });
        self.algorithm = new_algorithm;
    }

    /// Restore the freshly-constructed state: algorithm, RTT estimator,
    /// ledger, counters and history.
    pub fn reset(&mut self, now: Instant) {
        self.algorithm.reset(now);
        self.rtt.reset();
        self.sent_packets.clear();
        self.bytes_in_flight = 0;
        self.history.clear();
        self.last_stats_time = None;
    }

    /// Remove terminal records older than the retention horizon, bounding
    /// the ledger's memory.
    pub fn cleanup_packet_history(&mut self, now: Instant) {
        if let Some(horizon) = now.checked_sub(self.config.packet_retention) {
            self.sent_packets
                .retain(|_, pkt| !(pkt.is_terminal() && pkt.time_sent < horizon));
        }
    }

    /// Take a periodic statistics snapshot, throttled to the configured
    /// interval.
    pub fn collect_periodic_stats(&mut self, now: Instant) {
        if let Some(last_stats_time) = self.last_stats_time {
            if now.saturating_duration_since(last_stats_time) < self.config.stats_interval {
                return;
            }
        }

        self.last_stats_time = Some(now);
        let stats = self.stats();
        self.push_history(HistoryEntry::Snapshot { time: now, stats });
    }

    /// Build a statistics snapshot merging the algorithm view, the RTT
    /// estimator and the controller's own gauges.
    pub fn stats(&self) -> ControllerStats {
        let algorithm = self.algorithm.snapshot();
        let cwnd = algorithm.congestion_window;

        let unacked_packets = self
            .sent_packets
            .values()
            .filter(|pkt| !pkt.is_terminal())
            .count();
        let lost_packets_total = self
            .sent_packets
            .values()
            .filter(|pkt| pkt.time_lost.is_some())
            .count();
        let utilization = if cwnd == 0 {
            0.0
        } else {
            self.bytes_in_flight as f64 / cwnd as f64
        };

        ControllerStats {
            bytes_in_flight: self.bytes_in_flight,
            available_window: cwnd.saturating_sub(self.bytes_in_flight),
            sent_packets_count: self.sent_packets.len(),
            unacked_packets,
            lost_packets_total,
            utilization,
            min_rtt: self.rtt.min_rtt(),
            smoothed_rtt: self.rtt.smoothed_rtt(),
            rtt_var: self.rtt.rttvar(),
            algorithm,
        }
    }

    fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push_back(entry);
        while self.history.len() > self.config.stats_history_len {
            self.history.pop_front();
        }
    }
}
