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

//! Congestion control core for a QUIC endpoint.
//!
//! This crate decides, at any instant, how many bytes may be outstanding
//! on a connection, how fast they may be paced onto the wire, and how
//! these bounds evolve in response to acknowledgements and loss signals.
//!
//! * [`CongestionController`] coordinates a connection: it owns the
//!   sent-packet ledger and bytes-in-flight counter, drives RTT
//!   estimation, forwards normalized events to the active algorithm, and
//!   answers admission queries such as [`CongestionController::can_send`].
//! * [`CongestionAlgorithm`](congestion_control::CongestionAlgorithm) is
//!   the uniform algorithm contract. Two algorithms are provided: NewReno,
//!   a loss-based controller, and BBR v1, a model-based controller. The
//!   algorithm can be hot-swapped while the ledger persists.
//!
//! The core is single-threaded cooperative and fully deterministic: all
//! time values enter through method parameters, never from the
//! environment. An embedding that shares a controller across threads must
//! provide external mutual exclusion.
//!
//! ## Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use quic_congestion::{CongestionConfig, CongestionController};
//!
//! let now = Instant::now();
//! let mut controller = CongestionController::new(CongestionConfig::default(), now);
//!
//! if controller.can_send(1200) {
//!     controller.on_packet_sent(0, 1200, now);
//! }
//! controller.on_ack_received(&[0], now + Duration::from_millis(30));
//! assert_eq!(controller.bytes_in_flight(), 0);
//! ```

use std::time::Duration;

pub use crate::congestion_control::CongestionAlgorithm;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::controller::CongestionController;
pub use crate::controller::LossDetector;
pub use crate::controller::SentPacket;
pub use crate::error::Error;
pub use crate::rtt::RttEstimator;

/// The maximum segment size in bytes, the unit of window arithmetic.
pub const MAX_SEGMENT_SIZE: u64 = 1200;

/// The minimal congestion window in bytes.
/// The RECOMMENDED value is 2 * max_datagram_size.
/// See RFC 9002 Section 7.2
pub const MIN_CONGESTION_WINDOW: u64 = 2 * MAX_SEGMENT_SIZE;

/// The maximal congestion window in bytes.
pub const MAX_CONGESTION_WINDOW: u64 = 64 * 1024 * 1024;

/// The initial congestion window in bytes.
/// Endpoints SHOULD use an initial congestion window of ten times the
/// maximum datagram size. See RFC 9002 Section 7.2
pub const INITIAL_CONGESTION_WINDOW: u64 = 10 * MAX_SEGMENT_SIZE;

/// The multiplicative window decrease applied on a congestion event.
/// See RFC 9002 Section 7.3.2
pub const LOSS_REDUCTION_FACTOR: f64 = 0.5;

/// Result type for congestion control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about congestion control and statistics collection.
#[derive(Debug, Clone)]
pub struct CongestionConfig {
    /// The congestion control algorithm for the connection.
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// The maximum size of outgoing UDP payloads in bytes.
    pub max_datagram_size: u64,

    /// The initial congestion window in packets.
    /// See RFC 9002 Section 7.2
    pub initial_congestion_window: u64,

    /// The minimum duration for the BBR ProbeRTT state.
    pub bbr_probe_rtt_duration: Duration,

    /// The duration of one phase of the BBR ProbeBW gain cycle.
    pub bbr_cycle_duration: Duration,

    /// How long the BBR gain cycle may sit idle before ProbeRTT is
    /// entered.
    pub bbr_probe_rtt_interval: Duration,

    /// Minimum interval between periodic statistics snapshots.
    pub stats_interval: Duration,

    /// Upper bound on the statistics history length.
    pub stats_history_len: usize,

    /// How long terminal packet records are retained in the ledger.
    pub packet_retention: Duration,
}

impl CongestionConfig {
    /// Set the congestion control algorithm.
    pub fn set_congestion_control_algorithm(
        &mut self,
        cca: CongestionControlAlgorithm,
    ) -> &mut Self {
        self.congestion_control_algorithm = cca;
        self
    }

    /// Set the maximum size of outgoing UDP payloads in bytes.
    pub fn set_max_datagram_size(&mut self, max_datagram_size: u64) -> &mut Self {
        self.max_datagram_size = max_datagram_size;
        self
    }

    /// Set the initial congestion window in packets.
    pub fn set_initial_congestion_window(&mut self, packets: u64) -> &mut Self {
        self.initial_congestion_window = packets;
        self
    }

    /// Set the minimum interval between periodic statistics snapshots.
    pub fn set_stats_interval(&mut self, stats_interval: Duration) -> &mut Self {
        self.stats_interval = stats_interval;
        self
    }

    /// Set the retention horizon for terminal packet records.
    pub fn set_packet_retention(&mut self, packet_retention: Duration) -> &mut Self {
        self.packet_retention = packet_retention;
        self
    }
}

impl Default for CongestionConfig {
    fn default() -> CongestionConfig {
        CongestionConfig {
            congestion_control_algorithm: CongestionControlAlgorithm::NewReno,
            max_datagram_size: MAX_SEGMENT_SIZE,
            initial_congestion_window: 10,
            bbr_probe_rtt_duration: Duration::from_millis(200),
            bbr_cycle_duration: Duration::from_secs(1),
            bbr_probe_rtt_interval: Duration::from_secs(10),
            stats_interval: Duration::from_secs(1),
            stats_history_len: 300,
            packet_retention: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let config = CongestionConfig::default();
        assert_eq!(
            config.congestion_control_algorithm,
            CongestionControlAlgorithm::NewReno
        );
        assert_eq!(
            config.initial_congestion_window * config.max_datagram_size,
            INITIAL_CONGESTION_WINDOW
        );
        assert_eq!(config.stats_history_len, 300);
        assert_eq!(config.packet_retention, Duration::from_secs(60));
    }

    #[test]
    fn config_setters() {
        let mut config = CongestionConfig::default();
        config
            .set_congestion_control_algorithm(CongestionControlAlgorithm::Bbr)
            .set_max_datagram_size(1400)
            .set_initial_congestion_window(20)
            .set_stats_interval(Duration::from_secs(5))
            .set_packet_retention(Duration::from_secs(120));

        assert_eq!(
            config.congestion_control_algorithm,
            CongestionControlAlgorithm::Bbr
        );
        assert_eq!(config.max_datagram_size, 1400);
        assert_eq!(config.initial_congestion_window, 20);
        assert_eq!(config.stats_interval, Duration::from_secs(5));
        assert_eq!(config.packet_retention, Duration::from_secs(120));
    }
}

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;
pub mod controller;
pub mod error;
pub mod rtt;
