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

use crate::Error;
use crate::Result;
use crate::MAX_CONGESTION_WINDOW;
use crate::MAX_SEGMENT_SIZE;
use crate::MIN_CONGESTION_WINDOW;

/// A byte-counted congestion window with a slow start threshold.
///
/// The window size is kept within `[MIN_CONGESTION_WINDOW,
/// MAX_CONGESTION_WINDOW]` on every mutation; the threshold is kept at or
/// above `MIN_CONGESTION_WINDOW`. See RFC 9002 Section 7.2
#[derive(Clone, Copy, Debug)]
pub struct CongestionWindow {
    /// Congestion window in bytes.
    size: u64,

    /// Slow start threshold in bytes.
    ssthresh: u64,

    /// Window size restored by `reset()`.
    initial_size: u64,

    /// Threshold restored by `reset()`.
    initial_ssthresh: u64,
}

impl CongestionWindow {
    pub fn new(initial_size: u64, initial_ssthresh: u64) -> Self {
        let initial_size = initial_size.clamp(MIN_CONGESTION_WINDOW, MAX_CONGESTION_WINDOW);
        let initial_ssthresh = initial_ssthresh.max(MIN_CONGESTION_WINDOW);
        Self {
            size: initial_size,
            ssthresh: initial_ssthresh,
            initial_size,
            initial_ssthresh,
        }
    }

    /// Current congestion window in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current slow start threshold in bytes.
    pub fn ssthresh(&self) -> u64 {
        self.ssthresh
    }

    /// Check if in the slow start phase.
    pub fn in_slow_start(&self) -> bool {
        self.size < self.ssthresh
    }

    /// Grow the window by the acknowledged bytes during slow start.
    ///
    /// No-op outside of slow start.
    pub fn slow_start_increase(&mut self, acked_bytes: u64) {
        if self.in_slow_start() {
            self.set_size(self.size.saturating_add(acked_bytes));
        }
    }

    /// Grow the window by roughly one segment per window of acknowledged
    /// data during congestion avoidance, at least one byte per call.
    ///
    /// No-op during slow start. See RFC 5681 Section 3.1
    pub fn congestion_avoidance_increase(&mut self, acked_bytes: u64) {
        if self.in_slow_start() {
            return;
        }
        let increment = (MAX_SEGMENT_SIZE.saturating_mul(acked_bytes) / self.size).max(1);
        self.set_size(self.size.saturating_add(increment));
    }

    /// Collapse the window in response to a congestion event.
    ///
    /// The threshold becomes `size * factor` (floored at the minimal
    /// window), and the window is set to the new threshold.
    pub fn reduce(&mut self, factor: f64) -> Result<()> {
        if factor <= 0.0 || factor >= 1.0 {
            return Err(Error::InvalidReductionFactor);
        }
        self.ssthresh = ((self.size as f64 * factor) as u64).max(MIN_CONGESTION_WINDOW);
        self.size = self.ssthresh;
        Ok(())
    }

    /// Set the window size, clamped into the permitted range.
    pub fn set_size(&mut self, bytes: u64) {
        self.size = bytes.clamp(MIN_CONGESTION_WINDOW, MAX_CONGESTION_WINDOW);
    }

    /// Set the slow start threshold, floored at the minimal window.
    pub fn set_ssthresh(&mut self, bytes: u64) {
        self.ssthresh = bytes.max(MIN_CONGESTION_WINDOW);
    }

    /// Check whether the given number of bytes fits into the window.
    pub fn can_send(&self, bytes: u64, bytes_in_flight: u64) -> bool {
        bytes_in_flight.saturating_add(bytes) <= self.size
    }

    /// Remaining window space in bytes.
    pub fn available(&self, bytes_in_flight: u64) -> u64 {
        self.size.saturating_sub(bytes_in_flight)
    }

    /// Restore the initial window and threshold.
    pub fn reset(&mut self) {
        self.size = self.initial_size;
        self.ssthresh = self.initial_ssthresh;
    }
}

impl Default for CongestionWindow {
    fn default() -> Self {
        Self::new(crate::INITIAL_CONGESTION_WINDOW, MAX_CONGESTION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::INITIAL_CONGESTION_WINDOW;

    #[test]
    fn window_default() {
        let window = CongestionWindow::default();
        assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW);
        assert_eq!(window.ssthresh(), MAX_CONGESTION_WINDOW);
        assert_eq!(window.in_slow_start(), true);
    }

    #[test]
    fn window_clamping() {
        let mut window = CongestionWindow::default();

        window.set_size(100);
        assert_eq!(window.size(), MIN_CONGESTION_WINDOW);

        window.set_size(100 * 1024 * 1024);
        assert_eq!(window.size(), MAX_CONGESTION_WINDOW);

        window.set_ssthresh(100);
        assert_eq!(window.ssthresh(), MIN_CONGESTION_WINDOW);
    }

    #[test]
    fn window_slow_start_increase() {
        let mut window = CongestionWindow::default();

        window.slow_start_increase(MAX_SEGMENT_SIZE);
        assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW + MAX_SEGMENT_SIZE);

        // Outside of slow start the helper does nothing.
        window.set_ssthresh(MIN_CONGESTION_WINDOW);
        assert_eq!(window.in_slow_start(), false);
        let size = window.size();
        window.slow_start_increase(MAX_SEGMENT_SIZE);
        assert_eq!(window.size(), size);
    }

    #[test]
    fn window_congestion_avoidance_increase() {
        let mut window = CongestionWindow::default();

        // No-op while in slow start.
        window.congestion_avoidance_increase(MAX_SEGMENT_SIZE);
        assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW);

        // A full window of acked data grows the window by about one segment.
        window.set_ssthresh(MIN_CONGESTION_WINDOW);
        window.congestion_avoidance_increase(INITIAL_CONGESTION_WINDOW);
        assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW + MAX_SEGMENT_SIZE);

        // Tiny acks still make progress.
        let size = window.size();
        window.congestion_avoidance_increase(1);
        assert_eq!(window.size(), size + 1);
    }

    #[test]
    fn window_reduce() {
        let mut window = CongestionWindow::default();

        window.reduce(0.5).unwrap();
        assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW / 2);
        assert_eq!(window.ssthresh(), INITIAL_CONGESTION_WINDOW / 2);

        // Repeated reductions bottom out at the minimal window.
        window.reduce(0.5).unwrap();
        window.reduce(0.5).unwrap();
        assert_eq!(window.size(), MIN_CONGESTION_WINDOW);
        assert_eq!(window.ssthresh(), MIN_CONGESTION_WINDOW);
    }

    #[test]
    fn window_reduce_invalid_factor() {
        let mut window = CongestionWindow::default();

        for factor in [0.0, -0.5, 1.0, 1.5] {
            assert_eq!(window.reduce(factor), Err(Error::InvalidReductionFactor));
            assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW);
        }
    }

    #[test]
    fn window_can_send() {
        let window = CongestionWindow::default();

        assert_eq!(window.can_send(MAX_SEGMENT_SIZE, 0), true);
        assert_eq!(window.can_send(0, INITIAL_CONGESTION_WINDOW), true);
        assert_eq!(window.can_send(1, INITIAL_CONGESTION_WINDOW), false);
        assert_eq!(window.available(0), INITIAL_CONGESTION_WINDOW);
        assert_eq!(window.available(MAX_SEGMENT_SIZE), INITIAL_CONGESTION_WINDOW - MAX_SEGMENT_SIZE);
        assert_eq!(window.available(u64::MAX), 0);
    }

    #[test]
    fn window_reset() {
        let mut window = CongestionWindow::default();
        window.reduce(0.5).unwrap();

        window.reset();
        assert_eq!(window.size(), INITIAL_CONGESTION_WINDOW);
        assert_eq!(window.ssthresh(), MAX_CONGESTION_WINDOW);
    }
}
