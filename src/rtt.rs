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

use std::cmp;
use std::time::Duration;

/// RTT estimation for a network path.
/// See RFC 9002 Section 5
#[derive(Copy, Clone, Debug, Default)]
pub struct RttEstimator {
    /// The most recent RTT sample.
    latest_rtt: Option<Duration>,

    /// The smoothed RTT of the path is an exponentially weighted moving
    /// average of an endpoint's RTT samples.
    smoothed_rtt: Option<Duration>,

    /// The RTT variance estimates the variation in the RTT samples using a
    /// mean variation.
    rttvar: Duration,

    /// The minimum RTT observed on the path so far.
    min_rtt: Option<Duration>,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current best RTT estimation, if any sample was taken.
    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.smoothed_rtt
    }

    /// Return the latest RTT sample.
    pub fn latest_rtt(&self) -> Option<Duration> {
        self.latest_rtt
    }

    /// Return the minimum RTT observed so far for this estimator.
    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    /// Return the variation in the RTT samples using a mean variation.
    pub fn rttvar(&self) -> Option<Duration> {
        self.smoothed_rtt.map(|_| self.rttvar)
    }

    /// Update the estimator with the given RTT sample.
    ///
    /// Zero-length samples carry no information and are rejected; `Duration`
    /// is unsigned, so negative samples cannot reach this method.
    pub fn update(&mut self, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }

        self.latest_rtt = Some(rtt);

        if let Some(smoothed_rtt) = self.smoothed_rtt {
            self.min_rtt = Some(cmp::min(self.min_rtt.unwrap_or(rtt), rtt));

            let var_sample = if smoothed_rtt > rtt {
                smoothed_rtt - rtt
            } else {
                rtt - smoothed_rtt
            };

            self.rttvar = (3 * self.rttvar + var_sample) / 4;
            self.smoothed_rtt = Some((7 * smoothed_rtt + rtt) / 8);
        } else {
            self.smoothed_rtt = Some(rtt);
            self.rttvar = rtt / 2;
            self.min_rtt = Some(rtt);
        }
    }

    /// Discard all samples and restore the initial state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
