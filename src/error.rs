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

/// An enumeration of errors raised by the congestion core.
///
/// The error surface is intentionally narrow. Events arriving from the
/// network peer are handled by graceful no-ops rather than errors, so that
/// the core stays safe under duplicate, reordered, or adversarial input.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Error {
    /// The reduction factor passed to `CongestionWindow::reduce()` was
    /// outside the open interval (0, 1).
    #[default]
    InvalidReductionFactor,

    /// The configuration is invalid.
    InvalidConfig(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_format() {
        assert_eq!(
            format!("{}", Error::InvalidReductionFactor),
            "InvalidReductionFactor"
        );
        assert_eq!(
            format!("{}", Error::InvalidConfig("unknown".into())),
            "InvalidConfig(\"unknown\")"
        );
    }
}
