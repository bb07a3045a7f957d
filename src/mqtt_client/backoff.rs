// MIT License
//
// Copyright (c) 2025 Takatoshi Kondo
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Reconnect delay computation.

use crate::mqtt_client::config::JitterMode;
use rand::Rng;
use tokio::time::Duration;

/// Exponential reconnect backoff with optional jitter.
///
/// Every delay is clamped to `[min, max]`:
///
/// - `None`: `min * 2^n`
/// - `Full`: uniform in `[0, min * 2^n]`
/// - `Decorrelated`: uniform in `[min, previous * 3]`
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    mode: JitterMode,
    min_ms: u64,
    max_ms: u64,
    attempts: u32,
    previous_ms: u64,
}

impl ReconnectBackoff {
    pub fn new(mode: JitterMode, min: Duration, max: Duration) -> Self {
        let min_ms = min.as_millis().try_into().unwrap_or(u64::MAX);
        let max_ms = max.as_millis().try_into().unwrap_or(u64::MAX).max(min_ms);
        Self {
            mode,
            min_ms,
            max_ms,
            attempts: 0,
            previous_ms: min_ms,
        }
    }

    /// Returns the delay before the next attempt and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let exponential = self
            .min_ms
            .max(1)
            .saturating_mul(1u64.checked_shl(self.attempts).unwrap_or(u64::MAX))
            .min(self.max_ms);
        let delay = match self.mode {
            JitterMode::None => exponential,
            JitterMode::Full => rand::thread_rng().gen_range(0..=exponential),
            JitterMode::Decorrelated => {
                let upper = self.previous_ms.saturating_mul(3).max(self.min_ms);
                rand::thread_rng().gen_range(self.min_ms..=upper)
            }
        }
        .clamp(self.min_ms, self.max_ms);
        self.attempts = self.attempts.saturating_add(1);
        self.previous_ms = delay;
        Duration::from_millis(delay)
    }

    /// Starts the sequence over from the minimum delay.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.previous_ms = self.min_ms;
    }
}
