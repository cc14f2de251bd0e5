//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Reconnection policy for client connections.
//!
//! A [`Connection`](super::Connection) consults its strategy after every
//! failed connect and every lost link. The strategy decides whether another
//! attempt is made and how long to wait before it.

use crate::transport::TransportError;
use async_trait::async_trait;
use std::time::Duration;

/// Decides when and whether a connection retries.
#[async_trait]
pub trait ReconnectionStrategy: Send + Sync + std::fmt::Debug {
    /// Returns `true` if attempt number `attempt` (0-based) should be made
    /// after `last_error`.
    async fn should_reconnect(&self, attempt: u32, last_error: &TransportError) -> bool;

    /// Delay before attempt number `attempt`.
    async fn next_delay(&self, attempt: u32) -> Duration;

    /// Short name for logging.
    fn name(&self) -> &str;
}

/// Exponential backoff with optional full jitter.
///
/// The delay before attempt `n` is `initial_delay * multiplier^n`, capped at
/// `max_delay`. With jitter enabled a uniformly random fraction of that
/// delay is used instead. Errors that are not
/// [recoverable](TransportError::is_recoverable) end the retries.
///
/// # Examples
///
/// ```rust
/// use dotrpc::transport::ExponentialBackoff;
/// use std::time::Duration;
///
/// let strategy = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(50))
///     .max_delay(Duration::from_secs(2))
///     .max_attempts(Some(10))
///     .build();
/// assert!(format!("{strategy:?}").contains("max_attempts: Some(10)"));
/// ```
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    max_attempts: Option<u32>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

impl ExponentialBackoff {
    /// Returns a builder starting from the defaults (100 ms initial delay,
    /// 5 s cap, doubling, jitter, unlimited attempts).
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = Duration::from_millis(base_ms.min(u64::MAX as f64) as u64).min(self.max_delay);

        if self.jitter {
            let jittered = rand::random::<f64>() * capped.as_millis() as f64;
            Duration::from_millis(jittered as u64)
        } else {
            capped
        }
    }
}

#[async_trait]
impl ReconnectionStrategy for ExponentialBackoff {
    async fn should_reconnect(&self, attempt: u32, last_error: &TransportError) -> bool {
        if !last_error.is_recoverable() {
            return false;
        }
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }

    async fn next_delay(&self, attempt: u32) -> Duration {
        self.calculate_delay(attempt)
    }

    fn name(&self) -> &str {
        "ExponentialBackoff"
    }
}

/// Builder for [`ExponentialBackoff`].
#[derive(Debug, Clone)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    max_attempts: Option<u32>,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
            max_attempts: None,
        }
    }
}

impl ExponentialBackoffBuilder {
    /// Sets the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the upper bound of any single delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor between attempts.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Limits the number of consecutive attempts. `None` retries forever.
    pub fn max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Builds the strategy.
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
            max_attempts: self.max_attempts,
        }
    }
}
