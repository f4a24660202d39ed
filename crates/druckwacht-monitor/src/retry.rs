// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Reconnect backoff for device sessions.
//
// Exponential backoff with jitter, capped at a maximum delay.  There is no
// retry limit: a session keeps trying until its liveness timeout runs out or
// the monitor shuts down.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use druckwacht_core::MonitorConfig;
use druckwacht_core::error::DruckwachtError;
use tracing::debug;

/// Backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect attempt.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&MonitorConfig> for BackoffConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            base_delay: config.reconnect_base_delay(),
            max_delay: config.reconnect_max_delay(),
        }
    }
}

/// Per-session reconnect schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
    /// Per-printer jitter seed.
    seed: u64,
}

impl Backoff {
    /// Schedule for the printer identified by `printer_id`.
    ///
    /// The id seeds the jitter, so printers that drop together spread
    /// their reconnect attempts out.
    pub fn new(config: BackoffConfig, printer_id: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        printer_id.hash(&mut hasher);
        Self {
            config,
            attempt: 0,
            seed: hasher.finish(),
        }
    }

    /// Delay to wait before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = compute_delay(self.attempt, self.seed, &self.config);
        debug!(attempt = self.attempt, delay_ms = delay.as_millis(), "scheduling reconnect");
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

/// Whether a session error should lead to a reconnect rather than a stop.
pub fn should_reconnect(err: &DruckwachtError) -> bool {
    err.is_transient()
}

/// Compute exponential backoff delay with jitter.
///
/// delay = min(base * 2^attempt + jitter, max_delay)
/// jitter is a value in [0, base) derived from the attempt and the
/// printer's seed.
fn compute_delay(attempt: u32, seed: u64, config: &BackoffConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));

    let jitter_ms = jitter(base_ms, attempt, seed);
    let total_ms = exp_ms.saturating_add(jitter_ms);
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);

    Duration::from_millis(capped_ms)
}

/// Deterministic spread in [0, base): mix seed and attempt, take modulo base.
fn jitter(base_ms: u64, attempt: u32, seed: u64) -> u64 {
    let hash = seed
        .wrapping_add(attempt as u64)
        .wrapping_mul(6364136223846793005)
        .rotate_right(29);
    hash % base_ms.max(1)
}
