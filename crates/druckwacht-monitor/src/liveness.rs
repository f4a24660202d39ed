// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer liveness tracking.
//
// A printer stays monitored as long as something confirms it is still there:
// a discovery reply or a status message on its channel.  Once neither has
// been seen for the liveness timeout, the coordinator tears its session down.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Last confirmation time per printer id.
#[derive(Debug)]
pub struct LivenessTracker {
    last_seen: HashMap<String, Instant>,
    timeout: Duration,
}

impl LivenessTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout,
        }
    }

    /// Record that `printer_id` was confirmed at `at`.
    pub fn record_seen(&mut self, printer_id: &str, at: Instant) {
        match self.last_seen.get_mut(printer_id) {
            Some(seen) => {
                if at > *seen {
                    *seen = at;
                }
            }
            None => {
                debug!(printer = printer_id, "tracking liveness");
                self.last_seen.insert(printer_id.to_string(), at);
            }
        }
    }

    /// Printers not confirmed within the timeout as of `now`.
    pub fn expired(&self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > self.timeout)
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        for id in &expired {
            info!(printer = %id, timeout_ms = self.timeout.as_millis(), "liveness timeout exceeded");
        }
        expired
    }

    /// Stop tracking a printer.
    pub fn forget(&mut self, printer_id: &str) {
        self.last_seen.remove(printer_id);
    }

    pub fn last_seen(&self, printer_id: &str) -> Option<Instant> {
        self.last_seen.get(printer_id).copied()
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}
