// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Monitor configuration.
//
// All timing policy (poll interval, liveness timeout, backoff bounds) lives
// here rather than in the engine so tests can shrink it to milliseconds.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DruckwachtError, Result};
use crate::types::AlertKind;

/// Persistent monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between status requests on an open connection.
    pub poll_interval_ms: u64,
    /// How long a printer may go unconfirmed before its session is torn down.
    pub liveness_timeout_ms: u64,
    /// Pause between discovery probes.
    pub discovery_interval_ms: u64,
    /// How long to collect replies after each probe.
    pub discovery_window_ms: u64,
    /// First reconnect delay; doubled per failed attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for the reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// An open connection with no inbound traffic for this long is dead.
    pub silence_timeout_ms: u64,
    /// Bed temperature (°C) at or below which the bed counts as cooled.
    pub bed_cooldown_threshold_c: f64,
    /// Destination of the discovery broadcast.
    pub broadcast_address: IpAddr,
    /// UDP port printers answer discovery probes on.
    pub discovery_port: u16,
    /// TCP port of the printer's WebSocket status channel.
    pub websocket_port: u16,
    /// Printers probed by unicast on every cycle (for networks that drop broadcast).
    pub static_printers: Vec<IpAddr>,
    pub audio: AudioConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            liveness_timeout_ms: 60_000,
            discovery_interval_ms: 10_000,
            discovery_window_ms: 3_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            silence_timeout_ms: 15_000,
            bed_cooldown_threshold_c: 40.0,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            discovery_port: 3000,
            websocket_port: 3030,
            static_printers: Vec::new(),
            audio: AudioConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("liveness_timeout_ms", self.liveness_timeout_ms),
            ("discovery_interval_ms", self.discovery_interval_ms),
            ("discovery_window_ms", self.discovery_window_ms),
            ("reconnect_base_delay_ms", self.reconnect_base_delay_ms),
            ("silence_timeout_ms", self.silence_timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(DruckwachtError::Config(format!("{name} must be non-zero")));
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(DruckwachtError::Config(format!(
                "reconnect_max_delay_ms ({}) is below reconnect_base_delay_ms ({})",
                self.reconnect_max_delay_ms, self.reconnect_base_delay_ms
            )));
        }
        if !self.bed_cooldown_threshold_c.is_finite() {
            return Err(DruckwachtError::Config(
                "bed_cooldown_threshold_c must be a finite number".into(),
            ));
        }
        Ok(())
    }
}

/// How alerts are made audible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Master switch; when off, alerts are only printed.
    pub enabled: bool,
    /// External command per alert kind, run through the shell.  Kinds without
    /// an entry ring the terminal bell.
    pub commands: HashMap<AlertKind, String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commands: HashMap::new(),
        }
    }
}
