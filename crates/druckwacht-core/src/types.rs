// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Druckwacht printer monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// A printer that answered an SDCP discovery probe.
///
/// Endpoints are immutable once discovered.  When a printer is seen again
/// with different details (typically a new DHCP lease) the old value is
/// replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterEndpoint {
    /// SDCP device identifier (the `Id` of the discovery reply).
    pub id: String,
    /// User-assigned printer name.
    pub name: String,
    /// Address the status channel is opened against.
    pub address: IpAddr,
    /// Mainboard identifier, used to address status requests.
    pub mainboard_id: String,
    /// SDCP protocol version reported by the printer (e.g. "V3.0.0").
    pub protocol_version: String,
    pub firmware_version: Option<String>,
    pub machine_name: Option<String>,
    pub brand_name: Option<String>,
}

impl PrinterEndpoint {
    /// WebSocket URL of the printer's status channel.
    pub fn websocket_url(&self, port: u16) -> String {
        format!("ws://{}/websocket", SocketAddr::new(self.address, port))
    }
}

/// Normalised printer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrinterState {
    Idle,
    Printing,
    Paused,
    Complete,
    /// Job stopped, either by the user or by a fault.
    Error,
    /// No live status channel.  Never decoded from a payload.
    Offline,
    Unknown,
}

impl PrinterState {
    /// Upper-case name used in console output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Printing => "PRINTING",
            Self::Paused => "PAUSED",
            Self::Complete => "COMPLETE",
            Self::Error => "ERROR",
            Self::Offline => "OFFLINE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether a job is in flight (progress is meaningful).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Printing | Self::Paused | Self::Error | Self::Unknown)
    }
}

impl std::fmt::Display for PrinterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded status snapshot.
///
/// A fresh value is produced for every status message and compared against
/// the previous one; snapshots are never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterStatus {
    pub state: PrinterState,
    /// Raw SDCP machine status (`CurrentStatus[0]`), kept for display.
    pub machine_status: Option<u32>,
    /// Raw SDCP print status (`PrintInfo.Status`), kept for display.
    pub print_status: Option<u32>,
    /// Heated bed temperature in °C.
    pub bed_temperature: Option<f64>,
    /// Job progress in percent (0-100, 5 % steps).
    pub progress: Option<u8>,
    pub filename: Option<String>,
    /// When this snapshot was received.
    pub raw_timestamp: DateTime<Utc>,
}

impl PrinterStatus {
    /// A snapshot carrying only a state, stamped with the current time.
    pub fn with_state(state: PrinterState) -> Self {
        Self {
            state,
            machine_status: None,
            print_status: None,
            bed_temperature: None,
            progress: None,
            filename: None,
            raw_timestamp: Utc::now(),
        }
    }

    /// Bed temperature rounded to whole degrees.
    pub fn bed_temperature_rounded(&self) -> Option<i64> {
        self.bed_temperature.map(|t| t.round() as i64)
    }
}

/// Kinds of audible alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Paused,
    Error,
    Complete,
    BedCooled,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::BedCooled => "bed cooled",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection lifecycle of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Connecting,
    Connected,
    Polling,
    Reconnecting,
    /// Terminal.  The coordinator reaps closed sessions.
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Polling => "POLLING",
            Self::Reconnecting => "RECONNECTING",
            Self::Closed => "CLOSED",
        }
    }
}

/// Why a printer was dropped from monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalReason {
    /// Not confirmed by discovery or status traffic within the liveness timeout.
    LivenessTimeout,
    /// The session gave up reconnecting and closed itself.
    Unreachable,
    /// Process shutdown.
    Shutdown,
}

/// Everything the monitor reports to its output collaborators.
///
/// Events belonging to one printer are delivered in the order the printer's
/// session produced them.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// A printer was seen for the first time.
    Discovered { endpoint: PrinterEndpoint },
    /// A known printer answered with different details (e.g. a new address).
    EndpointUpdated {
        previous: PrinterEndpoint,
        current: PrinterEndpoint,
    },
    /// The session moved to a new connection phase.
    Phase {
        endpoint: PrinterEndpoint,
        phase: SessionPhase,
    },
    /// First status of a session; there is nothing to compare it with.
    Observed {
        endpoint: PrinterEndpoint,
        status: PrinterStatus,
    },
    /// The normalised state changed between two consecutive snapshots.
    Transition {
        endpoint: PrinterEndpoint,
        from: PrinterState,
        to: PrinterState,
        status: PrinterStatus,
    },
    /// Job progress moved while the state stayed the same.
    Progress {
        endpoint: PrinterEndpoint,
        status: PrinterStatus,
    },
    /// Bed temperature reached a new multiple of 5 °C while idle or complete.
    BedTemperature {
        endpoint: PrinterEndpoint,
        status: PrinterStatus,
    },
    /// The bed dropped to or below the cooldown threshold from above.
    ThresholdCrossed {
        endpoint: PrinterEndpoint,
        threshold_c: f64,
        status: PrinterStatus,
    },
    /// An alert fired.  Consumed by the audio collaborator.
    Alert {
        endpoint: PrinterEndpoint,
        kind: AlertKind,
        status: PrinterStatus,
    },
    /// The printer's session was torn down.
    Removed {
        endpoint: PrinterEndpoint,
        reason: RemovalReason,
    },
}

impl MonitorEvent {
    /// The printer this event concerns.
    pub fn endpoint(&self) -> &PrinterEndpoint {
        match self {
            Self::Discovered { endpoint }
            | Self::Phase { endpoint, .. }
            | Self::Observed { endpoint, .. }
            | Self::Transition { endpoint, .. }
            | Self::Progress { endpoint, .. }
            | Self::BedTemperature { endpoint, .. }
            | Self::ThresholdCrossed { endpoint, .. }
            | Self::Alert { endpoint, .. }
            | Self::Removed { endpoint, .. } => endpoint,
            Self::EndpointUpdated { current, .. } => current,
        }
    }

    /// The status snapshot carried by the event, if any.
    pub fn status(&self) -> Option<&PrinterStatus> {
        match self {
            Self::Observed { status, .. }
            | Self::Transition { status, .. }
            | Self::Progress { status, .. }
            | Self::BedTemperature { status, .. }
            | Self::ThresholdCrossed { status, .. }
            | Self::Alert { status, .. } => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> PrinterEndpoint {
        PrinterEndpoint {
            id: "f25273b12b094c5a8b9513a30ca60049".into(),
            name: "Centauri Carbon".into(),
            address: "192.168.1.50".parse().unwrap(),
            mainboard_id: "000000000001d354".into(),
            protocol_version: "V3.0.0".into(),
            firmware_version: Some("V1.1.29".into()),
            machine_name: None,
            brand_name: None,
        }
    }

    #[test]
    fn websocket_url_uses_address_and_port() {
        assert_eq!(
            endpoint().websocket_url(3030),
            "ws://192.168.1.50:3030/websocket"
        );
    }

    #[test]
    fn websocket_url_brackets_ipv6_addresses() {
        let mut printer = endpoint();
        printer.address = "fe80::1".parse().unwrap();
        assert_eq!(printer.websocket_url(3030), "ws://[fe80::1]:3030/websocket");
    }

    #[test]
    fn bed_temperature_rounds_half_up() {
        let mut status = PrinterStatus::with_state(PrinterState::Complete);
        status.bed_temperature = Some(39.5);
        assert_eq!(status.bed_temperature_rounded(), Some(40));
        status.bed_temperature = None;
        assert_eq!(status.bed_temperature_rounded(), None);
    }

    #[test]
    fn status_accessor_skips_lifecycle_events() {
        let discovered = MonitorEvent::Discovered {
            endpoint: endpoint(),
        };
        assert!(discovered.status().is_none());

        let observed = MonitorEvent::Observed {
            endpoint: endpoint(),
            status: PrinterStatus::with_state(PrinterState::Idle),
        };
        assert_eq!(observed.status().map(|s| s.state), Some(PrinterState::Idle));
        assert_eq!(observed.endpoint().name, "Centauri Carbon");
    }

    #[test]
    fn idle_and_complete_are_not_active() {
        assert!(!PrinterState::Idle.is_active());
        assert!(!PrinterState::Complete.is_active());
        assert!(PrinterState::Printing.is_active());
        assert!(PrinterState::Paused.is_active());
    }
}
