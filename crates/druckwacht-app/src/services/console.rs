// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Console reporter: one line on stdout per monitor event.
//
// Pause and stop lines are inverted red, completion and cooldown lines
// inverted green, printing lines yellow.  Colour is only used when stdout is
// a terminal.

use std::io::{IsTerminal, Write};

use chrono::Local;

use druckwacht_core::types::{
    AlertKind, MonitorEvent, PrinterEndpoint, PrinterState, PrinterStatus, RemovalReason,
    SessionPhase,
};
use druckwacht_monitor::EventReporter;
use druckwacht_monitor::protocol::status_label;

const RESET: &str = "\x1b[0m";

/// How a line is highlighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Plain,
    /// Needs attention: paused, stopped, offline.
    Alarm,
    /// Finished: complete, bed cooled.
    Done,
    Busy,
}

impl Tone {
    fn ansi(self) -> Option<&'static str> {
        match self {
            Tone::Plain => None,
            Tone::Alarm => Some("\x1b[7;31m"),
            Tone::Done => Some("\x1b[7;32m"),
            Tone::Busy => Some("\x1b[33m"),
        }
    }

    fn for_state(state: PrinterState) -> Self {
        match state {
            PrinterState::Paused | PrinterState::Error | PrinterState::Offline => Tone::Alarm,
            PrinterState::Complete => Tone::Done,
            PrinterState::Printing => Tone::Busy,
            PrinterState::Idle | PrinterState::Unknown => Tone::Plain,
        }
    }

    fn for_alert(kind: AlertKind) -> Self {
        match kind {
            AlertKind::Paused | AlertKind::Error => Tone::Alarm,
            AlertKind::Complete | AlertKind::BedCooled => Tone::Done,
        }
    }
}

/// Writes monitor events to stdout.
pub struct ConsoleReporter {
    colour: bool,
}

impl ConsoleReporter {
    /// Reporter for the process's stdout, coloured if it is a terminal.
    pub fn stdout() -> Self {
        Self {
            colour: std::io::stdout().is_terminal(),
        }
    }

    /// Render `event` as it would be printed, without the timestamp.
    fn render(&self, event: &MonitorEvent) -> String {
        let (tone, text) = describe(event);
        let prefix = printer_prefix(event.endpoint());
        match tone.ansi().filter(|_| self.colour) {
            Some(code) => format!("{prefix} {code}{text}{RESET}"),
            None => format!("{prefix} {text}"),
        }
    }
}

impl EventReporter for ConsoleReporter {
    fn report(&self, event: &MonitorEvent) {
        let line = self.render(event);
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{} {line}", Local::now().format("%H:%M:%S")) {
            tracing::debug!(error = %e, "stdout write failed");
        }
    }
}

fn printer_prefix(endpoint: &PrinterEndpoint) -> String {
    format!("{} [{}]", endpoint.name, endpoint.address)
}

/// Status label plus progress while a job runs, bed temperature otherwise.
fn status_text(status: &PrinterStatus) -> String {
    let label = status_label(status);
    if status.state.is_active() {
        match status.progress {
            Some(progress) => format!("{label} {progress}%"),
            None => label,
        }
    } else {
        match status.bed_temperature_rounded() {
            Some(bed) => format!("{label} bed {bed}°C"),
            None => label,
        }
    }
}

fn describe(event: &MonitorEvent) -> (Tone, String) {
    match event {
        MonitorEvent::Discovered { endpoint } => {
            let model = endpoint.machine_name.as_deref().unwrap_or("SDCP printer");
            let firmware = endpoint.firmware_version.as_deref().unwrap_or("unknown firmware");
            (
                Tone::Plain,
                format!("found {model}, {firmware}, protocol {}", endpoint.protocol_version),
            )
        }
        MonitorEvent::EndpointUpdated { previous, current } if previous.address != current.address => {
            (Tone::Plain, format!("moved from {}", previous.address))
        }
        MonitorEvent::EndpointUpdated { .. } => (Tone::Plain, "details updated".to_string()),
        MonitorEvent::Phase { phase, .. } => match phase {
            SessionPhase::Reconnecting => (
                Tone::for_state(PrinterState::Offline),
                format!("{}, reconnecting", PrinterState::Offline),
            ),
            other => (Tone::Plain, other.as_str().to_lowercase()),
        },
        MonitorEvent::Observed { status, .. } => {
            let mut text = status_text(status);
            if let Some(file) = &status.filename {
                text.push_str(&format!(" ({file})"));
            }
            (Tone::for_state(status.state), text)
        }
        MonitorEvent::Transition { from, to, status, .. } => (
            Tone::for_state(*to),
            format!("{from} -> {to}  {}", status_text(status)),
        ),
        MonitorEvent::Progress { status, .. } | MonitorEvent::BedTemperature { status, .. } => {
            (Tone::for_state(status.state), status_text(status))
        }
        MonitorEvent::ThresholdCrossed {
            threshold_c,
            status,
            ..
        } => {
            let bed = status.bed_temperature.unwrap_or(*threshold_c);
            (
                Tone::Done,
                format!("bed cooled to {bed:.1}°C (threshold {threshold_c:.1}°C)"),
            )
        }
        MonitorEvent::Alert { kind, .. } => {
            (Tone::for_alert(*kind), format!("ALERT: {}", kind.as_str().to_uppercase()))
        }
        MonitorEvent::Removed { reason, .. } => {
            let why = match reason {
                RemovalReason::LivenessTimeout => "not seen within liveness timeout",
                RemovalReason::Unreachable => "unreachable",
                RemovalReason::Shutdown => "monitor stopped",
            };
            let tone = if *reason == RemovalReason::Shutdown {
                Tone::Plain
            } else {
                Tone::Alarm
            };
            (tone, format!("removed: {why}"))
        }
    }
}
