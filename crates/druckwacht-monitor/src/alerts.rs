// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Alert rules.
//
//   entering PAUSED    -> "paused"     (once, until the printer leaves PAUSED)
//   entering ERROR     -> "error"      (once, until the printer leaves ERROR)
//   entering COMPLETE  -> "complete"   (once, until the printer leaves COMPLETE)
//   bed cools to <= T  -> "bed cooled" (once per print cycle)
//
// A print cycle starts when the printer enters PRINTING.  The engine does no
// I/O; the only state it touches is the suppression flags it is handed.

use druckwacht_core::types::{AlertKind, PrinterState};
use tracing::debug;

/// Something the rules are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertTrigger {
    /// The normalised state changed.
    Transition { from: PrinterState, to: PrinterState },
    /// The bed dropped to or below the cooldown threshold from above.
    BedCooled,
}

/// Per-session record of which alert conditions have already fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertSuppression {
    paused: bool,
    error: bool,
    complete: bool,
    bed_cooled: bool,
}

impl AlertSuppression {
    pub fn is_suppressed(&self, kind: AlertKind) -> bool {
        *self.flag(kind)
    }

    fn flag(&self, kind: AlertKind) -> &bool {
        match kind {
            AlertKind::Paused => &self.paused,
            AlertKind::Error => &self.error,
            AlertKind::Complete => &self.complete,
            AlertKind::BedCooled => &self.bed_cooled,
        }
    }

    fn flag_mut(&mut self, kind: AlertKind) -> &mut bool {
        match kind {
            AlertKind::Paused => &mut self.paused,
            AlertKind::Error => &mut self.error,
            AlertKind::Complete => &mut self.complete,
            AlertKind::BedCooled => &mut self.bed_cooled,
        }
    }

    /// Set the flag for `kind`; returns whether it was previously clear.
    fn arm(&mut self, kind: AlertKind) -> bool {
        !std::mem::replace(self.flag_mut(kind), true)
    }

    fn clear(&mut self, kind: AlertKind) {
        if std::mem::take(self.flag_mut(kind)) {
            debug!(alert = %kind, "alert re-armed");
        }
    }
}

/// The alert a state raises on entry, if any.
fn alert_for_state(state: PrinterState) -> Option<AlertKind> {
    match state {
        PrinterState::Paused => Some(AlertKind::Paused),
        PrinterState::Error => Some(AlertKind::Error),
        PrinterState::Complete => Some(AlertKind::Complete),
        _ => None,
    }
}

/// Evaluate the rules for one trigger, updating `suppression`.
pub fn evaluate(trigger: AlertTrigger, suppression: &mut AlertSuppression) -> Option<AlertKind> {
    match trigger {
        AlertTrigger::Transition { from, to } => {
            if from == to {
                return None;
            }
            if let Some(left) = alert_for_state(from) {
                suppression.clear(left);
            }
            if to == PrinterState::Printing {
                suppression.clear(AlertKind::BedCooled);
            }
            let kind = alert_for_state(to)?;
            suppression.arm(kind).then_some(kind)
        }
        AlertTrigger::BedCooled => suppression
            .arm(AlertKind::BedCooled)
            .then_some(AlertKind::BedCooled),
    }
}
