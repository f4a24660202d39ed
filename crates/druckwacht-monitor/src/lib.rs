// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Druckwacht Monitor — SDCP printer discovery, per-printer status sessions
// with reconnect, alert rules, and the coordinator that ties them together.
// Console and audio output are left to the embedding application through the
// `EventReporter` and `AlertPlayer` traits.

pub mod alerts;
pub mod coordinator;
pub mod discovery;
pub mod liveness;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use coordinator::{AlertPlayer, EventReporter, MonitorCoordinator};
pub use discovery::PrinterDiscovery;
pub use session::{DeviceSession, StatusTracker};
pub use transport::{Connection, Connector, WebSocketConnector};
