// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device sessions.
//
// One session per printer.  It owns the printer's status channel and walks
// CONNECTING -> CONNECTED -> POLLING, dropping to RECONNECTING with backoff
// whenever the channel fails, until it is cancelled or has been unable to
// reach the printer for longer than the liveness timeout (CLOSED).
//
// Status messages are handled strictly one at a time, in arrival order, by
// the `StatusTracker`.  The tracker outlives individual connections, so a
// reconnect that finds the printer still PAUSED raises nothing new.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use druckwacht_core::MonitorConfig;
use druckwacht_core::error::DruckwachtError;
use druckwacht_core::types::{
    AlertKind, MonitorEvent, PrinterEndpoint, PrinterState, PrinterStatus, SessionPhase,
};

use crate::alerts::{self, AlertSuppression, AlertTrigger};
use crate::protocol::{self, Inbound};
use crate::retry::{Backoff, BackoffConfig, should_reconnect};
use crate::transport::{Connection, Connector};

// ---------------------------------------------------------------------------
// Status tracking
// ---------------------------------------------------------------------------

/// What one status snapshot changed, in the order it should be reported.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Observed(PrinterStatus),
    Transition {
        from: PrinterState,
        to: PrinterState,
        status: PrinterStatus,
    },
    Progress(PrinterStatus),
    BedTemperature(PrinterStatus),
    ThresholdCrossed {
        threshold_c: f64,
        status: PrinterStatus,
    },
    Alert {
        kind: AlertKind,
        status: PrinterStatus,
    },
}

impl StatusChange {
    /// Attach the printer the change belongs to.
    pub fn into_event(self, endpoint: PrinterEndpoint) -> MonitorEvent {
        match self {
            Self::Observed(status) => MonitorEvent::Observed { endpoint, status },
            Self::Transition { from, to, status } => MonitorEvent::Transition {
                endpoint,
                from,
                to,
                status,
            },
            Self::Progress(status) => MonitorEvent::Progress { endpoint, status },
            Self::BedTemperature(status) => MonitorEvent::BedTemperature { endpoint, status },
            Self::ThresholdCrossed {
                threshold_c,
                status,
            } => MonitorEvent::ThresholdCrossed {
                endpoint,
                threshold_c,
                status,
            },
            Self::Alert { kind, status } => MonitorEvent::Alert {
                endpoint,
                kind,
                status,
            },
        }
    }
}

/// Compares each snapshot with the previous one and applies the alert rules.
///
/// `last_status` only ever holds successfully decoded snapshots; malformed
/// payloads and dropped connections never reach the tracker.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    last_status: Option<PrinterStatus>,
    /// Last known bed temperature, kept across snapshots that omit it.
    last_bed_temperature: Option<f64>,
    suppression: AlertSuppression,
    cooldown_threshold_c: f64,
}

impl StatusTracker {
    pub fn new(cooldown_threshold_c: f64) -> Self {
        Self {
            last_status: None,
            last_bed_temperature: None,
            suppression: AlertSuppression::default(),
            cooldown_threshold_c,
        }
    }

    pub fn last_status(&self) -> Option<&PrinterStatus> {
        self.last_status.as_ref()
    }

    pub fn suppression(&self) -> &AlertSuppression {
        &self.suppression
    }

    /// Process the next snapshot.
    pub fn ingest(&mut self, status: PrinterStatus) -> Vec<StatusChange> {
        let mut changes = Vec::new();

        match self.last_status.as_ref() {
            None => changes.push(StatusChange::Observed(status.clone())),
            Some(previous) if previous.state != status.state => {
                let (from, to) = (previous.state, status.state);
                changes.push(StatusChange::Transition {
                    from,
                    to,
                    status: status.clone(),
                });
                if let Some(kind) =
                    alerts::evaluate(AlertTrigger::Transition { from, to }, &mut self.suppression)
                {
                    changes.push(StatusChange::Alert {
                        kind,
                        status: status.clone(),
                    });
                }
            }
            Some(previous) => {
                if status.state.is_active() {
                    if status.progress != previous.progress {
                        changes.push(StatusChange::Progress(status.clone()));
                    }
                } else {
                    let rounded = status.bed_temperature_rounded();
                    if rounded != previous.bed_temperature_rounded()
                        && rounded.is_some_and(|t| t % 5 == 0)
                    {
                        changes.push(StatusChange::BedTemperature(status.clone()));
                    }
                }
            }
        }

        if let Some(temperature) = status.bed_temperature {
            let was_above = self
                .last_bed_temperature
                .is_some_and(|t| t > self.cooldown_threshold_c);
            if was_above && temperature <= self.cooldown_threshold_c {
                changes.push(StatusChange::ThresholdCrossed {
                    threshold_c: self.cooldown_threshold_c,
                    status: status.clone(),
                });
                if let Some(kind) = alerts::evaluate(AlertTrigger::BedCooled, &mut self.suppression) {
                    changes.push(StatusChange::Alert {
                        kind,
                        status: status.clone(),
                    });
                }
            }
            self.last_bed_temperature = Some(temperature);
        }

        self.last_status = Some(status);
        changes
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

/// Timing policy for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub silence_timeout: Duration,
    pub liveness_timeout: Duration,
    pub backoff: BackoffConfig,
    pub cooldown_threshold_c: f64,
}

impl From<&MonitorConfig> for SessionConfig {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            silence_timeout: config.silence_timeout(),
            liveness_timeout: config.liveness_timeout(),
            backoff: BackoffConfig::from(config),
            cooldown_threshold_c: config.bed_cooldown_threshold_c,
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Cancelled by the coordinator.
    Shutdown,
    /// Could not reach the printer for longer than the liveness timeout.
    Unreachable,
}

/// How a polling run on one connection ended.
enum PollEnd {
    Shutdown,
    Disconnected(DruckwachtError),
    /// The printer now lives at another address.
    Moved,
}

enum Step {
    Shutdown,
    Poll,
    Received(druckwacht_core::error::Result<String>),
    EndpointChanged(bool),
}

/// The per-printer monitoring task.
pub struct DeviceSession {
    endpoint: PrinterEndpoint,
    updates: watch::Receiver<PrinterEndpoint>,
    updates_open: bool,
    contact: watch::Sender<Instant>,
    connector: Arc<dyn Connector>,
    events: mpsc::Sender<MonitorEvent>,
    cancel: CancellationToken,
    config: SessionConfig,
    tracker: StatusTracker,
    backoff: Backoff,
    phase: Option<SessionPhase>,
}

impl DeviceSession {
    /// Create a session for the endpoint currently held by `updates`.
    ///
    /// Later values sent on `updates` replace the endpoint; `contact` is
    /// stamped every time the printer delivers a status.
    pub fn new(
        updates: watch::Receiver<PrinterEndpoint>,
        contact: watch::Sender<Instant>,
        connector: Arc<dyn Connector>,
        events: mpsc::Sender<MonitorEvent>,
        cancel: CancellationToken,
        config: SessionConfig,
    ) -> Self {
        let endpoint = updates.borrow().clone();
        let backoff = Backoff::new(config.backoff, &endpoint.id);
        Self {
            endpoint,
            updates,
            updates_open: true,
            contact,
            connector,
            events,
            cancel,
            tracker: StatusTracker::new(config.cooldown_threshold_c),
            backoff,
            config,
            phase: None,
        }
    }

    /// Run until cancelled or the printer stays unreachable too long.
    #[instrument(skip_all, fields(printer = %self.endpoint.id))]
    pub async fn run(mut self) -> SessionOutcome {
        let outcome = self.run_phases().await;
        self.set_phase(SessionPhase::Closed).await;
        info!(outcome = ?outcome, "session closed");
        outcome
    }

    async fn run_phases(&mut self) -> SessionOutcome {
        let mut last_contact = Instant::now();

        loop {
            self.set_phase(SessionPhase::Connecting).await;
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return SessionOutcome::Shutdown,
                opened = self.connector.open(&self.endpoint) => opened,
            };

            let mut moved = false;
            match opened {
                Ok(mut connection) => {
                    self.backoff.reset();
                    last_contact = Instant::now();
                    self.set_phase(SessionPhase::Connected).await;
                    let end = self.poll(connection.as_mut(), &mut last_contact).await;
                    connection.close().await;
                    match end {
                        PollEnd::Shutdown => return SessionOutcome::Shutdown,
                        PollEnd::Moved => moved = true,
                        PollEnd::Disconnected(e) => {
                            warn!(error = %e, "status channel lost");
                            if !should_reconnect(&e) {
                                return SessionOutcome::Unreachable;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(address = %self.endpoint.address, error = %e, "connect failed");
                }
            }

            if moved {
                info!(address = %self.endpoint.address, "printer moved, reconnecting");
                continue;
            }

            if last_contact.elapsed() >= self.config.liveness_timeout {
                warn!(
                    silent_ms = last_contact.elapsed().as_millis(),
                    "printer unreachable beyond liveness timeout"
                );
                return SessionOutcome::Unreachable;
            }

            self.set_phase(SessionPhase::Reconnecting).await;
            let delay = self.backoff.next_delay();
            tokio::select! {
                _ = self.cancel.cancelled() => return SessionOutcome::Shutdown,
                _ = tokio::time::sleep(delay) => {}
                changed = self.updates.changed(), if self.updates_open => {
                    if changed.is_ok() {
                        self.adopt_endpoint();
                        self.backoff.reset();
                    } else {
                        self.updates_open = false;
                    }
                }
            }
        }
    }

    /// Request and consume status on an open connection.
    async fn poll(&mut self, connection: &mut dyn Connection, last_contact: &mut Instant) -> PollEnd {
        self.set_phase(SessionPhase::Polling).await;

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_message = Instant::now();

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Shutdown,
                _ = ticker.tick() => Step::Poll,
                received = connection.receive() => Step::Received(received),
                changed = self.updates.changed(), if self.updates_open => {
                    Step::EndpointChanged(changed.is_ok())
                }
            };

            match step {
                Step::Shutdown => return PollEnd::Shutdown,
                Step::Poll => {
                    if last_message.elapsed() >= self.config.silence_timeout {
                        return PollEnd::Disconnected(DruckwachtError::Disconnected(format!(
                            "no traffic for {}ms",
                            last_message.elapsed().as_millis()
                        )));
                    }
                    let request = match protocol::status_request(
                        &self.endpoint,
                        &protocol::new_request_id(),
                        Utc::now().timestamp(),
                    ) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!(error = %e, "could not encode status request");
                            continue;
                        }
                    };
                    trace!("requesting status");
                    if let Err(e) = connection.send(request).await {
                        return PollEnd::Disconnected(e);
                    }
                }
                Step::Received(Ok(text)) => {
                    last_message = Instant::now();
                    *last_contact = last_message;
                    self.handle_message(&text).await;
                }
                Step::Received(Err(e)) => return PollEnd::Disconnected(e),
                Step::EndpointChanged(true) => {
                    if self.adopt_endpoint() {
                        return PollEnd::Moved;
                    }
                }
                Step::EndpointChanged(false) => self.updates_open = false,
            }
        }
    }

    async fn handle_message(&mut self, text: &str) {
        match protocol::decode_message(text, Utc::now()) {
            Ok(Inbound::Status(status)) => {
                self.contact.send_replace(Instant::now());
                for change in self.tracker.ingest(status) {
                    let event = change.into_event(self.endpoint.clone());
                    self.emit(event).await;
                }
            }
            Ok(Inbound::Other) => trace!("ignoring non-status message"),
            Err(e) => warn!(error = %e, "discarding malformed status payload"),
        }
    }

    /// Take the latest endpoint; returns whether the address changed.
    fn adopt_endpoint(&mut self) -> bool {
        let current = self.updates.borrow_and_update().clone();
        let moved = current.address != self.endpoint.address;
        if moved {
            debug!(from = %self.endpoint.address, to = %current.address, "endpoint address changed");
        }
        self.endpoint = current;
        moved
    }

    async fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase == Some(phase) {
            return;
        }
        debug!(phase = phase.as_str(), "session phase");
        self.phase = Some(phase);
        self.emit(MonitorEvent::Phase {
            endpoint: self.endpoint.clone(),
            phase,
        })
        .await;
    }

    async fn emit(&self, event: MonitorEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver gone, dropping event");
        }
    }
}
