// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Monitor coordinator.
//
// Owns the set of device sessions.  Discovered endpoints create sessions or
// update existing ones; a periodic sweep evicts printers that have not been
// confirmed within the liveness timeout and reaps sessions that gave up on
// their own.  Every event the sessions produce funnels through one channel
// into the coordinator, which hands it to the console reporter and, for
// alerts, to the alert player.
//
// Only the coordinator adds or removes sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use druckwacht_core::MonitorConfig;
use druckwacht_core::types::{AlertKind, MonitorEvent, PrinterEndpoint, RemovalReason};

use crate::liveness::LivenessTracker;
use crate::session::{DeviceSession, SessionConfig, SessionOutcome};
use crate::transport::Connector;

/// Buffered events between the sessions and the coordinator.
const EVENT_BUFFER: usize = 256;

/// How long stopping sessions may take before their tasks are aborted.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Receives every monitor event, e.g. to print it.
///
/// Called from the coordinator task only, one event at a time.
pub trait EventReporter: Send + Sync {
    fn report(&self, event: &MonitorEvent);
}

/// Plays the audible side of an alert.
///
/// Implementations must return promptly; anything slow belongs in a
/// spawned task.
pub trait AlertPlayer: Send + Sync {
    fn play(&self, kind: AlertKind);
}

/// Output collaborators.
struct Outputs {
    reporter: Arc<dyn EventReporter>,
    player: Arc<dyn AlertPlayer>,
}

impl Outputs {
    fn route(&self, event: &MonitorEvent) {
        self.reporter.report(event);
        if let MonitorEvent::Alert { endpoint, kind, .. } = event {
            info!(printer = %endpoint.id, alert = %kind, "alert");
            self.player.play(*kind);
        }
    }
}

/// Coordinator-side handle on a running session.
struct SessionHandle {
    endpoint: PrinterEndpoint,
    updates: watch::Sender<PrinterEndpoint>,
    contact: watch::Receiver<Instant>,
    cancel: CancellationToken,
    task: JoinHandle<SessionOutcome>,
}

/// Runs discovery-driven sessions for every printer on the network.
pub struct MonitorCoordinator {
    config: MonitorConfig,
    session_config: SessionConfig,
    connector: Arc<dyn Connector>,
    outputs: Outputs,
    sessions: HashMap<String, SessionHandle>,
    liveness: LivenessTracker,
    events_tx: mpsc::Sender<MonitorEvent>,
    events_rx: mpsc::Receiver<MonitorEvent>,
    /// Parent of every session's cancellation token.
    sessions_cancel: CancellationToken,
    last_discovery: Instant,
    warned_empty: bool,
}

impl MonitorCoordinator {
    pub fn new(
        config: MonitorConfig,
        connector: Arc<dyn Connector>,
        reporter: Arc<dyn EventReporter>,
        player: Arc<dyn AlertPlayer>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            session_config: SessionConfig::from(&config),
            liveness: LivenessTracker::new(config.liveness_timeout()),
            config,
            connector,
            outputs: Outputs { reporter, player },
            sessions: HashMap::new(),
            events_tx,
            events_rx,
            sessions_cancel: CancellationToken::new(),
            last_discovery: Instant::now(),
            warned_empty: false,
        }
    }

    /// Monitor until `shutdown` is cancelled, then close every session.
    ///
    /// `discoveries` is normally [`PrinterDiscovery::discover`]; if it ends,
    /// the sessions that exist keep running.
    ///
    /// [`PrinterDiscovery::discover`]: crate::discovery::PrinterDiscovery::discover
    pub async fn run<S>(mut self, discoveries: S, shutdown: CancellationToken)
    where
        S: Stream<Item = PrinterEndpoint> + Send,
    {
        // Sessions never outlive this future, even if it is dropped.
        let _guard = self.sessions_cancel.clone().drop_guard();

        tokio::pin!(discoveries);
        let mut discovering = true;

        let mut sweep = tokio::time::interval(self.sweep_period());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("monitor started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = self.events_rx.recv() => self.outputs.route(&event),
                next = discoveries.next(), if discovering => match next {
                    Some(endpoint) => self.on_discovered(endpoint).await,
                    None => {
                        warn!("discovery stream ended");
                        discovering = false;
                    }
                },
                _ = sweep.tick() => self.sweep().await,
            }
        }

        info!(sessions = self.sessions.len(), "shutting down monitor");
        let all: Vec<String> = self.sessions.keys().cloned().collect();
        self.stop_sessions(all, RemovalReason::Shutdown).await;
    }

    fn sweep_period(&self) -> Duration {
        (self.config.liveness_timeout() / 4)
            .min(Duration::from_secs(1))
            .max(Duration::from_millis(1))
    }

    async fn on_discovered(&mut self, endpoint: PrinterEndpoint) {
        let now = Instant::now();
        self.last_discovery = now;
        self.warned_empty = false;
        self.liveness.record_seen(&endpoint.id, now);

        if self
            .sessions
            .get(&endpoint.id)
            .is_some_and(|handle| handle.task.is_finished())
        {
            self.reap(&endpoint.id).await;
        }

        match self.sessions.get_mut(&endpoint.id) {
            Some(handle) if handle.endpoint != endpoint => {
                info!(
                    printer = %endpoint.id,
                    from = %handle.endpoint.address,
                    to = %endpoint.address,
                    "endpoint updated"
                );
                let previous = std::mem::replace(&mut handle.endpoint, endpoint.clone());
                handle.updates.send_replace(endpoint.clone());
                self.outputs.route(&MonitorEvent::EndpointUpdated {
                    previous,
                    current: endpoint,
                });
            }
            Some(_) => debug!(printer = %endpoint.id, "printer confirmed"),
            None => {
                info!(printer = %endpoint.id, address = %endpoint.address, "printer discovered");
                self.outputs.route(&MonitorEvent::Discovered {
                    endpoint: endpoint.clone(),
                });
                let handle = self.spawn_session(endpoint);
                self.sessions.insert(handle.endpoint.id.clone(), handle);
            }
        }
    }

    fn spawn_session(&self, endpoint: PrinterEndpoint) -> SessionHandle {
        let (updates, updates_rx) = watch::channel(endpoint.clone());
        let (contact_tx, contact) = watch::channel(Instant::now());
        let cancel = self.sessions_cancel.child_token();
        let session = DeviceSession::new(
            updates_rx,
            contact_tx,
            Arc::clone(&self.connector),
            self.events_tx.clone(),
            cancel.clone(),
            self.session_config.clone(),
        );
        SessionHandle {
            endpoint,
            updates,
            contact,
            cancel,
            task: tokio::spawn(session.run()),
        }
    }

    async fn sweep(&mut self) {
        let now = Instant::now();

        for (id, handle) in &self.sessions {
            self.liveness.record_seen(id, *handle.contact.borrow());
        }

        let finished: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, handle)| handle.task.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for id in finished {
            self.reap(&id).await;
        }

        let expired: Vec<String> = self
            .liveness
            .expired(now)
            .into_iter()
            .filter(|id| self.sessions.contains_key(id))
            .collect();
        self.stop_sessions(expired, RemovalReason::LivenessTimeout).await;

        let quiet_for = self.config.discovery_interval() + self.config.discovery_window();
        if self.sessions.is_empty()
            && !self.warned_empty
            && self.last_discovery.elapsed() >= quiet_for
        {
            warn!("no SDCP printers found on the network, still listening");
            self.warned_empty = true;
        }
    }

    /// Remove a session whose task already ended.
    async fn reap(&mut self, id: &str) {
        let Some(handle) = self.sessions.remove(id) else {
            return;
        };
        let outcome = handle.task.await;
        debug!(printer = %id, outcome = ?outcome, "reaped session");
        self.liveness.forget(id);
        self.drain_events();
        self.outputs.route(&MonitorEvent::Removed {
            endpoint: handle.endpoint,
            reason: RemovalReason::Unreachable,
        });
    }

    /// Cancel sessions, wait for them to close, then report their removal.
    ///
    /// Events keep flowing while we wait, so sessions blocked on a full
    /// channel can still finish.
    async fn stop_sessions(&mut self, ids: Vec<String>, reason: RemovalReason) {
        let handles: Vec<SessionHandle> = ids
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .collect();
        if handles.is_empty() {
            return;
        }

        let mut tasks = Vec::with_capacity(handles.len());
        let mut endpoints = Vec::with_capacity(handles.len());
        for handle in handles {
            handle.cancel.cancel();
            self.liveness.forget(&handle.endpoint.id);
            endpoints.push(handle.endpoint);
            tasks.push(handle.task);
        }
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();

        let joined = futures::future::join_all(tasks);
        tokio::pin!(joined);
        let grace = tokio::time::sleep(STOP_GRACE);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                _ = &mut joined => break,
                Some(event) = self.events_rx.recv() => self.outputs.route(&event),
                _ = &mut grace => {
                    warn!(count = aborts.len(), "sessions did not stop in time, aborting");
                    aborts.iter().for_each(|abort| abort.abort());
                    break;
                }
            }
        }
        self.drain_events();

        for endpoint in endpoints {
            info!(printer = %endpoint.id, reason = ?reason, "printer removed");
            self.outputs.route(&MonitorEvent::Removed { endpoint, reason });
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.outputs.route(&event);
        }
    }
}
