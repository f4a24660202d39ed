// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory printers for tests: a connector that plays back scripted
// connections and a sink that records what the monitor reported.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use druckwacht_core::error::{DruckwachtError, Result};
use druckwacht_core::types::{AlertKind, MonitorEvent, PrinterEndpoint};

use crate::coordinator::{AlertPlayer, EventReporter};
use crate::transport::{Connection, Connector};

/// One step of a scripted connection.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    /// Deliver a text frame.
    Message(String),
    /// Drop the channel.
    Disconnect,
}

/// Connector whose connections replay prepared scripts, per address.
///
/// Each `open` consumes the next script for the address; `None` makes that
/// attempt fail.  When the scripts run out every further attempt fails.
/// A connection that has played its script stays open and silent.
#[derive(Default)]
pub(crate) struct ScriptedConnector {
    scripts: Mutex<HashMap<IpAddr, VecDeque<Option<Vec<Step>>>>>,
    opens: Mutex<HashMap<IpAddr, usize>>,
    sent: Arc<Mutex<Vec<(IpAddr, String)>>>,
}

impl ScriptedConnector {
    pub(crate) fn script(&self, address: IpAddr, connection: Option<Vec<Step>>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(address)
            .or_default()
            .push_back(connection);
    }

    pub(crate) fn opens(&self, address: IpAddr) -> usize {
        self.opens.lock().unwrap().get(&address).copied().unwrap_or(0)
    }

    pub(crate) fn sent(&self) -> Vec<(IpAddr, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, endpoint: &PrinterEndpoint) -> Result<Box<dyn Connection>> {
        *self.opens.lock().unwrap().entry(endpoint.address).or_default() += 1;
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint.address)
            .and_then(VecDeque::pop_front)
            .flatten();
        match next {
            Some(steps) => Ok(Box::new(ScriptedConnection {
                address: endpoint.address,
                steps: steps.into(),
                sent: Arc::clone(&self.sent),
            })),
            None => Err(DruckwachtError::Connect {
                address: endpoint.address.to_string(),
                detail: "scripted refusal".into(),
            }),
        }
    }
}

struct ScriptedConnection {
    address: IpAddr,
    steps: VecDeque<Step>,
    sent: Arc<Mutex<Vec<(IpAddr, String)>>>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, message: String) -> Result<()> {
        self.sent.lock().unwrap().push((self.address, message));
        Ok(())
    }

    async fn receive(&mut self) -> Result<String> {
        match self.steps.pop_front() {
            Some(Step::Message(text)) => Ok(text),
            Some(Step::Disconnect) => Err(DruckwachtError::Disconnected(format!(
                "{} dropped (scripted)",
                self.address
            ))),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {}
}

/// Records reported events and played alerts.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<MonitorEvent>>,
    played: Mutex<Vec<AlertKind>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<MonitorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn played(&self) -> Vec<AlertKind> {
        self.played.lock().unwrap().clone()
    }
}

impl EventReporter for RecordingSink {
    fn report(&self, event: &MonitorEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

impl AlertPlayer for RecordingSink {
    fn play(&self, kind: AlertKind) {
        self.played.lock().unwrap().push(kind);
    }
}

pub(crate) fn endpoint(id: &str, address: &str) -> PrinterEndpoint {
    PrinterEndpoint {
        id: id.into(),
        name: format!("printer {id}"),
        address: address.parse().unwrap(),
        mainboard_id: format!("mb-{id}"),
        protocol_version: "V3.0.0".into(),
        firmware_version: Some("V1.1.29".into()),
        machine_name: Some("Centauri Carbon".into()),
        brand_name: Some("ELEGOO".into()),
    }
}

/// A status push with the given SDCP print status code and bed temperature.
pub(crate) fn status_frame(print_status: u32, bed: f64) -> String {
    format!(
        r#"{{"Status": {{"CurrentStatus": [1], "TempOfHotbed": {bed},
            "PrintInfo": {{"Status": {print_status}, "CurrentTicks": 10, "TotalTicks": 100}}}},
            "Topic": "sdcp/status/mb"}}"#
    )
}
