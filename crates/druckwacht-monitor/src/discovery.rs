// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SDCP printer discovery on the local network.
//
// Every cycle we send the `M99999` probe to the broadcast address (and by
// unicast to any statically configured printers), then listen for JSON
// replies until the listen window closes.  Each responding printer is
// yielded once per cycle; the coordinator uses the repeats to refresh
// liveness and to notice address changes.

use std::collections::{HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use druckwacht_core::MonitorConfig;
use druckwacht_core::error::{DruckwachtError, Result};
use druckwacht_core::types::PrinterEndpoint;

use crate::protocol::{DISCOVERY_PROBE, parse_discovery_reply};

/// Largest reply datagram we accept.
const MAX_REPLY_SIZE: usize = 4096;

/// Broadcast discovery engine.
///
/// Cheap to clone; clones share the socket.
#[derive(Debug, Clone)]
pub struct PrinterDiscovery {
    socket: Arc<UdpSocket>,
    /// Broadcast address first, then static printers.
    targets: Vec<SocketAddr>,
    interval: Duration,
    window: Duration,
}

impl PrinterDiscovery {
    /// Bind the discovery socket.
    ///
    /// Failure here is the one unrecoverable startup condition of the
    /// monitor, so callers should treat it as fatal.
    pub async fn bind(config: &MonitorConfig) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
            .await
            .map_err(|e| DruckwachtError::Discovery(format!("failed to bind discovery socket: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| DruckwachtError::Discovery(format!("failed to enable broadcast: {e}")))?;

        let mut targets = vec![SocketAddr::new(config.broadcast_address, config.discovery_port)];
        targets.extend(
            config
                .static_printers
                .iter()
                .map(|ip| SocketAddr::new(*ip, config.discovery_port)),
        );

        if let Ok(local) = socket.local_addr() {
            info!(local = %local, targets = targets.len(), "discovery socket bound");
        }

        Ok(Self {
            socket: Arc::new(socket),
            targets,
            interval: config.discovery_interval(),
            window: config.discovery_window(),
        })
    }

    /// Run one discovery cycle: probe, then collect replies for one window.
    ///
    /// Printers are deduplicated by identifier; a malformed or foreign reply
    /// is logged and skipped.  Fails only when no probe could be sent.
    pub async fn probe(&self) -> Result<Vec<PrinterEndpoint>> {
        let mut sent = 0usize;
        let mut last_error = None;
        for target in &self.targets {
            match self.socket.send_to(DISCOVERY_PROBE, target).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    debug!(target = %target, error = %e, "probe send failed");
                    last_error = Some(e);
                }
            }
        }
        if sent == 0 {
            let detail = last_error.map_or_else(|| "no targets".to_string(), |e| e.to_string());
            return Err(DruckwachtError::Discovery(format!("could not send probe: {detail}")));
        }

        let deadline = Instant::now() + self.window;
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut buf = [0u8; MAX_REPLY_SIZE];

        loop {
            let (len, source) =
                match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                    Err(_) => break,
                    Ok(Ok(received)) => received,
                    Ok(Err(e)) => {
                        // ICMP unreachable from a static target surfaces here on some stacks.
                        debug!(error = %e, "discovery receive failed");
                        continue;
                    }
                };

            let payload = &buf[..len];
            if payload == DISCOVERY_PROBE {
                // Our own broadcast looped back.
                continue;
            }
            match parse_discovery_reply(payload, source.ip()) {
                Ok(endpoint) => {
                    if seen.insert(endpoint.id.clone()) {
                        debug!(printer = %endpoint.id, address = %endpoint.address, "printer replied");
                        found.push(endpoint);
                    }
                }
                Err(e) => warn!(source = %source, error = %e, "skipping discovery reply"),
            }
        }

        Ok(found)
    }

    /// Discover printers forever.
    ///
    /// The stream runs a cycle every discovery interval and yields each
    /// printer found in it; it never ends.  Failed cycles are logged and
    /// retried on the next tick.  Dropping the stream stops discovery, and a
    /// fresh call starts it again.
    pub fn discover(&self) -> impl Stream<Item = PrinterEndpoint> + Send + use<> {
        let state = (self.clone(), VecDeque::new(), Instant::now());
        stream::unfold(state, |(discovery, mut pending, mut next_cycle)| async move {
            loop {
                if let Some(endpoint) = pending.pop_front() {
                    return Some((endpoint, (discovery, pending, next_cycle)));
                }
                tokio::time::sleep_until(next_cycle).await;
                next_cycle = Instant::now() + discovery.interval;

                match discovery.probe().await {
                    Ok(found) if found.is_empty() => debug!("discovery cycle found no printers"),
                    Ok(found) => {
                        debug!(count = found.len(), "discovery cycle complete");
                        pending.extend(found);
                    }
                    Err(e) => warn!(error = %e, "discovery cycle failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    /// A printer that answers every probe with the given reply bodies.
    async fn fake_printer(replies: Vec<String>) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                    return;
                };
                if &buf[..len] != DISCOVERY_PROBE {
                    continue;
                }
                for reply in &replies {
                    socket.send_to(reply.as_bytes(), from).await.unwrap();
                }
            }
        });
        (addr, task)
    }

    fn reply(id: &str, ip: &str) -> String {
        format!(
            r#"{{"Id": "{id}", "Data": {{"Name": "Carbon {id}", "MachineName": "Centauri Carbon",
                "BrandName": "ELEGOO", "MainboardIP": "{ip}", "MainboardID": "mb{id}",
                "ProtocolVersion": "V3.0.0", "FirmwareVersion": "V1.1.29"}}}}"#
        )
    }

    fn config_for(printer: SocketAddr) -> MonitorConfig {
        MonitorConfig {
            broadcast_address: printer.ip(),
            discovery_port: printer.port(),
            discovery_interval_ms: 50,
            discovery_window_ms: 150,
            ..MonitorConfig::default()
        }
    }

    #[tokio::test]
    async fn probe_collects_and_deduplicates_replies() {
        let (addr, _printer) = fake_printer(vec![
            reply("a", "192.168.1.20"),
            reply("a", "192.168.1.20"),
            "not json".into(),
            r#"{"hello": "world"}"#.into(),
            reply("b", "192.168.1.21"),
        ])
        .await;
        let discovery = PrinterDiscovery::bind(&config_for(addr)).await.unwrap();

        let found = discovery.probe().await.unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(found[0].address, "192.168.1.20".parse::<IpAddr>().unwrap());
        assert_eq!(found[1].machine_name.as_deref(), Some("Centauri Carbon"));
    }

    #[tokio::test]
    async fn probe_with_silent_network_is_empty() {
        // Bound but never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = config_for(silent.local_addr().unwrap());
        let discovery = PrinterDiscovery::bind(&config).await.unwrap();
        assert!(discovery.probe().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn static_printers_are_probed_by_unicast() {
        let (addr, _printer) = fake_printer(vec![reply("s", "127.0.0.1")]).await;
        let config = MonitorConfig {
            // Nothing listens on 127.0.0.2; only the static entry can answer.
            broadcast_address: "127.0.0.2".parse().unwrap(),
            discovery_port: addr.port(),
            static_printers: vec![addr.ip()],
            discovery_window_ms: 150,
            ..MonitorConfig::default()
        };
        let discovery = PrinterDiscovery::bind(&config).await.unwrap();
        assert_eq!(discovery.targets.len(), 2);
        let found = discovery.probe().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "s");
    }

    #[tokio::test]
    async fn discover_re_emits_printers_every_cycle() {
        let (addr, _printer) = fake_printer(vec![reply("a", "192.168.1.20")]).await;
        let discovery = PrinterDiscovery::bind(&config_for(addr)).await.unwrap();

        let endpoints: Vec<_> = tokio::time::timeout(
            Duration::from_secs(5),
            discovery.discover().take(3).collect::<Vec<_>>(),
        )
        .await
        .unwrap();
        assert_eq!(endpoints.len(), 3);
        assert!(endpoints.iter().all(|p| p.id == "a"));
    }
}
