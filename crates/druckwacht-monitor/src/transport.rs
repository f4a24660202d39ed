// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Message transport to a single printer.
//
// The printer's status channel is a WebSocket carrying JSON text frames.
// This layer knows nothing about SDCP: it opens, sends, receives and closes.
// Retrying is the session's business, never the transport's.
//
// The underlying socket is owned by the connection value, so it is released
// on every exit path by drop even when `close` is never reached.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

use druckwacht_core::error::{DruckwachtError, Result};
use druckwacht_core::types::PrinterEndpoint;

/// Default timeout for the TCP connect plus WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for the closing handshake before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// An open, message-oriented duplex channel to one printer.
#[async_trait]
pub trait Connection: Send {
    /// Send one text message.
    async fn send(&mut self, message: String) -> Result<()>;

    /// Wait for the next text message.
    ///
    /// Must be cancel-safe: dropping the future before it completes loses no
    /// message.  Fails with `Disconnected` once the channel is gone.
    async fn receive(&mut self) -> Result<String>;

    /// Close the channel.  Idempotent and infallible.
    async fn close(&mut self);
}

/// Opens connections to printers.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &PrinterEndpoint) -> Result<Box<dyn Connection>>;
}

/// Connector for the SDCP WebSocket status channel.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    port: u16,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, endpoint: &PrinterEndpoint) -> Result<Box<dyn Connection>> {
        let url = endpoint.websocket_url(self.port);
        debug!(printer = %endpoint.id, url = %url, "opening status channel");

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| DruckwachtError::Connect {
                address: url.clone(),
                detail: format!("timed out after {}ms", self.connect_timeout.as_millis()),
            })?
            .map_err(|e| DruckwachtError::Connect {
                address: url.clone(),
                detail: e.to_string(),
            })?;

        info!(printer = %endpoint.id, url = %url, "status channel open");
        Ok(Box::new(WebSocketConnection {
            stream,
            peer: url,
            closed: false,
        }))
    }
}

/// A live WebSocket status channel.
pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    peer: String,
    closed: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, message: String) -> Result<()> {
        if self.closed {
            return Err(DruckwachtError::Disconnected(format!("{} already closed", self.peer)));
        }
        self.stream
            .send(Message::text(message))
            .await
            .map_err(|e| DruckwachtError::Disconnected(format!("send to {}: {e}", self.peer)))
    }

    async fn receive(&mut self) -> Result<String> {
        if self.closed {
            return Err(DruckwachtError::Disconnected(format!("{} already closed", self.peer)));
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    return Err(DruckwachtError::Disconnected(format!(
                        "{} closed the channel ({frame:?})",
                        self.peer
                    )));
                }
                // Ping/pong are answered inside tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(DruckwachtError::Disconnected(format!("{}: {e}", self.peer)));
                }
                None => {
                    self.closed = true;
                    return Err(DruckwachtError::Disconnected(format!(
                        "{} ended the stream",
                        self.peer
                    )));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match tokio::time::timeout(CLOSE_TIMEOUT, self.stream.close(None)).await {
            Ok(Ok(())) => debug!(peer = %self.peer, "status channel closed"),
            Ok(Err(e)) => debug!(peer = %self.peer, error = %e, "close handshake failed"),
            Err(_) => debug!(peer = %self.peer, "close handshake timed out"),
        }
    }
}
