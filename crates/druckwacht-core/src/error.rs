// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Druckwacht.

use thiserror::Error;

/// Top-level error type for all Druckwacht operations.
#[derive(Debug, Error)]
pub enum DruckwachtError {
    // -- Network --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    #[error("connection to {address} failed: {detail}")]
    Connect { address: String, detail: String },

    #[error("printer disconnected: {0}")]
    Disconnected(String),

    // -- Protocol --
    #[error("malformed status payload: {0}")]
    Parse(String),

    // -- Setup --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DruckwachtError {
    /// Whether the failure is expected to clear up on its own.
    ///
    /// Transient errors are confined to one session or one discovery cycle;
    /// everything else is a setup problem the user has to fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Discovery(_) | Self::Connect { .. } | Self::Disconnected(_) | Self::Parse(_) => {
                true
            }
            Self::Io(_) => true,
            Self::Config(_) | Self::Serialization(_) => false,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DruckwachtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_transient() {
        assert!(DruckwachtError::Discovery("sendto".into()).is_transient());
        assert!(
            DruckwachtError::Connect {
                address: "10.0.0.5".into(),
                detail: "refused".into()
            }
            .is_transient()
        );
        assert!(DruckwachtError::Disconnected("closed".into()).is_transient());
        assert!(DruckwachtError::Parse("bad json".into()).is_transient());
    }

    #[test]
    fn config_errors_are_fatal() {
        assert!(!DruckwachtError::Config("poll interval is zero".into()).is_transient());
    }

    #[test]
    fn connect_error_names_the_address() {
        let err = DruckwachtError::Connect {
            address: "ws://10.0.0.5:3030/websocket".into(),
            detail: "timed out".into(),
        };
        assert_eq!(
            err.to_string(),
            "connection to ws://10.0.0.5:3030/websocket failed: timed out"
        );
    }
}
