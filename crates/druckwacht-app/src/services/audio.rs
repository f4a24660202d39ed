// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audible alerts.
//
// A configured command for the alert kind is started through `sh -c` and
// left to run on its own; otherwise the terminal bell rings.  The alert kind
// is passed to the command as `DRUCKWACHT_ALERT`.

use std::io::Write;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use druckwacht_core::AudioConfig;
use druckwacht_core::types::AlertKind;
use druckwacht_monitor::AlertPlayer;

const BELL: &[u8] = b"\x07";

/// Alert player driven by [`AudioConfig`].
pub struct BellPlayer {
    config: AudioConfig,
}

impl BellPlayer {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    fn spawn_command(&self, kind: AlertKind, command: &str) {
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("DRUCKWACHT_ALERT", kind.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn();
        match spawned {
            // Dropping the handle leaves the child running; tokio reaps it.
            Ok(child) => debug!(alert = %kind, pid = ?child.id(), "alert command started"),
            Err(e) => warn!(alert = %kind, command, error = %e, "alert command failed to start"),
        }
    }

    fn ring_bell(&self) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(BELL).and_then(|()| out.flush()) {
            debug!(error = %e, "could not ring terminal bell");
        }
    }
}

impl AlertPlayer for BellPlayer {
    fn play(&self, kind: AlertKind) {
        if !self.config.enabled {
            return;
        }
        match self.config.commands.get(&kind) {
            Some(command) => self.spawn_command(kind, command),
            None => self.ring_bell(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    async fn wait_for_file(path: &Path) -> bool {
        for _ in 0..200 {
            if path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn configured_command_runs_with_alert_kind() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("alert.txt");
        let player = BellPlayer::new(AudioConfig {
            enabled: true,
            commands: HashMap::from([(
                AlertKind::Complete,
                format!("printf %s \"$DRUCKWACHT_ALERT\" > '{}'", out.display()),
            )]),
        });

        player.play(AlertKind::Complete);
        assert!(wait_for_file(&out).await);
        // The shell may still be writing when the file appears.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "complete");
    }

    #[tokio::test]
    async fn disabled_audio_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("alert.txt");
        let player = BellPlayer::new(AudioConfig {
            enabled: false,
            commands: HashMap::from([(AlertKind::Paused, format!("touch '{}'", out.display()))]),
        });

        player.play(AlertKind::Paused);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn failing_command_is_not_fatal() {
        let player = BellPlayer::new(AudioConfig {
            enabled: true,
            commands: HashMap::from([(AlertKind::Error, "exit 3".to_string())]),
        });
        // Only the shell is spawned; its exit status is never observed.
        player.play(AlertKind::Error);
    }
}
