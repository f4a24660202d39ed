// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Configuration file handling.
//
// The monitor reads one JSON file: either the path given on the command
// line or `config.json` in the data directory.  Only the data-directory file
// may be absent (defaults are used and written out); a named file that is
// missing, or any file that does not parse, stops the program.

use std::path::Path;

use tracing::{info, warn};

use druckwacht_core::MonitorConfig;
use druckwacht_core::error::{DruckwachtError, Result};

/// Configuration filename inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// Load the configuration at `path`, which must exist.
pub fn load_config(path: &Path) -> Result<MonitorConfig> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(DruckwachtError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        }
        Err(e) => return Err(DruckwachtError::Io(e)),
    };
    let config: MonitorConfig = serde_json::from_str(&data)
        .map_err(|e| DruckwachtError::Config(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Load `config.json` from `data_dir`, writing the defaults there first if
/// it does not exist yet so they can be edited.
pub fn load_or_create(data_dir: &Path) -> Result<MonitorConfig> {
    let path = data_dir.join(CONFIG_FILE);
    if path.exists() {
        return load_config(&path);
    }
    let config = MonitorConfig::default();
    match persist_config(data_dir, &config) {
        Ok(()) => info!(path = %path.display(), "wrote default configuration"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not write default configuration"),
    }
    Ok(config)
}

pub fn persist_config(data_dir: &Path, config: &MonitorConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
