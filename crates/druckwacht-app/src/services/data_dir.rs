// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Where Druckwacht keeps its files: `$XDG_DATA_HOME/druckwacht`, else
// `~/.local/share/druckwacht`.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "druckwacht";

/// The data directory, created on demand.
///
/// A directory that cannot be created is only logged; reading or writing
/// the config inside it will report the real problem.
pub fn data_dir() -> PathBuf {
    let dir = resolve(
        std::env::var_os("XDG_DATA_HOME").map(PathBuf::from).as_deref(),
        std::env::var_os("HOME").map(PathBuf::from).as_deref(),
    );
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::debug!(path = %dir.display(), error = %e, "could not create data directory");
    }
    dir
}

/// Pick the data directory from the XDG and home settings.
///
/// An empty `XDG_DATA_HOME` counts as unset.  Without either variable the
/// system temp directory is used.
fn resolve(xdg_data_home: Option<&Path>, home: Option<&Path>) -> PathBuf {
    let base = match (xdg_data_home.filter(|p| !p.as_os_str().is_empty()), home) {
        (Some(xdg), _) => xdg.to_path_buf(),
        (None, Some(home)) => home.join(".local/share"),
        (None, None) => std::env::temp_dir(),
    };
    base.join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdg_data_home_wins() {
        let dir = resolve(Some(Path::new("/srv/data")), Some(Path::new("/home/ada")));
        assert_eq!(dir, PathBuf::from("/srv/data/druckwacht"));
    }

    #[test]
    fn home_is_the_fallback() {
        let dir = resolve(Some(Path::new("")), Some(Path::new("/home/ada")));
        assert_eq!(dir, PathBuf::from("/home/ada/.local/share/druckwacht"));
        assert_eq!(resolve(None, Some(Path::new("/home/ada"))), dir);
    }

    #[test]
    fn temp_dir_when_nothing_is_set() {
        assert_eq!(resolve(None, None), std::env::temp_dir().join("druckwacht"));
    }
}
