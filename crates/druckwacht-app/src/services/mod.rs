// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer — the binary's side of the monitor: where configuration
// lives, how events reach the terminal, and how alerts are made audible.

pub mod audio;
pub mod console;
pub mod data_dir;
pub mod settings;
