// Copyright (C) 2025 Barn Authors. This program is free software: you can
// redistribute it and/or modify it under the terms of the GNU General Public
// License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::PathBuf;
use std::time::Duration;

/// Server-wide configuration, shared with the scheduler.
#[derive(Clone, Debug)]
pub struct Config {
    /// Ticks a foreground (command/input) task may burn before abort.
    pub fg_ticks: usize,
    /// Seconds a foreground task may run before abort.
    pub fg_seconds: u64,
    /// Ticks for forked and resumed-from-suspension tasks.
    pub bg_ticks: usize,
    /// Seconds for forked and resumed tasks.
    pub bg_seconds: u64,
    /// Maximum verb-call frame depth.
    pub max_stack_depth: usize,
    /// Where checkpoints land, if anywhere.
    pub checkpoint_path: Option<PathBuf>,
    /// Interval between automatic checkpoints.
    pub checkpoint_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fg_ticks: 300_000,
            fg_seconds: 5,
            bg_ticks: 300_000,
            bg_seconds: 3,
            max_stack_depth: 50,
            checkpoint_path: None,
            checkpoint_interval: None,
        }
    }
}
