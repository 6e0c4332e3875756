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

use crate::config::Config;
use crate::tasks::ConnectionId;
use crate::vm::{Activation, VmExec};
use barn_common::tasks::TaskId;
use barn_var::{Obj, Var};
use std::time::SystemTime;

/// How a task came into being: player input, a fork statement, or a server-side
/// hook (login and connection transitions).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskKind {
    Input,
    Forked,
    Hook,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskState {
    Queued,
    Running,
    Suspended,
    Killed,
    Completed,
}

/// One task: a VM with scheduling bookkeeping wrapped around it.
pub struct Task {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub player: Obj,
    /// The permissions the task was created under (the verb owner).
    pub perms: Obj,
    pub vm: VmExec,
    /// The connection the task talks to, when it belongs to one.
    pub conn: Option<ConnectionId>,
    pub start_time: SystemTime,
    /// The store's anonymous-creation log position at task start, for the
    /// completion-time reachability sweep.
    pub anon_watermark: usize,
    /// Value to push when re-entering the VM after a suspension: the result of
    /// `suspend()` or the line a `read()` asked for.
    pub resume_value: Option<Var>,
    /// When the task sleeps on the clock, its deadline.
    pub wake_at: Option<std::time::Instant>,
    /// Set on login tasks: the connection whose login this task decides.
    pub login_conn: Option<ConnectionId>,
    /// Set on tasks from the `;`/EVAL intrinsic, which frame their results.
    pub is_eval: bool,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: TaskId,
        kind: TaskKind,
        player: Obj,
        perms: Obj,
        root: Activation,
        config: &Config,
        conn: Option<ConnectionId>,
        anon_watermark: usize,
    ) -> Self {
        let (max_ticks, max_seconds) = match kind {
            TaskKind::Input | TaskKind::Hook => (config.fg_ticks, config.fg_seconds),
            TaskKind::Forked => (config.bg_ticks, config.bg_seconds),
        };
        Task {
            task_id,
            kind,
            state: TaskState::Queued,
            player,
            perms,
            vm: VmExec::new(task_id, root, max_ticks, max_seconds),
            conn,
            start_time: SystemTime::now(),
            anon_watermark,
            resume_value: None,
            wake_at: None,
            login_conn: None,
            is_eval: false,
        }
    }

    /// Re-arm budgets for re-entry after suspension: suspended tasks resume on
    /// the background budget with a fresh clock, per the resource model.
    pub fn rearm_for_resume(&mut self, config: &Config) {
        self.vm.tick_count = 0;
        self.vm.max_ticks = config.bg_ticks;
        self.vm.max_seconds = config.bg_seconds;
        self.vm.reset_clock();
    }
}
