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

pub mod command_parse;
pub mod dispatch;
pub mod scheduler;
pub mod sessions;
pub mod task;

use barn_common::tasks::TaskId;
use barn_var::{Error, ErrorCode::E_INVARG, Obj, Var};

/// Server-side identity of one socket connection.
pub type ConnectionId = u64;

/// Pre-login connections act under a pseudo player object derived from the
/// connection id, the way unlogged connections get negative ids.
pub fn connection_pseudo_player(conn: ConnectionId) -> Obj {
    Obj(-4 - conn as i64)
}

pub fn pseudo_player_connection(player: &Obj) -> Option<ConnectionId> {
    if player.0 <= -4 {
        Some((-4 - player.0) as ConnectionId)
    } else {
        None
    }
}

/// A summary of a queued or suspended task, as reported by `queued_tasks()`.
#[derive(Clone, Debug)]
pub struct TaskDescription {
    pub task_id: TaskId,
    pub player: Obj,
    pub programmer: Obj,
    pub verb_definer: Obj,
    pub verb_name: String,
    pub line: usize,
    pub this: Var,
    /// Seconds until the task wakes, when it sleeps on a clock.
    pub wake_in: Option<f64>,
}

/// Scheduler facilities exposed to builtin functions while a task is running.
/// The running task itself has been taken out of the queue, so everything here
/// refers to the *other* tasks and the connection registry.
pub trait SchedulerControl {
    fn queued_tasks(&self) -> Vec<TaskDescription>;

    /// Kill a queued/suspended task. Killing the running task is handled by the
    /// caller before it gets here.
    fn kill_task(&mut self, id: TaskId, who: Obj, wizard: bool) -> Result<(), Error>;

    /// Wake a suspended task early, with `value` as its `suspend()` result.
    fn resume_task(&mut self, id: TaskId, value: Var, who: Obj, wizard: bool)
        -> Result<(), Error>;

    fn connected_players(&self) -> Vec<Obj>;
    fn connection_for(&self, player: &Obj) -> Option<ConnectionId>;
    fn connection_name(&self, player: &Obj) -> Option<String>;
    fn connected_seconds(&self, player: &Obj) -> Option<f64>;
    fn idle_seconds(&self, player: &Obj) -> Option<f64>;
    fn boot_player(&mut self, player: &Obj);
    fn request_shutdown(&mut self, message: Option<String>);
    fn request_checkpoint(&mut self);
}

/// A no-op control surface for VM tests that never touch the scheduler.
pub struct NoSchedulerControl;

impl SchedulerControl for NoSchedulerControl {
    fn queued_tasks(&self) -> Vec<TaskDescription> {
        vec![]
    }

    fn kill_task(&mut self, _id: TaskId, _who: Obj, _wizard: bool) -> Result<(), Error> {
        Err(E_INVARG.msg("no such task"))
    }

    fn resume_task(
        &mut self,
        _id: TaskId,
        _value: Var,
        _who: Obj,
        _wizard: bool,
    ) -> Result<(), Error> {
        Err(E_INVARG.msg("no such task"))
    }

    fn connected_players(&self) -> Vec<Obj> {
        vec![]
    }

    fn connection_for(&self, _player: &Obj) -> Option<ConnectionId> {
        None
    }

    fn connection_name(&self, _player: &Obj) -> Option<String> {
        None
    }

    fn connected_seconds(&self, _player: &Obj) -> Option<f64> {
        None
    }

    fn idle_seconds(&self, _player: &Obj) -> Option<f64> {
        None
    }

    fn boot_player(&mut self, _player: &Obj) {}

    fn request_shutdown(&mut self, _message: Option<String>) {}

    fn request_checkpoint(&mut self) {}
}
