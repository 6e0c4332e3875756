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

//! The stack-machine virtual machine. One `VmExec` per task; each holds a stack
//! of activations, each of which holds a frame over a compiled program.

pub(crate) mod activation;
mod exec;
mod exec_state;
mod frame;
mod unwind;
mod vm_call;
#[cfg(test)]
mod vm_test;

pub use activation::Activation;
pub use exec_state::{VmExec, VmExecParams};
pub use unwind::FinallyReason;
pub use vm_call::{prepare_verb_activation, program_for_verb};

use crate::builtins::{register_all, BuiltinFunction};
use barn_common::tasks::{AbortLimitReason, Exception, TaskId};
use barn_compiler::{Name, Offset, BUILTINS};
use barn_var::{Obj, Var};
use std::time::Duration;

/// How a slice of VM execution ended, as seen by the scheduler.
#[derive(Debug)]
pub enum ExecutionResult {
    /// Keep executing; internal to the opcode loop.
    More,
    /// Frame 0 returned: the task is done.
    Complete(Var),
    /// An error reached frame 0 uncaught.
    Exception(Exception),
    /// Ticks or seconds ran out, or the task was killed. Not catchable.
    Abort(AbortLimitReason),
    /// A fork statement wants a child task; the parent continues after dispatch.
    DispatchFork(Fork),
    /// `suspend(...)`: park the VM. None sleeps until `resume()`.
    Suspend(Option<Duration>),
    /// `read()`: park until the player's next input line.
    NeedInput,
}

/// A request to spawn a forked child task.
#[derive(Debug)]
pub struct Fork {
    pub delay: Option<Duration>,
    /// Snapshot of the parent activation, repositioned at the fork body.
    pub activation: Activation,
    /// Where to bind the child task id, in both parent and child.
    pub var: Option<Name>,
    pub fork_index: Offset,
    pub parent_task_id: TaskId,
    pub player: Obj,
    pub progr: Obj,
}

/// The virtual machine: the opcode interpreter plus the builtin registry.
/// Stateless across tasks; all task state lives in `VmExec`.
pub struct VM {
    pub(crate) builtins: Vec<Box<dyn BuiltinFunction>>,
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl VM {
    pub fn new() -> Self {
        let builtins = register_all(BUILTINS.number_of());
        VM { builtins }
    }
}
