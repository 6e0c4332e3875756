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

use crate::vm::activation::Activation;
use barn_common::tasks::{Exception, TaskId, TracebackFrame};
use barn_compiler::SourceParser;
use barn_var::{v_obj, Error, Obj, Var, NOTHING};
use bincode::{Decode, Encode};
use std::sync::Arc;
use std::time::Instant;

/// Knobs the scheduler hands the VM for every slice.
#[derive(Clone)]
pub struct VmExecParams {
    pub parser: Arc<dyn SourceParser>,
    pub max_stack_depth: usize,
}

/// Execution state of one task: the activation stack and resource accounting.
#[derive(Clone, Debug)]
pub struct VmExec {
    pub task_id: TaskId,
    pub(crate) stack: Vec<Activation>,
    pub tick_count: usize,
    pub max_ticks: usize,
    pub max_seconds: u64,
    /// Set when `kill_task` targets the running task itself.
    pub(crate) killed: bool,
    /// Wall-clock start of the current slice; reset by the scheduler at resume.
    pub(crate) started: Option<Instant>,
    /// The task-local value, reachable through `task_local()`.
    pub task_local: Var,
}

// The wall clock does not serialize; the deadline restarts after a checkpoint
// restore, and a restored task is never mid-kill.
impl Encode for VmExec {
    fn encode<E: bincode::enc::Encoder>(
        &self,
        encoder: &mut E,
    ) -> Result<(), bincode::error::EncodeError> {
        (self.task_id as u64).encode(encoder)?;
        self.stack.encode(encoder)?;
        (self.tick_count as u64).encode(encoder)?;
        (self.max_ticks as u64).encode(encoder)?;
        self.max_seconds.encode(encoder)?;
        self.task_local.encode(encoder)
    }
}

impl<Context> Decode<Context> for VmExec {
    fn decode<D: bincode::de::Decoder<Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        let task_id = u64::decode(decoder)? as TaskId;
        let stack = Vec::<Activation>::decode(decoder)?;
        let tick_count = u64::decode(decoder)? as usize;
        let max_ticks = u64::decode(decoder)? as usize;
        let max_seconds = u64::decode(decoder)?;
        let task_local = Var::decode(decoder)?;
        Ok(VmExec {
            task_id,
            stack,
            tick_count,
            max_ticks,
            max_seconds,
            killed: false,
            started: None,
            task_local,
        })
    }
}

impl<'de, Context> bincode::BorrowDecode<'de, Context> for VmExec {
    fn borrow_decode<D: bincode::de::BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, bincode::error::DecodeError> {
        Self::decode(decoder)
    }
}

impl VmExec {
    pub fn new(task_id: TaskId, root: Activation, max_ticks: usize, max_seconds: u64) -> Self {
        VmExec {
            task_id,
            stack: vec![root],
            tick_count: 0,
            max_ticks,
            max_seconds,
            killed: false,
            started: None,
            task_local: barn_var::v_empty_map(),
        }
    }

    pub fn top(&self) -> &Activation {
        self.stack.last().expect("empty activation stack")
    }

    pub fn top_mut(&mut self) -> &mut Activation {
        self.stack.last_mut().expect("empty activation stack")
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn ticks_left(&self) -> usize {
        self.max_ticks.saturating_sub(self.tick_count)
    }

    /// Restart the wall-clock budget; used when a task re-enters after parking.
    pub fn reset_clock(&mut self) {
        self.started = None;
    }

    /// The permissions the task currently runs under.
    pub fn task_perms(&self) -> Obj {
        self.top().permissions
    }

    /// The permissions of the caller of the current verb frame, NOTHING at the
    /// top.
    pub fn caller_perms(&self) -> Obj {
        if self.stack.len() < 2 {
            return NOTHING;
        }
        self.stack[self.stack.len() - 2].permissions
    }

    pub fn player(&self) -> Obj {
        self.top().player
    }

    /// Build an exception with a traceback snapshot of the current stack,
    /// innermost frame first.
    pub fn exception_for(&self, error: Error) -> Exception {
        let frames = self
            .stack
            .iter()
            .rev()
            .map(|a| TracebackFrame {
                this: a.this.clone(),
                definer: a.definer,
                verb: a.verb_name.to_string(),
                line: a.frame.line_no(),
            })
            .collect();
        Exception::new(error, frames)
    }

    /// The `callers()` view: one entry per frame below the current one,
    /// outermost last: {this, verb-name, programmer, verb-loc, player, line}.
    pub fn callers(&self) -> Vec<Var> {
        let mut result = vec![];
        for a in self.stack.iter().rev().skip(1) {
            result.push(barn_var::v_list(&[
                a.this.clone(),
                barn_var::v_string(a.verb_name.to_string()),
                v_obj(a.permissions),
                v_obj(a.definer),
                v_obj(a.player),
                barn_var::v_int(a.frame.line_no() as i64),
            ]));
        }
        result
    }
}
