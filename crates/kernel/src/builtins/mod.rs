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

mod bf_list_sets;
mod bf_maps;
mod bf_num;
mod bf_objects;
mod bf_properties;
mod bf_server;
mod bf_strings;
mod bf_values;
mod bf_verbs;

use crate::tasks::sessions::Sessions;
use crate::tasks::SchedulerControl;
use crate::vm::{ExecutionResult, VmExec, VmExecParams, VM};
use barn_db::ObjectStore;
use barn_var::{Error, ErrorCode, Obj, Symbol, Var};

/// The arguments and surrounding machinery passed to a builtin function.
pub struct BfCallState<'a> {
    /// The name the function was invoked by.
    pub(crate) name: Symbol,
    /// Arguments passed to the function.
    pub(crate) args: Vec<Var>,
    /// The task's execution state; builtins may inspect the stack.
    pub(crate) exec: &'a mut VmExec,
    /// The object store.
    pub(crate) world: &'a mut ObjectStore,
    /// Connection output.
    pub(crate) sessions: &'a dyn Sessions,
    /// Scheduler facilities: other tasks and the connection registry.
    pub(crate) sched: &'a mut dyn SchedulerControl,
    /// Compilation and depth limits, for builtins that re-enter the VM.
    pub(crate) params: &'a VmExecParams,
    /// The VM itself, for builtins that run nested executions.
    pub(crate) vm: &'a VM,
}

impl BfCallState<'_> {
    pub fn caller_perms(&self) -> Obj {
        self.exec.caller_perms()
    }

    pub fn task_perms_who(&self) -> Obj {
        self.exec.task_perms()
    }

    pub fn task_perms_wizard(&self) -> bool {
        let who = self.task_perms_who();
        self.world.is_wizard(&who)
    }

    /// E_PERM unless the task runs with wizard permissions.
    pub fn needs_wizard(&self) -> Result<(), BfErr> {
        if self.task_perms_wizard() {
            Ok(())
        } else {
            Err(BfErr::Code(ErrorCode::E_PERM))
        }
    }

    /// E_PERM unless wizard or the task perms own `what`.
    pub fn needs_owner_or_wizard(&self, what: &Obj) -> Result<(), BfErr> {
        if self.task_perms_wizard() {
            return Ok(());
        }
        let owner = self
            .world
            .get(what)
            .map(|o| o.owner)
            .ok_or(BfErr::Code(ErrorCode::E_INVARG))?;
        if owner == self.task_perms_who() {
            Ok(())
        } else {
            Err(BfErr::Code(ErrorCode::E_PERM))
        }
    }
}

/// Return possibilities from a builtin function.
pub enum BfRet {
    /// Successful return: a value for the operand stack.
    Ret(Var),
    /// Hand a control-flow result back to the opcode loop (suspend, read, ...).
    VmInstr(ExecutionResult),
}

/// Failure from a builtin, eventually raised (or returned, under a non-'d'
/// verb) in the calling frame.
pub enum BfErr {
    Code(ErrorCode),
    Raise(Error),
}

impl BfErr {
    pub(crate) fn to_error(self) -> Error {
        match self {
            BfErr::Code(code) => code.into(),
            BfErr::Raise(err) => err,
        }
    }
}

impl From<Error> for BfErr {
    fn from(err: Error) -> Self {
        BfErr::Raise(err)
    }
}

impl From<ErrorCode> for BfErr {
    fn from(code: ErrorCode) -> Self {
        BfErr::Code(code)
    }
}

pub trait BuiltinFunction: Sync + Send {
    fn name(&self) -> &str;
    fn call(&self, bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr>;
}

/// Declare a struct implementing `BuiltinFunction` that delegates to `$action`.
#[macro_export]
macro_rules! bf_declare {
    ( $name:ident, $action:expr ) => {
        paste::paste! {
            pub struct [<Bf $name:camel >] {}
            impl $crate::builtins::BuiltinFunction for [<Bf $name:camel >] {
                fn name(&self) -> &str {
                    stringify!($name)
                }
                fn call(
                    &self,
                    bf_args: &mut $crate::builtins::BfCallState<'_>
                ) -> Result<$crate::builtins::BfRet, $crate::builtins::BfErr> {
                    $action(bf_args)
                }
            }
        }
    };
}

/// Placeholder for descriptor slots nothing has registered yet.
pub struct BfNoop {}

impl BuiltinFunction for BfNoop {
    fn name(&self) -> &str {
        "noop"
    }

    fn call(&self, bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
        tracing::error!(name = %bf_args.name, "call to unimplemented builtin");
        Err(BfErr::Code(ErrorCode::E_INVARG))
    }
}

/// Build the full registry, one implementation per descriptor slot.
pub(crate) fn register_all(count: usize) -> Vec<Box<dyn BuiltinFunction>> {
    let mut builtins: Vec<Box<dyn BuiltinFunction>> = Vec::with_capacity(count);
    for _ in 0..count {
        builtins.push(Box::new(BfNoop {}));
    }
    bf_values::register(&mut builtins);
    bf_num::register(&mut builtins);
    bf_strings::register(&mut builtins);
    bf_list_sets::register(&mut builtins);
    bf_maps::register(&mut builtins);
    bf_objects::register(&mut builtins);
    bf_properties::register(&mut builtins);
    bf_verbs::register(&mut builtins);
    bf_server::register(&mut builtins);
    builtins
}
