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

use crate::builtins::{BfCallState, BfErr, BfRet};
use crate::tasks::command_parse::ParsedCommand;
use crate::tasks::sessions::Sessions;
use crate::tasks::SchedulerControl;
use crate::vm::activation::Activation;
use crate::vm::exec_state::{VmExec, VmExecParams};
use crate::vm::{ExecutionResult, VM};
use barn_common::model::VerbFlag;
use barn_compiler::{compile, BuiltinId, Program, SourceParser, BUILTINS};
use barn_db::ObjectStore;
use barn_var::ErrorCode::{E_ARGS, E_INVIND, E_MAXREC, E_VERBNF};
use barn_var::{Error, List, Obj, Symbol, Var, Variant};
use std::sync::Arc;

/// Ticks charged per builtin invocation, on top of the call opcode itself.
pub(crate) const BUILTIN_TICKS: usize = 8;

/// Resolve the object a verb call on `target` dispatches through: the object
/// itself, or a waif's class.
fn dispatch_object(world: &ObjectStore, target: &Var) -> Result<Obj, Error> {
    match target.variant() {
        Variant::Obj(o) | Variant::Anon(o) => {
            if !world.valid(o) {
                return Err(E_INVIND.with_msg(|| format!("{o} is not valid")));
            }
            Ok(*o)
        }
        Variant::Waif(w) => w.class(),
        _ => Err(E_INVIND.msg("verb call on non-object")),
    }
}

/// The verb's compiled program, compiling and caching on first call.
pub fn program_for_verb(
    world: &mut ObjectStore,
    parser: &Arc<dyn SourceParser>,
    definer: &Obj,
    index: usize,
) -> Result<Program, Error> {
    let verb = world
        .verb(definer, index)
        .ok_or_else(|| Error::from(E_VERBNF))?;
    if let Some(program) = &verb.program {
        return Ok(program.clone());
    }
    let source = verb.source.clone();
    if source.trim().is_empty() {
        let program = Program::new();
        world.cache_verb_program(definer, index, program.clone());
        return Ok(program);
    }
    let parse = parser
        .parse_program(&source)
        .map_err(|e| E_VERBNF.with_msg(|| format!("verb failed to compile: {e}")))?;
    let program =
        compile(parse).map_err(|e| E_VERBNF.with_msg(|| format!("verb failed to compile: {e}")))?;
    world.cache_verb_program(definer, index, program.clone());
    Ok(program)
}

/// Build the activation for calling `verb` on `target`. Used for explicit calls,
/// command dispatch and the server hooks alike.
#[allow(clippy::too_many_arguments)]
pub fn prepare_verb_activation(
    world: &mut ObjectStore,
    parser: &Arc<dyn SourceParser>,
    target: Var,
    verb: Symbol,
    args: Var,
    player: Obj,
    caller: Var,
    command: Option<ParsedCommand>,
) -> Result<Activation, Error> {
    let obj = dispatch_object(world, &target)?;
    let (definer, index) = world
        .find_callable_verb(&obj, verb)
        .ok_or_else(|| E_VERBNF.with_msg(|| format!("verb {verb} not found on {obj}")))?;
    let program = program_for_verb(world, parser, &definer, index)?;
    let vd = &world.verb(&definer, index).expect("verb vanished").def;
    Ok(Activation::for_verb(
        program,
        target,
        player,
        caller,
        verb,
        definer,
        vd.owner,
        vd.flags.contains(VerbFlag::Debug),
        args,
        command,
    ))
}

impl VM {
    /// Dispatch `target:verb(args)` from the running frame: resolve, compile if
    /// needed, and push the activation.
    pub(crate) fn call_verb(
        &self,
        params: &VmExecParams,
        state: &mut VmExec,
        world: &mut ObjectStore,
        target: Var,
        verb: Symbol,
        args: List,
    ) -> ExecutionResult {
        if state.depth() >= params.max_stack_depth {
            return state.raise_error(E_MAXREC.msg("too many verb calls"));
        }
        let caller = state.top().this.clone();
        let player = state.top().player;
        let activation = match prepare_verb_activation(
            world,
            &params.parser,
            target,
            verb,
            Var::from_list(args),
            player,
            caller,
            None,
        ) {
            Ok(a) => a,
            Err(e) => return state.push_error(e),
        };
        state.stack.push(activation);
        ExecutionResult::More
    }

    /// `pass(@args)`: re-dispatch the current verb name starting above its
    /// definer in the receiver's ancestry.
    pub(crate) fn prepare_pass(
        &self,
        params: &VmExecParams,
        state: &mut VmExec,
        world: &mut ObjectStore,
        args: List,
    ) -> ExecutionResult {
        if state.depth() >= params.max_stack_depth {
            return state.raise_error(E_MAXREC.msg("too many verb calls"));
        }
        let (definer, verb_name, this, player, caller) = {
            let a = state.top();
            (
                a.definer,
                a.verb_name,
                a.this.clone(),
                a.player,
                a.caller.clone(),
            )
        };
        let Some((parent_definer, index)) = world.find_pass_verb(&definer, verb_name) else {
            return state.push_error(
                E_VERBNF.with_msg(|| format!("no verb {verb_name} above {definer}")),
            );
        };
        let program = match program_for_verb(world, &params.parser, &parent_definer, index) {
            Ok(p) => p,
            Err(e) => return state.push_error(e),
        };
        let vd = &world
            .verb(&parent_definer, index)
            .expect("verb vanished")
            .def;
        let activation = Activation::for_verb(
            program,
            this,
            player,
            caller,
            verb_name,
            parent_definer,
            vd.owner,
            vd.flags.contains(VerbFlag::Debug),
            Var::from_list(args),
            None,
        );
        state.stack.push(activation);
        ExecutionResult::More
    }

    /// Invoke a builtin by id. Arity is enforced from the descriptor table; the
    /// function's return value lands on the calling frame's stack.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call_builtin(
        &self,
        id: BuiltinId,
        args: Vec<Var>,
        params: &VmExecParams,
        state: &mut VmExec,
        world: &mut ObjectStore,
        sessions: &dyn Sessions,
        sched: &mut dyn SchedulerControl,
    ) -> ExecutionResult {
        let Some(desc) = BUILTINS.description_for(id) else {
            return state.push_error(E_VERBNF.msg("unknown builtin"));
        };
        if args.len() < desc.min_args || desc.max_args.map(|m| args.len() > m).unwrap_or(false) {
            return state.push_error(E_ARGS.with_msg(|| {
                format!("{} takes {} arguments", desc.name, desc.min_args)
            }));
        }
        state.tick_count += BUILTIN_TICKS;

        let function = &self.builtins[id.0 as usize];
        let result = {
            let mut bf_args = BfCallState {
                name: Symbol::mk(desc.name),
                args,
                exec: state,
                world,
                sessions,
                sched,
                params,
                vm: self,
            };
            function.call(&mut bf_args)
        };
        match result {
            Ok(BfRet::Ret(value)) => {
                state.top_mut().frame.push(value);
                ExecutionResult::More
            }
            Ok(BfRet::VmInstr(result)) => result,
            Err(err) => state.push_error(err.to_error()),
        }
    }

    /// Run a fresh activation to completion inside the current task, sharing its
    /// tick budget. Used by builtins that need a synchronous verb result (the
    /// `accept` hook in `move()`, `eval()`); fork and suspension are refused.
    pub(crate) fn run_nested(
        &self,
        params: &VmExecParams,
        outer: &mut VmExec,
        world: &mut ObjectStore,
        sessions: &dyn Sessions,
        sched: &mut dyn SchedulerControl,
        activation: Activation,
    ) -> ExecutionResult {
        let mut nested = VmExec::new(
            outer.task_id,
            activation,
            outer.max_ticks,
            outer.max_seconds,
        );
        nested.tick_count = outer.tick_count;
        nested.started = outer.started;
        let result = loop {
            match self.exec(params, &mut nested, world, sessions, sched) {
                ExecutionResult::More => continue,
                ExecutionResult::DispatchFork(_)
                | ExecutionResult::Suspend(_)
                | ExecutionResult::NeedInput => {
                    break ExecutionResult::Exception(nested.exception_for(
                        barn_var::ErrorCode::E_INVARG
                            .msg("cannot suspend or fork in this context"),
                    ))
                }
                done => break done,
            }
        };
        outer.tick_count = nested.tick_count;
        result
    }
}
