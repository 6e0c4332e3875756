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

//! Main opcode execution. The actual meat of the virtual machine.

use crate::tasks::sessions::Sessions;
use crate::tasks::SchedulerControl;
use crate::vm::exec_state::{VmExec, VmExecParams};
use crate::vm::unwind::FinallyReason;
use crate::vm::{ExecutionResult, Fork, VM};
use barn_common::model::{ObjFlag, PropFlag};
use barn_common::tasks::AbortLimitReason;
use barn_db::ObjectStore;
use barn_compiler::{Op, ScatterLabel, OFFSET_NONE};
use barn_var::ErrorCode::{E_ARGS, E_INVARG, E_PERM, E_PROPNF, E_RANGE, E_TYPE, E_VARNF};
use barn_var::{
    v_bool, v_empty_list, v_empty_map, v_int, v_list, v_obj, v_string, Associative, Error, Obj,
    Sequence, Symbol, Var, Variant,
};
use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// Evaluate a step result: `More` keeps the opcode loop going, anything else
/// leaves the interpreter.
macro_rules! flow {
    ( $e:expr ) => {
        match $e {
            ExecutionResult::More => continue,
            other => return other,
        }
    };
}

macro_rules! binary_bool_op {
    ( $f:ident, $op:tt ) => {{
        let rhs = $f.pop();
        let lhs = $f.peek_top();
        let result = if *lhs $op rhs { 1 } else { 0 };
        $f.poke(0, v_int(result))
    }};
}

macro_rules! binary_var_op {
    ( $state:ident, $f:ident, $op:ident ) => {{
        let rhs = $f.pop();
        let lhs = $f.peek_top();
        match lhs.$op(&rhs) {
            Ok(result) => $f.poke(0, result),
            Err(err) => {
                $f.pop();
                flow!($state.push_error(err));
            }
        }
    }};
}

impl VM {
    /// Run opcodes until the task yields: completion, uncaught exception, abort,
    /// fork dispatch, suspension or input. `More` only escapes for verb-call
    /// frame pushes, where the scheduler just re-enters.
    pub fn exec(
        &self,
        params: &VmExecParams,
        state: &mut VmExec,
        world: &mut ObjectStore,
        sessions: &dyn Sessions,
        sched: &mut dyn SchedulerControl,
    ) -> ExecutionResult {
        if state.started.is_none() {
            state.started = Some(Instant::now());
        }

        loop {
            // Cancellation and resource limits are polled at every opcode
            // boundary. Neither is catchable in-language.
            if state.killed {
                return ExecutionResult::Abort(AbortLimitReason::Killed);
            }
            if state.tick_count >= state.max_ticks {
                return ExecutionResult::Abort(AbortLimitReason::Ticks(state.max_ticks));
            }
            if let Some(started) = state.started {
                if started.elapsed() >= Duration::from_secs(state.max_seconds) {
                    return ExecutionResult::Abort(AbortLimitReason::Time(state.max_seconds));
                }
            }

            let (op, perms) = {
                let a = state.top();
                let opcodes = &a.frame.program.main_vector;
                if a.frame.pc >= opcodes.len() {
                    // Ran off the end of the vector; a compiler bug if it ever
                    // happens, since every program ends in Done.
                    panic!("program counter {} out of bounds", a.frame.pc);
                }
                (opcodes[a.frame.pc].clone(), a.permissions)
            };
            state.tick_count += tick_cost(&op);
            state.top_mut().frame.pc += 1;

            let f = &mut state.top_mut().frame;
            match op {
                Op::Imm(slot) => {
                    let value = f.program.literal(slot).clone();
                    f.push(value);
                }
                Op::ImmInt(i) => f.push(v_int(i)),
                Op::ImmFloat(fl) => f.push(barn_var::v_float(fl)),
                Op::ImmObj(o) => f.push(v_obj(o)),
                Op::ImmErr(e) => f.push(barn_var::v_err(e)),
                Op::ImmEmptyList => f.push(v_empty_list()),
                Op::Push(id) => {
                    let Some(v) = f.get_env(&id) else {
                        let name = f
                            .program
                            .var_names
                            .name_of(&id)
                            .map(|s| s.to_string())
                            .unwrap_or_default();
                        flow!(state.push_error(
                            E_VARNF.with_msg(|| format!("variable `{name}' not found"))
                        ));
                    };
                    let v = v.clone();
                    f.push(v);
                }
                Op::Put(id) => {
                    let v = f.peek_top().clone();
                    f.set_env(&id, v);
                }
                Op::Pop => {
                    f.pop();
                }
                Op::MakeSingletonList => {
                    let v = f.peek_top().clone();
                    f.poke(0, v_list(&[v]));
                }
                Op::ListAddTail => {
                    let tail = f.pop();
                    let list = f.peek_top();
                    let Variant::List(l) = list.variant() else {
                        f.pop();
                        flow!(state.push_error(E_TYPE.msg("cannot append to non-list")));
                    };
                    let new = l.push(&tail);
                    f.poke(0, new);
                }
                Op::ListAppend => {
                    let tail = f.pop();
                    let list = f.peek_top();
                    let (Variant::List(l), Variant::List(t)) = (list.variant(), tail.variant())
                    else {
                        f.pop();
                        flow!(state.push_error(E_TYPE.msg("splice of non-list")));
                    };
                    let new = l.append(t);
                    f.poke(0, new);
                }
                Op::CheckListForSplice => {
                    if !matches!(f.peek_top().variant(), Variant::List(_)) {
                        f.pop();
                        flow!(state.push_error(E_TYPE.msg("splice of non-list")));
                    }
                }
                Op::MakeMap => f.push(v_empty_map()),
                Op::MapInsert => {
                    let (value, key) = (f.pop(), f.pop());
                    let map = f.peek_top();
                    let result = match map.variant() {
                        Variant::Map(m) => m.set(&key, &value),
                        _ => Err(E_TYPE.msg("map constructor corrupted")),
                    };
                    match result {
                        Ok(m) => f.poke(0, m),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::Index => {
                    let index = f.pop();
                    let value = f.peek_top();
                    match value.index(&index) {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::IndexPush => {
                    let (index, value) = f.peek2();
                    match value.index(index) {
                        Ok(v) => f.push(v),
                        Err(e) => {
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::IndexSet => {
                    let (rhs, index) = (f.pop(), f.pop());
                    let value = f.peek_top();
                    match value.index_set(&index, &rhs) {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::RangeRef => {
                    let (to, from) = (f.pop(), f.pop());
                    let base = f.peek_top();
                    match base.range(&from, &to) {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::RangeSet => {
                    let (value, to, from) = (f.pop(), f.pop(), f.pop());
                    let base = f.peek_top();
                    match base.range_set(&from, &to, &value) {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::PutTemp => {
                    f.temp = Some(f.peek_top().clone());
                }
                Op::PushTemp => {
                    let temp = f.temp.take().unwrap_or_else(|| v_int(0));
                    f.push(temp);
                }
                Op::RangeEnd(offset) => {
                    if offset == OFFSET_NONE {
                        flow!(state
                            .push_error(E_TYPE.msg("`$' used outside an index expression")));
                    }
                    let value = f.peek_abs(offset.0 as usize);
                    match range_end_of(value) {
                        Ok(v) => f.push(v),
                        Err(e) => {
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::RangeStart(offset) => {
                    if offset == OFFSET_NONE {
                        flow!(state
                            .push_error(E_TYPE.msg("`^' used outside an index expression")));
                    }
                    let value = f.peek_abs(offset.0 as usize);
                    match range_start_of(value) {
                        Ok(v) => f.push(v),
                        Err(e) => {
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::GetProp => {
                    let propname = f.pop();
                    let obj = f.peek_top().clone();
                    match get_property(world, &perms, &obj, &propname) {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::PushGetProp => {
                    let (propname, obj) = f.peek2();
                    let (propname, obj) = (propname.clone(), obj.clone());
                    match get_property(world, &perms, &obj, &propname) {
                        Ok(v) => f.push(v),
                        Err(e) => {
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::PutProp => {
                    let (rhs, propname) = (f.pop(), f.pop());
                    let obj = f.peek_top().clone();
                    match set_property(world, &perms, &obj, &propname, &rhs) {
                        Ok(()) => f.poke(0, rhs),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::Eq => binary_bool_op!(f, ==),
                Op::Ne => binary_bool_op!(f, !=),
                Op::Gt => {
                    flow!(comparison(state, Ordering::Greater, false));
                }
                Op::Lt => {
                    flow!(comparison(state, Ordering::Less, false));
                }
                Op::Ge => {
                    flow!(comparison(state, Ordering::Greater, true));
                }
                Op::Le => {
                    flow!(comparison(state, Ordering::Less, true));
                }
                Op::In => {
                    let container = f.pop();
                    let needle = f.peek_top();
                    match needle.index_in(&container) {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::Add => binary_var_op!(state, f, add),
                Op::Sub => binary_var_op!(state, f, sub),
                Op::Mul => binary_var_op!(state, f, mul),
                Op::Div => binary_var_op!(state, f, div),
                Op::Mod => binary_var_op!(state, f, modulus),
                Op::Exp => binary_var_op!(state, f, pow),
                Op::And(label) => {
                    let v = f.peek_top().is_true();
                    if !v {
                        f.jump(&label);
                    } else {
                        f.pop();
                    }
                }
                Op::Or(label) => {
                    let v = f.peek_top().is_true();
                    if v {
                        f.jump(&label);
                    } else {
                        f.pop();
                    }
                }
                Op::Not => {
                    let v = !f.peek_top().is_true();
                    f.poke(0, v_bool(v));
                }
                Op::UnaryMinus => {
                    let v = f.peek_top();
                    match v.negative() {
                        Ok(v) => f.poke(0, v),
                        Err(e) => {
                            f.pop();
                            flow!(state.push_error(e));
                        }
                    }
                }
                Op::Jump { label } => f.jump(&label),
                Op::IfFalse(label) => {
                    let cond = f.pop();
                    if !cond.is_true() {
                        f.jump(&label);
                    }
                }
                Op::ForList { id, end_label } => {
                    let (count, container) = {
                        let (count, container) = f.peek2();
                        (count.clone(), container.clone())
                    };
                    let Variant::Int(count) = count.variant() else {
                        f.pop();
                        f.pop();
                        f.jump(&end_label);
                        flow!(state.push_error(E_TYPE.msg("loop counter corrupted")));
                    };
                    let idx = *count as usize;
                    let element = match container.variant() {
                        Variant::List(l) => {
                            if idx >= l.len() {
                                None
                            } else {
                                Some(l.index(idx).expect("list index vanished"))
                            }
                        }
                        Variant::Map(m) => m.index_pair(idx).map(|(_, v)| v),
                        _ => {
                            f.pop();
                            f.pop();
                            f.jump(&end_label);
                            flow!(state
                                .push_error(E_TYPE.msg("for-in over a non-container")));
                        }
                    };
                    match element {
                        None => {
                            f.pop();
                            f.pop();
                            f.jump(&end_label);
                        }
                        Some(element) => {
                            f.set_env(&id, element);
                            f.poke(0, v_int(idx as i64 + 1));
                        }
                    }
                }
                Op::ForRange { id, end_label } => {
                    let (to, from) = {
                        let (to, from) = f.peek2();
                        (to.clone(), from.clone())
                    };
                    let next = match (to.variant(), from.variant()) {
                        (Variant::Int(to_i), Variant::Int(from_i)) => {
                            if from_i > to_i {
                                None
                            } else {
                                Some((v_int(*from_i), v_int(from_i + 1)))
                            }
                        }
                        (Variant::Obj(to_o), Variant::Obj(from_o)) => {
                            if from_o > to_o {
                                None
                            } else {
                                Some((v_obj(*from_o), v_obj(from_o.successor())))
                            }
                        }
                        (_, _) => {
                            f.pop();
                            f.pop();
                            f.jump(&end_label);
                            flow!(state
                                .push_error(E_TYPE.msg("for-range bounds must be like types")));
                        }
                    };
                    match next {
                        None => {
                            f.pop();
                            f.pop();
                            f.jump(&end_label);
                        }
                        Some((current, next)) => {
                            f.set_env(&id, current);
                            f.poke(1, next);
                        }
                    }
                }
                Op::Exit { stack, label } => {
                    flow!(state.unwind_exit(stack, label));
                }
                Op::Fork { fork } => {
                    let time = f.pop();
                    let seconds = match time.variant() {
                        Variant::Int(t) => *t as f64,
                        Variant::Float(t) => *t,
                        _ => {
                            flow!(state.push_error(E_TYPE.msg("fork delay must be a number")));
                        }
                    };
                    if seconds < 0.0 {
                        flow!(state.push_error(E_INVARG.msg("fork delay must not be negative")));
                    }
                    let delay =
                        (seconds != 0.0).then(|| Duration::from_secs_f64(seconds));
                    let a = state.top();
                    let body = a.frame.program.fork_table[fork.0 as usize].clone();
                    let activation = a.for_fork(&body);
                    return ExecutionResult::DispatchFork(Fork {
                        delay,
                        activation,
                        var: body.var,
                        fork_index: fork,
                        parent_task_id: state.task_id,
                        player: a.player,
                        progr: a.permissions,
                    });
                }
                Op::CallVerb => {
                    let (args, verb, target) = (f.pop(), f.pop(), f.pop());
                    let (Variant::List(args), Variant::Str(verb)) =
                        (args.variant(), verb.variant())
                    else {
                        flow!(state.push_error(E_TYPE.msg("bad verb call operands")));
                    };
                    let verb = Symbol::mk(verb.as_str());
                    flow!(self.call_verb(params, state, world, target, verb, args.clone()));
                }
                Op::Pass => {
                    let args = f.pop();
                    let Variant::List(args) = args.variant() else {
                        flow!(state.push_error(E_TYPE.msg("bad pass arguments")));
                    };
                    let args = args.clone();
                    flow!(self.prepare_pass(params, state, world, args));
                }
                Op::CallBuiltin(id) => {
                    let args = f.pop();
                    let Variant::List(args) = args.variant() else {
                        flow!(state.push_error(E_ARGS.msg("bad builtin arguments")));
                    };
                    let args: Vec<Var> = args.iter().collect();
                    flow!(self.call_builtin(id, args, params, state, world, sessions, sched));
                }
                Op::Return => {
                    let value = f.pop();
                    flow!(state.unwind_stack(FinallyReason::Return(value)));
                }
                Op::Return0 => {
                    flow!(state.unwind_stack(FinallyReason::Return(v_int(0))));
                }
                Op::Done => {
                    flow!(state.unwind_stack(FinallyReason::Return(v_int(0))));
                }
                Op::Scatter(sa) => {
                    flow!(scatter_assign(state, &sa));
                }
                Op::EndFinally => {
                    f.finally_stack.push(FinallyReason::Fallthrough);
                }
                Op::FinallyContinue => {
                    let why = f.finally_stack.pop().expect("missing finally reason");
                    match why {
                        FinallyReason::Fallthrough => {}
                        FinallyReason::Exit { stack, label } => {
                            flow!(state.unwind_exit(stack, label));
                        }
                        why @ (FinallyReason::Raise(_) | FinallyReason::Return(_)) => {
                            flow!(state.unwind_stack(why));
                        }
                    }
                }
            }
        }
    }
}

/// Most opcodes cost one tick; list and map construction are free.
fn tick_cost(op: &Op) -> usize {
    match op {
        Op::MakeSingletonList
        | Op::ListAddTail
        | Op::ListAppend
        | Op::CheckListForSplice
        | Op::MakeMap
        | Op::MapInsert
        | Op::ImmEmptyList => 0,
        _ => 1,
    }
}

/// Relational comparison: `ordering` (optionally `or_equal`) against
/// `lhs.compare(rhs)`.
fn comparison(state: &mut VmExec, ordering: Ordering, or_equal: bool) -> ExecutionResult {
    let f = &mut state.top_mut().frame;
    let rhs = f.pop();
    let lhs = f.peek_top();
    match lhs.compare(&rhs) {
        Ok(actual) => {
            let result = actual == ordering || (or_equal && actual == Ordering::Equal);
            f.poke(0, v_int(result as i64));
            ExecutionResult::More
        }
        Err(e) => {
            f.pop();
            state.push_error(e)
        }
    }
}

/// `$` for the saved container: its length, or a map's last key.
fn range_end_of(value: &Var) -> Result<Var, Error> {
    match value.variant() {
        Variant::Str(s) => Ok(v_int(s.len() as i64)),
        Variant::List(l) => Ok(v_int(l.len() as i64)),
        Variant::Map(m) => m
            .last_key()
            .ok_or_else(|| E_RANGE.msg("`$' of an empty map")),
        _ => Err(E_TYPE.msg("`$' of a non-container")),
    }
}

/// `^`: 1 for sequences, or a map's first key.
fn range_start_of(value: &Var) -> Result<Var, Error> {
    match value.variant() {
        Variant::Str(_) | Variant::List(_) => Ok(v_int(1)),
        Variant::Map(m) => m
            .first_key()
            .ok_or_else(|| E_RANGE.msg("`^' of an empty map")),
        _ => Err(E_TYPE.msg("`^' of a non-container")),
    }
}

/// Scatter-assign the list on top of the stack into the targets. The list stays
/// on the stack as the expression's value.
fn scatter_assign(state: &mut VmExec, sa: &barn_compiler::ScatterArgs) -> ExecutionResult {
    let f = &mut state.top_mut().frame;
    let rhs = f.peek_top().clone();
    let Variant::List(rhs_values) = rhs.variant() else {
        f.pop();
        return state.push_error(E_TYPE.msg("scatter of a non-list"));
    };

    let nargs = sa.labels.len();
    let nreq = sa
        .labels
        .iter()
        .filter(|l| matches!(l, ScatterLabel::Required(_)))
        .count();
    let have_rest = sa
        .labels
        .iter()
        .any(|l| matches!(l, ScatterLabel::Rest(_)));

    let len = rhs_values.len();
    if len < nreq || (!have_rest && len > nargs) {
        f.pop();
        return state.push_error(E_ARGS.with_msg(|| {
            format!("scatter of {len} values into {nreq} required targets")
        }));
    }

    let mut nopt_avail = len - nreq;
    let nrest = if have_rest && len >= nargs {
        len - nargs + 1
    } else {
        0
    };
    let mut jump_where = None;
    let mut args_iter = rhs_values.iter();

    for label in &sa.labels {
        match label {
            ScatterLabel::Rest(id) => {
                let mut v = Vec::with_capacity(nrest);
                for _ in 0..nrest {
                    let Some(rest) = args_iter.next() else {
                        break;
                    };
                    v.push(rest);
                }
                f.set_env(id, v_list(&v));
            }
            ScatterLabel::Required(id) => {
                let Some(arg) = args_iter.next() else {
                    return state.push_error(E_ARGS.msg("scatter underflow"));
                };
                f.set_env(id, arg);
            }
            ScatterLabel::Optional(id, jump_to) => {
                if nopt_avail > 0 {
                    nopt_avail -= 1;
                    let Some(arg) = args_iter.next() else {
                        return state.push_error(E_ARGS.msg("scatter underflow"));
                    };
                    f.set_env(id, arg);
                } else {
                    // No value: default to 0 here; a written default's island
                    // overwrites it when one exists.
                    f.set_env(id, v_int(0));
                    if jump_where.is_none() && jump_to.is_some() {
                        jump_where = *jump_to;
                    }
                }
            }
        }
    }
    match &jump_where {
        None => f.jump(&sa.done),
        Some(jump_where) => f.jump(jump_where),
    }
    ExecutionResult::More
}

/// Property read, including the built-in attributes and waif slots.
pub(crate) fn get_property(
    world: &mut ObjectStore,
    perms: &Obj,
    obj: &Var,
    propname: &Var,
) -> Result<Var, Error> {
    let Variant::Str(propname) = propname.variant() else {
        return Err(E_TYPE.msg("property name must be a string"));
    };
    let name = Symbol::mk(propname.as_str());

    match obj.variant() {
        Variant::Obj(o) | Variant::Anon(o) => get_object_property(world, perms, o, name),
        Variant::Waif(w) => {
            // `class` and `owner` are intrinsic to the waif; anything else reads
            // its own slots, falling back to the class for defaults.
            match name.to_lowercase().as_str() {
                "class" => Ok(v_obj(w.class()?)),
                "owner" => Ok(v_obj(w.owner())),
                _ => {
                    if let Some(v) = w.get_property(name)? {
                        return Ok(v);
                    }
                    let class = w.class()?;
                    get_object_property(world, perms, &class, name)
                }
            }
        }
        _ => Err(barn_var::ErrorCode::E_INVIND.msg("property access on a non-object")),
    }
}

fn get_object_property(
    world: &ObjectStore,
    perms: &Obj,
    o: &Obj,
    name: Symbol,
) -> Result<Var, Error> {
    let Some(object) = world.get(o) else {
        return Err(barn_var::ErrorCode::E_INVIND.with_msg(|| format!("{o} is not valid")));
    };

    // Built-in attributes first.
    match name.to_lowercase().as_str() {
        "name" => return Ok(v_string(object.name.clone())),
        "owner" => return Ok(v_obj(object.owner)),
        "location" => return Ok(v_obj(object.location)),
        "contents" => {
            let contents: Vec<Var> = object.contents.iter().map(|c| v_obj(*c)).collect();
            return Ok(v_list(&contents));
        }
        "programmer" => return Ok(v_int(object.flags.contains(ObjFlag::Programmer) as i64)),
        "wizard" => return Ok(v_int(object.flags.contains(ObjFlag::Wizard) as i64)),
        "player" => return Ok(v_int(object.flags.contains(ObjFlag::User) as i64)),
        "r" => return Ok(v_int(object.flags.contains(ObjFlag::Read) as i64)),
        "w" => return Ok(v_int(object.flags.contains(ObjFlag::Write) as i64)),
        "f" => return Ok(v_int(object.flags.contains(ObjFlag::Fertile) as i64)),
        _ => {}
    }

    let (value, _definer, entry_perms) = world
        .resolve_property(o, name)
        .map_err(|e| e.to_error())?;
    let readable = world.is_wizard(perms)
        || entry_perms.owner == *perms
        || entry_perms.flags.contains(PropFlag::Read);
    if !readable {
        return Err(E_PERM.with_msg(|| format!("{o}.{name} is not readable")));
    }
    Ok(value)
}

/// Property write, including built-in attributes and waif slots.
pub(crate) fn set_property(
    world: &mut ObjectStore,
    perms: &Obj,
    obj: &Var,
    propname: &Var,
    value: &Var,
) -> Result<(), Error> {
    let Variant::Str(propname) = propname.variant() else {
        return Err(E_TYPE.msg("property name must be a string"));
    };
    let name = Symbol::mk(propname.as_str());

    match obj.variant() {
        Variant::Obj(o) | Variant::Anon(o) => set_object_property(world, perms, o, name, value),
        Variant::Waif(w) => {
            if matches!(name.to_lowercase().as_str(), "class" | "owner") {
                return Err(E_PERM.msg("waif class and owner are immutable"));
            }
            let writable = world.is_wizard(perms) || w.owner() == *perms;
            if !writable {
                return Err(E_PERM.msg("waif is not writable"));
            }
            w.set_property(name, value.clone())
        }
        _ => Err(barn_var::ErrorCode::E_INVIND.msg("property access on a non-object")),
    }
}

fn set_object_property(
    world: &mut ObjectStore,
    perms: &Obj,
    o: &Obj,
    name: Symbol,
    value: &Var,
) -> Result<(), Error> {
    let wizard = world.is_wizard(perms);
    let Some(object) = world.get_mut(o) else {
        return Err(barn_var::ErrorCode::E_INVIND.with_msg(|| format!("{o} is not valid")));
    };
    let owner_ok = wizard || object.owner == *perms;

    match name.to_lowercase().as_str() {
        "name" => {
            if !owner_ok {
                return Err(E_PERM.msg("only the owner may rename"));
            }
            let Variant::Str(s) = value.variant() else {
                return Err(E_TYPE.msg("name must be a string"));
            };
            object.name = s.as_str().to_string();
            return Ok(());
        }
        "owner" => {
            if !wizard {
                return Err(E_PERM.msg("only wizards may chown"));
            }
            let Variant::Obj(new_owner) = value.variant() else {
                return Err(E_TYPE.msg("owner must be an object"));
            };
            object.owner = *new_owner;
            return Ok(());
        }
        "programmer" | "wizard" => {
            if !wizard {
                return Err(E_PERM.msg("only wizards may grant bits"));
            }
            let flag = if name.to_lowercase() == "wizard" {
                ObjFlag::Wizard
            } else {
                ObjFlag::Programmer
            };
            if value.is_true() {
                object.flags.set(flag);
            } else {
                object.flags.clear(flag);
            }
            return Ok(());
        }
        "r" | "w" | "f" => {
            if !owner_ok {
                return Err(E_PERM.msg("only the owner may set flags"));
            }
            let flag = match name.to_lowercase().as_str() {
                "r" => ObjFlag::Read,
                "w" => ObjFlag::Write,
                _ => ObjFlag::Fertile,
            };
            if value.is_true() {
                object.flags.set(flag);
            } else {
                object.flags.clear(flag);
            }
            return Ok(());
        }
        "location" | "contents" | "player" => {
            return Err(E_PERM.with_msg(|| format!(".{name} is not directly writable")));
        }
        _ => {}
    }

    let Some(entry) = world.property_entry(o, name) else {
        return Err(E_PROPNF.with_msg(|| format!("{o}.{name} not found")));
    };
    let writable =
        wizard || entry.perms.owner == *perms || entry.perms.flags.contains(PropFlag::Write);
    if !writable {
        return Err(E_PERM.with_msg(|| format!("{o}.{name} is not writable")));
    }
    world
        .set_property(o, name, value.clone())
        .map_err(|e| e.to_error())
}
