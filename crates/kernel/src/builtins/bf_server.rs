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

use crate::bf_declare;
use crate::builtins::bf_values::stringify;
use crate::builtins::BfRet::{Ret, VmInstr};
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction};
use crate::vm::{Activation, ExecutionResult};
use barn_compiler::{compile, offset_for_builtin, BUILTINS};
use barn_var::ErrorCode::{E_INVARG, E_PERM, E_TYPE};
use barn_var::{v_float, v_int, v_list, v_obj, v_str, v_string, Error, Obj, Var, Variant};
use chrono::TimeZone;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

fn arg_player(v: &Var) -> Result<Obj, BfErr> {
    match v.variant() {
        Variant::Obj(o) => Ok(*o),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// `notify(player, message)`: buffered output onto the player's connection.
fn bf_notify(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = arg_player(&bf_args.args[0])?;
    let message = stringify(&bf_args.args[1]);
    if !bf_args.task_perms_wizard() && bf_args.task_perms_who() != player {
        return Err(BfErr::Code(E_PERM));
    }
    if let Some(conn) = bf_args.sched.connection_for(&player) {
        bf_args.sessions.send_line(conn, &message);
    }
    Ok(Ret(v_int(1)))
}
bf_declare!(notify, bf_notify);

fn bf_buffered_output_length(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = match bf_args.args.first() {
        Some(v) => arg_player(v)?,
        None => bf_args.exec.player(),
    };
    let Some(conn) = bf_args.sched.connection_for(&player) else {
        return Err(BfErr::Code(E_INVARG));
    };
    Ok(Ret(v_int(bf_args.sessions.buffered_len(conn) as i64)))
}
bf_declare!(buffered_output_length, bf_buffered_output_length);

/// `read([player])`: park the task until the connection's next input line.
fn bf_read(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = match bf_args.args.first() {
        Some(v) => arg_player(v)?,
        None => bf_args.exec.player(),
    };
    if player != bf_args.exec.player() && !bf_args.task_perms_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    if bf_args.sched.connection_for(&player).is_none() {
        return Err(BfErr::Code(E_INVARG));
    }
    Ok(VmInstr(ExecutionResult::NeedInput))
}
bf_declare!(read, bf_read);

fn bf_server_version(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_str(env!("CARGO_PKG_VERSION"))))
}
bf_declare!(server_version, bf_server_version);

fn bf_server_log(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.needs_wizard()?;
    let message = bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let is_error = bf_args.args.get(1).map(|v| v.is_true()).unwrap_or(false);
    if is_error {
        warn!(player = %bf_args.exec.player(), "> {message}");
    } else {
        info!(player = %bf_args.exec.player(), "> {message}");
    }
    Ok(Ret(v_int(1)))
}
bf_declare!(server_log, bf_server_log);

fn bf_memory_usage(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    // Block-size accounting is allocator business we don't do.
    Ok(Ret(v_list(&[])))
}
bf_declare!(memory_usage, bf_memory_usage);

fn bf_shutdown(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.needs_wizard()?;
    let message = bf_args
        .args
        .first()
        .and_then(|v| v.as_str())
        .map(str::to_string);
    bf_args.sched.request_shutdown(message);
    Ok(Ret(v_int(0)))
}
bf_declare!(shutdown, bf_shutdown);

fn bf_dump_database(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.needs_wizard()?;
    bf_args.sched.request_checkpoint();
    Ok(Ret(v_int(1)))
}
bf_declare!(dump_database, bf_dump_database);

fn epoch_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

fn bf_time(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_int(epoch_now().as_secs() as i64)))
}
bf_declare!(time, bf_time);

fn bf_ftime(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_float(epoch_now().as_secs_f64())))
}
bf_declare!(ftime, bf_ftime);

fn bf_ctime(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let time = match bf_args.args.first() {
        Some(v) => match v.variant() {
            Variant::Int(t) => *t,
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => epoch_now().as_secs() as i64,
    };
    let datetime = chrono::Local
        .timestamp_opt(time, 0)
        .single()
        .ok_or(BfErr::Code(E_INVARG))?;
    Ok(Ret(v_string(
        datetime.format("%a %b %e %H:%M:%S %Y %Z").to_string(),
    )))
}
bf_declare!(ctime, bf_ctime);

/// `raise(code [, message [, value]])`
fn bf_raise(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let Variant::Err(e) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let msg = match bf_args.args.get(1) {
        None => None,
        Some(m) => Some(
            m.as_str()
                .map(str::to_string)
                .ok_or(BfErr::Code(E_TYPE))?,
        ),
    };
    let value = bf_args.args.get(2).cloned();
    Err(BfErr::Raise(Error::new(e.code, msg, value)))
}
bf_declare!(raise, bf_raise);

/// `suspend([seconds])`: no argument parks until `resume()`; zero goes through
/// the queue immediately; positive sleeps until the deadline.
fn bf_suspend(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let delay = match bf_args.args.first().map(|v| v.variant()) {
        None => None,
        Some(Variant::Int(secs)) => {
            if *secs < 0 {
                return Err(BfErr::Code(E_INVARG));
            }
            Some(Duration::from_secs(*secs as u64))
        }
        Some(Variant::Float(secs)) => {
            if *secs < 0.0 {
                return Err(BfErr::Code(E_INVARG));
            }
            Some(Duration::from_secs_f64(*secs))
        }
        Some(_) => return Err(BfErr::Code(E_TYPE)),
    };
    Ok(VmInstr(ExecutionResult::Suspend(delay)))
}
bf_declare!(suspend, bf_suspend);

fn bf_resume(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let Variant::Int(task_id) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let value = bf_args.args.get(1).cloned().unwrap_or_else(|| v_int(0));
    let who = bf_args.task_perms_who();
    let wizard = bf_args.task_perms_wizard();
    bf_args
        .sched
        .resume_task(*task_id as usize, value, who, wizard)
        .map_err(BfErr::Raise)?;
    Ok(Ret(v_int(0)))
}
bf_declare!(resume, bf_resume);

fn bf_queued_tasks(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let now = epoch_now().as_secs() as i64;
    let tasks = bf_args.sched.queued_tasks();
    let entries: Vec<Var> = tasks
        .iter()
        .map(|t| {
            let start = t.wake_in.map(|w| now + w as i64).unwrap_or(now);
            v_list(&[
                v_int(t.task_id as i64),
                v_int(start),
                v_int(0),
                v_int(0),
                v_obj(t.programmer),
                v_obj(t.verb_definer),
                v_string(t.verb_name.clone()),
                v_int(t.line as i64),
                t.this.clone(),
            ])
        })
        .collect();
    Ok(Ret(v_list(&entries)))
}
bf_declare!(queued_tasks, bf_queued_tasks);

fn bf_task_id(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_int(bf_args.exec.task_id as i64)))
}
bf_declare!(task_id, bf_task_id);

fn bf_task_local(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(bf_args.exec.task_local.clone()))
}
bf_declare!(task_local, bf_task_local);

fn bf_set_task_local(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.exec.task_local = bf_args.args[0].clone();
    Ok(Ret(v_int(0)))
}
bf_declare!(set_task_local, bf_set_task_local);

fn bf_kill_task(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let Variant::Int(task_id) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let task_id = *task_id as usize;
    if task_id == bf_args.exec.task_id {
        // Killing yourself: the abort lands at the next opcode boundary.
        bf_args.exec.killed = true;
        return Ok(Ret(v_int(0)));
    }
    let who = bf_args.task_perms_who();
    let wizard = bf_args.task_perms_wizard();
    bf_args
        .sched
        .kill_task(task_id, who, wizard)
        .map_err(BfErr::Raise)?;
    Ok(Ret(v_int(0)))
}
bf_declare!(kill_task, bf_kill_task);

fn bf_ticks_left(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_int(bf_args.exec.ticks_left() as i64)))
}
bf_declare!(ticks_left, bf_ticks_left);

fn bf_seconds_left(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let elapsed = bf_args
        .exec
        .started
        .map(|s| s.elapsed().as_secs())
        .unwrap_or(0);
    Ok(Ret(v_int(
        bf_args.exec.max_seconds.saturating_sub(elapsed) as i64
    )))
}
bf_declare!(seconds_left, bf_seconds_left);

fn bf_callers(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_list(&bf_args.exec.callers())))
}
bf_declare!(callers, bf_callers);

fn bf_set_task_perms(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let who = arg_player(&bf_args.args[0])?;
    if !bf_args.task_perms_wizard() && who != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.exec.top_mut().permissions = who;
    Ok(Ret(v_int(0)))
}
bf_declare!(set_task_perms, bf_set_task_perms);

fn bf_caller_perms(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_obj(bf_args.caller_perms())))
}
bf_declare!(caller_perms, bf_caller_perms);

/// `call_function(name, @args)`: dispatch a builtin by runtime name.
fn bf_call_function(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let name = bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let id = BUILTINS
        .find_builtin(name)
        .ok_or(BfErr::Code(E_INVARG))?;
    let desc = BUILTINS.description_for(id).ok_or(BfErr::Code(E_INVARG))?;
    let rest: Vec<Var> = bf_args.args[1..].to_vec();
    if rest.len() < desc.min_args || desc.max_args.map(|m| rest.len() > m).unwrap_or(false) {
        return Err(BfErr::Code(barn_var::ErrorCode::E_ARGS));
    }
    let saved_name = bf_args.name;
    let saved_args = std::mem::replace(&mut bf_args.args, rest);
    let vm = bf_args.vm;
    let result = vm.builtins[id.0 as usize].call(bf_args);
    bf_args.name = saved_name;
    bf_args.args = saved_args;
    result
}
bf_declare!(call_function, bf_call_function);

fn bf_function_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let info_for = |name: &'static str, id: barn_compiler::BuiltinId| {
        let desc = BUILTINS.description_for(id).expect("missing descriptor");
        v_list(&[
            v_str(name),
            v_int(desc.min_args as i64),
            v_int(desc.max_args.map(|m| m as i64).unwrap_or(-1)),
        ])
    };
    match bf_args.args.first() {
        Some(v) => {
            let name = v.as_str().ok_or(BfErr::Code(E_TYPE))?;
            let id = BUILTINS.find_builtin(name).ok_or(BfErr::Code(E_INVARG))?;
            let name = BUILTINS.name_of(id).ok_or(BfErr::Code(E_INVARG))?;
            Ok(Ret(info_for(name, id)))
        }
        None => {
            let all: Vec<Var> = BUILTINS
                .names()
                .map(|(name, id)| info_for(name, id))
                .collect();
            Ok(Ret(v_list(&all)))
        }
    }
}
bf_declare!(function_info, bf_function_info);

/// `eval(code)`: compile and run a string as a program, synchronously.
/// Produces `{1, value}` on success and `{0, {messages}}` on compile failure.
fn bf_eval(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let code = bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let programmer = bf_args.task_perms_who();
    let is_programmer = bf_args
        .world
        .get(&programmer)
        .map(|o| {
            o.flags.contains(barn_common::model::ObjFlag::Programmer)
                || o.flags.contains(barn_common::model::ObjFlag::Wizard)
        })
        .unwrap_or(false);
    if !is_programmer {
        return Err(BfErr::Code(E_PERM));
    }

    let compiled = bf_args.params.parser.parse_program(code).and_then(compile);
    let program = match compiled {
        Ok(program) => program,
        Err(e) => {
            return Ok(Ret(v_list(&[
                v_int(0),
                v_list(&[v_string(e.to_string())]),
            ])));
        }
    };

    let player = bf_args.exec.player();
    let activation = Activation::for_eval(program, player, programmer);
    let result = bf_args.vm.run_nested(
        bf_args.params,
        bf_args.exec,
        bf_args.world,
        bf_args.sessions,
        bf_args.sched,
        activation,
    );
    match result {
        ExecutionResult::Complete(value) => Ok(Ret(v_list(&[v_int(1), value]))),
        ExecutionResult::Exception(e) => Err(BfErr::Raise(e.error)),
        ExecutionResult::Abort(reason) => {
            Ok(VmInstr(ExecutionResult::Abort(reason)))
        }
        _ => Err(BfErr::Code(E_INVARG)),
    }
}
bf_declare!(eval, bf_eval);

fn bf_connected_players(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let players: Vec<Var> = bf_args
        .sched
        .connected_players()
        .iter()
        .map(|p| v_obj(*p))
        .collect();
    Ok(Ret(v_list(&players)))
}
bf_declare!(connected_players, bf_connected_players);

fn bf_connected_seconds(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = arg_player(&bf_args.args[0])?;
    let seconds = bf_args
        .sched
        .connected_seconds(&player)
        .ok_or(BfErr::Code(E_INVARG))?;
    Ok(Ret(v_int(seconds as i64)))
}
bf_declare!(connected_seconds, bf_connected_seconds);

fn bf_idle_seconds(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = arg_player(&bf_args.args[0])?;
    let seconds = bf_args
        .sched
        .idle_seconds(&player)
        .ok_or(BfErr::Code(E_INVARG))?;
    Ok(Ret(v_int(seconds as i64)))
}
bf_declare!(idle_seconds, bf_idle_seconds);

fn bf_connection_name(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = arg_player(&bf_args.args[0])?;
    if !bf_args.task_perms_wizard() && player != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    let name = bf_args
        .sched
        .connection_name(&player)
        .ok_or(BfErr::Code(E_INVARG))?;
    Ok(Ret(v_string(name)))
}
bf_declare!(connection_name, bf_connection_name);

fn bf_boot_player(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = arg_player(&bf_args.args[0])?;
    if !bf_args.task_perms_wizard() && player != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.sched.boot_player(&player);
    Ok(Ret(v_int(0)))
}
bf_declare!(boot_player, bf_boot_player);

fn bf_is_wizard(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_player(&bf_args.args[0])?;
    Ok(Ret(v_int(bf_args.world.is_wizard(&obj) as i64)))
}
bf_declare!(is_wizard, bf_is_wizard);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("notify")] = Box::new(BfNotify {});
    builtins[offset_for_builtin("buffered_output_length")] =
        Box::new(BfBufferedOutputLength {});
    builtins[offset_for_builtin("read")] = Box::new(BfRead {});
    builtins[offset_for_builtin("server_version")] = Box::new(BfServerVersion {});
    builtins[offset_for_builtin("server_log")] = Box::new(BfServerLog {});
    builtins[offset_for_builtin("memory_usage")] = Box::new(BfMemoryUsage {});
    builtins[offset_for_builtin("shutdown")] = Box::new(BfShutdown {});
    builtins[offset_for_builtin("dump_database")] = Box::new(BfDumpDatabase {});
    builtins[offset_for_builtin("time")] = Box::new(BfTime {});
    builtins[offset_for_builtin("ftime")] = Box::new(BfFtime {});
    builtins[offset_for_builtin("ctime")] = Box::new(BfCtime {});
    builtins[offset_for_builtin("raise")] = Box::new(BfRaise {});
    builtins[offset_for_builtin("suspend")] = Box::new(BfSuspend {});
    builtins[offset_for_builtin("resume")] = Box::new(BfResume {});
    builtins[offset_for_builtin("queued_tasks")] = Box::new(BfQueuedTasks {});
    builtins[offset_for_builtin("task_id")] = Box::new(BfTaskId {});
    builtins[offset_for_builtin("task_local")] = Box::new(BfTaskLocal {});
    builtins[offset_for_builtin("set_task_local")] = Box::new(BfSetTaskLocal {});
    builtins[offset_for_builtin("kill_task")] = Box::new(BfKillTask {});
    builtins[offset_for_builtin("ticks_left")] = Box::new(BfTicksLeft {});
    builtins[offset_for_builtin("seconds_left")] = Box::new(BfSecondsLeft {});
    builtins[offset_for_builtin("callers")] = Box::new(BfCallers {});
    builtins[offset_for_builtin("set_task_perms")] = Box::new(BfSetTaskPerms {});
    builtins[offset_for_builtin("caller_perms")] = Box::new(BfCallerPerms {});
    builtins[offset_for_builtin("call_function")] = Box::new(BfCallFunction {});
    builtins[offset_for_builtin("function_info")] = Box::new(BfFunctionInfo {});
    builtins[offset_for_builtin("eval")] = Box::new(BfEval {});
    builtins[offset_for_builtin("connected_players")] = Box::new(BfConnectedPlayers {});
    builtins[offset_for_builtin("connected_seconds")] = Box::new(BfConnectedSeconds {});
    builtins[offset_for_builtin("idle_seconds")] = Box::new(BfIdleSeconds {});
    builtins[offset_for_builtin("connection_name")] = Box::new(BfConnectionName {});
    builtins[offset_for_builtin("boot_player")] = Box::new(BfBootPlayer {});
    builtins[offset_for_builtin("is_wizard")] = Box::new(BfIsWizard {});
}
