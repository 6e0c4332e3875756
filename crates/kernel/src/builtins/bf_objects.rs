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
use crate::builtins::BfRet::Ret;
use crate::builtins::{BfCallState, BfErr, BfRet, BuiltinFunction};
use crate::vm::{prepare_verb_activation, ExecutionResult};
use barn_common::model::ObjFlag;
use barn_compiler::offset_for_builtin;
use barn_var::ErrorCode::{E_INVARG, E_NACC, E_PERM, E_RECMOVE, E_TYPE};
use barn_var::{
    v_int, v_list, v_obj, v_waif, Error, Obj, Symbol, Var, Variant, Waif, NOTHING,
};
use tracing::warn;

fn arg_object(v: &Var) -> Result<Obj, BfErr> {
    match v.variant() {
        Variant::Obj(o) | Variant::Anon(o) => Ok(*o),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

fn valid_object(bf_args: &BfCallState<'_>, v: &Var) -> Result<Obj, BfErr> {
    let o = arg_object(v)?;
    if !bf_args.world.valid(&o) {
        return Err(BfErr::Code(E_INVARG));
    }
    Ok(o)
}

/// Run `target:verb(args)` to completion inside the current task, if the verb
/// exists. Returns None when there is no such verb.
fn run_hook(
    bf_args: &mut BfCallState<'_>,
    target: &Obj,
    verb: &str,
    args: &[Var],
) -> Result<Option<ExecutionResult>, Error> {
    let verb = Symbol::mk(verb);
    if bf_args.world.find_callable_verb(target, verb).is_none() {
        return Ok(None);
    }
    let caller = bf_args.exec.top().this.clone();
    let player = bf_args.exec.player();
    let activation = prepare_verb_activation(
        bf_args.world,
        &bf_args.params.parser,
        v_obj(*target),
        verb,
        v_list(args),
        player,
        caller,
        None,
    )?;
    let result = bf_args.vm.run_nested(
        bf_args.params,
        bf_args.exec,
        bf_args.world,
        bf_args.sessions,
        bf_args.sched,
        activation,
    );
    Ok(Some(result))
}

/// `create(parents [, owner or anonymous-flag])`
fn bf_create(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let parents = match bf_args.args.first().map(|v| v.variant()) {
        None => vec![],
        Some(Variant::Obj(o)) if o.is_nothing() => vec![],
        Some(Variant::Obj(o)) => vec![*o],
        Some(Variant::List(l)) => {
            let mut parents = vec![];
            for p in l.iter() {
                parents.push(arg_object(&p)?);
            }
            parents
        }
        Some(_) => return Err(BfErr::Code(E_TYPE)),
    };

    let who = bf_args.task_perms_who();
    let wizard = bf_args.task_perms_wizard();
    let mut owner = who;
    let mut anonymous = false;
    if let Some(second) = bf_args.args.get(1) {
        match second.variant() {
            Variant::Obj(o) => {
                if *o != who && !wizard {
                    return Err(BfErr::Code(E_PERM));
                }
                owner = *o;
            }
            Variant::Int(i) => anonymous = *i != 0,
            _ => return Err(BfErr::Code(E_TYPE)),
        }
    }

    let id = bf_args
        .world
        .create(parents, owner, anonymous, Some(who))
        .map_err(|e| BfErr::Raise(e.to_error()))?;

    let value = if anonymous {
        Var::mk_anonymous(id)
    } else {
        v_obj(id)
    };

    // The new object gets its `initialize` hook, synchronously.
    match run_hook(bf_args, &id, "initialize", &[]).map_err(BfErr::Raise)? {
        Some(ExecutionResult::Exception(e)) => {
            return Err(BfErr::Raise(e.error));
        }
        Some(ExecutionResult::Abort(reason)) => {
            return Ok(crate::builtins::BfRet::VmInstr(ExecutionResult::Abort(
                reason,
            )));
        }
        Some(_) | None => {}
    }
    Ok(Ret(value))
}
bf_declare!(create, bf_create);

fn bf_recycle(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    bf_args.needs_owner_or_wizard(&obj)?;

    // The recycle hook runs first; its failures are logged, never fatal.
    match run_hook(bf_args, &obj, "recycle", &[]) {
        Ok(Some(ExecutionResult::Exception(e))) => {
            warn!(object = %obj, error = %e.error, "error in recycle hook");
        }
        Err(e) => {
            warn!(object = %obj, error = %e, "failed to run recycle hook");
        }
        _ => {}
    }

    bf_args
        .world
        .recycle(&obj)
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(0)))
}
bf_declare!(recycle, bf_recycle);

fn bf_valid(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let valid = match bf_args.args[0].variant() {
        Variant::Obj(o) | Variant::Anon(o) => bf_args.world.valid(o),
        Variant::Waif(w) => !w.is_invalidated(),
        _ => false,
    };
    Ok(Ret(v_int(valid as i64)))
}
bf_declare!(valid, bf_valid);

fn bf_parent(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    let parent = bf_args
        .world
        .get(&obj)
        .and_then(|o| o.parents.first().copied())
        .unwrap_or(NOTHING);
    Ok(Ret(v_obj(parent)))
}
bf_declare!(parent, bf_parent);

fn bf_parents(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    let parents: Vec<Var> = bf_args
        .world
        .get(&obj)
        .map(|o| o.parents.iter().map(|p| v_obj(*p)).collect())
        .unwrap_or_default();
    Ok(Ret(v_list(&parents)))
}
bf_declare!(parents, bf_parents);

fn bf_children(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    let children: Vec<Var> = bf_args
        .world
        .get(&obj)
        .map(|o| o.children.iter().map(|c| v_obj(*c)).collect())
        .unwrap_or_default();
    Ok(Ret(v_list(&children)))
}
bf_declare!(children, bf_children);

fn chparent_common(bf_args: &mut BfCallState<'_>, new_parents: Vec<Obj>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    bf_args.needs_owner_or_wizard(&obj)?;
    let who = bf_args.task_perms_who();
    let wizard = bf_args.task_perms_wizard();
    for parent in &new_parents {
        let p = bf_args.world.get(parent).ok_or(BfErr::Code(E_INVARG))?;
        if !wizard && p.owner != who && !p.is_fertile() {
            return Err(BfErr::Code(E_PERM));
        }
    }
    bf_args
        .world
        .chparents(&obj, new_parents)
        .map_err(|e| match e.to_error_code() {
            barn_var::ErrorCode::E_RECMOVE => BfErr::Code(E_RECMOVE),
            _ => BfErr::Raise(e.to_error()),
        })?;
    Ok(Ret(v_int(0)))
}

fn bf_chparent(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let parent = match bf_args.args[1].variant() {
        Variant::Obj(o) if o.is_nothing() => vec![],
        Variant::Obj(o) => vec![*o],
        _ => return Err(BfErr::Code(E_TYPE)),
    };
    chparent_common(bf_args, parent)
}
bf_declare!(chparent, bf_chparent);

fn bf_chparents(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let Variant::List(parents) = bf_args.args[1].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let mut new_parents = vec![];
    for p in parents.iter() {
        new_parents.push(arg_object(&p)?);
    }
    chparent_common(bf_args, new_parents)
}
bf_declare!(chparents, bf_chparents);

fn bf_max_object(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_obj(bf_args.world.max_object())))
}
bf_declare!(max_object, bf_max_object);

/// `move(what, where)`: the `accept` hook on the destination is consulted; a
/// refusal stands unless the mover is a wizard or owns the destination.
fn bf_move(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let what = valid_object(bf_args, &bf_args.args[0].clone())?;
    let dest = arg_object(&bf_args.args[1])?;
    bf_args.needs_owner_or_wizard(&what)?;

    if !dest.is_nothing() {
        if !bf_args.world.valid(&dest) {
            return Err(BfErr::Code(E_INVARG));
        }
        let accepted = match run_hook(bf_args, &dest, "accept", &[v_obj(what)])
            .map_err(BfErr::Raise)?
        {
            Some(ExecutionResult::Complete(v)) => v.is_true(),
            Some(ExecutionResult::Exception(e)) => return Err(BfErr::Raise(e.error)),
            Some(ExecutionResult::Abort(reason)) => {
                return Ok(crate::builtins::BfRet::VmInstr(ExecutionResult::Abort(
                    reason,
                )));
            }
            Some(_) | None => false,
        };
        if !accepted {
            let wizard = bf_args.task_perms_wizard();
            let dest_owner = bf_args
                .world
                .get(&dest)
                .map(|o| o.owner)
                .unwrap_or(NOTHING);
            if !wizard && dest_owner != bf_args.task_perms_who() {
                return Err(BfErr::Code(E_NACC));
            }
        }
    }

    bf_args
        .world
        .move_object(&what, &dest)
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(0)))
}

// `move` is a keyword, so this one skips the declaration macro.
pub struct BfMove {}
impl BuiltinFunction for BfMove {
    fn name(&self) -> &str {
        "move"
    }

    fn call(&self, bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
        bf_move(bf_args)
    }
}

fn bf_players(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let players: Vec<Var> = bf_args.world.players().iter().map(|p| v_obj(*p)).collect();
    Ok(Ret(v_list(&players)))
}
bf_declare!(players, bf_players);

fn bf_is_player(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    let is_player = bf_args
        .world
        .get(&obj)
        .map(|o| o.is_player())
        .unwrap_or(false);
    Ok(Ret(v_int(is_player as i64)))
}
bf_declare!(is_player, bf_is_player);

fn bf_set_player_flag(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.needs_wizard()?;
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    let value = bf_args.args[1].is_true();
    let o = bf_args.world.get_mut(&obj).ok_or(BfErr::Code(E_INVARG))?;
    if value {
        o.flags.set(ObjFlag::User);
    } else {
        o.flags.clear(ObjFlag::User);
    }
    Ok(Ret(v_int(0)))
}
bf_declare!(set_player_flag, bf_set_player_flag);

fn bf_object_bytes(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = valid_object(bf_args, &bf_args.args[0].clone())?;
    let o = bf_args.world.get(&obj).ok_or(BfErr::Code(E_INVARG))?;
    let mut bytes = std::mem::size_of::<barn_db::Object>() + o.name.len();
    for (name, entry) in &o.properties {
        bytes += name.to_string().len() + 16;
        if let Some(v) = &entry.value {
            bytes += barn_var::to_literal(v).len();
        }
    }
    for verb in &o.verbs {
        bytes += verb.def.names.len() + verb.source.len() + 16;
    }
    Ok(Ret(v_int(bytes as i64)))
}
bf_declare!(object_bytes, bf_object_bytes);

/// Renumbering is not supported by this store; ids are stable for an object's
/// lifetime.
fn bf_renumber(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.needs_wizard()?;
    Err(BfErr::Code(E_INVARG))
}
bf_declare!(renumber, bf_renumber);

/// `new_waif(class [, owner])`
fn bf_new_waif(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let class = valid_object(bf_args, &bf_args.args[0].clone())?;
    let who = bf_args.task_perms_who();
    let wizard = bf_args.task_perms_wizard();
    let owner = match bf_args.args.get(1) {
        None => who,
        Some(v) => {
            let o = arg_object(v)?;
            if o != who && !wizard {
                return Err(BfErr::Code(E_PERM));
            }
            o
        }
    };
    let class_obj = bf_args.world.get(&class).ok_or(BfErr::Code(E_INVARG))?;
    if !wizard && class_obj.owner != who && !class_obj.is_fertile() {
        return Err(BfErr::Code(E_PERM));
    }
    let waif = Waif::mk(class, owner);
    bf_args.world.register_waif(&waif);
    Ok(Ret(v_waif(waif)))
}
bf_declare!(new_waif, bf_new_waif);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("create")] = Box::new(BfCreate {});
    builtins[offset_for_builtin("recycle")] = Box::new(BfRecycle {});
    builtins[offset_for_builtin("valid")] = Box::new(BfValid {});
    builtins[offset_for_builtin("parent")] = Box::new(BfParent {});
    builtins[offset_for_builtin("parents")] = Box::new(BfParents {});
    builtins[offset_for_builtin("children")] = Box::new(BfChildren {});
    builtins[offset_for_builtin("chparent")] = Box::new(BfChparent {});
    builtins[offset_for_builtin("chparents")] = Box::new(BfChparents {});
    builtins[offset_for_builtin("max_object")] = Box::new(BfMaxObject {});
    builtins[offset_for_builtin("move")] = Box::new(BfMove {});
    builtins[offset_for_builtin("players")] = Box::new(BfPlayers {});
    builtins[offset_for_builtin("is_player")] = Box::new(BfIsPlayer {});
    builtins[offset_for_builtin("set_player_flag")] = Box::new(BfSetPlayerFlag {});
    builtins[offset_for_builtin("object_bytes")] = Box::new(BfObjectBytes {});
    builtins[offset_for_builtin("renumber")] = Box::new(BfRenumber {});
    builtins[offset_for_builtin("new_waif")] = Box::new(BfNewWaif {});
}
