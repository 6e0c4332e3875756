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
use barn_common::model::{
    verb_perms_string, ArgSpec, PrepSpec, VerbArgsSpec, VerbDef, VerbFlag,
};
use barn_common::util::{verb_pattern_valid, BitEnum};
use barn_compiler::{compile, offset_for_builtin};
use barn_var::ErrorCode::{E_INVARG, E_PERM, E_TYPE, E_VERBNF};
use barn_var::{v_int, v_list, v_obj, v_str, v_string, Obj, Sequence, Symbol, Var, Variant};

fn arg_object(bf_args: &BfCallState<'_>, v: &Var) -> Result<Obj, BfErr> {
    match v.variant() {
        Variant::Obj(o) | Variant::Anon(o) if bf_args.world.valid(o) => Ok(*o),
        Variant::Obj(_) | Variant::Anon(_) => Err(BfErr::Code(E_INVARG)),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// Verbs are addressed by name or by 1-based index.
fn resolve_verb(bf_args: &BfCallState<'_>, obj: &Obj, desc: &Var) -> Result<usize, BfErr> {
    match desc.variant() {
        Variant::Str(s) => bf_args
            .world
            .own_verb_index(obj, Symbol::mk(s.as_str()))
            .ok_or(BfErr::Code(E_VERBNF)),
        Variant::Int(i) => {
            let count = bf_args
                .world
                .get(obj)
                .map(|o| o.verbs.len())
                .unwrap_or_default();
            if *i < 1 || *i as usize > count {
                return Err(BfErr::Code(E_VERBNF));
            }
            Ok((*i - 1) as usize)
        }
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

fn verb_readable(bf_args: &BfCallState<'_>, def: &VerbDef) -> bool {
    bf_args.task_perms_wizard()
        || def.owner == bf_args.task_perms_who()
        || def.flags.contains(VerbFlag::Read)
}

fn verb_writable(bf_args: &BfCallState<'_>, def: &VerbDef) -> bool {
    bf_args.task_perms_wizard()
        || def.owner == bf_args.task_perms_who()
        || def.flags.contains(VerbFlag::Write)
}

/// `{owner, perms, names}` triples used by verb_info and add_verb.
fn parse_verb_info(info: &Var) -> Result<(Obj, BitEnum<VerbFlag>, String), BfErr> {
    let Variant::List(info) = info.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() != 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let owner = match info.index(0).unwrap().variant() {
        Variant::Obj(o) => *o,
        _ => return Err(BfErr::Code(E_TYPE)),
    };
    let flags = info
        .index(1)
        .unwrap()
        .as_str()
        .and_then(VerbFlag::parse_str)
        .ok_or(BfErr::Code(E_INVARG))?;
    let names = info
        .index(2)
        .unwrap()
        .as_str()
        .map(str::to_string)
        .ok_or(BfErr::Code(E_TYPE))?;
    for pattern in names.split(' ') {
        if pattern.is_empty() || !verb_pattern_valid(pattern) {
            return Err(BfErr::Code(E_INVARG));
        }
    }
    Ok((owner, flags, names))
}

/// `{dobj, prep, iobj}` triples used by verb_args and add_verb.
fn parse_verb_args(args: &Var) -> Result<VerbArgsSpec, BfErr> {
    let Variant::List(args) = args.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if args.len() != 3 {
        return Err(BfErr::Code(E_INVARG));
    }
    let dobj = args
        .index(0)
        .unwrap()
        .as_str()
        .and_then(ArgSpec::from_string)
        .ok_or(BfErr::Code(E_INVARG))?;
    let prep = args
        .index(1)
        .unwrap()
        .as_str()
        .and_then(PrepSpec::parse)
        .ok_or(BfErr::Code(E_INVARG))?;
    let iobj = args
        .index(2)
        .unwrap()
        .as_str()
        .and_then(ArgSpec::from_string)
        .ok_or(BfErr::Code(E_INVARG))?;
    Ok(VerbArgsSpec { dobj, prep, iobj })
}

fn bf_verbs(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let o = bf_args.world.get(&obj).ok_or(BfErr::Code(E_INVARG))?;
    let names: Vec<Var> = o.verbs.iter().map(|v| v_str(&v.def.names)).collect();
    Ok(Ret(v_list(&names)))
}
bf_declare!(verbs, bf_verbs);

fn bf_verb_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let def = bf_args
        .world
        .verb(&obj, index)
        .map(|v| v.def.clone())
        .ok_or(BfErr::Code(E_VERBNF))?;
    if !verb_readable(bf_args, &def) {
        return Err(BfErr::Code(E_PERM));
    }
    Ok(Ret(v_list(&[
        v_obj(def.owner),
        v_str(&verb_perms_string(def.flags)),
        v_str(&def.names),
    ])))
}
bf_declare!(verb_info, bf_verb_info);

fn bf_set_verb_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let (owner, flags, names) = parse_verb_info(&bf_args.args[2])?;
    if !bf_args.task_perms_wizard() && owner != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    let def = bf_args
        .world
        .verb(&obj, index)
        .map(|v| v.def.clone())
        .ok_or(BfErr::Code(E_VERBNF))?;
    if !verb_writable(bf_args, &def) {
        return Err(BfErr::Code(E_PERM));
    }
    let verb = bf_args
        .world
        .verb_mut(&obj, index)
        .ok_or(BfErr::Code(E_VERBNF))?;
    verb.def.owner = owner;
    verb.def.flags = flags;
    verb.def.names = names;
    Ok(Ret(v_int(0)))
}
bf_declare!(set_verb_info, bf_set_verb_info);

fn bf_verb_args(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let def = bf_args
        .world
        .verb(&obj, index)
        .map(|v| v.def.clone())
        .ok_or(BfErr::Code(E_VERBNF))?;
    if !verb_readable(bf_args, &def) {
        return Err(BfErr::Code(E_PERM));
    }
    Ok(Ret(v_list(&[
        v_str(def.args.dobj.to_string()),
        v_string(def.args.prep.to_string()),
        v_str(def.args.iobj.to_string()),
    ])))
}
bf_declare!(verb_args, bf_verb_args);

fn bf_set_verb_args(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let spec = parse_verb_args(&bf_args.args[2])?;
    let def = bf_args
        .world
        .verb(&obj, index)
        .map(|v| v.def.clone())
        .ok_or(BfErr::Code(E_VERBNF))?;
    if !verb_writable(bf_args, &def) {
        return Err(BfErr::Code(E_PERM));
    }
    let verb = bf_args
        .world
        .verb_mut(&obj, index)
        .ok_or(BfErr::Code(E_VERBNF))?;
    verb.def.args = spec;
    Ok(Ret(v_int(0)))
}
bf_declare!(set_verb_args, bf_set_verb_args);

fn bf_add_verb(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let (owner, flags, names) = parse_verb_info(&bf_args.args[1])?;
    let spec = parse_verb_args(&bf_args.args[2])?;
    bf_args.needs_owner_or_wizard(&obj)?;
    if !bf_args.task_perms_wizard() && owner != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    let index = bf_args
        .world
        .add_verb(
            &obj,
            VerbDef {
                names,
                owner,
                flags,
                args: spec,
            },
            String::new(),
        )
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(index as i64 + 1)))
}
bf_declare!(add_verb, bf_add_verb);

fn bf_delete_verb(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    bf_args.needs_owner_or_wizard(&obj)?;
    bf_args
        .world
        .delete_verb(&obj, index)
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(0)))
}
bf_declare!(delete_verb, bf_delete_verb);

fn bf_verb_code(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let verb = bf_args.world.verb(&obj, index).ok_or(BfErr::Code(E_VERBNF))?;
    if !verb_readable(bf_args, &verb.def.clone()) {
        return Err(BfErr::Code(E_PERM));
    }
    let verb = bf_args.world.verb(&obj, index).ok_or(BfErr::Code(E_VERBNF))?;
    let lines: Vec<Var> = verb.source.lines().map(v_str).collect();
    Ok(Ret(v_list(&lines)))
}
bf_declare!(verb_code, bf_verb_code);

/// Install new source. The code is compiled eagerly; compilation failures come
/// back as a list of message strings, leaving the verb unchanged.
fn bf_set_verb_code(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let Variant::List(lines) = bf_args.args[2].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let mut source = String::new();
    for line in lines.iter() {
        let Variant::Str(s) = line.variant() else {
            return Err(BfErr::Code(E_TYPE));
        };
        source.push_str(s.as_str());
        source.push('\n');
    }
    let def = bf_args
        .world
        .verb(&obj, index)
        .map(|v| v.def.clone())
        .ok_or(BfErr::Code(E_VERBNF))?;
    if !verb_writable(bf_args, &def) {
        return Err(BfErr::Code(E_PERM));
    }

    let compiled = bf_args
        .params
        .parser
        .parse_program(&source)
        .and_then(compile);
    let program = match compiled {
        Ok(program) => program,
        Err(e) => {
            return Ok(Ret(v_list(&[v_string(e.to_string())])));
        }
    };
    let verb = bf_args
        .world
        .verb_mut(&obj, index)
        .ok_or(BfErr::Code(E_VERBNF))?;
    verb.source = source;
    verb.program = Some(program);
    Ok(Ret(v_list(&[])))
}
bf_declare!(set_verb_code, bf_set_verb_code);

fn bf_disassemble(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let index = resolve_verb(bf_args, &obj, &bf_args.args[1].clone())?;
    let program = crate::vm::program_for_verb(
        bf_args.world,
        &bf_args.params.parser,
        &obj,
        index,
    )
    .map_err(BfErr::Raise)?;
    let lines: Vec<Var> = program
        .main_vector
        .iter()
        .enumerate()
        .map(|(i, op)| v_string(format!("{i:4}: {op:?}")))
        .collect();
    Ok(Ret(v_list(&lines)))
}
bf_declare!(disassemble, bf_disassemble);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("verbs")] = Box::new(BfVerbs {});
    builtins[offset_for_builtin("verb_info")] = Box::new(BfVerbInfo {});
    builtins[offset_for_builtin("set_verb_info")] = Box::new(BfSetVerbInfo {});
    builtins[offset_for_builtin("verb_args")] = Box::new(BfVerbArgs {});
    builtins[offset_for_builtin("set_verb_args")] = Box::new(BfSetVerbArgs {});
    builtins[offset_for_builtin("add_verb")] = Box::new(BfAddVerb {});
    builtins[offset_for_builtin("delete_verb")] = Box::new(BfDeleteVerb {});
    builtins[offset_for_builtin("verb_code")] = Box::new(BfVerbCode {});
    builtins[offset_for_builtin("set_verb_code")] = Box::new(BfSetVerbCode {});
    builtins[offset_for_builtin("disassemble")] = Box::new(BfDisassemble {});
}
