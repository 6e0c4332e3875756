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
use barn_common::model::{prop_flags_string, PropFlag, PropPerms};
use barn_common::util::BitEnum;
use barn_compiler::offset_for_builtin;
use barn_var::ErrorCode::{E_INVARG, E_PERM, E_PROPNF, E_TYPE};
use barn_var::{v_int, v_list, v_obj, v_str, Obj, Sequence, Symbol, Var, Variant};

fn arg_object(bf_args: &BfCallState<'_>, v: &Var) -> Result<Obj, BfErr> {
    match v.variant() {
        Variant::Obj(o) | Variant::Anon(o) if bf_args.world.valid(o) => Ok(*o),
        Variant::Obj(_) | Variant::Anon(_) => Err(BfErr::Code(E_INVARG)),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

fn arg_propname(v: &Var) -> Result<Symbol, BfErr> {
    v.as_str()
        .map(Symbol::mk)
        .ok_or(BfErr::Code(E_TYPE))
}

/// Can these perms see this property entry at all?
fn prop_readable(bf_args: &BfCallState<'_>, perms: &PropPerms) -> bool {
    bf_args.task_perms_wizard()
        || perms.owner == bf_args.task_perms_who()
        || perms.flags.contains(PropFlag::Read)
}

fn prop_owned(bf_args: &BfCallState<'_>, perms: &PropPerms) -> bool {
    bf_args.task_perms_wizard() || perms.owner == bf_args.task_perms_who()
}

/// `{owner, "rwc"}` pairs used by property_info and friends.
fn parse_prop_info(info: &Var) -> Result<(Obj, BitEnum<PropFlag>), BfErr> {
    let Variant::List(info) = info.variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if info.len() != 2 {
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
        .and_then(PropFlag::parse_str)
        .ok_or(BfErr::Code(E_INVARG))?;
    Ok((owner, flags))
}

/// Names of the properties defined on the object itself.
fn bf_properties(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let o = bf_args.world.get(&obj).ok_or(BfErr::Code(E_INVARG))?;
    let names: Vec<Var> = o
        .properties
        .iter()
        .filter(|(_, e)| e.definer == obj)
        .map(|(name, _)| v_str(&name.to_string()))
        .collect();
    Ok(Ret(v_list(&names)))
}
bf_declare!(properties, bf_properties);

fn bf_property_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let name = arg_propname(&bf_args.args[1])?;
    let entry = bf_args
        .world
        .property_entry(&obj, name)
        .ok_or(BfErr::Code(E_PROPNF))?;
    let perms = entry.perms;
    if !prop_readable(bf_args, &perms) {
        return Err(BfErr::Code(E_PERM));
    }
    Ok(Ret(v_list(&[
        v_obj(perms.owner),
        v_str(&prop_flags_string(perms.flags)),
    ])))
}
bf_declare!(property_info, bf_property_info);

fn bf_set_property_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let name = arg_propname(&bf_args.args[1])?;
    let (new_owner, new_flags) = parse_prop_info(&bf_args.args[2])?;
    if !bf_args.task_perms_wizard() && new_owner != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    let entry = bf_args
        .world
        .property_entry(&obj, name)
        .ok_or(BfErr::Code(E_PROPNF))?;
    let perms = entry.perms;
    if !prop_owned(bf_args, &perms) {
        return Err(BfErr::Code(E_PERM));
    }
    let entry = bf_args
        .world
        .property_entry_mut(&obj, name)
        .ok_or(BfErr::Code(E_PROPNF))?;
    entry.perms = PropPerms {
        owner: new_owner,
        flags: new_flags,
    };
    Ok(Ret(v_int(0)))
}
bf_declare!(set_property_info, bf_set_property_info);

fn bf_add_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let name = arg_propname(&bf_args.args[1])?;
    let value = bf_args.args[2].clone();
    let (owner, flags) = parse_prop_info(&bf_args.args[3])?;
    bf_args.needs_owner_or_wizard(&obj)?;
    if !bf_args.task_perms_wizard() && owner != bf_args.task_perms_who() {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .define_property(&obj, name, owner, flags, Some(value))
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(0)))
}
bf_declare!(add_property, bf_add_property);

fn bf_delete_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let name = arg_propname(&bf_args.args[1])?;
    bf_args.needs_owner_or_wizard(&obj)?;
    bf_args
        .world
        .delete_property(&obj, name)
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(0)))
}
bf_declare!(delete_property, bf_delete_property);

fn bf_clear_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let name = arg_propname(&bf_args.args[1])?;
    let entry = bf_args
        .world
        .property_entry(&obj, name)
        .ok_or(BfErr::Code(E_PROPNF))?;
    let perms = entry.perms;
    if !prop_owned(bf_args, &perms) {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args
        .world
        .clear_property(&obj, name)
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(0)))
}
bf_declare!(clear_property, bf_clear_property);

fn bf_is_clear_property(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let obj = arg_object(bf_args, &bf_args.args[0].clone())?;
    let name = arg_propname(&bf_args.args[1])?;
    let entry = bf_args
        .world
        .property_entry(&obj, name)
        .ok_or(BfErr::Code(E_PROPNF))?;
    let perms = entry.perms;
    if !prop_readable(bf_args, &perms) {
        return Err(BfErr::Code(E_PERM));
    }
    let clear = bf_args
        .world
        .is_clear_property(&obj, name)
        .map_err(|e| BfErr::Raise(e.to_error()))?;
    Ok(Ret(v_int(clear as i64)))
}
bf_declare!(is_clear_property, bf_is_clear_property);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("properties")] = Box::new(BfProperties {});
    builtins[offset_for_builtin("property_info")] = Box::new(BfPropertyInfo {});
    builtins[offset_for_builtin("set_property_info")] = Box::new(BfSetPropertyInfo {});
    builtins[offset_for_builtin("add_property")] = Box::new(BfAddProperty {});
    builtins[offset_for_builtin("delete_property")] = Box::new(BfDeleteProperty {});
    builtins[offset_for_builtin("clear_property")] = Box::new(BfClearProperty {});
    builtins[offset_for_builtin("is_clear_property")] = Box::new(BfIsClearProperty {});
}
