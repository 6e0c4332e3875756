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
use barn_compiler::offset_for_builtin;
use barn_var::ErrorCode::{E_RANGE, E_TYPE};
use barn_var::{v_int, List, Sequence, Var, Variant};

fn as_list<'a>(v: &'a Var) -> Result<&'a List, BfErr> {
    match v.variant() {
        Variant::List(l) => Ok(l),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// `is_member(value, list)`: like `in`, but case-sensitive for strings.
fn bf_is_member(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[1])?;
    let pos = l
        .index_in(&bf_args.args[0], true)
        .map_err(BfErr::Raise)?;
    Ok(Ret(v_int(pos.map(|i| i as i64 + 1).unwrap_or(0))))
}
bf_declare!(is_member, bf_is_member);

/// `listinsert(list, value [, index])`: insert before `index`; defaults to the
/// front.
fn bf_listinsert(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[0])?;
    let value = &bf_args.args[1];
    let index = match bf_args.args.get(2) {
        None => 0,
        Some(v) => match v.variant() {
            Variant::Int(i) if *i >= 1 => (*i - 1) as usize,
            Variant::Int(_) => 0,
            _ => return Err(BfErr::Code(E_TYPE)),
        },
    };
    let index = index.min(l.len());
    l.insert(index, value).map(Ret).map_err(BfErr::Raise)
}
bf_declare!(listinsert, bf_listinsert);

/// `listappend(list, value [, index])`: insert after `index`; defaults to the
/// end.
fn bf_listappend(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[0])?;
    let value = &bf_args.args[1];
    let index = match bf_args.args.get(2) {
        None => l.len(),
        Some(v) => match v.variant() {
            Variant::Int(i) if *i >= 0 => *i as usize,
            Variant::Int(_) => 0,
            _ => return Err(BfErr::Code(E_TYPE)),
        },
    };
    let index = index.min(l.len());
    l.insert(index, value).map(Ret).map_err(BfErr::Raise)
}
bf_declare!(listappend, bf_listappend);

fn bf_listdelete(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[0])?;
    let Variant::Int(index) = bf_args.args[1].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if *index < 1 || *index as usize > l.len() {
        return Err(BfErr::Code(E_RANGE));
    }
    l.remove_at((*index - 1) as usize)
        .map(Ret)
        .map_err(BfErr::Raise)
}
bf_declare!(listdelete, bf_listdelete);

fn bf_listset(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[0])?;
    let value = &bf_args.args[1];
    let Variant::Int(index) = bf_args.args[2].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if *index < 1 || *index as usize > l.len() {
        return Err(BfErr::Code(E_RANGE));
    }
    l.index_set((*index - 1) as usize, value)
        .map(Ret)
        .map_err(BfErr::Raise)
}
bf_declare!(listset, bf_listset);

fn bf_setadd(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[0])?;
    Ok(Ret(l.set_add(&bf_args.args[1])))
}
bf_declare!(setadd, bf_setadd);

fn bf_setremove(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let l = as_list(&bf_args.args[0])?;
    Ok(Ret(l.set_remove(&bf_args.args[1])))
}
bf_declare!(setremove, bf_setremove);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("is_member")] = Box::new(BfIsMember {});
    builtins[offset_for_builtin("listinsert")] = Box::new(BfListinsert {});
    builtins[offset_for_builtin("listappend")] = Box::new(BfListappend {});
    builtins[offset_for_builtin("listdelete")] = Box::new(BfListdelete {});
    builtins[offset_for_builtin("listset")] = Box::new(BfListset {});
    builtins[offset_for_builtin("setadd")] = Box::new(BfSetadd {});
    builtins[offset_for_builtin("setremove")] = Box::new(BfSetremove {});
}
