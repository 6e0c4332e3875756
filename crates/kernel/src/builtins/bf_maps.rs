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
use barn_var::ErrorCode::E_TYPE;
use barn_var::{v_int, v_list_iter, Associative, Map, Var, Variant};

fn as_map<'a>(v: &'a Var) -> Result<&'a Map, BfErr> {
    match v.variant() {
        Variant::Map(m) => Ok(m),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

/// Keys in insertion order.
fn bf_mapkeys(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let m = as_map(&bf_args.args[0])?;
    Ok(Ret(v_list_iter(m.keys())))
}
bf_declare!(mapkeys, bf_mapkeys);

fn bf_mapvalues(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let m = as_map(&bf_args.args[0])?;
    Ok(Ret(v_list_iter(m.values())))
}
bf_declare!(mapvalues, bf_mapvalues);

/// Removing an absent key is a no-op: the map comes back unchanged.
fn bf_mapdelete(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let m = as_map(&bf_args.args[0])?;
    Ok(Ret(m.remove(&bf_args.args[1])))
}
bf_declare!(mapdelete, bf_mapdelete);

fn bf_maphaskey(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let m = as_map(&bf_args.args[0])?;
    Ok(Ret(v_int(m.contains_key(&bf_args.args[1]) as i64)))
}
bf_declare!(maphaskey, bf_maphaskey);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("mapkeys")] = Box::new(BfMapkeys {});
    builtins[offset_for_builtin("mapvalues")] = Box::new(BfMapvalues {});
    builtins[offset_for_builtin("mapdelete")] = Box::new(BfMapdelete {});
    builtins[offset_for_builtin("maphaskey")] = Box::new(BfMaphaskey {});
}
