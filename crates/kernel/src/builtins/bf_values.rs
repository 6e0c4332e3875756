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
use barn_var::ErrorCode::{E_INVARG, E_RANGE};
use barn_var::{
    to_literal, v_float, v_int, v_obj, v_str, v_string, Obj, Var, Variant,
};
use md5::{Digest, Md5};

fn bf_typeof(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let arg = &bf_args.args[0];
    Ok(Ret(v_int(arg.type_code() as i64)))
}
bf_declare!(typeof, bf_typeof);

pub(crate) fn stringify(arg: &Var) -> String {
    match arg.variant() {
        Variant::Int(i) => i.to_string(),
        Variant::Float(f) => format!("{f:?}"),
        Variant::Str(s) => s.as_str().to_string(),
        Variant::Obj(o) => o.to_string(),
        Variant::Err(e) => e.message(),
        Variant::Bool(b) => b.to_string(),
        Variant::List(_) => "{list}".to_string(),
        Variant::Map(_) => "[map]".to_string(),
        Variant::Waif(_) => "<waif>".to_string(),
        Variant::Anon(_) => "*anonymous*".to_string(),
    }
}

fn bf_tostr(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let mut result = String::new();
    for arg in &bf_args.args {
        result.push_str(&stringify(arg));
    }
    Ok(Ret(v_string(result)))
}
bf_declare!(tostr, bf_tostr);

fn bf_toliteral(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_string(to_literal(&bf_args.args[0]))))
}
bf_declare!(toliteral, bf_toliteral);

fn bf_toint(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    match bf_args.args[0].variant() {
        Variant::Int(i) => Ok(Ret(v_int(*i))),
        Variant::Float(f) => Ok(Ret(v_int(*f as i64))),
        Variant::Obj(o) => Ok(Ret(v_int(o.id()))),
        Variant::Err(e) => Ok(Ret(v_int(e.code as i64))),
        Variant::Bool(b) => Ok(Ret(v_int(*b as i64))),
        Variant::Str(s) => {
            let parsed = s
                .as_str()
                .trim()
                .parse::<i64>()
                .or_else(|_| s.as_str().trim().parse::<f64>().map(|f| f as i64));
            Ok(Ret(v_int(parsed.unwrap_or(0))))
        }
        _ => Err(BfErr::Code(E_INVARG)),
    }
}
bf_declare!(toint, bf_toint);
bf_declare!(tonum, bf_toint);

fn bf_toobj(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    match bf_args.args[0].variant() {
        Variant::Int(i) => Ok(Ret(v_obj(Obj(*i)))),
        Variant::Float(f) => Ok(Ret(v_obj(Obj(*f as i64)))),
        Variant::Obj(o) => Ok(Ret(v_obj(*o))),
        Variant::Str(s) => {
            let s = s.as_str().trim();
            let s = s.strip_prefix('#').unwrap_or(s);
            Ok(Ret(v_obj(Obj(s.parse::<i64>().unwrap_or(0)))))
        }
        _ => Err(BfErr::Code(E_INVARG)),
    }
}
bf_declare!(toobj, bf_toobj);

fn bf_tofloat(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    match bf_args.args[0].variant() {
        Variant::Int(i) => Ok(Ret(v_float(*i as f64))),
        Variant::Float(f) => Ok(Ret(v_float(*f))),
        Variant::Err(e) => Ok(Ret(v_float(e.code as u8 as f64))),
        Variant::Str(s) => Ok(Ret(v_float(s.as_str().trim().parse::<f64>().unwrap_or(0.0)))),
        _ => Err(BfErr::Code(E_INVARG)),
    }
}
bf_declare!(tofloat, bf_tofloat);

/// `equal(a, b)`: deep equality, strings compared case-sensitively.
fn bf_equal(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let eq = bf_args.args[0].eq_case_sensitive(&bf_args.args[1]);
    Ok(Ret(v_int(eq as i64)))
}
bf_declare!(equal, bf_equal);

fn bf_value_bytes(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    // An approximation: the literal rendering plus the tag word.
    let size = to_literal(&bf_args.args[0]).len() + 8;
    Ok(Ret(v_int(size as i64)))
}
bf_declare!(value_bytes, bf_value_bytes);

fn bf_value_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let literal = to_literal(&bf_args.args[0]);
    let mut hasher = Md5::new();
    hasher.update(literal.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02X}")).collect();
    Ok(Ret(v_str(&hex)))
}
bf_declare!(value_hash, bf_value_hash);

fn bf_random(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let max = match bf_args.args.first().map(|v| v.variant()) {
        None => i64::MAX,
        Some(Variant::Int(i)) if *i > 0 => *i,
        Some(_) => return Err(BfErr::Code(E_RANGE)),
    };
    // A small xorshift seeded from the clock; no crypto strength required of
    // MOO's random().
    let seed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x9E3779B97F4A7C15);
    let mut x = seed | 1;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    Ok(Ret(v_int((x % (max as u64)) as i64 + 1)))
}
bf_declare!(random, bf_random);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("typeof")] = Box::new(BfTypeof {});
    builtins[offset_for_builtin("tostr")] = Box::new(BfTostr {});
    builtins[offset_for_builtin("toliteral")] = Box::new(BfToliteral {});
    builtins[offset_for_builtin("toint")] = Box::new(BfToint {});
    builtins[offset_for_builtin("tonum")] = Box::new(BfTonum {});
    builtins[offset_for_builtin("toobj")] = Box::new(BfToobj {});
    builtins[offset_for_builtin("tofloat")] = Box::new(BfTofloat {});
    builtins[offset_for_builtin("equal")] = Box::new(BfEqual {});
    builtins[offset_for_builtin("value_bytes")] = Box::new(BfValueBytes {});
    builtins[offset_for_builtin("value_hash")] = Box::new(BfValueHash {});
    builtins[offset_for_builtin("random")] = Box::new(BfRandom {});
}
