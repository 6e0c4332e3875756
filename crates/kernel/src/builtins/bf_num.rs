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
use barn_var::ErrorCode::{E_FLOAT, E_INVARG, E_TYPE};
use barn_var::{v_float, v_int, v_string, Var, Variant};

fn numeric(v: &Var) -> Result<f64, BfErr> {
    match v.variant() {
        Variant::Int(i) => Ok(*i as f64),
        Variant::Float(f) => Ok(*f),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}

fn checked_float(f: f64) -> Result<BfRet, BfErr> {
    if !f.is_finite() {
        return Err(BfErr::Code(E_FLOAT));
    }
    Ok(Ret(v_float(f)))
}

fn bf_abs(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    match bf_args.args[0].variant() {
        Variant::Int(i) => Ok(Ret(v_int(i.checked_abs().ok_or(BfErr::Code(E_INVARG))?))),
        Variant::Float(f) => Ok(Ret(v_float(f.abs()))),
        _ => Err(BfErr::Code(E_TYPE)),
    }
}
bf_declare!(abs, bf_abs);

fn extremum(bf_args: &mut BfCallState<'_>, want_greater: bool) -> Result<BfRet, BfErr> {
    let mut best = bf_args.args[0].clone();
    for candidate in &bf_args.args[1..] {
        let ord = candidate
            .compare(&best)
            .map_err(BfErr::Raise)?;
        let better = if want_greater {
            ord == std::cmp::Ordering::Greater
        } else {
            ord == std::cmp::Ordering::Less
        };
        if better {
            best = candidate.clone();
        }
    }
    Ok(Ret(best))
}

fn bf_min(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    extremum(bf_args, false)
}
bf_declare!(min, bf_min);

fn bf_max(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    extremum(bf_args, true)
}
bf_declare!(max, bf_max);

/// `floatstr(x, precision [, scientific])`
fn bf_floatstr(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let x = numeric(&bf_args.args[0])?;
    let Variant::Int(precision) = bf_args.args[1].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    if *precision < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    let precision = (*precision as usize).min(19);
    let scientific = bf_args
        .args
        .get(2)
        .map(|v| v.is_true())
        .unwrap_or(false);
    let s = if scientific {
        format!("{x:.precision$e}")
    } else {
        format!("{x:.precision$}")
    };
    Ok(Ret(v_string(s)))
}
bf_declare!(floatstr, bf_floatstr);

macro_rules! bf_float_fn {
    ( $name:ident ) => {
        paste::paste! {
            fn [<bf_ $name>](bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
                let x = numeric(&bf_args.args[0])?;
                checked_float(x.$name())
            }
            bf_declare!($name, [<bf_ $name>]);
        }
    };
}

bf_float_fn!(sqrt);
bf_float_fn!(sin);
bf_float_fn!(cos);
bf_float_fn!(tan);
bf_float_fn!(asin);
bf_float_fn!(acos);
bf_float_fn!(sinh);
bf_float_fn!(cosh);
bf_float_fn!(tanh);
bf_float_fn!(exp);
bf_float_fn!(ln);
bf_float_fn!(log10);

fn bf_atan(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let y = numeric(&bf_args.args[0])?;
    let result = match bf_args.args.get(1) {
        None => y.atan(),
        Some(x) => y.atan2(numeric(x)?),
    };
    checked_float(result)
}
bf_declare!(atan, bf_atan);

fn bf_ceil(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked_float(numeric(&bf_args.args[0])?.ceil())
}
bf_declare!(ceil, bf_ceil);

fn bf_floor(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked_float(numeric(&bf_args.args[0])?.floor())
}
bf_declare!(floor, bf_floor);

fn bf_trunc(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    checked_float(numeric(&bf_args.args[0])?.trunc())
}
bf_declare!(trunc, bf_trunc);

macro_rules! bf_bitwise_fn {
    ( $name:ident, $op:ident ) => {
        paste::paste! {
            fn [<bf_ $name>](bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
                bf_args.args[0].$op(&bf_args.args[1]).map(Ret).map_err(BfErr::Raise)
            }
            bf_declare!($name, [<bf_ $name>]);
        }
    };
}

bf_bitwise_fn!(bitand, bitand);
bf_bitwise_fn!(bitor, bitor);
bf_bitwise_fn!(bitxor, bitxor);
bf_bitwise_fn!(bitshl, shl);
bf_bitwise_fn!(bitshr, shr);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("abs")] = Box::new(BfAbs {});
    builtins[offset_for_builtin("min")] = Box::new(BfMin {});
    builtins[offset_for_builtin("max")] = Box::new(BfMax {});
    builtins[offset_for_builtin("floatstr")] = Box::new(BfFloatstr {});
    builtins[offset_for_builtin("sqrt")] = Box::new(BfSqrt {});
    builtins[offset_for_builtin("sin")] = Box::new(BfSin {});
    builtins[offset_for_builtin("cos")] = Box::new(BfCos {});
    builtins[offset_for_builtin("tan")] = Box::new(BfTan {});
    builtins[offset_for_builtin("asin")] = Box::new(BfAsin {});
    builtins[offset_for_builtin("acos")] = Box::new(BfAcos {});
    builtins[offset_for_builtin("atan")] = Box::new(BfAtan {});
    builtins[offset_for_builtin("sinh")] = Box::new(BfSinh {});
    builtins[offset_for_builtin("cosh")] = Box::new(BfCosh {});
    builtins[offset_for_builtin("tanh")] = Box::new(BfTanh {});
    builtins[offset_for_builtin("exp")] = Box::new(BfExp {});
    builtins[offset_for_builtin("log")] = Box::new(BfLn {});
    builtins[offset_for_builtin("log10")] = Box::new(BfLog10 {});
    builtins[offset_for_builtin("ceil")] = Box::new(BfCeil {});
    builtins[offset_for_builtin("floor")] = Box::new(BfFloor {});
    builtins[offset_for_builtin("trunc")] = Box::new(BfTrunc {});
    builtins[offset_for_builtin("bitand")] = Box::new(BfBitand {});
    builtins[offset_for_builtin("bitor")] = Box::new(BfBitor {});
    builtins[offset_for_builtin("bitxor")] = Box::new(BfBitxor {});
    builtins[offset_for_builtin("bitshl")] = Box::new(BfBitshl {});
    builtins[offset_for_builtin("bitshr")] = Box::new(BfBitshr {});
}
