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
use barn_var::{v_int, v_list, v_str, v_string};
use md5::{Digest, Md5};

fn bf_length(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    bf_args.args[0]
        .len()
        .map(|l| Ret(v_int(l as i64)))
        .map_err(BfErr::Raise)
}
bf_declare!(length, bf_length);

/// `strsub(subject, what, with [, case-matters])`
fn bf_strsub(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let (subject, what, with) = (
        bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?,
        bf_args.args[1].as_str().ok_or(BfErr::Code(E_TYPE))?,
        bf_args.args[2].as_str().ok_or(BfErr::Code(E_TYPE))?,
    );
    let case_matters = bf_args.args.get(3).map(|v| v.is_true()).unwrap_or(false);
    if what.is_empty() {
        return Ok(Ret(v_str(subject)));
    }
    let result = if case_matters {
        subject.replace(what, with)
    } else {
        // Caseless replace: scan the folded subject, splice from the original.
        let mut result = String::new();
        let folded_subject = subject.to_lowercase();
        let folded_what = what.to_lowercase();
        let mut last = 0;
        let mut from = 0;
        while let Some(at) = folded_subject[from..].find(&folded_what) {
            let at = from + at;
            result.push_str(&subject[last..at]);
            result.push_str(with);
            last = at + what.len();
            from = last;
        }
        result.push_str(&subject[last..]);
        result
    };
    Ok(Ret(v_string(result)))
}
bf_declare!(strsub, bf_strsub);

fn str_index(bf_args: &BfCallState<'_>, reverse: bool) -> Result<BfRet, BfErr> {
    let subject = bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let what = bf_args.args[1].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let case_matters = bf_args.args.get(2).map(|v| v.is_true()).unwrap_or(false);
    let (subject, what) = if case_matters {
        (subject.to_string(), what.to_string())
    } else {
        (subject.to_lowercase(), what.to_lowercase())
    };
    let found = if reverse {
        subject.rfind(&what)
    } else {
        subject.find(&what)
    };
    Ok(Ret(v_int(found.map(|i| i as i64 + 1).unwrap_or(0))))
}

fn bf_index(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    str_index(bf_args, false)
}
bf_declare!(index, bf_index);

fn bf_rindex(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    str_index(bf_args, true)
}
bf_declare!(rindex, bf_rindex);

/// Byte-wise (case-sensitive) three-way comparison, -1/0/1.
fn bf_strcmp(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let (a, b) = (
        bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?,
        bf_args.args[1].as_str().ok_or(BfErr::Code(E_TYPE))?,
    );
    Ok(Ret(v_int(match a.cmp(b) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    })))
}
bf_declare!(strcmp, bf_strcmp);

/// `explode(subject [, separator])`: split on the separator's first character,
/// dropping empty pieces.
fn bf_explode(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let subject = bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let separator = match bf_args.args.get(1) {
        None => " ".to_string(),
        Some(v) => {
            let s = v.as_str().ok_or(BfErr::Code(E_TYPE))?;
            if s.is_empty() {
                return Err(BfErr::Code(barn_var::ErrorCode::E_INVARG));
            }
            s.to_string()
        }
    };
    let sep = &separator[0..1];
    let pieces: Vec<_> = subject
        .split(sep)
        .filter(|p| !p.is_empty())
        .map(v_str)
        .collect();
    Ok(Ret(v_list(&pieces)))
}
bf_declare!(explode, bf_explode);

fn bf_string_hash(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let s = bf_args.args[0].as_str().ok_or(BfErr::Code(E_TYPE))?;
    let mut hasher = Md5::new();
    hasher.update(s.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02X}")).collect();
    Ok(Ret(v_string(hex)))
}
bf_declare!(string_hash, bf_string_hash);

pub(crate) fn register(builtins: &mut [Box<dyn BuiltinFunction>]) {
    builtins[offset_for_builtin("length")] = Box::new(BfLength {});
    builtins[offset_for_builtin("strsub")] = Box::new(BfStrsub {});
    builtins[offset_for_builtin("index")] = Box::new(BfIndex {});
    builtins[offset_for_builtin("rindex")] = Box::new(BfRindex {});
    builtins[offset_for_builtin("strcmp")] = Box::new(BfStrcmp {});
    builtins[offset_for_builtin("explode")] = Box::new(BfExplode {});
    builtins[offset_for_builtin("string_hash")] = Box::new(BfStringHash {});
}
