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

use crate::var::Var;
use crate::variant::Variant;

/// Render a value the way it would be written in source: strings quoted and
/// escaped, lists braced, maps bracketed with keys in canonical order.
pub fn to_literal(v: &Var) -> String {
    let mut out = String::new();
    write_literal(&mut out, v);
    out
}

fn write_literal(out: &mut String, v: &Var) {
    match v.variant() {
        Variant::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Variant::Int(i) => out.push_str(&i.to_string()),
        Variant::Float(f) => {
            // {:?} keeps a trailing ".0" so floats read back as floats.
            out.push_str(&format!("{f:?}"));
        }
        Variant::Obj(o) => out.push_str(&o.to_string()),
        Variant::Err(e) => out.push_str(e.name()),
        Variant::Str(s) => {
            out.push('"');
            for c in s.as_str().chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    c => out.push(c),
                }
            }
            out.push('"');
        }
        Variant::List(l) => {
            out.push('{');
            for (i, e) in l.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, &e);
            }
            out.push('}');
        }
        Variant::Map(m) => {
            out.push('[');
            for (i, (k, val)) in m.canonical_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_literal(out, &k);
                out.push_str(" -> ");
                write_literal(out, &val);
            }
            out.push(']');
        }
        Variant::Waif(w) => {
            match w.class() {
                Ok(class) => out.push_str(&format!("<waif of {class}>")),
                Err(_) => out.push_str("<invalidated waif>"),
            };
        }
        Variant::Anon(_) => out.push_str("*anonymous*"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{v_err, v_float, v_int, v_list, v_map, v_objid, v_str, E_PERM};

    #[test]
    fn scalars() {
        assert_eq!(to_literal(&v_int(42)), "42");
        assert_eq!(to_literal(&v_float(1.0)), "1.0");
        assert_eq!(to_literal(&v_objid(-1)), "#-1");
        assert_eq!(to_literal(&v_err(E_PERM)), "E_PERM");
        assert_eq!(to_literal(&v_str("say \"hi\"")), r#""say \"hi\"""#);
    }

    #[test]
    fn containers() {
        let l = v_list(&[v_int(1), v_str("two")]);
        assert_eq!(to_literal(&l), "{1, \"two\"}");
    }

    #[test]
    fn map_keys_print_in_canonical_order() {
        // Insertion order is STR first, but INT keys rank before STR keys.
        let m = v_map(&[(v_str("z"), v_int(1)), (v_int(5), v_int(2))]);
        assert_eq!(to_literal(&m), "[5 -> 2, \"z\" -> 1]");
    }
}
