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

use crate::list::List;
use crate::map::Map;
use crate::string::Str;
use crate::variant::Variant;
use crate::waif::Waif;
use crate::ErrorCode::{E_RANGE, E_TYPE};
use crate::{Associative, Error, ErrorCode, Obj, Sequence, VarType};
use bincode::{Decode, Encode};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

/// A value in the language. Clones are cheap; the container variants share
/// structure and are updated copy-on-write.
#[derive(Clone, Encode, Decode)]
pub struct Var(Variant);

impl Var {
    pub fn from_variant(variant: Variant) -> Self {
        Var(variant)
    }

    pub fn variant(&self) -> &Variant {
        &self.0
    }

    pub fn mk_integer(i: i64) -> Self {
        Var(Variant::Int(i))
    }

    pub fn mk_float(f: f64) -> Self {
        Var(Variant::Float(f))
    }

    pub fn mk_str(s: &str) -> Self {
        Var(Variant::Str(Str::mk_str(s)))
    }

    pub fn mk_string(s: String) -> Self {
        Var(Variant::Str(Str::mk_string(s)))
    }

    pub fn mk_object(o: Obj) -> Self {
        Var(Variant::Obj(o))
    }

    pub fn mk_bool(b: bool) -> Self {
        Var(Variant::Bool(b))
    }

    pub fn mk_error(e: Error) -> Self {
        Var(Variant::Err(Box::new(e)))
    }

    pub fn from_list(l: List) -> Self {
        Var(Variant::List(l))
    }

    pub fn from_map(m: Map) -> Self {
        Var(Variant::Map(m))
    }

    pub fn from_waif(w: Waif) -> Self {
        Var(Variant::Waif(w))
    }

    pub fn mk_anonymous(o: Obj) -> Self {
        Var(Variant::Anon(o))
    }

    pub fn type_code(&self) -> VarType {
        match self.variant() {
            Variant::Int(_) => VarType::TYPE_INT,
            Variant::Obj(_) => VarType::TYPE_OBJ,
            Variant::Str(_) => VarType::TYPE_STR,
            Variant::Err(_) => VarType::TYPE_ERR,
            Variant::List(_) => VarType::TYPE_LIST,
            Variant::Float(_) => VarType::TYPE_FLOAT,
            Variant::Map(_) => VarType::TYPE_MAP,
            Variant::Anon(_) => VarType::TYPE_ANON,
            Variant::Waif(_) => VarType::TYPE_WAIF,
            Variant::Bool(_) => VarType::TYPE_BOOL,
        }
    }

    /// Truth: nonzero INT, non-empty STR/LIST/MAP, true BOOL. Everything else,
    /// including FLOAT, OBJ, ERR, WAIF and ANON, is false.
    pub fn is_true(&self) -> bool {
        match self.variant() {
            Variant::Int(i) => *i != 0,
            Variant::Str(s) => !s.is_empty(),
            Variant::List(l) => !l.is_empty(),
            Variant::Map(m) => !m.is_empty(),
            Variant::Bool(b) => *b,
            _ => false,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.variant(), Variant::Str(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.variant(), Variant::Str(_) | Variant::List(_))
    }

    pub fn as_object(&self) -> Option<Obj> {
        match self.variant() {
            Variant::Obj(o) => Some(*o),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.variant() {
            Variant::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.variant() {
            Variant::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Any value but an anonymous-object reference can key a map.
    pub fn is_hashable_key(&self) -> bool {
        !matches!(self.variant(), Variant::Anon(_))
    }

    /// Length of a sequence or map; E_TYPE otherwise.
    pub fn len(&self) -> Result<usize, Error> {
        match self.variant() {
            Variant::Str(s) => Ok(s.len()),
            Variant::List(l) => Ok(l.len()),
            Variant::Map(m) => Ok(m.len()),
            _ => Err(E_TYPE.msg("value has no length")),
        }
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// `self[index]`, with language (1-based) index semantics for sequences and key
    /// lookup for maps (E_RANGE on a missing key).
    pub fn index(&self, index: &Var) -> Result<Var, Error> {
        match self.variant() {
            Variant::Map(m) => m
                .get(index)
                .ok_or_else(|| E_RANGE.msg("key not found in map")),
            Variant::List(l) => {
                let idx = one_based(index, l.len())?;
                l.index(idx)
            }
            Variant::Str(s) => {
                let idx = one_based(index, s.len())?;
                s.index(idx)
            }
            _ => Err(E_TYPE.msg("value is not indexable")),
        }
    }

    /// `self[index] = value`, returning the new container.
    pub fn index_set(&self, index: &Var, value: &Var) -> Result<Var, Error> {
        match self.variant() {
            Variant::Map(m) => m.set(index, value),
            Variant::List(l) => {
                let idx = one_based(index, l.len())?;
                l.index_set(idx, value)
            }
            Variant::Str(s) => {
                let idx = one_based(index, s.len())?;
                s.index_set(idx, value)
            }
            _ => Err(E_TYPE.msg("value is not indexable")),
        }
    }

    /// `self[from..to]` with 1-based closed-range semantics.
    pub fn range(&self, from: &Var, to: &Var) -> Result<Var, Error> {
        let (from, to) = range_bounds(from, to)?;
        match self.variant() {
            Variant::List(l) => l.range(from - 1, to - 1),
            Variant::Str(s) => s.range(from - 1, to - 1),
            _ => Err(E_TYPE.msg("value is not rangeable")),
        }
    }

    /// `self[from..to] = value` with 1-based closed-range semantics.
    pub fn range_set(&self, from: &Var, to: &Var, value: &Var) -> Result<Var, Error> {
        let (from, to) = range_bounds(from, to)?;
        match self.variant() {
            Variant::List(l) => l.range_set(from - 1, to - 1, value),
            Variant::Str(s) => s.range_set(from - 1, to - 1, value),
            _ => Err(E_TYPE.msg("value is not rangeable")),
        }
    }

    /// The `in` operator: 1-based position of `self` in `container`, 0 when absent.
    /// For maps the search is over values, yielding the insertion rank.
    pub fn index_in(&self, container: &Var) -> Result<Var, Error> {
        match container.variant() {
            Variant::List(l) => Ok(v_int(
                l.index_in(self, false)?.map(|i| i as i64 + 1).unwrap_or(0),
            )),
            Variant::Str(s) => Ok(v_int(
                s.index_in(self, false)?.map(|i| i as i64 + 1).unwrap_or(0),
            )),
            Variant::Map(m) => Ok(v_int(
                m.rank_of_value(self, false)
                    .map(|i| i as i64 + 1)
                    .unwrap_or(0),
            )),
            _ => Err(E_TYPE.msg("right operand of `in' is not a container")),
        }
    }

    /// Relational comparison for `<`, `<=`, `>`, `>=`. Only like types (with
    /// INT/FLOAT promotion) are comparable.
    pub fn compare(&self, other: &Var) -> Result<Ordering, Error> {
        match (self.variant(), other.variant()) {
            (Variant::Int(l), Variant::Int(r)) => Ok(l.cmp(r)),
            (Variant::Float(l), Variant::Float(r)) => {
                l.partial_cmp(r).ok_or_else(|| E_TYPE.msg("NaN comparison"))
            }
            (Variant::Int(l), Variant::Float(r)) => (*l as f64)
                .partial_cmp(r)
                .ok_or_else(|| E_TYPE.msg("NaN comparison")),
            (Variant::Float(l), Variant::Int(r)) => l
                .partial_cmp(&(*r as f64))
                .ok_or_else(|| E_TYPE.msg("NaN comparison")),
            (Variant::Str(l), Variant::Str(r)) => Ok(l.cmp(r)),
            (Variant::Obj(l), Variant::Obj(r)) => Ok(l.cmp(r)),
            (Variant::Err(l), Variant::Err(r)) => Ok(l.code.cmp(&r.code)),
            (Variant::Bool(l), Variant::Bool(r)) => Ok(l.cmp(r)),
            (_, _) => Err(E_TYPE.msg("values of these types cannot be compared")),
        }
    }

    /// The canonical total order over all values, used for map-key printing.
    pub fn total_cmp(&self, other: &Var) -> Ordering {
        self.0.total_cmp(&other.0)
    }

    /// Deep equality with case-sensitive string comparison, as used by `equal()`
    /// and literal pooling.
    pub fn eq_case_sensitive(&self, other: &Var) -> bool {
        match (self.variant(), other.variant()) {
            (Variant::Str(l), Variant::Str(r)) => l.as_str() == r.as_str(),
            (Variant::List(l), Variant::List(r)) => {
                l.len() == r.len()
                    && l.iter()
                        .zip(r.iter())
                        .all(|(a, b)| a.eq_case_sensitive(&b))
            }
            (Variant::Map(l), Variant::Map(r)) => {
                l.len() == r.len()
                    && l.iter().zip(r.iter()).all(|((lk, lv), (rk, rv))| {
                        lk.eq_case_sensitive(&rk) && lv.eq_case_sensitive(&rv)
                    })
            }
            (l, r) => l == r,
        }
    }
}

/// Convert a 1-based language index against a container of length `len` into a
/// 0-based offset, or E_RANGE.
fn one_based(index: &Var, len: usize) -> Result<usize, Error> {
    let Variant::Int(i) = index.variant() else {
        return Err(E_TYPE.msg("index must be an integer"));
    };
    if *i < 1 || *i as usize > len {
        return Err(E_RANGE.with_msg(|| format!("index {i} out of range for length {len}")));
    }
    Ok((*i - 1) as usize)
}

fn range_bounds(from: &Var, to: &Var) -> Result<(isize, isize), Error> {
    let (Variant::Int(from), Variant::Int(to)) = (from.variant(), to.variant()) else {
        return Err(E_TYPE.msg("range bounds must be integers"));
    };
    Ok((*from as isize, *to as isize))
}

impl PartialEq for Var {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Var {}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Var {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl Debug for Var {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.variant())
    }
}

pub fn v_bool(b: bool) -> Var {
    Var::mk_bool(b)
}

pub fn v_int(i: i64) -> Var {
    Var::mk_integer(i)
}

pub fn v_float(f: f64) -> Var {
    Var::mk_float(f)
}

pub fn v_str(s: &str) -> Var {
    Var::mk_str(s)
}

pub fn v_string(s: String) -> Var {
    Var::mk_string(s)
}

pub fn v_empty_str() -> Var {
    v_str("")
}

pub fn v_obj(o: Obj) -> Var {
    Var::mk_object(o)
}

pub fn v_objid(id: i64) -> Var {
    Var::mk_object(Obj(id))
}

pub fn v_err(code: ErrorCode) -> Var {
    Var::mk_error(code.into())
}

pub fn v_error(e: Error) -> Var {
    Var::mk_error(e)
}

pub fn v_list(values: &[Var]) -> Var {
    List::build(values)
}

pub fn v_list_iter<I: IntoIterator<Item = Var>>(values: I) -> Var {
    let values: Vec<Var> = values.into_iter().collect();
    List::build(&values)
}

pub fn v_empty_list() -> Var {
    v_list(&[])
}

pub fn v_map(pairs: &[(Var, Var)]) -> Var {
    Map::build(pairs.iter())
}

pub fn v_empty_map() -> Var {
    v_map(&[])
}

pub fn v_waif(w: Waif) -> Var {
    Var::from_waif(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode::E_DIV;

    #[test]
    fn truthiness() {
        assert!(v_int(1).is_true());
        assert!(!v_int(0).is_true());
        assert!(v_str("x").is_true());
        assert!(!v_str("").is_true());
        assert!(v_list(&[v_int(1)]).is_true());
        assert!(!v_empty_list().is_true());
        assert!(!v_float(1.0).is_true());
        assert!(!v_objid(5).is_true());
        assert!(!v_err(E_DIV).is_true());
        assert!(v_bool(true).is_true());
    }

    #[test]
    fn one_based_indexing() {
        let l = v_list(&[v_int(10), v_int(20)]);
        assert_eq!(l.index(&v_int(1)).unwrap(), v_int(10));
        assert_eq!(l.index(&v_int(2)).unwrap(), v_int(20));
        assert_eq!(l.index(&v_int(0)).unwrap_err().code, E_RANGE);
        assert_eq!(l.index(&v_int(3)).unwrap_err().code, E_RANGE);
    }

    #[test]
    fn map_missing_key_is_range_error() {
        let m = v_map(&[(v_str("a"), v_int(1))]);
        assert_eq!(m.index(&v_str("a")).unwrap(), v_int(1));
        assert_eq!(m.index(&v_str("b")).unwrap_err().code, E_RANGE);
    }

    #[test]
    fn in_operator() {
        let l = v_list(&[v_str("a"), v_str("B")]);
        assert_eq!(v_str("b").index_in(&l).unwrap(), v_int(2));
        assert_eq!(v_str("z").index_in(&l).unwrap(), v_int(0));
        let m = v_map(&[(v_str("k"), v_int(7))]);
        assert_eq!(v_int(7).index_in(&m).unwrap(), v_int(1));
    }

    #[test]
    fn float_equality_is_ieee() {
        assert_eq!(v_float(0.0), v_float(-0.0));
        assert_ne!(v_float(f64::NAN), v_float(f64::NAN));
    }

    #[test]
    fn comparison_promotes() {
        assert_eq!(v_int(1).compare(&v_float(1.5)).unwrap(), Ordering::Less);
        assert!(v_str("abc").compare(&v_list(&[])).is_err());
        assert_eq!(
            v_str("ABC").compare(&v_str("abc")).unwrap(),
            Ordering::Equal
        );
    }
}
