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
use crate::waif::Waif;
use crate::{Error, Obj};
use bincode::{Decode, Encode};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};

/// Our series of types.
#[derive(Clone, Encode, Decode)]
pub enum Variant {
    Bool(bool),
    Int(i64),
    Float(f64),
    Obj(Obj),
    Err(Box<Error>),
    Str(Str),
    List(List),
    Map(Map),
    Waif(Waif),
    Anon(Obj),
}

impl Variant {
    /// Rank used for the canonical total order on values of differing types,
    /// as seen in map-literal printing: INT < OBJ < FLOAT < ERR < STR < the rest.
    fn type_rank(&self) -> u8 {
        match self {
            Variant::Int(_) => 0,
            Variant::Obj(_) => 1,
            Variant::Float(_) => 2,
            Variant::Err(_) => 3,
            Variant::Str(_) => 4,
            Variant::Bool(_) => 5,
            Variant::List(_) => 6,
            Variant::Map(_) => 7,
            Variant::Waif(_) => 8,
            Variant::Anon(_) => 9,
        }
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Variant::Bool(l), Variant::Bool(r)) => l.cmp(r),
            (Variant::Int(l), Variant::Int(r)) => l.cmp(r),
            (Variant::Float(l), Variant::Float(r)) => l.total_cmp(r),
            (Variant::Obj(l), Variant::Obj(r)) => l.cmp(r),
            (Variant::Err(l), Variant::Err(r)) => l.cmp(r),
            (Variant::Str(l), Variant::Str(r)) => l.cmp(r),
            (Variant::List(l), Variant::List(r)) => l.cmp(r),
            (Variant::Map(l), Variant::Map(r)) => l.cmp(r),
            (Variant::Waif(l), Variant::Waif(r)) => l.cmp(r),
            (Variant::Anon(l), Variant::Anon(r)) => l.cmp(r),
            (l, r) => l.type_rank().cmp(&r.type_rank()),
        }
    }
}

impl Hash for Variant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Variant::Bool(b) => b.hash(state),
            Variant::Int(i) => i.hash(state),
            Variant::Float(f) => f.to_bits().hash(state),
            Variant::Obj(o) => o.hash(state),
            Variant::Err(e) => e.hash(state),
            Variant::Str(s) => s.hash(state),
            Variant::List(l) => l.hash(state),
            Variant::Map(m) => m.hash(state),
            Variant::Waif(w) => w.hash(state),
            Variant::Anon(o) => o.hash(state),
        }
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Variant::Bool(l), Variant::Bool(r)) => l == r,
            (Variant::Int(l), Variant::Int(r)) => l == r,
            // IEEE equality: NaN != NaN, +0.0 == -0.0.
            (Variant::Float(l), Variant::Float(r)) => l == r,
            (Variant::Obj(l), Variant::Obj(r)) => l == r,
            (Variant::Err(l), Variant::Err(r)) => l == r,
            (Variant::Str(l), Variant::Str(r)) => l == r,
            (Variant::List(l), Variant::List(r)) => l == r,
            (Variant::Map(l), Variant::Map(r)) => l == r,
            (Variant::Waif(l), Variant::Waif(r)) => l == r,
            (Variant::Anon(l), Variant::Anon(r)) => l == r,
            _ => false,
        }
    }
}

impl Eq for Variant {}

impl Debug for Variant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Bool(b) => write!(f, "{b}"),
            Variant::Int(i) => write!(f, "Integer({i})"),
            Variant::Float(fl) => write!(f, "Float({fl})"),
            Variant::Obj(o) => write!(f, "Object({o})"),
            Variant::Err(e) => write!(f, "Error({e:?})"),
            Variant::Str(s) => write!(f, "String({:?})", s.as_str()),
            Variant::List(l) => write!(f, "List({l:?})"),
            Variant::Map(m) => write!(f, "Map({m:?})"),
            Variant::Waif(w) => write!(f, "{w:?}"),
            Variant::Anon(o) => write!(f, "Anonymous({o})"),
        }
    }
}
