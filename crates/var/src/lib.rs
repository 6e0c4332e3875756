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

mod error;
mod list;
mod literal;
mod map;
mod obj;
mod scalar;
mod string;
mod symbol;
#[allow(clippy::module_inception)]
mod var;
mod variant;
mod waif;

pub use error::{Error, ErrorCode, ErrorCode::*};
pub use list::List;
pub use literal::to_literal;
pub use map::Map;
pub use obj::{Obj, AMBIGUOUS, FAILED_MATCH, NOTHING, SYSTEM_OBJECT};
pub use string::Str;
pub use symbol::Symbol;
pub use var::{
    v_bool, v_empty_list, v_empty_map, v_empty_str, v_err, v_error, v_float, v_int, v_list,
    v_list_iter, v_map, v_obj, v_objid, v_str, v_string, v_waif, Var,
};
pub use variant::Variant;
pub use waif::{Waif, WaifRegistry};

use bincode::{Decode, Encode};
use strum::FromRepr;

/// Type codes as reported by `typeof()` and stored in checkpoints.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, FromRepr, Encode, Decode)]
#[allow(non_camel_case_types)]
pub enum VarType {
    TYPE_INT = 0,
    TYPE_OBJ = 1,
    TYPE_STR = 2,
    TYPE_ERR = 3,
    TYPE_LIST = 4,
    TYPE_FLOAT = 9,
    TYPE_MAP = 10,
    TYPE_ANON = 12,
    TYPE_WAIF = 13,
    TYPE_BOOL = 14,
}

impl VarType {
    pub fn to_literal(&self) -> &str {
        match self {
            VarType::TYPE_INT => "INT",
            VarType::TYPE_OBJ => "OBJ",
            VarType::TYPE_STR => "STR",
            VarType::TYPE_ERR => "ERR",
            VarType::TYPE_LIST => "LIST",
            VarType::TYPE_FLOAT => "FLOAT",
            VarType::TYPE_MAP => "MAP",
            VarType::TYPE_ANON => "ANON",
            VarType::TYPE_WAIF => "WAIF",
            VarType::TYPE_BOOL => "BOOL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NUM" | "INT" => Some(VarType::TYPE_INT),
            "OBJ" => Some(VarType::TYPE_OBJ),
            "STR" => Some(VarType::TYPE_STR),
            "ERR" => Some(VarType::TYPE_ERR),
            "LIST" => Some(VarType::TYPE_LIST),
            "FLOAT" => Some(VarType::TYPE_FLOAT),
            "MAP" => Some(VarType::TYPE_MAP),
            "ANON" => Some(VarType::TYPE_ANON),
            "WAIF" => Some(VarType::TYPE_WAIF),
            "BOOL" => Some(VarType::TYPE_BOOL),
            _ => None,
        }
    }
}

/// Operations common to the sequence types (LIST, STR). Indices here are 0-based;
/// the 1-based arithmetic of the language happens in `Var`'s index methods.
pub trait Sequence {
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
    fn contains(&self, value: &Var, case_sensitive: bool) -> Result<bool, Error>;
    fn index_in(&self, value: &Var, case_sensitive: bool) -> Result<Option<usize>, Error>;
}

/// Operations common to the associative types (MAP).
pub trait Associative {
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
    fn get(&self, key: &Var) -> Option<Var>;
    fn set(&self, key: &Var, value: &Var) -> Result<Var, Error>;
    fn remove(&self, key: &Var) -> Var;
    fn contains_key(&self, key: &Var) -> bool;
}
