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
mod objects;
mod props;
mod verbs;

pub use error::WorldStateError;
pub use objects::{obj_flags_string, ObjFlag};
pub use props::{prop_flags_string, PropFlag, PropPerms};
pub use verbs::{
    verb_perms_string, ArgSpec, PrepSpec, Preposition, VerbArgsSpec, VerbDef, VerbFlag,
};
