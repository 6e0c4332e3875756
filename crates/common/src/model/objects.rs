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

use crate::util::BitEnum;
use enum_primitive_derive::Primitive;

/// Flags on an object.
#[derive(Debug, Ord, PartialOrd, Copy, Clone, Eq, PartialEq, Hash, Primitive)]
#[repr(u8)]
pub enum ObjFlag {
    User = 0,
    Programmer = 1,
    Wizard = 2,
    Read = 3,
    Write = 4,
    Fertile = 5,
}

pub fn obj_flags_string(flags: BitEnum<ObjFlag>) -> String {
    let mut s = String::new();
    if flags.contains(ObjFlag::User) {
        s.push('u');
    }
    if flags.contains(ObjFlag::Programmer) {
        s.push('p');
    }
    if flags.contains(ObjFlag::Wizard) {
        s.push('w');
    }
    if flags.contains(ObjFlag::Read) {
        s.push('r');
    }
    if flags.contains(ObjFlag::Write) {
        s.push('W');
    }
    if flags.contains(ObjFlag::Fertile) {
        s.push('f');
    }
    s
}
