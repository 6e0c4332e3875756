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
use barn_var::Obj;
use bincode::{Decode, Encode};
use enum_primitive_derive::Primitive;

/// Flags on a property: readable, writable, chown (owner changes on inheritance).
#[derive(Debug, Ord, PartialOrd, Copy, Clone, Eq, PartialEq, Hash, Primitive)]
#[repr(u8)]
pub enum PropFlag {
    Read = 0,
    Write = 1,
    Chown = 2,
}

impl PropFlag {
    pub fn parse_str(s: &str) -> Option<BitEnum<Self>> {
        let mut flags = BitEnum::new();
        for c in s.chars() {
            match c {
                'r' => flags.set(PropFlag::Read),
                'w' => flags.set(PropFlag::Write),
                'c' => flags.set(PropFlag::Chown),
                _ => return None,
            }
        }
        Some(flags)
    }

    #[must_use]
    pub fn rw() -> BitEnum<Self> {
        BitEnum::new_with(Self::Read) | Self::Write
    }

    #[must_use]
    pub fn rc() -> BitEnum<Self> {
        BitEnum::new_with(Self::Read) | Self::Chown
    }
}

pub fn prop_flags_string(flags: BitEnum<PropFlag>) -> String {
    let mut s = String::new();
    if flags.contains(PropFlag::Read) {
        s.push('r');
    }
    if flags.contains(PropFlag::Write) {
        s.push('w');
    }
    if flags.contains(PropFlag::Chown) {
        s.push('c');
    }
    s
}

/// Ownership and permission bits of one property entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Encode, Decode)]
pub struct PropPerms {
    pub owner: Obj,
    pub flags: BitEnum<PropFlag>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let flags = PropFlag::parse_str("rc").unwrap();
        assert_eq!(prop_flags_string(flags), "rc");
        assert!(PropFlag::parse_str("rx").is_none());
    }
}
