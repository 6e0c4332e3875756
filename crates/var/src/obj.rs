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

use bincode::{Decode, Encode};
use std::fmt::{Debug, Display, Formatter};

/// The "system" object, where login and command-dispatch hooks hang off.
pub const SYSTEM_OBJECT: Obj = Obj(0);

/// Used throughout to refer to a missing object value.
pub const NOTHING: Obj = Obj(-1);
/// Matching found more than one candidate.
pub const AMBIGUOUS: Obj = Obj(-2);
/// Matching found no candidate.
pub const FAILED_MATCH: Obj = Obj(-3);

/// A reference to an object: the global database object id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Encode, Decode)]
#[repr(transparent)]
pub struct Obj(pub i64);

impl Obj {
    pub const fn mk_id(id: i64) -> Self {
        Obj(id)
    }

    pub fn id(&self) -> i64 {
        self.0
    }

    /// Whether this id can possibly name a database object (sentinels cannot).
    pub fn is_positional(&self) -> bool {
        self.0 >= 0
    }

    pub fn is_sysobj(&self) -> bool {
        self.0 == 0
    }

    pub fn is_nothing(&self) -> bool {
        *self == NOTHING
    }

    pub fn successor(&self) -> Self {
        Obj(self.0 + 1)
    }
}

impl Display for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Debug for Obj {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Obj(#{})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_sentinels() {
        assert_eq!(format!("{}", Obj(42)), "#42");
        assert_eq!(format!("{}", NOTHING), "#-1");
        assert!(!NOTHING.is_positional());
        assert!(!AMBIGUOUS.is_positional());
        assert!(SYSTEM_OBJECT.is_sysobj());
    }
}
