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

use crate::names::Name;
use bincode::{Decode, Encode};

/// A Label is a unique identifier for a jump position in the program. A committed,
/// compiled label resolves to a program offset via the program's jump table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Label(pub u16);

impl From<usize> for Label {
    fn from(value: usize) -> Self {
        Label(value as u16)
    }
}

/// An Offset is an absolute program position (or a stack depth, where so noted).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Offset(pub u16);

impl From<usize> for Offset {
    fn from(value: usize) -> Self {
        Offset(value as u16)
    }
}

/// What a label resolves to in the program.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub struct JumpLabel {
    /// The unique id for the jump label, also its offset in the jump table.
    pub id: Label,

    /// The variable name associated with this label, for labeled loops.
    pub name: Option<Name>,

    /// The resolved position of the label in terms of program offsets.
    pub position: Offset,
}
