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

use barn_var::Symbol;
use bincode::{Decode, Encode};
use strum::{Display, EnumIter, IntoEnumIterator};

/// A Name is the slot of a variable in a frame's environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Name(pub u16);

/// The task variables bound on every verb frame, in slot order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, Display)]
#[strum(serialize_all = "lowercase")]
pub enum GlobalName {
    This,
    Player,
    Caller,
    Verb,
    Args,
    Argstr,
    Dobjstr,
    Dobj,
    Prepstr,
    Iobjstr,
    Iobj,
}

impl GlobalName {
    pub fn slot(self) -> Name {
        Name(self as u16)
    }
}

/// The variable-name table of a program: symbol per environment slot. The reserved
/// task variables occupy the first slots of every table.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Encode, Decode)]
pub struct Names {
    pub names: Vec<Symbol>,
}

impl Default for Names {
    fn default() -> Self {
        Self::new()
    }
}

impl Names {
    pub fn new() -> Self {
        let mut names = Self { names: vec![] };
        for global in GlobalName::iter() {
            names.find_or_add_name(&global.to_string());
        }
        names
    }

    pub fn find_or_add_name(&mut self, name: &str) -> Name {
        let name = Symbol::mk(name);
        match self.names.iter().position(|n| *n == name) {
            None => {
                let pos = self.names.len();
                self.names.push(name);
                Name(pos as u16)
            }
            Some(n) => Name(n as u16),
        }
    }

    pub fn find_name(&self, name: &str) -> Option<Name> {
        let name = Symbol::mk(name);
        self.names
            .iter()
            .position(|x| *x == name)
            .map(|x| Name(x as u16))
    }

    /// The number of environment slots a frame for this program needs.
    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn name_of(&self, name: &Name) -> Option<Symbol> {
        self.names.get(name.0 as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_are_preregistered() {
        let names = Names::new();
        assert_eq!(names.find_name("this"), Some(GlobalName::This.slot()));
        assert_eq!(names.find_name("iobj"), Some(GlobalName::Iobj.slot()));
        assert_eq!(names.width(), 11);
    }

    #[test]
    fn caseless_lookup() {
        let mut names = Names::new();
        let n = names.find_or_add_name("Counter");
        assert_eq!(names.find_name("counter"), Some(n));
        assert_eq!(names.find_or_add_name("COUNTER"), n);
    }
}
