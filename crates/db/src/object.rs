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

use barn_common::model::{ObjFlag, PropPerms, VerbDef};
use barn_common::util::BitEnum;
use barn_compiler::Program;
use barn_var::{Obj, Symbol, Var, NOTHING};
use indexmap::IndexMap;

/// One property slot on an object. Every object carries a slot for each property
/// defined on it or any of its ancestors; a slot with no value is "clear" and
/// resolves through the parents.
#[derive(Clone, Debug)]
pub struct PropertyEntry {
    /// None marks the clear bit.
    pub value: Option<Var>,
    pub perms: PropPerms,
    /// The object the property was defined on. Slots copied down to descendants
    /// keep the definer, which is how definitions are told apart from copies.
    pub definer: Obj,
}

/// A verb on an object: its metadata, its source, and the lazily compiled program.
#[derive(Clone, Debug)]
pub struct Verb {
    pub def: VerbDef,
    pub source: String,
    /// Populated on first call.
    pub program: Option<Program>,
}

/// An object record. Parent/child and location/contents relationships are stored
/// as ids, never as references; the store owns the graph.
#[derive(Clone, Debug)]
pub struct Object {
    pub id: Obj,
    pub name: String,
    pub owner: Obj,
    pub flags: BitEnum<ObjFlag>,
    pub location: Obj,
    pub contents: Vec<Obj>,
    pub parents: Vec<Obj>,
    pub children: Vec<Obj>,
    pub properties: IndexMap<Symbol, PropertyEntry>,
    pub verbs: Vec<Verb>,
    /// Anonymous objects are excluded from id enumeration and are collected by
    /// reachability.
    pub anonymous: bool,
}

impl Object {
    pub fn new(id: Obj, parents: Vec<Obj>, owner: Obj) -> Self {
        Object {
            id,
            name: String::new(),
            owner,
            flags: BitEnum::new(),
            location: NOTHING,
            contents: vec![],
            parents,
            children: vec![],
            properties: IndexMap::new(),
            verbs: vec![],
            anonymous: false,
        }
    }

    pub fn is_wizard(&self) -> bool {
        self.flags.contains(ObjFlag::Wizard)
    }

    pub fn is_player(&self) -> bool {
        self.flags.contains(ObjFlag::User)
    }

    pub fn is_fertile(&self) -> bool {
        self.flags.contains(ObjFlag::Fertile)
    }
}
