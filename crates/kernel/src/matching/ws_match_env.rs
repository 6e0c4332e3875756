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

use barn_common::matching::MatchEnvironment;
use barn_common::model::WorldStateError;
use barn_db::ObjectStore;
use barn_var::{Obj, Symbol, Variant, NOTHING};

/// A matching environment backed by the object store. Aliases come from the
/// conventional `aliases` property, when one resolves to a list of strings.
pub struct WsMatchEnv<'a> {
    pub ws: &'a ObjectStore,
}

impl MatchEnvironment for WsMatchEnv<'_> {
    fn obj_valid(&self, oid: &Obj) -> Result<bool, WorldStateError> {
        Ok(self.ws.valid(oid))
    }

    fn names_of(&self, oid: &Obj) -> Result<(String, Vec<String>), WorldStateError> {
        let o = self
            .ws
            .get(oid)
            .ok_or(WorldStateError::ObjectNotFound(*oid))?;
        let mut aliases = vec![];
        if let Ok((value, _, _)) = self.ws.resolve_property(oid, Symbol::mk("aliases")) {
            if let Variant::List(l) = value.variant() {
                for alias in l.iter() {
                    if let Variant::Str(s) = alias.variant() {
                        aliases.push(s.as_str().to_string());
                    }
                }
            }
        }
        Ok((o.name.clone(), aliases))
    }

    fn surroundings(&self, player: &Obj) -> Result<Vec<Obj>, WorldStateError> {
        let p = self
            .ws
            .get(player)
            .ok_or(WorldStateError::ObjectNotFound(*player))?;
        let mut search: Vec<Obj> = p.contents.clone();
        if let Some(room) = self.ws.get(&p.location) {
            search.extend(room.contents.iter().filter(|o| *o != player));
        }
        Ok(search)
    }

    fn location_of(&self, oid: &Obj) -> Result<Obj, WorldStateError> {
        Ok(self.ws.get(oid).map(|o| o.location).unwrap_or(NOTHING))
    }
}
