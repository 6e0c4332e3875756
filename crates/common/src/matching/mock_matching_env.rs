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

use crate::matching::MatchEnvironment;
use crate::model::WorldStateError;
use barn_var::{Obj, NOTHING};
use std::collections::HashMap;

pub const MOCK_ROOM: Obj = Obj(100);
pub const MOCK_PLAYER: Obj = Obj(101);
pub const MOCK_THING1: Obj = Obj(102);
pub const MOCK_THING2: Obj = Obj(103);

struct MockObject {
    name: String,
    aliases: Vec<String>,
    location: Obj,
}

#[derive(Default)]
pub struct MockMatchEnv {
    objects: HashMap<Obj, MockObject>,
}

impl MatchEnvironment for MockMatchEnv {
    fn obj_valid(&self, oid: &Obj) -> Result<bool, WorldStateError> {
        Ok(self.objects.contains_key(oid))
    }

    fn names_of(&self, oid: &Obj) -> Result<(String, Vec<String>), WorldStateError> {
        let o = self
            .objects
            .get(oid)
            .ok_or(WorldStateError::ObjectNotFound(*oid))?;
        Ok((o.name.clone(), o.aliases.clone()))
    }

    fn surroundings(&self, player: &Obj) -> Result<Vec<Obj>, WorldStateError> {
        let location = self.location_of(player)?;
        let mut result: Vec<Obj> = self
            .objects
            .iter()
            .filter(|(oid, o)| o.location == *player && *oid != player)
            .map(|(oid, _)| *oid)
            .collect();
        result.sort();
        let mut room: Vec<Obj> = self
            .objects
            .iter()
            .filter(|(oid, o)| o.location == location && *oid != player)
            .map(|(oid, _)| *oid)
            .collect();
        room.sort();
        result.extend(room);
        Ok(result)
    }

    fn location_of(&self, oid: &Obj) -> Result<Obj, WorldStateError> {
        Ok(self
            .objects
            .get(oid)
            .map(|o| o.location)
            .unwrap_or(NOTHING))
    }
}

pub fn setup_mock_environment() -> MockMatchEnv {
    let mut objects = HashMap::new();
    objects.insert(
        MOCK_ROOM,
        MockObject {
            name: "a test chamber".into(),
            aliases: vec!["chamber".into()],
            location: NOTHING,
        },
    );
    objects.insert(
        MOCK_PLAYER,
        MockObject {
            name: "Porcupine".into(),
            aliases: vec![],
            location: MOCK_ROOM,
        },
    );
    objects.insert(
        MOCK_THING1,
        MockObject {
            name: "ball".into(),
            aliases: vec!["sphere".into()],
            location: MOCK_PLAYER,
        },
    );
    objects.insert(
        MOCK_THING2,
        MockObject {
            name: "ballista".into(),
            aliases: vec![],
            location: MOCK_ROOM,
        },
    );
    MockMatchEnv { objects }
}
