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

use crate::model::WorldStateError;
use barn_var::{Obj, AMBIGUOUS, FAILED_MATCH};

// The interface the matcher needs onto the world state. Separated out so it can be
// mocked in tests.
pub trait MatchEnvironment {
    fn obj_valid(&self, oid: &Obj) -> Result<bool, WorldStateError>;

    /// The object's name and its aliases, in that order.
    fn names_of(&self, oid: &Obj) -> Result<(String, Vec<String>), WorldStateError>;

    /// The contents of the player, then the contents of the player's location with
    /// the player excluded. This is the full search space, in search order.
    fn surroundings(&self, player: &Obj) -> Result<Vec<Obj>, WorldStateError>;

    fn location_of(&self, oid: &Obj) -> Result<Obj, WorldStateError>;
}

// The four match passes, in decreasing order of strength.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MatchPass {
    ExactName,
    ExactAlias,
    PrefixName,
    PrefixAlias,
}

const PASSES: [MatchPass; 4] = [
    MatchPass::ExactName,
    MatchPass::ExactAlias,
    MatchPass::PrefixName,
    MatchPass::PrefixAlias,
];

fn pass_matches(pass: MatchPass, name: &str, aliases: &[String], wanted: &str) -> bool {
    let name = name.to_lowercase();
    match pass {
        MatchPass::ExactName => name == wanted,
        MatchPass::ExactAlias => aliases.iter().any(|a| a.to_lowercase() == wanted),
        MatchPass::PrefixName => name.starts_with(wanted),
        MatchPass::PrefixAlias => aliases
            .iter()
            .any(|a| a.to_lowercase().starts_with(wanted)),
    }
}

/// Resolve an object name as typed in a command, against the player's
/// surroundings. `#N` parses literally; `me` is the player; `here` the player's
/// location. Otherwise the strongest pass with any hits decides: one hit resolves,
/// several yield AMBIGUOUS, none at all yields FAILED_MATCH.
pub fn match_object<M: MatchEnvironment>(
    env: &M,
    player: &Obj,
    name: &str,
) -> Result<Option<Obj>, WorldStateError> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }

    if let Some(stripped) = name.strip_prefix('#') {
        if let Ok(id) = stripped.parse::<i64>() {
            return Ok(Some(Obj(id)));
        }
    }

    if !env.obj_valid(player)? {
        return Ok(Some(FAILED_MATCH));
    }

    let wanted = name.to_lowercase();
    if wanted == "me" {
        return Ok(Some(*player));
    }
    if wanted == "here" {
        return Ok(Some(env.location_of(player)?));
    }

    let search = env.surroundings(player)?;
    let mut named: Vec<(Obj, String, Vec<String>)> = Vec::with_capacity(search.len());
    for oid in search {
        if !env.obj_valid(&oid)? {
            continue;
        }
        let (obj_name, aliases) = env.names_of(&oid)?;
        named.push((oid, obj_name, aliases));
    }

    for pass in PASSES {
        let mut hits = named
            .iter()
            .filter(|(_, obj_name, aliases)| pass_matches(pass, obj_name, aliases, &wanted));
        let Some((first, _, _)) = hits.next() else {
            continue;
        };
        return if hits.next().is_some() {
            Ok(Some(AMBIGUOUS))
        } else {
            Ok(Some(*first))
        };
    }

    Ok(Some(FAILED_MATCH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::mock_matching_env::{
        setup_mock_environment, MOCK_PLAYER, MOCK_ROOM, MOCK_THING1, MOCK_THING2,
    };

    #[test]
    fn literal_me_here() {
        let env = setup_mock_environment();
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "#42").unwrap(),
            Some(Obj(42))
        );
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "me").unwrap(),
            Some(MOCK_PLAYER)
        );
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "HERE").unwrap(),
            Some(MOCK_ROOM)
        );
    }

    #[test]
    fn exact_beats_prefix() {
        let env = setup_mock_environment();
        // "ball" names thing1 exactly; "ballista" would prefix-match thing2.
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "ball").unwrap(),
            Some(MOCK_THING1)
        );
    }

    #[test]
    fn prefix_ambiguity() {
        let env = setup_mock_environment();
        // Both "ball" and "ballista" prefix-match "ba".
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "ba").unwrap(),
            Some(AMBIGUOUS)
        );
    }

    #[test]
    fn alias_matching() {
        let env = setup_mock_environment();
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "sphere").unwrap(),
            Some(MOCK_THING1)
        );
    }

    #[test]
    fn failed_match() {
        let env = setup_mock_environment();
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "xyzzy").unwrap(),
            Some(FAILED_MATCH)
        );
        assert_eq!(match_object(&env, &MOCK_PLAYER, "").unwrap(), None);
    }

    #[test]
    fn unique_prefix_resolves() {
        let env = setup_mock_environment();
        assert_eq!(
            match_object(&env, &MOCK_PLAYER, "balli").unwrap(),
            Some(MOCK_THING2)
        );
    }
}
