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

use crate::tasks::command_parse::ParsedCommand;
use barn_common::model::{ArgSpec, PrepSpec};
use barn_db::ObjectStore;
use barn_var::{Obj, Symbol, NOTHING};

/// Where a command verb was found: the receiver it ran against, its definer, and
/// the verb index on the definer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandVerbMatch {
    pub this: Obj,
    pub definer: Obj,
    pub index: usize,
}

fn arg_matches(spec: ArgSpec, value: &Obj, candidate: &Obj) -> bool {
    match spec {
        ArgSpec::None => *value == NOTHING,
        ArgSpec::Any => true,
        ArgSpec::This => *value == *candidate,
    }
}

fn prep_matches(spec: &PrepSpec, actual: &PrepSpec) -> bool {
    match spec {
        PrepSpec::Any => true,
        PrepSpec::None => *actual == PrepSpec::None,
        PrepSpec::Other(p) => matches!(actual, PrepSpec::Other(actual_p) if actual_p == p),
    }
}

/// Find the verb a command dispatches to. Candidate receivers are tried in
/// order player, location, dobj, iobj; on each, the ancestor walk is
/// breadth-first; the first verb whose names and argument spec both match wins.
pub fn find_command_verb(
    world: &ObjectStore,
    player: &Obj,
    command: &ParsedCommand,
) -> Option<CommandVerbMatch> {
    let location = world.get(player).map(|p| p.location).unwrap_or(NOTHING);
    let mut candidates = vec![*player, location, command.dobj, command.iobj];
    candidates.retain(|c| world.valid(c));
    candidates.dedup();

    let verb = Symbol::mk(&command.verb);
    for candidate in candidates {
        for definer in world.ancestors_bfs(&candidate, true) {
            let Some(object) = world.get(&definer) else {
                continue;
            };
            for (index, v) in object.verbs.iter().enumerate() {
                if !v.def.matches_name(verb) {
                    continue;
                }
                if !arg_matches(v.def.args.dobj, &command.dobj, &candidate) {
                    continue;
                }
                if !prep_matches(&v.def.args.prep, &command.prep) {
                    continue;
                }
                if !arg_matches(v.def.args.iobj, &command.iobj, &candidate) {
                    continue;
                }
                return Some(CommandVerbMatch {
                    this: candidate,
                    definer,
                    index,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use barn_common::model::{VerbArgsSpec, VerbDef, VerbFlag};
    use barn_var::v_str;

    fn setup() -> (ObjectStore, Obj, Obj, Obj) {
        let mut world = ObjectStore::new();
        let room = world.create(vec![], Obj(0), false, None).unwrap();
        let player = world.create(vec![], Obj(0), false, None).unwrap();
        let ball = world.create(vec![], Obj(0), false, None).unwrap();
        world.move_object(&player, &room).unwrap();
        world.move_object(&ball, &room).unwrap();
        (world, room, player, ball)
    }

    fn command(verb: &str, dobj: Obj, prep: PrepSpec, iobj: Obj) -> ParsedCommand {
        ParsedCommand {
            verb: verb.into(),
            argstr: String::new(),
            args: vec![v_str("x")],
            dobjstr: String::new(),
            dobj,
            prepstr: String::new(),
            prep,
            iobjstr: String::new(),
            iobj,
        }
    }

    fn add_verb(world: &mut ObjectStore, on: &Obj, names: &str, args: VerbArgsSpec) {
        world
            .add_verb(
                on,
                VerbDef {
                    names: names.into(),
                    owner: Obj(0),
                    flags: VerbFlag::rxd(),
                    args,
                },
                "return 1;".into(),
            )
            .unwrap();
    }

    #[test]
    fn dobj_this_binds_to_the_object() {
        let (mut world, _room, player, ball) = setup();
        add_verb(
            &mut world,
            &ball,
            "kick",
            VerbArgsSpec {
                dobj: ArgSpec::This,
                prep: PrepSpec::None,
                iobj: ArgSpec::None,
            },
        );
        let m = find_command_verb(
            &world,
            &player,
            &command("kick", ball, PrepSpec::None, NOTHING),
        )
        .unwrap();
        assert_eq!(m.this, ball);
        assert_eq!(m.definer, ball);

        // A command with a different dobj does not reach it.
        assert!(find_command_verb(
            &world,
            &player,
            &command("kick", NOTHING, PrepSpec::None, NOTHING)
        )
        .is_none());
    }

    #[test]
    fn candidate_order_prefers_player() {
        let (mut world, room, player, _ball) = setup();
        let spec = VerbArgsSpec {
            dobj: ArgSpec::Any,
            prep: PrepSpec::Any,
            iobj: ArgSpec::Any,
        };
        add_verb(&mut world, &room, "go", spec);
        add_verb(&mut world, &player, "go", spec);
        let m = find_command_verb(
            &world,
            &player,
            &command("go", NOTHING, PrepSpec::None, NOTHING),
        )
        .unwrap();
        assert_eq!(m.this, player);
    }

    #[test]
    fn wildcard_and_inheritance() {
        let (mut world, _room, player, _ball) = setup();
        let generic = world.create(vec![], Obj(0), false, None).unwrap();
        add_verb(
            &mut world,
            &generic,
            "co*nnect",
            VerbArgsSpec {
                dobj: ArgSpec::Any,
                prep: PrepSpec::Any,
                iobj: ArgSpec::Any,
            },
        );
        world.chparents(&player, vec![generic]).unwrap();
        let m = find_command_verb(
            &world,
            &player,
            &command("connnnect", NOTHING, PrepSpec::None, NOTHING),
        )
        .unwrap();
        assert_eq!(m.definer, generic);
        assert!(find_command_verb(
            &world,
            &player,
            &command("co", NOTHING, PrepSpec::None, NOTHING)
        )
        .is_none());
    }

    #[test]
    fn preposition_class_must_match() {
        let (mut world, _room, player, ball) = setup();
        add_verb(
            &mut world,
            &ball,
            "put",
            VerbArgsSpec {
                dobj: ArgSpec::Any,
                prep: PrepSpec::Other(barn_common::model::Preposition::IntoIn),
                iobj: ArgSpec::This,
            },
        );
        assert!(find_command_verb(
            &world,
            &player,
            &command(
                "put",
                NOTHING,
                PrepSpec::Other(barn_common::model::Preposition::IntoIn),
                ball
            )
        )
        .is_some());
        assert!(find_command_verb(
            &world,
            &player,
            &command(
                "put",
                NOTHING,
                PrepSpec::Other(barn_common::model::Preposition::OnTopOfOn),
                ball
            )
        )
        .is_none());
    }
}
