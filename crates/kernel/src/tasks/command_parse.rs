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

use barn_common::matching::{match_object, MatchEnvironment};
use barn_common::model::{PrepSpec, Preposition, WorldStateError};
use barn_common::util::parse_into_words;
use barn_var::{v_str, Obj, Var, NOTHING};
use bincode::{Decode, Encode};

/// A player command after tokenizing, preposition scanning and object matching.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct ParsedCommand {
    pub verb: String,
    pub argstr: String,
    pub args: Vec<Var>,
    pub dobjstr: String,
    pub dobj: Obj,
    pub prepstr: String,
    pub prep: PrepSpec,
    pub iobjstr: String,
    pub iobj: Obj,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum ParseCommandError {
    #[error("empty command")]
    EmptyCommand,
    #[error("error during object matching")]
    ErrorDuringMatch(WorldStateError),
}

/// Find the leftmost preposition phrase; at a given position the longest
/// matching alias wins (so "on top of" beats "on").
fn seek_preposition(words: &[String]) -> Option<(usize, usize, Preposition)> {
    let max_phrase = 3;
    for j in 0..words.len() {
        let limit = max_phrase.min(words.len() - j);
        for len in (1..=limit).rev() {
            let candidate = words[j..j + len].join(" ").to_lowercase();
            for prep in Preposition::all() {
                if prep.phrases().contains(&candidate.as_str()) {
                    return Some((j, len, *prep));
                }
            }
        }
    }
    None
}

/// Turn an input line into a `ParsedCommand`, resolving dobj/iobj against the
/// player's surroundings. Lines starting with `"` and `:` become `say`/`emote`;
/// the `;` eval intrinsic is handled before we ever get here.
pub fn parse_command<M: MatchEnvironment>(
    input: &str,
    env: &M,
    player: &Obj,
) -> Result<ParsedCommand, ParseCommandError> {
    let mut command = input.trim_start().to_string();
    match command.chars().next().unwrap_or(' ') {
        '"' => command.replace_range(..1, "say "),
        ':' => command.replace_range(..1, "emote "),
        _ => {}
    };

    if parse_into_words(&command).is_empty() {
        return Err(ParseCommandError::EmptyCommand);
    }

    // Split into verb and argument string.
    let mut parts = command.splitn(2, ' ');
    let verb = parts.next().unwrap_or_default().to_string();
    let argstr = parts.next().unwrap_or_default().to_string();
    let words = parse_into_words(&argstr);

    let prep_match = seek_preposition(&words);
    let (prep, prepstr) = match &prep_match {
        Some((j, len, prep)) => (PrepSpec::Other(*prep), words[*j..*j + *len].join(" ")),
        None => (PrepSpec::None, String::new()),
    };

    let dobjstr = match &prep_match {
        Some((j, _, _)) => words[0..*j].join(" "),
        None => words.join(" "),
    };
    let iobjstr = match &prep_match {
        Some((j, len, _)) => words[j + len..].join(" "),
        None => String::new(),
    };

    let dobj = match_part(env, player, &dobjstr)?;
    let iobj = match_part(env, player, &iobjstr)?;

    let args: Vec<Var> = words.iter().map(|w| v_str(w)).collect();

    Ok(ParsedCommand {
        verb,
        argstr,
        args,
        dobjstr,
        dobj,
        prepstr,
        prep,
        iobjstr,
        iobj,
    })
}

fn match_part<M: MatchEnvironment>(
    env: &M,
    player: &Obj,
    name: &str,
) -> Result<Obj, ParseCommandError> {
    if name.is_empty() {
        return Ok(NOTHING);
    }
    match_object(env, player, name)
        .map(|m| m.unwrap_or(NOTHING))
        .map_err(ParseCommandError::ErrorDuringMatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use barn_common::matching::mock_matching_env::{
        setup_mock_environment, MOCK_PLAYER, MOCK_THING1, MOCK_THING2,
    };
    use barn_var::FAILED_MATCH;

    #[test]
    fn bare_verb() {
        let env = setup_mock_environment();
        let pc = parse_command("look", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.verb, "look");
        assert_eq!(pc.dobj, NOTHING);
        assert_eq!(pc.prep, PrepSpec::None);
        assert!(pc.args.is_empty());
    }

    #[test]
    fn verb_with_dobj() {
        let env = setup_mock_environment();
        let pc = parse_command("get ball", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.verb, "get");
        assert_eq!(pc.dobjstr, "ball");
        assert_eq!(pc.dobj, MOCK_THING1);
        assert_eq!(pc.argstr, "ball");
    }

    #[test]
    fn preposition_splits_dobj_iobj() {
        let env = setup_mock_environment();
        let pc = parse_command("put ball in ballista", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.dobjstr, "ball");
        assert_eq!(pc.dobj, MOCK_THING1);
        assert_eq!(pc.prepstr, "in");
        assert_eq!(pc.prep, PrepSpec::Other(Preposition::IntoIn));
        assert_eq!(pc.iobjstr, "ballista");
        assert_eq!(pc.iobj, MOCK_THING2);
    }

    #[test]
    fn multiword_preposition_wins_over_short() {
        let env = setup_mock_environment();
        let pc = parse_command("put ball on top of ballista", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.prepstr, "on top of");
        assert_eq!(pc.prep, PrepSpec::Other(Preposition::OnTopOfOn));
        assert_eq!(pc.iobjstr, "ballista");
    }

    #[test]
    fn say_and_emote_intrinsics() {
        let env = setup_mock_environment();
        let pc = parse_command("\"hello there", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.verb, "say");
        assert_eq!(pc.argstr, "hello there");
        let pc = parse_command(":waves", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.verb, "emote");
        assert_eq!(pc.argstr, "waves");
    }

    #[test]
    fn failed_match_is_reported() {
        let env = setup_mock_environment();
        let pc = parse_command("get xyzzy", &env, &MOCK_PLAYER).unwrap();
        assert_eq!(pc.dobj, FAILED_MATCH);
    }
}
