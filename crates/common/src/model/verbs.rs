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

use crate::util::{verbnames_match, BitEnum};
use barn_var::{Obj, Symbol};
use bincode::{Decode, Encode};
use enum_primitive_derive::Primitive;
use strum::FromRepr;

/// Flags on a verb: readable, writable, executable, debug ('d' raises errors).
#[derive(Debug, Ord, PartialOrd, Copy, Clone, Eq, PartialEq, Hash, Primitive)]
#[repr(u8)]
pub enum VerbFlag {
    Read = 0,
    Write = 1,
    Exec = 2,
    Debug = 3,
}

impl VerbFlag {
    pub fn parse_str(s: &str) -> Option<BitEnum<Self>> {
        let mut flags = BitEnum::new();
        for c in s.chars() {
            match c {
                'r' => flags.set(VerbFlag::Read),
                'w' => flags.set(VerbFlag::Write),
                'x' => flags.set(VerbFlag::Exec),
                'd' => flags.set(VerbFlag::Debug),
                _ => return None,
            }
        }
        Some(flags)
    }

    #[must_use]
    pub fn rxd() -> BitEnum<Self> {
        BitEnum::new_with(Self::Read) | Self::Exec | Self::Debug
    }

    #[must_use]
    pub fn rwxd() -> BitEnum<Self> {
        BitEnum::new_with(Self::Read) | Self::Write | Self::Exec | Self::Debug
    }
}

pub fn verb_perms_string(perms: BitEnum<VerbFlag>) -> String {
    let mut s = String::new();
    if perms.contains(VerbFlag::Read) {
        s.push('r');
    }
    if perms.contains(VerbFlag::Write) {
        s.push('w');
    }
    if perms.contains(VerbFlag::Exec) {
        s.push('x');
    }
    if perms.contains(VerbFlag::Debug) {
        s.push('d');
    }
    s
}

/// What a verb requires of the direct or indirect object slot of a command.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr, Hash, Ord, PartialOrd, Encode, Decode)]
#[repr(u8)]
pub enum ArgSpec {
    None = 0,
    Any = 1,
    This = 2,
}

impl ArgSpec {
    #[must_use]
    pub fn to_string(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Any => "any",
            Self::This => "this",
        }
    }

    #[must_use]
    pub fn from_string(repr: &str) -> Option<Self> {
        match repr {
            "none" => Some(Self::None),
            "any" => Some(Self::Any),
            "this" => Some(Self::This),
            _ => None,
        }
    }
}

/// The fifteen preposition classes, with their aliases.
#[repr(u16)]
#[derive(Copy, Clone, Debug, FromRepr, Eq, PartialEq, Hash, Encode, Decode, Ord, PartialOrd)]
pub enum Preposition {
    WithUsing = 0,
    AtTo = 1,
    InFrontOf = 2,
    IntoIn = 3,
    OnTopOfOn = 4,
    OutOf = 5,
    Over = 6,
    Through = 7,
    Under = 8,
    Behind = 9,
    Beside = 10,
    ForAbout = 11,
    Is = 12,
    As = 13,
    OffOf = 14,
}

impl Preposition {
    /// Alias phrases for each class. Multi-word phrases are single entries and are
    /// matched longest-first by the command parser.
    pub fn phrases(&self) -> &'static [&'static str] {
        match self {
            Self::WithUsing => &["with", "using"],
            Self::AtTo => &["at", "to"],
            Self::InFrontOf => &["in front of"],
            Self::IntoIn => &["in", "inside", "into"],
            Self::OnTopOfOn => &["on top of", "on", "onto", "upon"],
            Self::OutOf => &["out of", "from inside", "from"],
            Self::Over => &["over"],
            Self::Through => &["through"],
            Self::Under => &["under", "underneath", "beneath"],
            Self::Behind => &["behind"],
            Self::Beside => &["beside"],
            Self::ForAbout => &["for", "about"],
            Self::Is => &["is"],
            Self::As => &["as"],
            Self::OffOf => &["off", "off of"],
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let all = Self::all();
        let s = s.to_lowercase();
        // Accept either a single alias or the canonical slash-joined form.
        all.iter()
            .find(|p| p.phrases().contains(&s.as_str()) || p.to_string() == s)
            .copied()
    }

    pub fn all() -> &'static [Preposition] {
        &[
            Self::WithUsing,
            Self::AtTo,
            Self::InFrontOf,
            Self::IntoIn,
            Self::OnTopOfOn,
            Self::OutOf,
            Self::Over,
            Self::Through,
            Self::Under,
            Self::Behind,
            Self::Beside,
            Self::ForAbout,
            Self::Is,
            Self::As,
            Self::OffOf,
        ]
    }

    #[allow(clippy::inherent_to_string)]
    pub fn to_string(&self) -> &'static str {
        match self {
            Self::WithUsing => "with/using",
            Self::AtTo => "at/to",
            Self::InFrontOf => "in front of",
            Self::IntoIn => "in/inside/into",
            Self::OnTopOfOn => "on top of/on/onto/upon",
            Self::OutOf => "out of/from inside/from",
            Self::Over => "over",
            Self::Through => "through",
            Self::Under => "under/underneath/beneath",
            Self::Behind => "behind",
            Self::Beside => "beside",
            Self::ForAbout => "for/about",
            Self::Is => "is",
            Self::As => "as",
            Self::OffOf => "off/off of",
        }
    }
}

/// A verb's preposition requirement: a specific class, any preposition, or none.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Encode, Decode)]
pub enum PrepSpec {
    Any,
    None,
    Other(Preposition),
}

impl PrepSpec {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(Self::Any),
            "none" => Some(Self::None),
            _ => Preposition::parse(s).map(Self::Other),
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            Self::Any => "any".into(),
            Self::None => "none".into(),
            Self::Other(p) => p.to_string().into(),
        }
    }
}

/// The argument specification of a verb: dobj/prep/iobj requirements.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Encode, Decode)]
pub struct VerbArgsSpec {
    pub dobj: ArgSpec,
    pub prep: PrepSpec,
    pub iobj: ArgSpec,
}

impl VerbArgsSpec {
    /// "this none this": the conventional spec for verbs only called from code.
    #[must_use]
    pub fn this_none_this() -> Self {
        VerbArgsSpec {
            dobj: ArgSpec::This,
            prep: PrepSpec::None,
            iobj: ArgSpec::This,
        }
    }

    #[must_use]
    pub fn none_none_none() -> Self {
        VerbArgsSpec {
            dobj: ArgSpec::None,
            prep: PrepSpec::None,
            iobj: ArgSpec::None,
        }
    }
}

/// The metadata of a verb: names, ownership, permissions, argument spec.
/// Source and compiled program live with the store's verb record, not here.
#[derive(Clone, Debug, Eq, PartialEq, Encode, Decode)]
pub struct VerbDef {
    pub names: String,
    pub owner: Obj,
    pub flags: BitEnum<VerbFlag>,
    pub args: VerbArgsSpec,
}

impl VerbDef {
    pub fn matches_name(&self, candidate: Symbol) -> bool {
        verbnames_match(&self.names, &candidate.to_lowercase())
    }

    /// The first name pattern, used in tracebacks and verb_info.
    pub fn first_name(&self) -> &str {
        self.names.split(' ').next().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preposition_aliases() {
        assert_eq!(Preposition::parse("with"), Some(Preposition::WithUsing));
        assert_eq!(Preposition::parse("using"), Some(Preposition::WithUsing));
        assert_eq!(
            Preposition::parse("in front of"),
            Some(Preposition::InFrontOf)
        );
        assert_eq!(
            Preposition::parse("with/using"),
            Some(Preposition::WithUsing)
        );
        assert_eq!(Preposition::parse("xyzzy"), None);
    }

    #[test]
    fn verbdef_name_matching() {
        let vd = VerbDef {
            names: "g*et take".into(),
            owner: Obj(2),
            flags: VerbFlag::rxd(),
            args: VerbArgsSpec::this_none_this(),
        };
        assert!(vd.matches_name(Symbol::mk("get")));
        assert!(vd.matches_name(Symbol::mk("TAKE")));
        assert!(!vd.matches_name(Symbol::mk("drop")));
        assert_eq!(vd.first_name(), "g*et");
    }

    #[test]
    fn flag_parsing() {
        let flags = VerbFlag::parse_str("rxd").unwrap();
        assert!(flags.contains(VerbFlag::Read));
        assert!(flags.contains(VerbFlag::Exec));
        assert!(flags.contains(VerbFlag::Debug));
        assert!(!flags.contains(VerbFlag::Write));
        assert_eq!(verb_perms_string(flags), "rxd");
        assert!(VerbFlag::parse_str("rz").is_none());
    }
}
