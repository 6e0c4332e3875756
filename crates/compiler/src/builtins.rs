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
use lazy_static::lazy_static;
use std::collections::HashMap;

/// A builtin function id is the offset of the function in the registry, fixed at
/// compile time of the server. Bytecode refers to builtins by id, never by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct BuiltinId(pub u16);

/// Compile-time descriptor of one builtin function: its name and arity bounds.
/// The kernel registers implementations against these slots; the VM enforces the
/// arity, raising E_ARGS before dispatch.
pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: Option<usize>,
}

const fn bf(name: &'static str, min_args: usize, max_args: Option<usize>) -> Builtin {
    Builtin {
        name,
        min_args,
        max_args,
    }
}

/// Every builtin the compiler knows. Order is the id space; append only.
const BUILTIN_DESCRIPTORS: &[Builtin] = &[
    // Values
    bf("typeof", 1, Some(1)),
    bf("tostr", 0, None),
    bf("toliteral", 1, Some(1)),
    bf("toint", 1, Some(1)),
    bf("tonum", 1, Some(1)),
    bf("toobj", 1, Some(1)),
    bf("tofloat", 1, Some(1)),
    bf("equal", 2, Some(2)),
    bf("value_bytes", 1, Some(1)),
    bf("value_hash", 1, Some(1)),
    // Numbers
    bf("abs", 1, Some(1)),
    bf("min", 1, None),
    bf("max", 1, None),
    bf("random", 0, Some(1)),
    bf("floatstr", 2, Some(3)),
    bf("sqrt", 1, Some(1)),
    bf("sin", 1, Some(1)),
    bf("cos", 1, Some(1)),
    bf("tan", 1, Some(1)),
    bf("asin", 1, Some(1)),
    bf("acos", 1, Some(1)),
    bf("atan", 1, Some(2)),
    bf("sinh", 1, Some(1)),
    bf("cosh", 1, Some(1)),
    bf("tanh", 1, Some(1)),
    bf("exp", 1, Some(1)),
    bf("log", 1, Some(1)),
    bf("log10", 1, Some(1)),
    bf("ceil", 1, Some(1)),
    bf("floor", 1, Some(1)),
    bf("trunc", 1, Some(1)),
    bf("bitand", 2, Some(2)),
    bf("bitor", 2, Some(2)),
    bf("bitxor", 2, Some(2)),
    bf("bitshl", 2, Some(2)),
    bf("bitshr", 2, Some(2)),
    // Strings
    bf("length", 1, Some(1)),
    bf("strsub", 3, Some(4)),
    bf("index", 2, Some(3)),
    bf("rindex", 2, Some(3)),
    bf("strcmp", 2, Some(2)),
    bf("explode", 1, Some(2)),
    bf("string_hash", 1, Some(1)),
    // Lists and sets
    bf("is_member", 2, Some(2)),
    bf("listinsert", 2, Some(3)),
    bf("listappend", 2, Some(3)),
    bf("listdelete", 2, Some(2)),
    bf("listset", 3, Some(3)),
    bf("setadd", 2, Some(2)),
    bf("setremove", 2, Some(2)),
    // Maps
    bf("mapkeys", 1, Some(1)),
    bf("mapvalues", 1, Some(1)),
    bf("mapdelete", 2, Some(2)),
    bf("maphaskey", 2, Some(2)),
    // Objects
    bf("create", 0, Some(2)),
    bf("recycle", 1, Some(1)),
    bf("valid", 1, Some(1)),
    bf("parent", 1, Some(1)),
    bf("parents", 1, Some(1)),
    bf("children", 1, Some(1)),
    bf("chparent", 2, Some(2)),
    bf("chparents", 2, Some(2)),
    bf("max_object", 0, Some(0)),
    bf("move", 2, Some(2)),
    bf("players", 0, Some(0)),
    bf("is_player", 1, Some(1)),
    bf("set_player_flag", 2, Some(2)),
    bf("object_bytes", 1, Some(1)),
    bf("renumber", 1, Some(1)),
    bf("new_waif", 1, Some(2)),
    // Properties
    bf("properties", 1, Some(1)),
    bf("property_info", 2, Some(2)),
    bf("set_property_info", 3, Some(3)),
    bf("add_property", 4, Some(4)),
    bf("delete_property", 2, Some(2)),
    bf("clear_property", 2, Some(2)),
    bf("is_clear_property", 2, Some(2)),
    // Verbs
    bf("verbs", 1, Some(1)),
    bf("verb_info", 2, Some(2)),
    bf("set_verb_info", 3, Some(3)),
    bf("verb_args", 2, Some(2)),
    bf("set_verb_args", 3, Some(3)),
    bf("add_verb", 3, Some(3)),
    bf("delete_verb", 2, Some(2)),
    bf("verb_code", 2, Some(2)),
    bf("set_verb_code", 3, Some(3)),
    bf("disassemble", 2, Some(2)),
    // Server, tasks, connections
    bf("notify", 2, Some(2)),
    bf("buffered_output_length", 0, Some(1)),
    bf("read", 0, Some(1)),
    bf("server_version", 0, Some(0)),
    bf("server_log", 1, Some(2)),
    bf("memory_usage", 0, Some(0)),
    bf("shutdown", 0, Some(1)),
    bf("dump_database", 0, Some(0)),
    bf("time", 0, Some(0)),
    bf("ftime", 0, Some(0)),
    bf("ctime", 0, Some(1)),
    bf("raise", 1, Some(3)),
    bf("suspend", 0, Some(1)),
    bf("resume", 1, Some(2)),
    bf("queued_tasks", 0, Some(0)),
    bf("task_id", 0, Some(0)),
    bf("task_local", 0, Some(0)),
    bf("set_task_local", 1, Some(1)),
    bf("kill_task", 1, Some(1)),
    bf("ticks_left", 0, Some(0)),
    bf("seconds_left", 0, Some(0)),
    bf("callers", 0, Some(1)),
    bf("set_task_perms", 1, Some(1)),
    bf("caller_perms", 0, Some(0)),
    bf("call_function", 1, None),
    bf("function_info", 0, Some(1)),
    bf("eval", 1, Some(1)),
    bf("connected_players", 0, Some(1)),
    bf("connected_seconds", 1, Some(1)),
    bf("idle_seconds", 1, Some(1)),
    bf("connection_name", 1, Some(1)),
    bf("boot_player", 1, Some(1)),
    bf("is_wizard", 1, Some(1)),
];

/// The compile-time registry: name to id and id to descriptor.
pub struct BuiltinsRegistry {
    by_name: HashMap<&'static str, BuiltinId>,
}

impl BuiltinsRegistry {
    fn mk() -> Self {
        let mut by_name = HashMap::with_capacity(BUILTIN_DESCRIPTORS.len());
        for (i, b) in BUILTIN_DESCRIPTORS.iter().enumerate() {
            by_name.insert(b.name, BuiltinId(i as u16));
        }
        BuiltinsRegistry { by_name }
    }

    pub fn find_builtin(&self, name: &str) -> Option<BuiltinId> {
        let name = name.to_lowercase();
        self.by_name.get(name.as_str()).copied()
    }

    pub fn description_for(&self, id: BuiltinId) -> Option<&'static Builtin> {
        BUILTIN_DESCRIPTORS.get(id.0 as usize)
    }

    pub fn name_of(&self, id: BuiltinId) -> Option<&'static str> {
        self.description_for(id).map(|b| b.name)
    }

    pub fn number_of(&self) -> usize {
        BUILTIN_DESCRIPTORS.len()
    }

    pub fn names(&self) -> impl Iterator<Item = (&'static str, BuiltinId)> + '_ {
        BUILTIN_DESCRIPTORS
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name, BuiltinId(i as u16)))
    }
}

lazy_static! {
    pub static ref BUILTINS: BuiltinsRegistry = BuiltinsRegistry::mk();
}

/// Slot offset for a builtin known to exist; for kernel registration tables.
pub fn offset_for_builtin(name: &str) -> usize {
    BUILTINS
        .find_builtin(name)
        .unwrap_or_else(|| panic!("unknown builtin {name}"))
        .0 as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_caseless_and_stable() {
        let id = BUILTINS.find_builtin("NOTIFY").unwrap();
        assert_eq!(BUILTINS.name_of(id), Some("notify"));
        assert_eq!(offset_for_builtin("notify"), id.0 as usize);
        assert!(BUILTINS.find_builtin("no_such_function").is_none());
    }

    #[test]
    fn arity_descriptors() {
        let id = BUILTINS.find_builtin("tostr").unwrap();
        let d = BUILTINS.description_for(id).unwrap();
        assert_eq!(d.min_args, 0);
        assert_eq!(d.max_args, None);
    }
}
