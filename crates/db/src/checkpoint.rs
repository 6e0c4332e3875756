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

use crate::object::{Object, PropertyEntry, Verb};
use crate::store::ObjectStore;
use barn_common::model::{ObjFlag, PropPerms, VerbDef};
use barn_common::util::BitEnum;
use barn_var::{Obj, Symbol, Var};
use bincode::{Decode, Encode};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Encode, Decode)]
struct PropertySnapshot {
    name: Symbol,
    value: Option<Var>,
    perms: PropPerms,
    definer: Obj,
}

#[derive(Encode, Decode)]
struct VerbSnapshot {
    def: VerbDef,
    source: String,
}

#[derive(Encode, Decode)]
struct ObjectSnapshot {
    id: Obj,
    name: String,
    owner: Obj,
    flags: BitEnum<ObjFlag>,
    location: Obj,
    contents: Vec<Obj>,
    parents: Vec<Obj>,
    children: Vec<Obj>,
    properties: Vec<PropertySnapshot>,
    verbs: Vec<VerbSnapshot>,
    anonymous: bool,
}

/// A checkpoint image: the object graph plus the scheduler's suspended-task
/// state, which the kernel serializes separately and treats as opaque here.
/// Compiled programs are not captured; verbs recompile lazily after restore.
#[derive(Encode, Decode)]
pub struct Snapshot {
    objects: Vec<ObjectSnapshot>,
    recycled: Vec<i64>,
    max_id: i64,
    max_enumerable: i64,
    pub tasks: Vec<u8>,
}

impl Snapshot {
    /// Capture the store. Objects in `exclude` (anonymous ids unreachable from
    /// any suspended task) are left out of the image.
    pub fn capture(store: &ObjectStore, exclude: &HashSet<Obj>, tasks: Vec<u8>) -> Snapshot {
        let mut objects: Vec<ObjectSnapshot> = store
            .objects
            .values()
            .filter(|o| !exclude.contains(&o.id))
            .map(|o| ObjectSnapshot {
                id: o.id,
                name: o.name.clone(),
                owner: o.owner,
                flags: o.flags,
                location: o.location,
                contents: o.contents.clone(),
                parents: o.parents.clone(),
                children: o.children.clone(),
                properties: o
                    .properties
                    .iter()
                    .map(|(name, e)| PropertySnapshot {
                        name: *name,
                        value: e.value.clone(),
                        perms: e.perms,
                        definer: e.definer,
                    })
                    .collect(),
                verbs: o
                    .verbs
                    .iter()
                    .map(|v| VerbSnapshot {
                        def: v.def.clone(),
                        source: v.source.clone(),
                    })
                    .collect(),
                anonymous: o.anonymous,
            })
            .collect();
        objects.sort_by_key(|o| o.id);
        Snapshot {
            objects,
            recycled: store.recycled.iter().copied().collect(),
            max_id: store.max_id,
            max_enumerable: store.max_enumerable,
            tasks,
        }
    }

    /// Rebuild a store from the image; returns the store and the opaque task
    /// blob for the kernel.
    pub fn restore(self) -> (ObjectStore, Vec<u8>) {
        let mut store = ObjectStore::new();
        for snap in self.objects {
            let mut object = Object::new(snap.id, snap.parents, snap.owner);
            object.name = snap.name;
            object.flags = snap.flags;
            object.location = snap.location;
            object.contents = snap.contents;
            object.children = snap.children;
            object.anonymous = snap.anonymous;
            for p in snap.properties {
                object.properties.insert(
                    p.name,
                    PropertyEntry {
                        value: p.value,
                        perms: p.perms,
                        definer: p.definer,
                    },
                );
            }
            for v in snap.verbs {
                object.verbs.push(Verb {
                    def: v.def,
                    source: v.source,
                    program: None,
                });
            }
            store.install(object);
        }
        store.recycled = self.recycled.into_iter().collect();
        store.max_id = self.max_id;
        store.max_enumerable = self.max_enumerable;
        (store, self.tasks)
    }
}

/// Write a checkpoint atomically: serialize to `<path>.in-progress`, fsync, then
/// rename over `path`.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> std::io::Result<()> {
    let bytes = bincode::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let tmp_path = path.with_extension("in-progress");
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    info!(?path, bytes = bytes.len(), "wrote checkpoint");
    Ok(())
}

pub fn read_snapshot(path: &Path) -> std::io::Result<Snapshot> {
    let bytes = std::fs::read(path)?;
    let (snapshot, _) = bincode::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use barn_common::model::{PropFlag, VerbArgsSpec, VerbFlag};
    use barn_var::v_int;

    #[test]
    fn round_trip() {
        let mut store = ObjectStore::new();
        let root = store.create(vec![], Obj(0), false, None).unwrap();
        let child = store.create(vec![root], Obj(0), false, None).unwrap();
        store.get_mut(&root).unwrap().name = "Root Class".into();
        store
            .define_property(
                &root,
                Symbol::mk("size"),
                Obj(0),
                PropFlag::rw(),
                Some(v_int(42)),
            )
            .unwrap();
        store
            .add_verb(
                &root,
                VerbDef {
                    names: "look".into(),
                    owner: Obj(0),
                    flags: VerbFlag::rxd(),
                    args: VerbArgsSpec::this_none_this(),
                },
                "return this.size;".into(),
            )
            .unwrap();
        store.recycle(&child).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.db");
        let snapshot = Snapshot::capture(&store, &HashSet::new(), vec![1, 2, 3]);
        write_snapshot(&path, &snapshot).unwrap();

        let (restored, tasks) = read_snapshot(&path).unwrap().restore();
        assert_eq!(tasks, vec![1, 2, 3]);
        assert_eq!(restored.max_object(), store.max_object());
        assert_eq!(restored.next_id(), child);
        assert_eq!(restored.get(&root).unwrap().name, "Root Class");
        assert_eq!(
            restored
                .resolve_property(&root, Symbol::mk("size"))
                .unwrap()
                .0,
            v_int(42)
        );
        let verb = restored.verb(&root, 0).unwrap();
        assert_eq!(verb.source, "return this.size;");
        assert!(verb.program.is_none());
    }

    #[test]
    fn excluded_objects_are_dropped() {
        let mut store = ObjectStore::new();
        let root = store.create(vec![], Obj(0), false, None).unwrap();
        let anon = store.create(vec![root], Obj(0), true, None).unwrap();
        let mut exclude = HashSet::new();
        exclude.insert(anon);
        let snapshot = Snapshot::capture(&store, &exclude, vec![]);
        let (restored, _) = snapshot.restore();
        assert!(restored.valid(&root));
        assert!(!restored.valid(&anon));
    }
}
