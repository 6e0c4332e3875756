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
use barn_common::model::{ObjFlag, PropFlag, PropPerms, VerbDef, VerbFlag, WorldStateError};
use barn_common::util::verb_pattern_valid;
use barn_compiler::Program;
use barn_var::{Obj, Symbol, Var, Variant, Waif, WaifRegistry, NOTHING};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::warn;

/// The in-memory object graph, owned by the scheduler thread. All mutation runs
/// through here; connection threads never touch it.
pub struct ObjectStore {
    pub(crate) objects: HashMap<Obj, Object>,
    /// Recycled ids available for reuse, lowest first.
    pub(crate) recycled: BTreeSet<i64>,
    /// Highest id ever allocated, anonymous included.
    pub(crate) max_id: i64,
    /// Highest enumerable (non-anonymous) id ever allocated.
    pub(crate) max_enumerable: i64,
    waifs: WaifRegistry,
    /// Anonymous ids in creation order, for the per-task reachability sweep.
    anon_log: Vec<Obj>,
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        ObjectStore {
            objects: HashMap::new(),
            recycled: BTreeSet::new(),
            max_id: -1,
            max_enumerable: -1,
            waifs: WaifRegistry::default(),
            anon_log: vec![],
        }
    }

    pub fn get(&self, id: &Obj) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: &Obj) -> Option<&mut Object> {
        self.objects.get_mut(id)
    }

    fn expect(&self, id: &Obj) -> Result<&Object, WorldStateError> {
        self.objects
            .get(id)
            .ok_or(WorldStateError::ObjectNotFound(*id))
    }

    fn expect_mut(&mut self, id: &Obj) -> Result<&mut Object, WorldStateError> {
        self.objects
            .get_mut(id)
            .ok_or(WorldStateError::ObjectNotFound(*id))
    }

    pub fn valid(&self, id: &Obj) -> bool {
        self.objects.contains_key(id)
    }

    pub fn max_object(&self) -> Obj {
        Obj(self.max_enumerable)
    }

    /// The id the next non-anonymous `create` will take, without consuming it.
    pub fn next_id(&self) -> Obj {
        match self.recycled.iter().next() {
            Some(lowest) => Obj(*lowest),
            None => Obj(self.max_id + 1),
        }
    }

    pub fn is_wizard(&self, id: &Obj) -> bool {
        self.get(id).map(|o| o.is_wizard()).unwrap_or(false)
    }

    pub fn players(&self) -> Vec<Obj> {
        let mut players: Vec<Obj> = self
            .objects
            .values()
            .filter(|o| o.is_player() && !o.anonymous)
            .map(|o| o.id)
            .collect();
        players.sort();
        players
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.values()
    }

    /// Install an object verbatim; bootstrap and checkpoint restore only.
    pub fn install(&mut self, object: Object) {
        let id = object.id;
        if !object.anonymous {
            self.max_enumerable = self.max_enumerable.max(id.0);
        }
        self.max_id = self.max_id.max(id.0);
        self.recycled.remove(&id.0);
        self.objects.insert(id, object);
    }

    fn allocate_id(&mut self) -> Obj {
        if let Some(lowest) = self.recycled.iter().next().copied() {
            self.recycled.remove(&lowest);
            return Obj(lowest);
        }
        self.max_id += 1;
        Obj(self.max_id)
    }

    /// Create a new object. When `as_who` is given, each parent must be fertile
    /// (or owned by / creatable by them) and the owner's `ownership_quota`
    /// property, if it holds an integer, must permit another object.
    pub fn create(
        &mut self,
        parents: Vec<Obj>,
        owner: Obj,
        anonymous: bool,
        as_who: Option<Obj>,
    ) -> Result<Obj, WorldStateError> {
        for parent in &parents {
            let p = self.expect(parent)?;
            if let Some(who) = as_who {
                let permitted = self.is_wizard(&who) || p.owner == who || p.is_fertile();
                if !permitted {
                    return Err(WorldStateError::ObjectPermissionDenied(*parent));
                }
            }
        }

        if as_who.is_some() {
            self.charge_quota(&owner)?;
        }

        let id = self.allocate_id();
        if !anonymous {
            self.max_enumerable = self.max_enumerable.max(id.0);
        }
        let mut object = Object::new(id, parents.clone(), owner);
        object.anonymous = anonymous;

        // Inherit a clear slot for every property visible on the parents.
        for parent in &parents {
            let parent_props: Vec<(Symbol, PropertyEntry)> = self
                .expect(parent)?
                .properties
                .iter()
                .map(|(k, v)| (*k, v.clone()))
                .collect();
            for (name, entry) in parent_props {
                if object.properties.contains_key(&name) {
                    continue;
                }
                let slot_owner = if entry.perms.flags.contains(PropFlag::Chown) {
                    owner
                } else {
                    entry.perms.owner
                };
                object.properties.insert(
                    name,
                    PropertyEntry {
                        value: None,
                        perms: PropPerms {
                            owner: slot_owner,
                            flags: entry.perms.flags,
                        },
                        definer: entry.definer,
                    },
                );
            }
        }

        for parent in &parents {
            let p = self.expect_mut(parent)?;
            if !p.children.contains(&id) {
                p.children.push(id);
            }
        }
        self.objects.insert(id, object);
        if anonymous {
            self.anon_log.push(id);
        }
        Ok(id)
    }

    fn charge_quota(&mut self, owner: &Obj) -> Result<(), WorldStateError> {
        let quota_name = Symbol::mk("ownership_quota");
        if !self.valid(owner) {
            return Ok(());
        }
        let Ok((value, _, _)) = self.resolve_property(owner, quota_name) else {
            return Ok(());
        };
        let Variant::Int(q) = value.variant() else {
            return Ok(());
        };
        if *q <= 0 {
            return Err(WorldStateError::QuotaExceeded(*owner));
        }
        self.set_property(owner, quota_name, barn_var::v_int(q - 1))?;
        Ok(())
    }

    /// Destroy an object: contents dumped to NOTHING, children spliced onto the
    /// object's own parents, waifs of this class invalidated, id queued for reuse.
    pub fn recycle(&mut self, id: &Obj) -> Result<(), WorldStateError> {
        let object = self.expect(id)?.clone();

        let invalidated = self.waifs.invalidate_class(id);
        if invalidated > 0 {
            warn!(class = %id, count = invalidated, "invalidated waifs of recycled class");
        }

        for content in &object.contents {
            if let Some(c) = self.objects.get_mut(content) {
                c.location = NOTHING;
            }
        }
        if let Some(loc) = self.objects.get_mut(&object.location) {
            loc.contents.retain(|o| o != id);
        }
        for parent in &object.parents {
            if let Some(p) = self.objects.get_mut(parent) {
                p.children.retain(|o| o != id);
            }
        }

        // Children are spliced onto the recycled object's parents.
        let children = object.children.clone();
        for child in &children {
            let Some(c) = self.objects.get_mut(child) else {
                continue;
            };
            let mut new_parents: Vec<Obj> = vec![];
            for p in &c.parents {
                if p == id {
                    for gp in &object.parents {
                        if !new_parents.contains(gp) {
                            new_parents.push(*gp);
                        }
                    }
                } else if !new_parents.contains(p) {
                    new_parents.push(*p);
                }
            }
            c.parents = new_parents.clone();
            for gp in &new_parents {
                if let Some(p) = self.objects.get_mut(gp) {
                    if !p.children.contains(child) {
                        p.children.push(*child);
                    }
                }
            }
        }

        self.objects.remove(id);
        self.recycled.insert(id.0);
        self.anon_log.retain(|o| o != id);

        // Former children keep inherited slots from surviving ancestors only.
        for child in &children {
            self.refresh_inherited_slots(child);
        }
        Ok(())
    }

    /// Move an object to a new location (possibly NOTHING). The `accept` hook and
    /// permission checks happen in the kernel; here only the cycle check and the
    /// contents surgery.
    pub fn move_object(&mut self, what: &Obj, dest: &Obj) -> Result<(), WorldStateError> {
        self.expect(what)?;
        if !dest.is_nothing() {
            self.expect(dest)?;
            // Walk up from dest: moving into yourself or your own contents is
            // recursive.
            let mut cursor = *dest;
            let mut seen = HashSet::new();
            while !cursor.is_nothing() && seen.insert(cursor) {
                if cursor == *what {
                    return Err(WorldStateError::RecursiveMove(*what));
                }
                cursor = self
                    .get(&cursor)
                    .map(|o| o.location)
                    .unwrap_or(NOTHING);
            }
        }

        let old_location = self.expect(what)?.location;
        if let Some(old) = self.objects.get_mut(&old_location) {
            old.contents.retain(|o| o != what);
        }
        if !dest.is_nothing() {
            let d = self.expect_mut(dest)?;
            if !d.contents.contains(what) {
                d.contents.push(*what);
            }
        }
        self.expect_mut(what)?.location = *dest;
        Ok(())
    }

    /// All ancestors of `obj` in breadth-first, parents-left-to-right order.
    /// Cycles are broken by the visited set.
    pub fn ancestors_bfs(&self, obj: &Obj, include_self: bool) -> Vec<Obj> {
        let mut result = vec![];
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(*obj);
        visited.insert(*obj);
        while let Some(o) = queue.pop_front() {
            if o != *obj || include_self {
                result.push(o);
            }
            let Some(object) = self.get(&o) else {
                continue;
            };
            for parent in &object.parents {
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        result
    }

    /// All transitive children, breadth-first.
    pub fn descendants(&self, obj: &Obj) -> Vec<Obj> {
        let mut result = vec![];
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(*obj);
        if let Some(o) = self.get(obj) {
            for c in &o.children {
                if visited.insert(*c) {
                    queue.push_back(*c);
                }
            }
        }
        while let Some(o) = queue.pop_front() {
            result.push(o);
            if let Some(object) = self.get(&o) {
                for c in &object.children {
                    if visited.insert(*c) {
                        queue.push_back(*c);
                    }
                }
            }
        }
        result
    }

    // ---- properties ----

    /// Breadth-first property resolution: the first non-clear slot along the
    /// ancestor order wins. Returns the value, the defining object, and the
    /// permission bits of the slot on `obj` itself.
    pub fn resolve_property(
        &self,
        obj: &Obj,
        name: Symbol,
    ) -> Result<(Var, Obj, PropPerms), WorldStateError> {
        let o = self.expect(obj)?;
        let Some(local) = o.properties.get(&name) else {
            return Err(WorldStateError::PropertyNotFound(*obj, name.to_string()));
        };
        let local_perms = local.perms;
        for ancestor in self.ancestors_bfs(obj, true) {
            let Some(object) = self.get(&ancestor) else {
                continue;
            };
            if let Some(entry) = object.properties.get(&name) {
                if let Some(value) = &entry.value {
                    return Ok((value.clone(), entry.definer, local_perms));
                }
            }
        }
        // Every slot along the chain is clear.
        Err(WorldStateError::PropertyNotFound(*obj, name.to_string()))
    }

    /// Write a property value on `obj` itself, clearing the clear bit.
    pub fn set_property(
        &mut self,
        obj: &Obj,
        name: Symbol,
        value: Var,
    ) -> Result<(), WorldStateError> {
        let o = self.expect_mut(obj)?;
        let Some(entry) = o.properties.get_mut(&name) else {
            return Err(WorldStateError::PropertyNotFound(*obj, name.to_string()));
        };
        entry.value = Some(value);
        Ok(())
    }

    /// Define a new property on `obj` and push clear slots to all descendants.
    pub fn define_property(
        &mut self,
        obj: &Obj,
        name: Symbol,
        owner: Obj,
        flags: barn_common::util::BitEnum<PropFlag>,
        value: Option<Var>,
    ) -> Result<(), WorldStateError> {
        // A definition may not collide with one visible anywhere in the family.
        if self.expect(obj)?.properties.contains_key(&name) {
            return Err(WorldStateError::DuplicatePropertyDefinition(
                *obj,
                name.to_string(),
            ));
        }
        for descendant in self.descendants(obj) {
            if let Some(d) = self.get(&descendant) {
                if d.properties.contains_key(&name) {
                    return Err(WorldStateError::DuplicatePropertyDefinition(
                        descendant,
                        name.to_string(),
                    ));
                }
            }
        }

        let definer = *obj;
        self.expect_mut(obj)?.properties.insert(
            name,
            PropertyEntry {
                value: Some(value.unwrap_or_else(|| barn_var::v_int(0))),
                perms: PropPerms { owner, flags },
                definer,
            },
        );
        for descendant in self.descendants(obj) {
            let descendant_owner = self.get(&descendant).map(|d| d.owner).unwrap_or(owner);
            let slot_owner = if flags.contains(PropFlag::Chown) {
                descendant_owner
            } else {
                owner
            };
            if let Some(d) = self.objects.get_mut(&descendant) {
                d.properties.insert(
                    name,
                    PropertyEntry {
                        value: None,
                        perms: PropPerms {
                            owner: slot_owner,
                            flags,
                        },
                        definer,
                    },
                );
            }
        }
        Ok(())
    }

    /// Remove a property definition from its definer and every descendant.
    pub fn delete_property(&mut self, obj: &Obj, name: Symbol) -> Result<(), WorldStateError> {
        let o = self.expect(obj)?;
        let Some(entry) = o.properties.get(&name) else {
            return Err(WorldStateError::PropertyNotFound(*obj, name.to_string()));
        };
        if entry.definer != *obj {
            // Deletion happens at the definition, not at an inheriting object.
            return Err(WorldStateError::PropertyNotFound(*obj, name.to_string()));
        }
        self.expect_mut(obj)?.properties.shift_remove(&name);
        for descendant in self.descendants(obj) {
            if let Some(d) = self.objects.get_mut(&descendant) {
                d.properties.shift_remove(&name);
            }
        }
        Ok(())
    }

    /// Set the clear bit on a slot. A cleared definition resolves through the
    /// object's other ancestors; when every slot along the chain is clear the
    /// property reads as not-found.
    pub fn clear_property(&mut self, obj: &Obj, name: Symbol) -> Result<(), WorldStateError> {
        let o = self.expect_mut(obj)?;
        let Some(entry) = o.properties.get_mut(&name) else {
            return Err(WorldStateError::PropertyNotFound(*obj, name.to_string()));
        };
        entry.value = None;
        Ok(())
    }

    pub fn is_clear_property(&self, obj: &Obj, name: Symbol) -> Result<bool, WorldStateError> {
        let o = self.expect(obj)?;
        let Some(entry) = o.properties.get(&name) else {
            return Err(WorldStateError::PropertyNotFound(*obj, name.to_string()));
        };
        Ok(entry.value.is_none())
    }

    pub fn property_entry(&self, obj: &Obj, name: Symbol) -> Option<&PropertyEntry> {
        self.get(obj).and_then(|o| o.properties.get(&name))
    }

    pub fn property_entry_mut(&mut self, obj: &Obj, name: Symbol) -> Option<&mut PropertyEntry> {
        self.get_mut(obj).and_then(|o| o.properties.get_mut(&name))
    }

    /// Recompute inherited slots for `obj` and its descendants after a parentage
    /// change: slots from departed ancestors go away, slots for newly visible
    /// definitions arrive clear.
    fn refresh_inherited_slots(&mut self, obj: &Obj) {
        let mut family = vec![*obj];
        family.extend(self.descendants(obj));
        for member in family {
            let ancestors: HashSet<Obj> =
                self.ancestors_bfs(&member, false).into_iter().collect();
            // Definitions visible from the new ancestor set.
            let mut visible: Vec<(Symbol, PropertyEntry)> = vec![];
            for ancestor in &ancestors {
                if let Some(a) = self.get(ancestor) {
                    for (name, entry) in &a.properties {
                        if entry.definer == *ancestor {
                            visible.push((*name, entry.clone()));
                        }
                    }
                }
            }
            let member_owner = self.get(&member).map(|o| o.owner).unwrap_or(NOTHING);
            let Some(o) = self.objects.get_mut(&member) else {
                continue;
            };
            o.properties
                .retain(|_, entry| entry.definer == member || ancestors.contains(&entry.definer));
            for (name, entry) in visible {
                if o.properties.contains_key(&name) {
                    continue;
                }
                let slot_owner = if entry.perms.flags.contains(PropFlag::Chown) {
                    member_owner
                } else {
                    entry.perms.owner
                };
                o.properties.insert(
                    name,
                    PropertyEntry {
                        value: None,
                        perms: PropPerms {
                            owner: slot_owner,
                            flags: entry.perms.flags,
                        },
                        definer: entry.definer,
                    },
                );
            }
        }
    }

    /// Change an object's parents, with cycle detection and slot recomputation.
    pub fn chparents(&mut self, obj: &Obj, new_parents: Vec<Obj>) -> Result<(), WorldStateError> {
        self.expect(obj)?;
        for parent in &new_parents {
            self.expect(parent)?;
            if *parent == *obj || self.ancestors_bfs(parent, true).contains(obj) {
                return Err(WorldStateError::RecursiveMove(*obj));
            }
        }
        let old_parents = self.expect(obj)?.parents.clone();
        for p in &old_parents {
            if let Some(po) = self.objects.get_mut(p) {
                po.children.retain(|c| c != obj);
            }
        }
        for p in &new_parents {
            if let Some(po) = self.objects.get_mut(p) {
                if !po.children.contains(obj) {
                    po.children.push(*obj);
                }
            }
        }
        self.expect_mut(obj)?.parents = new_parents;
        self.refresh_inherited_slots(obj);
        Ok(())
    }

    // ---- verbs ----

    /// BFS through `obj` and its ancestors for the first executable verb matching
    /// `name`. This is the lookup for explicit `obj:name()` calls; the arg spec
    /// is ignored.
    pub fn find_callable_verb(&self, obj: &Obj, name: Symbol) -> Option<(Obj, usize)> {
        for ancestor in self.ancestors_bfs(obj, true) {
            let object = self.get(&ancestor)?;
            for (i, verb) in object.verbs.iter().enumerate() {
                if verb.def.flags.contains(VerbFlag::Exec) && verb.def.matches_name(name) {
                    return Some((ancestor, i));
                }
            }
        }
        None
    }

    /// Like `find_callable_verb`, but starting strictly above `definer` in the
    /// ancestor ordering; this is `pass()`.
    pub fn find_pass_verb(&self, definer: &Obj, name: Symbol) -> Option<(Obj, usize)> {
        let Some(d) = self.get(definer) else {
            return None;
        };
        let mut visited: HashSet<Obj> = HashSet::new();
        visited.insert(*definer);
        let mut queue: VecDeque<Obj> = d.parents.iter().copied().collect();
        for p in &d.parents {
            visited.insert(*p);
        }
        while let Some(o) = queue.pop_front() {
            if let Some(object) = self.get(&o) {
                for (i, verb) in object.verbs.iter().enumerate() {
                    if verb.def.flags.contains(VerbFlag::Exec) && verb.def.matches_name(name) {
                        return Some((o, i));
                    }
                }
                for p in &object.parents {
                    if visited.insert(*p) {
                        queue.push_back(*p);
                    }
                }
            }
        }
        None
    }

    /// Index of a verb on `obj` itself (no inheritance), by name.
    pub fn own_verb_index(&self, obj: &Obj, name: Symbol) -> Option<usize> {
        self.get(obj)?
            .verbs
            .iter()
            .position(|v| v.def.matches_name(name))
    }

    pub fn verb(&self, obj: &Obj, index: usize) -> Option<&Verb> {
        self.get(obj)?.verbs.get(index)
    }

    pub fn verb_mut(&mut self, obj: &Obj, index: usize) -> Option<&mut Verb> {
        self.get_mut(obj)?.verbs.get_mut(index)
    }

    pub fn add_verb(
        &mut self,
        obj: &Obj,
        def: VerbDef,
        source: String,
    ) -> Result<usize, WorldStateError> {
        for pattern in def.names.split(' ') {
            if pattern.is_empty() || !verb_pattern_valid(pattern) {
                return Err(WorldStateError::InvalidVerbName(pattern.to_string()));
            }
        }
        let o = self.expect_mut(obj)?;
        o.verbs.push(Verb {
            def,
            source,
            program: None,
        });
        Ok(o.verbs.len() - 1)
    }

    pub fn delete_verb(&mut self, obj: &Obj, index: usize) -> Result<(), WorldStateError> {
        let o = self.expect_mut(obj)?;
        if index >= o.verbs.len() {
            return Err(WorldStateError::VerbNotFound(*obj, index.to_string()));
        }
        o.verbs.remove(index);
        Ok(())
    }

    /// Install the compiled program for a verb; the compile-on-first-call cache.
    pub fn cache_verb_program(&mut self, obj: &Obj, index: usize, program: Program) {
        if let Some(verb) = self.verb_mut(obj, index) {
            verb.program = Some(program);
        }
    }

    // ---- waifs and anonymous objects ----

    pub fn register_waif(&mut self, waif: &Waif) {
        self.waifs.register(waif);
    }

    /// Creation-log length; the scheduler records this at task start.
    pub fn anon_watermark(&self) -> usize {
        self.anon_log.len()
    }

    /// Recycle anonymous objects created at or after `watermark` that are not in
    /// `reachable`. Survivors leave the log; they live until explicitly recycled.
    pub fn sweep_anonymous(&mut self, watermark: usize, reachable: &HashSet<Obj>) -> usize {
        if watermark >= self.anon_log.len() {
            return 0;
        }
        let candidates: Vec<Obj> = self.anon_log.split_off(watermark);
        let mut collected = 0;
        for id in candidates {
            if reachable.contains(&id) {
                continue;
            }
            if self.valid(&id) && self.recycle(&id).is_ok() {
                collected += 1;
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barn_common::model::VerbArgsSpec;
    use barn_common::util::BitEnum;
    use barn_var::{v_int, v_str};

    fn store_with_root() -> (ObjectStore, Obj) {
        let mut store = ObjectStore::new();
        let root = store.create(vec![], Obj(0), false, None).unwrap();
        (store, root)
    }

    fn rw() -> BitEnum<PropFlag> {
        PropFlag::rw()
    }

    #[test]
    fn id_allocation_and_reuse() {
        let (mut store, root) = store_with_root();
        assert_eq!(root, Obj(0));
        let a = store.create(vec![root], Obj(0), false, None).unwrap();
        let b = store.create(vec![root], Obj(0), false, None).unwrap();
        assert_eq!((a, b), (Obj(1), Obj(2)));
        assert_eq!(store.max_object(), Obj(2));
        store.recycle(&a).unwrap();
        assert!(!store.valid(&a));
        assert_eq!(store.next_id(), a);
        let c = store.create(vec![root], Obj(0), false, None).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn property_resolution_first_non_clear_wins() {
        // A(parents = B, C); B.x = 200; C.x = 100; D carries an unrelated x.
        let mut store = ObjectStore::new();
        let b = store.create(vec![], Obj(0), false, None).unwrap();
        let c = store.create(vec![], Obj(0), false, None).unwrap();
        let d = store.create(vec![], Obj(0), false, None).unwrap();
        let x = Symbol::mk("x");
        store
            .define_property(&b, x, Obj(0), rw(), Some(v_int(200)))
            .unwrap();
        store
            .define_property(&c, x, Obj(0), rw(), Some(v_int(100)))
            .unwrap();
        store
            .define_property(&d, x, Obj(0), rw(), Some(v_int(999)))
            .unwrap();
        let a = store.create(vec![b, c], Obj(0), false, None).unwrap();

        // Left-to-right breadth-first: B's definition wins.
        let (value, definer, _) = store.resolve_property(&a, x).unwrap();
        assert_eq!(value, v_int(200));
        assert_eq!(definer, b);

        // Clearing B.x exposes C's definition.
        store.clear_property(&b, x).unwrap();
        assert_eq!(store.resolve_property(&a, x).unwrap().0, v_int(100));

        // With both parents clear, the read fails outright.
        store.clear_property(&c, x).unwrap();
        assert!(store.resolve_property(&a, x).is_err());
    }

    #[test]
    fn clear_slot_inherits_and_propnf_when_all_clear() {
        let mut store = ObjectStore::new();
        let parent = store.create(vec![], Obj(0), false, None).unwrap();
        let x = Symbol::mk("x");
        store
            .define_property(&parent, x, Obj(0), rw(), Some(v_int(7)))
            .unwrap();
        let child = store.create(vec![parent], Obj(0), false, None).unwrap();

        // The child's slot is clear and resolves to the parent value.
        assert!(store.is_clear_property(&child, x).unwrap());
        assert_eq!(store.resolve_property(&child, x).unwrap().0, v_int(7));

        // A local write shadows; clearing restores inheritance.
        store.set_property(&child, x, v_int(8)).unwrap();
        assert!(!store.is_clear_property(&child, x).unwrap());
        assert_eq!(store.resolve_property(&child, x).unwrap().0, v_int(8));
        store.clear_property(&child, x).unwrap();
        assert_eq!(store.resolve_property(&child, x).unwrap().0, v_int(7));

        // Unknown property is E_PROPNF at the world-state layer.
        assert!(store
            .resolve_property(&child, Symbol::mk("nope"))
            .is_err());
    }

    #[test]
    fn duplicate_definitions_refused() {
        let (mut store, root) = store_with_root();
        let child = store.create(vec![root], Obj(0), false, None).unwrap();
        let x = Symbol::mk("x");
        store
            .define_property(&root, x, Obj(0), rw(), Some(v_int(1)))
            .unwrap();
        // Redefinition on the child collides with the inherited slot.
        assert!(store
            .define_property(&child, x, Obj(0), rw(), Some(v_int(2)))
            .is_err());
        // And a child definition blocks a new ancestor definition of that name.
        let y = Symbol::mk("y");
        store
            .define_property(&child, y, Obj(0), rw(), Some(v_int(3)))
            .unwrap();
        assert!(store
            .define_property(&root, y, Obj(0), rw(), Some(v_int(4)))
            .is_err());
    }

    #[test]
    fn delete_property_reaches_descendants() {
        let (mut store, root) = store_with_root();
        let child = store.create(vec![root], Obj(0), false, None).unwrap();
        let x = Symbol::mk("x");
        store
            .define_property(&root, x, Obj(0), rw(), Some(v_int(1)))
            .unwrap();
        assert!(store.property_entry(&child, x).is_some());
        store.delete_property(&root, x).unwrap();
        assert!(store.property_entry(&child, x).is_none());
        assert!(store.property_entry(&root, x).is_none());
    }

    #[test]
    fn move_and_recursive_move() {
        let (mut store, root) = store_with_root();
        let room = store.create(vec![root], Obj(0), false, None).unwrap();
        let box_ = store.create(vec![root], Obj(0), false, None).unwrap();
        let ball = store.create(vec![root], Obj(0), false, None).unwrap();

        store.move_object(&box_, &room).unwrap();
        store.move_object(&ball, &box_).unwrap();
        assert_eq!(store.get(&ball).unwrap().location, box_);
        assert!(store.get(&box_).unwrap().contents.contains(&ball));

        // Moving the box into the ball it contains is recursive; so is self.
        assert!(store.move_object(&box_, &ball).is_err());
        assert!(store.move_object(&box_, &box_).is_err());

        store.move_object(&ball, &NOTHING).unwrap();
        assert_eq!(store.get(&ball).unwrap().location, NOTHING);
        assert!(!store.get(&box_).unwrap().contents.contains(&ball));
    }

    #[test]
    fn recycle_splices_children_and_contents() {
        let (mut store, root) = store_with_root();
        let middle = store.create(vec![root], Obj(0), false, None).unwrap();
        let leaf = store.create(vec![middle], Obj(0), false, None).unwrap();
        let thing = store.create(vec![root], Obj(0), false, None).unwrap();
        store.move_object(&thing, &middle).unwrap();

        let x = Symbol::mk("x");
        store
            .define_property(&middle, x, Obj(0), rw(), Some(v_int(5)))
            .unwrap();
        assert!(store.property_entry(&leaf, x).is_some());

        store.recycle(&middle).unwrap();
        assert!(!store.valid(&middle));
        // The leaf is reparented onto root, and the middle's property slots are
        // gone from it.
        assert_eq!(store.get(&leaf).unwrap().parents, vec![root]);
        assert!(store.get(&root).unwrap().children.contains(&leaf));
        assert!(store.property_entry(&leaf, x).is_none());
        // Contents dumped to NOTHING.
        assert_eq!(store.get(&thing).unwrap().location, NOTHING);
    }

    #[test]
    fn fertile_and_quota_checks() {
        let mut store = ObjectStore::new();
        let wizard = store.create(vec![], Obj(0), false, None).unwrap();
        store.get_mut(&wizard).unwrap().flags.set(ObjFlag::Wizard);
        let parent = store.create(vec![], wizard, false, None).unwrap();
        let pleb = store.create(vec![], wizard, false, None).unwrap();

        // Non-fertile parent refuses a stranger.
        assert!(store
            .create(vec![parent], pleb, false, Some(pleb))
            .is_err());
        store.get_mut(&parent).unwrap().flags.set(ObjFlag::Fertile);
        assert!(store
            .create(vec![parent], pleb, false, Some(pleb))
            .is_ok());

        // Quota runs out.
        store
            .define_property(&pleb, Symbol::mk("ownership_quota"), wizard, rw(), Some(v_int(1)))
            .unwrap();
        assert!(store
            .create(vec![parent], pleb, false, Some(pleb))
            .is_ok());
        let err = store
            .create(vec![parent], pleb, false, Some(pleb))
            .unwrap_err();
        assert!(matches!(err, WorldStateError::QuotaExceeded(_)));
    }

    #[test]
    fn verb_lookup_inherits_and_passes() {
        let (mut store, root) = store_with_root();
        let child = store.create(vec![root], Obj(0), false, None).unwrap();
        let def = VerbDef {
            names: "look l*ook".into(),
            owner: Obj(0),
            flags: VerbFlag::rxd(),
            args: VerbArgsSpec::this_none_this(),
        };
        store.add_verb(&root, def.clone(), "return 1;".into()).unwrap();
        let (definer, idx) = store
            .find_callable_verb(&child, Symbol::mk("look"))
            .unwrap();
        assert_eq!((definer, idx), (root, 0));

        // Overriding on the child shadows; pass() reaches the root's copy.
        store.add_verb(&child, def, "return 2;".into()).unwrap();
        let (definer, _) = store
            .find_callable_verb(&child, Symbol::mk("look"))
            .unwrap();
        assert_eq!(definer, child);
        let (pass_definer, _) = store
            .find_pass_verb(&child, Symbol::mk("look"))
            .unwrap();
        assert_eq!(pass_definer, root);
    }

    #[test]
    fn non_executable_verbs_are_invisible_to_calls() {
        let (mut store, root) = store_with_root();
        let def = VerbDef {
            names: "helper".into(),
            owner: Obj(0),
            flags: VerbFlag::parse_str("r").unwrap(),
            args: VerbArgsSpec::this_none_this(),
        };
        store.add_verb(&root, def, String::new()).unwrap();
        assert!(store
            .find_callable_verb(&root, Symbol::mk("helper"))
            .is_none());
    }

    #[test]
    fn bad_verb_patterns_rejected() {
        let (mut store, root) = store_with_root();
        let def = VerbDef {
            names: "a*b*c".into(),
            owner: Obj(0),
            flags: VerbFlag::rxd(),
            args: VerbArgsSpec::this_none_this(),
        };
        assert!(store.add_verb(&root, def, String::new()).is_err());
    }

    #[test]
    fn anonymous_objects_skip_enumeration_and_sweep() {
        let (mut store, root) = store_with_root();
        let mark = store.anon_watermark();
        let anon = store.create(vec![root], Obj(0), true, None).unwrap();
        assert!(store.valid(&anon));
        // max_object ignores the anonymous id.
        assert_eq!(store.max_object(), root);

        let mut reachable = HashSet::new();
        assert_eq!(store.sweep_anonymous(mark, &reachable), 1);
        assert!(!store.valid(&anon));

        // A reachable anonymous object survives the sweep.
        let mark = store.anon_watermark();
        let kept = store.create(vec![root], Obj(0), true, None).unwrap();
        reachable.insert(kept);
        assert_eq!(store.sweep_anonymous(mark, &reachable), 0);
        assert!(store.valid(&kept));
    }

    #[test]
    fn waif_invalidated_on_class_recycle() {
        let (mut store, root) = store_with_root();
        let class = store.create(vec![root], Obj(0), false, None).unwrap();
        let waif = Waif::mk(class, Obj(0));
        store.register_waif(&waif);
        waif.set_property(Symbol::mk("hp"), v_str("full")).unwrap();
        store.recycle(&class).unwrap();
        assert!(waif.is_invalidated());
        assert!(waif.get_property(Symbol::mk("hp")).is_err());
    }

    #[test]
    fn chparents_cycle_detection() {
        let (mut store, root) = store_with_root();
        let child = store.create(vec![root], Obj(0), false, None).unwrap();
        assert!(store.chparents(&root, vec![child]).is_err());
        assert!(store.chparents(&child, vec![child]).is_err());
    }
}
