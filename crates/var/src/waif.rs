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

use crate::var::Var;
use crate::ErrorCode::E_INVIND;
use crate::{Error, Obj, Symbol, NOTHING};
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, Weak};

/// A waif: a lightweight instance of a class object. It holds its own property
/// values and delegates verb (and default property) resolution to the class.
/// Identity is reference identity; copies alias the same instance.
/// When the class object is recycled every waif of that class is invalidated:
/// its class becomes NOTHING and property access raises E_INVIND.
#[derive(Clone)]
#[repr(transparent)]
pub struct Waif(Arc<WaifInner>);

pub struct WaifInner {
    state: Mutex<WaifState>,
}

struct WaifState {
    class: Obj,
    owner: Obj,
    properties: HashMap<Symbol, Var>,
}

impl Waif {
    pub fn mk(class: Obj, owner: Obj) -> Self {
        Waif(Arc::new(WaifInner {
            state: Mutex::new(WaifState {
                class,
                owner,
                properties: HashMap::new(),
            }),
        }))
    }

    /// The class object, or E_INVIND if the class has been recycled out from
    /// under us.
    pub fn class(&self) -> Result<Obj, Error> {
        let state = self.0.state.lock().unwrap();
        if state.class == NOTHING {
            return Err(E_INVIND.msg("waif class has been recycled"));
        }
        Ok(state.class)
    }

    pub fn owner(&self) -> Obj {
        self.0.state.lock().unwrap().owner
    }

    pub fn is_invalidated(&self) -> bool {
        self.0.state.lock().unwrap().class == NOTHING
    }

    pub fn get_property(&self, name: Symbol) -> Result<Option<Var>, Error> {
        let state = self.0.state.lock().unwrap();
        if state.class == NOTHING {
            return Err(E_INVIND.msg("waif class has been recycled"));
        }
        Ok(state.properties.get(&name).cloned())
    }

    pub fn set_property(&self, name: Symbol, value: Var) -> Result<(), Error> {
        let mut state = self.0.state.lock().unwrap();
        if state.class == NOTHING {
            return Err(E_INVIND.msg("waif class has been recycled"));
        }
        state.properties.insert(name, value);
        Ok(())
    }

    /// Sever the waif from its (recycled) class.
    pub fn invalidate(&self) {
        let mut state = self.0.state.lock().unwrap();
        state.class = NOTHING;
        state.properties.clear();
    }

    /// A stable token for this instance, for cycle detection when walking
    /// value graphs (waifs are the only values that can alias).
    pub fn identity(&self) -> usize {
        self.ptr() as usize
    }

    /// Snapshot of the current property values.
    pub fn property_values(&self) -> Vec<Var> {
        self.0
            .state
            .lock()
            .unwrap()
            .properties
            .values()
            .cloned()
            .collect()
    }

    fn ptr(&self) -> *const WaifInner {
        Arc::as_ptr(&self.0)
    }
}

impl PartialEq for Waif {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Waif {}

impl PartialOrd for Waif {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waif {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ptr().cmp(&other.ptr())
    }
}

impl Hash for Waif {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.ptr(), state);
    }
}

impl Debug for Waif {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.lock().unwrap();
        write!(f, "Waif(class = {}, owner = {})", state.class, state.owner)
    }
}

// Persistence flattens the waif to its state; reference identity does not survive a
// checkpoint round trip.
impl Encode for Waif {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        let state = self.0.state.lock().unwrap();
        state.class.encode(encoder)?;
        state.owner.encode(encoder)?;
        (state.properties.len() as u64).encode(encoder)?;
        for (k, v) in state.properties.iter() {
            k.encode(encoder)?;
            v.encode(encoder)?;
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for Waif {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let class = Obj::decode(decoder)?;
        let owner = Obj::decode(decoder)?;
        let len = u64::decode(decoder)?;
        let mut properties = HashMap::with_capacity(len as usize);
        for _ in 0..len {
            let k = Symbol::decode(decoder)?;
            let v = Var::decode(decoder)?;
            properties.insert(k, v);
        }
        Ok(Waif(Arc::new(WaifInner {
            state: Mutex::new(WaifState {
                class,
                owner,
                properties,
            }),
        })))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Waif {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Self::decode(decoder)
    }
}

/// A registry of live waifs per class, held by the object store so that recycling a
/// class can invalidate its instances. Holds weak references only; waif lifetime is
/// governed by value reachability.
#[derive(Default)]
pub struct WaifRegistry {
    by_class: HashMap<Obj, Vec<Weak<WaifInner>>>,
}

impl WaifRegistry {
    pub fn register(&mut self, waif: &Waif) {
        let class = {
            let state = waif.0.state.lock().unwrap();
            state.class
        };
        self.by_class
            .entry(class)
            .or_default()
            .push(Arc::downgrade(&waif.0));
    }

    /// Invalidate all live waifs of `class` and drop the bookkeeping for it.
    pub fn invalidate_class(&mut self, class: &Obj) -> usize {
        let Some(entries) = self.by_class.remove(class) else {
            return 0;
        };
        let mut count = 0;
        for weak in entries {
            if let Some(inner) = weak.upgrade() {
                Waif(inner).invalidate();
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v_int;

    #[test]
    fn aliasing_identity() {
        let w = Waif::mk(Obj(10), Obj(2));
        let alias = w.clone();
        alias.set_property(Symbol::mk("hp"), v_int(7)).unwrap();
        assert_eq!(w.get_property(Symbol::mk("HP")).unwrap(), Some(v_int(7)));
        assert_eq!(w, alias);
        assert_ne!(w, Waif::mk(Obj(10), Obj(2)));
    }

    #[test]
    fn invalidation_via_registry() {
        let mut registry = WaifRegistry::default();
        let w = Waif::mk(Obj(10), Obj(2));
        registry.register(&w);
        assert_eq!(registry.invalidate_class(&Obj(10)), 1);
        assert!(w.is_invalidated());
        assert!(w.get_property(Symbol::mk("hp")).is_err());
        assert!(w.class().is_err());
    }
}
