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
use crate::variant::Variant;
use crate::ErrorCode::E_TYPE;
use crate::{Associative, Error};
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The map type: an ordered associative container. Iteration is insertion order;
/// updates are copy-on-write. Keys may be any hashable value except ANON.
#[derive(Clone)]
#[repr(transparent)]
pub struct Map(Arc<indexmap::IndexMap<Var, Var>>);

impl Map {
    pub fn build<'a, I: Iterator<Item = &'a (Var, Var)>>(pairs: I) -> Var {
        let m: indexmap::IndexMap<Var, Var> = pairs.cloned().collect();
        Var::from_variant(Variant::Map(Map(Arc::new(m))))
    }

    pub fn mk_map(pairs: &[(Var, Var)]) -> Map {
        Map(Arc::new(pairs.iter().cloned().collect()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Var, Var)> + '_ {
        self.0.iter().map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn keys(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.keys().cloned()
    }

    pub fn values(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.values().cloned()
    }

    /// The pair at insertion rank `index` (0-based).
    pub fn index_pair(&self, index: usize) -> Option<(Var, Var)> {
        self.0
            .get_index(index)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn first_key(&self) -> Option<Var> {
        self.0.keys().next().cloned()
    }

    pub fn last_key(&self) -> Option<Var> {
        self.0.keys().last().cloned()
    }

    /// The 1-based insertion rank of the first entry whose *value* equals `value`,
    /// or None. This is what the `in` operator sees.
    pub fn rank_of_value(&self, value: &Var, case_sensitive: bool) -> Option<usize> {
        self.0.values().position(|v| {
            if case_sensitive {
                v.eq_case_sensitive(value)
            } else {
                v == value
            }
        })
    }

    fn sorted_pairs(&self) -> Vec<(Var, Var)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        pairs
    }

    /// Pairs in canonical key order, as used for literal printing.
    pub fn canonical_iter(&self) -> impl Iterator<Item = (Var, Var)> {
        self.sorted_pairs().into_iter()
    }
}

impl Associative for Map {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn get(&self, key: &Var) -> Option<Var> {
        self.0.get(key).cloned()
    }

    fn set(&self, key: &Var, value: &Var) -> Result<Var, Error> {
        if !key.is_hashable_key() {
            return Err(E_TYPE.msg("value cannot be used as a map key"));
        }
        let mut new = (*self.0).clone();
        new.insert(key.clone(), value.clone());
        Ok(Var::from_variant(Variant::Map(Map(Arc::new(new)))))
    }

    /// Remove `key`. Removing an absent key is a no-op.
    fn remove(&self, key: &Var) -> Var {
        if !self.0.contains_key(key) {
            return Var::from_variant(Variant::Map(self.clone()));
        }
        let mut new = (*self.0).clone();
        new.shift_remove(key);
        Var::from_variant(Variant::Map(Map(Arc::new(new))))
    }

    fn contains_key(&self, key: &Var) -> bool {
        self.0.contains_key(key)
    }
}

// Map equality is content equality, independent of insertion order.
impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).map(|ov| ov == v).unwrap_or(false))
    }
}

impl Eq for Map {}

impl PartialOrd for Map {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Map {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.sorted_pairs();
        let b = other.sorted_pairs();
        for ((ak, av), (bk, bv)) in a.iter().zip(b.iter()) {
            match ak.total_cmp(bk) {
                Ordering::Equal => {}
                ord => return ord,
            }
            match av.total_cmp(bv) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        a.len().cmp(&b.len())
    }
}

impl Hash for Map {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for (k, v) in self.sorted_pairs() {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl Debug for Map {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl Encode for Map {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        (self.0.len() as u64).encode(encoder)?;
        for (k, v) in self.0.iter() {
            k.encode(encoder)?;
            v.encode(encoder)?;
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for Map {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let len = u64::decode(decoder)?;
        let mut m = indexmap::IndexMap::with_capacity(len as usize);
        for _ in 0..len {
            let k = Var::decode(decoder)?;
            let v = Var::decode(decoder)?;
            m.insert(k, v);
        }
        Ok(Map(Arc::new(m)))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Map {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let len = u64::decode(decoder)?;
        let mut m = indexmap::IndexMap::with_capacity(len as usize);
        for _ in 0..len {
            let k = Var::decode(decoder)?;
            let v = Var::decode(decoder)?;
            m.insert(k, v);
        }
        Ok(Map(Arc::new(m)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{v_int, v_str};

    #[test]
    fn insertion_order_iteration() {
        let m = Map::mk_map(&[
            (v_str("zebra"), v_int(1)),
            (v_str("aardvark"), v_int(2)),
        ]);
        let keys: Vec<_> = m.keys().collect();
        assert_eq!(keys, vec![v_str("zebra"), v_str("aardvark")]);
    }

    #[test]
    fn caseless_string_keys() {
        let m = Map::mk_map(&[(v_str("Key"), v_int(1))]);
        assert_eq!(m.get(&v_str("kEY")), Some(v_int(1)));
    }

    #[test]
    fn absent_key_removal_is_noop() {
        let m = Map::mk_map(&[(v_str("a"), v_int(1))]);
        let removed = m.remove(&v_str("missing"));
        let Variant::Map(rm) = removed.variant() else {
            panic!("not a map")
        };
        assert_eq!(rm.len(), 1);
    }

    #[test]
    fn update_keeps_position() {
        let m = Map::mk_map(&[(v_str("a"), v_int(1)), (v_str("b"), v_int(2))]);
        let updated = m.set(&v_str("a"), &v_int(99)).unwrap();
        let Variant::Map(um) = updated.variant() else {
            panic!("not a map")
        };
        let pairs: Vec<_> = um.iter().collect();
        assert_eq!(pairs[0], (v_str("a"), v_int(99)));
    }

    #[test]
    fn value_rank() {
        let m = Map::mk_map(&[(v_str("a"), v_int(10)), (v_str("b"), v_int(20))]);
        assert_eq!(m.rank_of_value(&v_int(20), false), Some(1));
        assert_eq!(m.rank_of_value(&v_int(30), false), None);
    }
}
