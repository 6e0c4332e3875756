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
use crate::ErrorCode::{E_RANGE, E_TYPE};
use crate::{Error, Sequence};
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The list type: 1-based at the language level, copy-on-write. Mutating operations
/// return a new list sharing structure with the original.
#[derive(Clone)]
#[repr(transparent)]
pub struct List(Arc<imbl::Vector<Var>>);

impl List {
    pub fn build(values: &[Var]) -> Var {
        Var::from_variant(Variant::List(Self::mk_list(values)))
    }

    pub fn mk_list(values: &[Var]) -> List {
        List(Arc::new(imbl::Vector::from(values.to_vec())))
    }

    pub fn from_vector(v: imbl::Vector<Var>) -> List {
        List(Arc::new(v))
    }

    pub fn iter(&self) -> impl Iterator<Item = Var> + '_ {
        self.0.iter().cloned()
    }

    pub fn index(&self, index: usize) -> Result<Var, Error> {
        self.0.get(index).cloned().ok_or_else(|| {
            E_RANGE.with_msg(|| {
                format!("index {} out of range for list of length {}", index + 1, self.0.len())
            })
        })
    }

    pub fn index_set(&self, index: usize, value: &Var) -> Result<Var, Error> {
        if index >= self.0.len() {
            return Err(E_RANGE.with_msg(|| {
                format!("index {} out of range for list of length {}", index + 1, self.0.len())
            }));
        }
        let mut new = (*self.0).clone();
        new.set(index, value.clone());
        Ok(Var::from_list(List(Arc::new(new))))
    }

    /// Insert `value` before position `index` (0-based); an index of `len` appends.
    pub fn insert(&self, index: usize, value: &Var) -> Result<Var, Error> {
        if index > self.0.len() {
            return Err(E_RANGE.msg("insertion point out of range"));
        }
        let mut new = (*self.0).clone();
        new.insert(index, value.clone());
        Ok(Var::from_list(List(Arc::new(new))))
    }

    pub fn remove_at(&self, index: usize) -> Result<Var, Error> {
        if index >= self.0.len() {
            return Err(E_RANGE.msg("removal point out of range"));
        }
        let mut new = (*self.0).clone();
        new.remove(index);
        Ok(Var::from_list(List(Arc::new(new))))
    }

    pub fn push(&self, value: &Var) -> Var {
        let mut new = (*self.0).clone();
        new.push_back(value.clone());
        Var::from_list(List(Arc::new(new)))
    }

    pub fn append(&self, other: &List) -> Var {
        let mut new = (*self.0).clone();
        new.append((*other.0).clone());
        Var::from_list(List(Arc::new(new)))
    }

    /// Add `value` only if it is not already present.
    pub fn set_add(&self, value: &Var) -> Var {
        if self.iter().any(|v| v == *value) {
            return Var::from_list(self.clone());
        }
        self.push(value)
    }

    /// Remove the first occurrence of `value`, if any.
    pub fn set_remove(&self, value: &Var) -> Var {
        match self.0.iter().position(|v| *v == *value) {
            None => Var::from_list(self.clone()),
            Some(idx) => {
                let mut new = (*self.0).clone();
                new.remove(idx);
                Var::from_list(List(Arc::new(new)))
            }
        }
    }

    /// Sublist over the closed range [from, to], 0-based. An inverted range one past
    /// the left end yields the empty list.
    pub fn range(&self, from: isize, to: isize) -> Result<Var, Error> {
        let len = self.0.len() as isize;
        if to == from - 1 {
            return Ok(List::build(&[]));
        }
        if from < 0 || from >= len || to < 0 || to >= len || to < from {
            return Err(E_RANGE.msg("list range out of bounds"));
        }
        let new: imbl::Vector<Var> = self
            .0
            .iter()
            .skip(from as usize)
            .take((to - from + 1) as usize)
            .cloned()
            .collect();
        Ok(Var::from_list(List(Arc::new(new))))
    }

    /// Splice the elements of `value` (a list) over the closed range [from, to].
    pub fn range_set(&self, from: isize, to: isize, value: &Var) -> Result<Var, Error> {
        let Variant::List(r) = value.variant() else {
            return Err(E_TYPE.msg("list range assignment requires a list"));
        };
        let len = self.0.len() as isize;
        if from < 0 || from > len || to < from - 1 || to >= len {
            return Err(E_RANGE.msg("list range out of bounds"));
        }
        let mut new = imbl::Vector::new();
        for v in self.0.iter().take(from as usize) {
            new.push_back(v.clone());
        }
        for v in r.iter() {
            new.push_back(v);
        }
        for v in self.0.iter().skip((to + 1) as usize) {
            new.push_back(v.clone());
        }
        Ok(Var::from_list(List(Arc::new(new))))
    }
}

impl Sequence for List {
    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn contains(&self, value: &Var, case_sensitive: bool) -> Result<bool, Error> {
        Ok(self.index_in(value, case_sensitive)?.is_some())
    }

    fn index_in(&self, value: &Var, case_sensitive: bool) -> Result<Option<usize>, Error> {
        for (i, v) in self.0.iter().enumerate() {
            let hit = if case_sensitive {
                v.eq_case_sensitive(value)
            } else {
                *v == *value
            };
            if hit {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

impl PartialEq for List {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for List {}

impl PartialOrd for List {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for List {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl Hash for List {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in self.0.iter() {
            v.hash(state);
        }
    }
}

impl Debug for List {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl Encode for List {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        (self.0.len() as u64).encode(encoder)?;
        for v in self.0.iter() {
            v.encode(encoder)?;
        }
        Ok(())
    }
}

impl<Context> Decode<Context> for List {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let len = u64::decode(decoder)?;
        let mut v = imbl::Vector::new();
        for _ in 0..len {
            v.push_back(Var::decode(decoder)?);
        }
        Ok(List(Arc::new(v)))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for List {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let len = u64::decode(decoder)?;
        let mut v = imbl::Vector::new();
        for _ in 0..len {
            v.push_back(Var::decode(decoder)?);
        }
        Ok(List(Arc::new(v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{v_int, v_list, v_str};

    #[test]
    fn copy_on_write() {
        let a = v_list(&[v_int(1), v_int(2), v_int(3)]);
        let Variant::List(al) = a.variant() else {
            panic!("not a list")
        };
        let b = al.index_set(0, &v_int(99)).unwrap();
        assert_eq!(a.index(&v_int(1)).unwrap(), v_int(1));
        assert_eq!(b.index(&v_int(1)).unwrap(), v_int(99));
    }

    #[test]
    fn set_operations() {
        let l = List::mk_list(&[v_int(1), v_int(2)]);
        let with = l.set_add(&v_int(3));
        let without = l.set_add(&v_int(2));
        assert_eq!(with.len().unwrap(), 3);
        assert_eq!(without.len().unwrap(), 2);
        let removed = l.set_remove(&v_int(1));
        assert_eq!(removed, v_list(&[v_int(2)]));
    }

    #[test]
    fn caseless_membership() {
        let l = List::mk_list(&[v_str("Foo"), v_str("bar")]);
        assert_eq!(l.index_in(&v_str("FOO"), false).unwrap(), Some(0));
        assert_eq!(l.index_in(&v_str("FOO"), true).unwrap(), None);
    }

    #[test]
    fn range_splice() {
        let l = List::mk_list(&[v_int(1), v_int(2), v_int(3), v_int(4)]);
        assert_eq!(
            l.range(1, 2).unwrap(),
            v_list(&[v_int(2), v_int(3)])
        );
        let spliced = l
            .range_set(1, 2, &v_list(&[v_int(9)]))
            .unwrap();
        assert_eq!(spliced, v_list(&[v_int(1), v_int(9), v_int(4)]));
    }
}
