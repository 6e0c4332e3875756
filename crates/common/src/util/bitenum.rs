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

use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use num_traits::ToPrimitive;
use std::marker::PhantomData;
use std::ops::BitOr;

/// A compact set of flags drawn from a small `#[repr(u8)]` enum, stored as bits of
/// a u16. The permission bit-sets on objects, verbs and properties are all of this
/// shape.
#[derive(Debug, Ord, PartialOrd, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BitEnum<T: ToPrimitive> {
    value: u16,
    phantom: PhantomData<T>,
}

impl<T: ToPrimitive> BitEnum<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            value: 0,
            phantom: PhantomData,
        }
    }

    #[must_use]
    pub fn new_with(flag: T) -> Self {
        let mut s = Self::new();
        s.set(flag);
        s
    }

    pub fn from_u16(value: u16) -> Self {
        Self {
            value,
            phantom: PhantomData,
        }
    }

    pub fn to_u16(self) -> u16 {
        self.value
    }

    pub fn set(&mut self, flag: T) {
        self.value |= 1 << flag.to_u64().expect("flag out of range");
    }

    pub fn clear(&mut self, flag: T) {
        self.value &= !(1 << flag.to_u64().expect("flag out of range"));
    }

    #[must_use]
    pub fn contains(&self, flag: T) -> bool {
        self.value & (1 << flag.to_u64().expect("flag out of range")) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0
    }
}

impl<T: ToPrimitive> Default for BitEnum<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ToPrimitive> BitOr for BitEnum<T> {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            value: self.value | rhs.value,
            phantom: PhantomData,
        }
    }
}

impl<T: ToPrimitive> BitOr<T> for BitEnum<T> {
    type Output = Self;

    fn bitor(mut self, rhs: T) -> Self::Output {
        self.set(rhs);
        self
    }
}

impl<T: ToPrimitive> Encode for BitEnum<T> {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.value.encode(encoder)
    }
}

impl<T: ToPrimitive, Context> Decode<Context> for BitEnum<T> {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        Ok(Self::from_u16(u16::decode(decoder)?))
    }
}

impl<'de, T: ToPrimitive, Context> BorrowDecode<'de, Context> for BitEnum<T> {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        Ok(Self::from_u16(u16::decode(decoder)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enum_primitive_derive::Primitive;

    #[derive(Debug, Copy, Clone, Eq, PartialEq, Primitive)]
    #[repr(u8)]
    enum TestFlag {
        A = 0,
        B = 1,
        C = 2,
    }

    #[test]
    fn set_clear_contains() {
        let mut flags = BitEnum::new_with(TestFlag::A) | TestFlag::C;
        assert!(flags.contains(TestFlag::A));
        assert!(!flags.contains(TestFlag::B));
        assert!(flags.contains(TestFlag::C));
        flags.clear(TestFlag::C);
        assert!(!flags.contains(TestFlag::C));
    }
}
