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
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, Mutex};

/// An interned, case-insensitive identifier. Used for verb names, property names and
/// variable names, which are compared caselessly everywhere in the language.
/// The casing of the first interning is preserved for display.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Symbol(u32);

struct SymbolTable {
    names: Vec<Arc<str>>,
    index: HashMap<String, u32>,
}

lazy_static! {
    static ref SYMBOLS: Mutex<SymbolTable> = Mutex::new(SymbolTable {
        names: Vec::new(),
        index: HashMap::new(),
    });
}

impl Symbol {
    pub fn mk(s: &str) -> Self {
        let folded = s.to_lowercase();
        let mut table = SYMBOLS.lock().unwrap();
        if let Some(id) = table.index.get(&folded) {
            return Symbol(*id);
        }
        let id = table.names.len() as u32;
        table.names.push(Arc::from(s));
        table.index.insert(folded, id);
        Symbol(id)
    }

    /// The stored (first-interned) casing of the symbol.
    pub fn as_arc_str(&self) -> Arc<str> {
        let table = SYMBOLS.lock().unwrap();
        table.names[self.0 as usize].clone()
    }

    pub fn to_lowercase(&self) -> String {
        self.as_arc_str().to_lowercase()
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_arc_str())
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({})", self.as_arc_str())
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::mk(s)
    }
}

impl Encode for Symbol {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        self.as_arc_str().as_ref().encode(encoder)
    }
}

impl<Context> Decode<Context> for Symbol {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        let s = String::decode(decoder)?;
        Ok(Symbol::mk(&s))
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Symbol {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        let s = String::decode(decoder)?;
        Ok(Symbol::mk(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_caseless() {
        let a = Symbol::mk("Frobnitz");
        let b = Symbol::mk("frobnitz");
        let c = Symbol::mk("FROBNITZ");
        assert_eq!(a, b);
        assert_eq!(b, c);
        // First-interned casing wins for display.
        assert_eq!(a.to_string(), "Frobnitz");
    }

    #[test]
    fn distinct_symbols_differ() {
        assert_ne!(Symbol::mk("look"), Symbol::mk("get"));
    }
}
