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
use bincode::{Decode, Encode};
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use strum::FromRepr;
use ErrorCode::*;

/// An in-language error value. Always carries one of the fixed error kinds, and
/// optionally a message and a value payload attached at raise time.
#[derive(Clone, Eq, Ord, PartialOrd, Encode, Decode)]
pub struct Error {
    pub code: ErrorCode,
    pub msg: Option<Box<String>>,
    pub value: Option<Box<Var>>,
}

/// The fixed taxonomy of error kinds.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, FromRepr, Encode, Decode)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    E_NONE = 0,
    E_TYPE = 1,
    E_DIV = 2,
    E_PERM = 3,
    E_PROPNF = 4,
    E_VERBNF = 5,
    E_VARNF = 6,
    E_INVIND = 7,
    E_RECMOVE = 8,
    E_MAXREC = 9,
    E_RANGE = 10,
    E_ARGS = 11,
    E_NACC = 12,
    E_INVARG = 13,
    E_QUOTA = 14,
    E_FLOAT = 15,
    E_FILE = 16,
    E_EXEC = 17,
}

impl Error {
    pub fn new(code: ErrorCode, msg: Option<String>, value: Option<Var>) -> Self {
        Self {
            code,
            msg: msg.map(Box::new),
            value: value.map(Box::new),
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        if let Some(msg) = &self.msg {
            return msg.deref().clone();
        }
        self.code.default_message().into()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.code.name()
    }
}

impl Hash for Error {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.msg.is_some() {
            write!(f, "{} ({})", self.code, self.message())
        } else {
            write!(f, "{}", self.code)
        }
    }
}

// Equality on error values considers the kind and the payload, never the message.
impl PartialEq<Error> for Error {
    fn eq(&self, other: &Error) -> bool {
        self.code == other.code && self.value == other.value
    }
}

impl PartialEq<ErrorCode> for Error {
    fn eq(&self, other: &ErrorCode) -> bool {
        self.code == *other
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::new(code, None, None)
    }
}

impl std::error::Error for Error {}

impl ErrorCode {
    pub fn name(&self) -> &'static str {
        match self {
            E_NONE => "E_NONE",
            E_TYPE => "E_TYPE",
            E_DIV => "E_DIV",
            E_PERM => "E_PERM",
            E_PROPNF => "E_PROPNF",
            E_VERBNF => "E_VERBNF",
            E_VARNF => "E_VARNF",
            E_INVIND => "E_INVIND",
            E_RECMOVE => "E_RECMOVE",
            E_MAXREC => "E_MAXREC",
            E_RANGE => "E_RANGE",
            E_ARGS => "E_ARGS",
            E_NACC => "E_NACC",
            E_INVARG => "E_INVARG",
            E_QUOTA => "E_QUOTA",
            E_FLOAT => "E_FLOAT",
            E_FILE => "E_FILE",
            E_EXEC => "E_EXEC",
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            E_NONE => "No error",
            E_TYPE => "Type mismatch",
            E_DIV => "Division by zero",
            E_PERM => "Permission denied",
            E_PROPNF => "Property not found",
            E_VERBNF => "Verb not found",
            E_VARNF => "Variable not found",
            E_INVIND => "Invalid indirection",
            E_RECMOVE => "Recursive move",
            E_MAXREC => "Too many verb calls",
            E_RANGE => "Range error",
            E_ARGS => "Incorrect number of arguments",
            E_NACC => "Move refused by destination",
            E_INVARG => "Invalid argument",
            E_QUOTA => "Resource limit exceeded",
            E_FLOAT => "Floating-point arithmetic error",
            E_FILE => "File error",
            E_EXEC => "Execution error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "E_NONE" => Some(E_NONE),
            "E_TYPE" => Some(E_TYPE),
            "E_DIV" => Some(E_DIV),
            "E_PERM" => Some(E_PERM),
            "E_PROPNF" => Some(E_PROPNF),
            "E_VERBNF" => Some(E_VERBNF),
            "E_VARNF" => Some(E_VARNF),
            "E_INVIND" => Some(E_INVIND),
            "E_RECMOVE" => Some(E_RECMOVE),
            "E_MAXREC" => Some(E_MAXREC),
            "E_RANGE" => Some(E_RANGE),
            "E_ARGS" => Some(E_ARGS),
            "E_NACC" => Some(E_NACC),
            "E_INVARG" => Some(E_INVARG),
            "E_QUOTA" => Some(E_QUOTA),
            "E_FLOAT" => Some(E_FLOAT),
            "E_FILE" => Some(E_FILE),
            "E_EXEC" => Some(E_EXEC),
            _ => None,
        }
    }

    /// Attach a message, producing an `Error` value.
    pub fn msg<S: ToString>(self, s: S) -> Error {
        Error::new(self, Some(s.to_string()), None)
    }

    pub fn with_msg<F>(self, f: F) -> Error
    where
        F: FnOnce() -> String,
    {
        Error::new(self, Some(f()), None)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ignored_in_equality() {
        let bare: Error = E_RANGE.into();
        let with_msg = E_RANGE.msg("index 4 out of range");
        assert_eq!(bare, with_msg);
        assert_ne!(bare, Error::from(E_TYPE));
    }

    #[test]
    fn repr_round_trip() {
        for i in 0..18u8 {
            let code = ErrorCode::from_repr(i).unwrap();
            assert_eq!(code as u8, i);
            assert_eq!(ErrorCode::parse(code.name()), Some(code));
        }
        assert!(ErrorCode::from_repr(18).is_none());
    }
}
