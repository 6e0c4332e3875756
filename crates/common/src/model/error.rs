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

use barn_var::{Error, ErrorCode, Obj};

/// Failures from the object store. These cross the VM boundary as in-language
/// error values via `to_error()`.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum WorldStateError {
    #[error("Object not found: {0}")]
    ObjectNotFound(Obj),
    #[error("Object already exists: {0}")]
    ObjectAlreadyExists(Obj),
    #[error("Could not set/get object attribute on {0}")]
    ObjectPermissionDenied(Obj),
    #[error("Recursive parentage or move: {0}")]
    RecursiveMove(Obj),
    #[error("Move refused by destination {0}")]
    MoveRefused(Obj),
    #[error("Property not found: {0}.{1}")]
    PropertyNotFound(Obj, String),
    #[error("Property permission denied: {0}.{1}")]
    PropertyPermissionDenied(Obj, String),
    #[error("Property already defined: {0}.{1}")]
    DuplicatePropertyDefinition(Obj, String),
    #[error("Verb not found: {0}:{1}")]
    VerbNotFound(Obj, String),
    #[error("Verb permission denied: {0}:{1}")]
    VerbPermissionDenied(Obj, String),
    #[error("Verb already defined: {0}:{1}")]
    DuplicateVerb(Obj, String),
    #[error("Invalid verb name pattern: {0}")]
    InvalidVerbName(String),
    #[error("Object quota exceeded for {0}")]
    QuotaExceeded(Obj),
}

impl WorldStateError {
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            Self::ObjectNotFound(_) | Self::ObjectAlreadyExists(_) => ErrorCode::E_INVIND,
            Self::ObjectPermissionDenied(_)
            | Self::PropertyPermissionDenied(_, _)
            | Self::VerbPermissionDenied(_, _) => ErrorCode::E_PERM,
            Self::RecursiveMove(_) => ErrorCode::E_RECMOVE,
            Self::MoveRefused(_) => ErrorCode::E_NACC,
            Self::PropertyNotFound(_, _) | Self::DuplicatePropertyDefinition(_, _) => {
                ErrorCode::E_PROPNF
            }
            Self::VerbNotFound(_, _) | Self::DuplicateVerb(_, _) => ErrorCode::E_VERBNF,
            Self::InvalidVerbName(_) => ErrorCode::E_INVARG,
            Self::QuotaExceeded(_) => ErrorCode::E_QUOTA,
        }
    }

    pub fn to_error(&self) -> Error {
        self.to_error_code().msg(self.to_string())
    }
}
