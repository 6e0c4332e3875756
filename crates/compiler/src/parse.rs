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

use crate::ast::Stmt;
use crate::names::Names;

/// What a parser hands to codegen: the statement list, and the name table with
/// every identifier in the statements bound to a slot.
#[derive(Debug, Clone)]
pub struct Parse {
    pub stmts: Vec<Stmt>,
    pub names: Names,
}

/// Compilation failures, both from the external parser and from codegen itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("parse: {0}")]
    ParseFailure(String),
    #[error("unknown built-in function: {0}")]
    UnknownBuiltinFunction(String),
    #[error("unknown loop label: {0}")]
    UnknownLoopLabel(String),
    #[error("break/continue outside of a loop")]
    NoLoopContext,
    #[error("bad lvalue in assignment")]
    BadAssignmentTarget,
}

/// The lexer/parser for verb source is an external collaborator; this is its
/// interface. The kernel holds one for lazy verb compilation and for eval.
pub trait SourceParser: Send + Sync {
    fn parse_program(&self, source: &str) -> Result<Parse, CompileError>;
}

/// A stand-in parser for deployments wired without one: every compile fails.
/// Worlds served this way must carry precompiled programs.
pub struct NullParser;

impl SourceParser for NullParser {
    fn parse_program(&self, _source: &str) -> Result<Parse, CompileError> {
        Err(CompileError::ParseFailure(
            "no source parser is configured".to_string(),
        ))
    }
}
