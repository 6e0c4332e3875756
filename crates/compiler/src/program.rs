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

use crate::labels::{JumpLabel, Label, Offset};
use crate::names::{Name, Names};
use crate::opcode::Op;
use barn_var::{ErrorCode, Var};
use bincode::{Decode, Encode};
use std::sync::Arc;

/// The error codes a handler intercepts.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum CatchCodes {
    Codes(Vec<ErrorCode>),
    Any,
}

impl CatchCodes {
    pub fn matches(&self, code: &ErrorCode) -> bool {
        match self {
            CatchCodes::Any => true,
            CatchCodes::Codes(codes) => codes.contains(code),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub enum HandlerKind {
    /// An except arm or catch expression. `bind` receives the error value;
    /// `push` puts the error value on the operand stack instead (expression form).
    Catch {
        codes: CatchCodes,
        bind: Option<Name>,
        push: bool,
    },
    /// A finally block: runs on every non-normal exit of the region and re-raises
    /// (or re-returns, or re-exits) afterwards.
    Finally,
}

/// One entry of a program's exception table. A raise at program counter `pc` is
/// covered when `start < pc <= end` (the pc has already advanced past the raising
/// opcode). Entries appear inner-before-outer; the first covering match wins.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Handler {
    pub start: Offset,
    pub end: Offset,
    pub target: Label,
    /// Operand-stack depth of the frame at region entry; the unwinder cuts the
    /// stack back to this depth before entering the handler.
    pub depth: Offset,
    pub kind: HandlerKind,
}

impl Handler {
    pub fn covers(&self, pc: usize) -> bool {
        pc > self.start.0 as usize && pc <= self.end.0 as usize
    }
}

/// One fork body: a region of the main opcode vector, and the parent-side
/// variable that receives the child task id, if the fork was named.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct ForkBody {
    pub offset: Offset,
    pub len: u16,
    pub var: Option<Name>,
}

/// The result of compilation: everything the VM needs to execute a verb.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Program {
    /// All non-inlined literals.
    pub literals: Vec<Var>,
    /// Jump label table, indexed by `Label`.
    pub jump_labels: Vec<JumpLabel>,
    /// The names of the variables in the environment.
    pub var_names: Names,
    /// The linear opcode stream. Fork bodies are regions within it.
    pub main_vector: Arc<Vec<Op>>,
    /// The exception handler table, inner regions first.
    pub handlers: Vec<Handler>,
    /// The fork table, one entry per fork statement.
    pub fork_table: Vec<ForkBody>,
    /// (opcode offset, source line) pairs, ascending by offset.
    pub line_spans: Vec<(usize, usize)>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            literals: vec![],
            jump_labels: vec![],
            var_names: Names::new(),
            main_vector: Arc::new(vec![]),
            handlers: vec![],
            fork_table: vec![],
            line_spans: vec![],
        }
    }

    pub fn jump_label(&self, label: Label) -> &JumpLabel {
        &self.jump_labels[label.0 as usize]
    }

    pub fn literal(&self, label: Label) -> &Var {
        &self.literals[label.0 as usize]
    }

    /// Source line for a given program counter, from the line-number spans.
    pub fn line_for(&self, pc: usize) -> usize {
        let mut line = 1;
        for (offset, l) in &self.line_spans {
            if *offset > pc {
                break;
            }
            line = *l;
        }
        line
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_coverage_is_post_fetch() {
        let h = Handler {
            start: Offset(2),
            end: Offset(5),
            target: Label(0),
            depth: Offset(0),
            kind: HandlerKind::Finally,
        };
        // Opcode at index 2 raises with pc == 3.
        assert!(h.covers(3));
        assert!(h.covers(5));
        assert!(!h.covers(2));
        assert!(!h.covers(6));
    }

    #[test]
    fn line_spans() {
        let mut p = Program::new();
        p.line_spans = vec![(0, 1), (4, 2), (9, 5)];
        assert_eq!(p.line_for(0), 1);
        assert_eq!(p.line_for(3), 1);
        assert_eq!(p.line_for(4), 2);
        assert_eq!(p.line_for(100), 5);
    }
}
