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

use barn_var::{Error, Obj, Var};
use bincode::{Decode, Encode};

/// Task identifiers are monotonically assigned by the scheduler.
pub type TaskId = usize;

/// Why a task was aborted by the scheduler rather than by its own code.
/// These aborts are not catchable by in-language handlers.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AbortLimitReason {
    /// Ran out of ticks.
    Ticks(usize),
    /// Ran out of seconds.
    Time(u64),
    /// Killed via `kill_task` or scheduler shutdown.
    Killed,
}

/// One frame of a traceback, innermost first.
#[derive(Clone, Debug, Eq, PartialEq, Encode, Decode)]
pub struct TracebackFrame {
    pub this: Var,
    pub definer: Obj,
    pub verb: String,
    pub line: usize,
}

/// An uncaught in-language exception, as delivered to the player and the log.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct Exception {
    pub error: Error,
    pub frames: Vec<TracebackFrame>,
}

impl Exception {
    pub fn new(error: Error, frames: Vec<TracebackFrame>) -> Self {
        Self { error, frames }
    }

    /// Render the standard traceback:
    /// ```text
    /// #<obj>:<verb>, line <n>: <ERROR_NAME>
    /// ... called from #<obj>:<verb>, line <n>
    /// (End of traceback)
    /// ```
    pub fn traceback_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.frames.len() + 1);
        for (i, frame) in self.frames.iter().enumerate() {
            let line = if i == 0 {
                format!(
                    "{}:{}, line {}: {}",
                    frame.definer, frame.verb, frame.line, self.error.name()
                )
            } else {
                format!(
                    "... called from {}:{}, line {}",
                    frame.definer, frame.verb, frame.line
                )
            };
            lines.push(line);
        }
        lines.push("(End of traceback)".to_string());
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barn_var::{v_objid, ErrorCode::E_DIV};

    #[test]
    fn traceback_format() {
        let e = Exception::new(
            E_DIV.into(),
            vec![
                TracebackFrame {
                    this: v_objid(10),
                    definer: Obj(10),
                    verb: "frob".into(),
                    line: 3,
                },
                TracebackFrame {
                    this: v_objid(2),
                    definer: Obj(1),
                    verb: "main".into(),
                    line: 12,
                },
            ],
        );
        assert_eq!(
            e.traceback_lines(),
            vec![
                "#10:frob, line 3: E_DIV",
                "... called from #1:main, line 12",
                "(End of traceback)",
            ]
        );
    }
}
