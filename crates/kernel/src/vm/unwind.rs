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

use crate::vm::exec_state::VmExec;
use crate::vm::ExecutionResult;
use barn_common::tasks::Exception;
use barn_compiler::{HandlerKind, Label, Offset};
use barn_var::{v_error, v_int, Error, Var};
use bincode::{Decode, Encode};
use tracing::trace;

/// Why control is leaving a protected region (or a frame) non-normally. Parked
/// on the frame's finally stack while a finally handler runs, then resumed.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub enum FinallyReason {
    /// Normal completion of the protected region.
    Fallthrough,
    /// An in-language error is propagating.
    Raise(Exception),
    /// A `return` is propagating out of the frame.
    Return(Var),
    /// A break/continue is transferring within the frame.
    Exit { stack: Offset, label: Label },
}

impl VmExec {
    /// An error was produced by an opcode or builtin. Under a 'd' verb it
    /// raises; otherwise the error becomes the value of the failed expression
    /// and execution continues.
    pub(crate) fn push_error(&mut self, error: Error) -> ExecutionResult {
        trace!(code = ?error.code, "push_error");
        if self.top().debug {
            return self.raise_error(error);
        }
        self.top_mut().frame.push(v_error(error));
        ExecutionResult::More
    }

    /// Raise unconditionally (the `raise()` builtin and non-expression errors).
    pub(crate) fn raise_error(&mut self, error: Error) -> ExecutionResult {
        let exception = self.exception_for(error);
        self.unwind_stack(FinallyReason::Raise(exception))
    }

    /// Unwind for a raise or a return: give each frame's handler table a chance,
    /// popping frames until handled or the stack empties.
    pub(crate) fn unwind_stack(&mut self, mut why: FinallyReason) -> ExecutionResult {
        loop {
            let frame = &mut self.top_mut().frame;
            let pc = frame.pc;

            // Find the innermost applicable handler entry covering the pc.
            let mut chosen: Option<(Label, usize, HandlerKind)> = None;
            for handler in frame.applicable_handlers() {
                if !handler.covers(pc) {
                    continue;
                }
                match (&handler.kind, &why) {
                    (HandlerKind::Finally, _) => {
                        chosen = Some((
                            handler.target,
                            handler.depth.0 as usize,
                            HandlerKind::Finally,
                        ));
                        break;
                    }
                    (HandlerKind::Catch { codes, bind, push }, FinallyReason::Raise(e)) => {
                        if codes.matches(&e.error.code) {
                            chosen = Some((
                                handler.target,
                                handler.depth.0 as usize,
                                HandlerKind::Catch {
                                    codes: codes.clone(),
                                    bind: *bind,
                                    push: *push,
                                },
                            ));
                            break;
                        }
                    }
                    _ => {}
                }
            }

            match chosen {
                Some((target, depth, HandlerKind::Finally)) => {
                    frame.truncate_stack(depth);
                    frame.finally_stack.push(why);
                    frame.jump(&target);
                    return ExecutionResult::More;
                }
                Some((target, depth, HandlerKind::Catch { bind, push, .. })) => {
                    let FinallyReason::Raise(ref e) = why else {
                        unreachable!("catch chosen for non-raise");
                    };
                    let value = v_error(e.error.clone());
                    frame.truncate_stack(depth);
                    if let Some(slot) = bind {
                        frame.set_env(&slot, value.clone());
                    }
                    if push {
                        frame.push(value);
                    }
                    frame.jump(&target);
                    return ExecutionResult::More;
                }
                None => {}
            }

            // Nothing in this frame handles it; pop and propagate.
            self.stack.pop();
            if self.stack.is_empty() {
                return match why {
                    FinallyReason::Return(v) => ExecutionResult::Complete(v),
                    FinallyReason::Raise(e) => ExecutionResult::Exception(e),
                    FinallyReason::Fallthrough => ExecutionResult::Complete(v_int(0)),
                    FinallyReason::Exit { .. } => {
                        unreachable!("break/continue escaped its frame")
                    }
                };
            }

            match why {
                FinallyReason::Return(v) => {
                    // The caller's CallVerb/Pass left nothing on the stack; the
                    // return value is the call's result.
                    self.top_mut().frame.push(v);
                    return ExecutionResult::More;
                }
                // A raise keeps walking down the stack.
                FinallyReason::Raise(e) => why = FinallyReason::Raise(e),
                FinallyReason::Fallthrough | FinallyReason::Exit { .. } => {
                    unreachable!("unexpected unwind reason across frames")
                }
            }
        }
    }

    /// Execute a break/continue: run intervening finally handlers whose region
    /// the transfer leaves, then cut the stack and jump.
    pub(crate) fn unwind_exit(&mut self, stack: Offset, label: Label) -> ExecutionResult {
        let frame = &mut self.top_mut().frame;
        let pc = frame.pc;
        let target_pos = frame.program.jump_label(label).position.0 as usize;

        let mut finally: Option<(Label, usize)> = None;
        for handler in frame.applicable_handlers() {
            if handler.kind != HandlerKind::Finally {
                continue;
            }
            // Run the finally only when the jump actually leaves its region.
            if handler.covers(pc) && !handler.covers(target_pos) {
                finally = Some((handler.target, handler.depth.0 as usize));
                break;
            }
        }

        if let Some((target, depth)) = finally {
            frame.truncate_stack(depth);
            frame.finally_stack.push(FinallyReason::Exit { stack, label });
            frame.jump(&target);
            return ExecutionResult::More;
        }

        frame.truncate_stack(stack.0 as usize);
        frame.jump(&label);
        ExecutionResult::More
    }
}
