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

//! Takes the AST and turns it into a list of opcodes.

use std::sync::Arc;

use crate::ast::{
    Arg, AstCatchCodes, BinaryOp, Expr, ScatterItem, ScatterKind, Stmt, StmtNode, UnaryOp,
};
use crate::builtins::BUILTINS;
use crate::labels::{JumpLabel, Label, Offset};
use crate::names::{Name, Names};
use crate::opcode::{Op, ScatterArgs, ScatterLabel, OFFSET_NONE};
use crate::parse::{CompileError, Parse};
use crate::program::{CatchCodes, ForkBody, Handler, HandlerKind, Program};
use barn_var::{Sequence, Variant};

struct Loop {
    loop_name: Option<Name>,
    top_label: Label,
    top_stack: Offset,
    bottom_label: Label,
    bottom_stack: Offset,
}

// Compiler code generation state.
struct CodegenState {
    ops: Vec<Op>,
    jumps: Vec<JumpLabel>,
    var_names: Names,
    literals: Vec<barn_var::Var>,
    loops: Vec<Loop>,
    handlers: Vec<Handler>,
    fork_table: Vec<ForkBody>,
    saved_stack: Option<Offset>,
    cur_stack: usize,
    max_stack: usize,
    line_spans: Vec<(usize, usize)>,
}

impl CodegenState {
    fn new(var_names: Names) -> Self {
        Self {
            ops: vec![],
            jumps: vec![],
            var_names,
            literals: vec![],
            loops: vec![],
            handlers: vec![],
            fork_table: vec![],
            saved_stack: None,
            cur_stack: 0,
            max_stack: 0,
            line_spans: vec![],
        }
    }

    // Create an anonymous jump label at the current position and return its id.
    fn make_jump_label(&mut self, name: Option<Name>) -> Label {
        let id = Label(self.jumps.len() as u16);
        let position = self.ops.len().into();
        self.jumps.push(JumpLabel { id, name, position });
        id
    }

    // Adjust the position of a jump label to the current position.
    fn commit_jump_label(&mut self, id: Label) {
        let position = self.ops.len();
        let jump = self
            .jumps
            .get_mut(id.0 as usize)
            .expect("invalid jump fixup");
        jump.position = position.into();
    }

    fn add_literal(&mut self, v: &barn_var::Var) -> Label {
        // Pooling compares case-sensitively so that distinct casings stay distinct.
        let pos = self
            .literals
            .iter()
            .position(|lv| lv.eq_case_sensitive(v))
            .unwrap_or_else(|| {
                self.literals.push(v.clone());
                self.literals.len() - 1
            });
        Label(pos as u16)
    }

    fn emit(&mut self, op: Op) {
        self.ops.push(op);
    }

    fn find_loop(&self, loop_label: &Name) -> Result<&Loop, CompileError> {
        self.loops
            .iter()
            .rev()
            .find(|l| l.loop_name.as_ref() == Some(loop_label))
            .ok_or_else(|| {
                let name = self
                    .var_names
                    .name_of(loop_label)
                    .map(|s| s.to_string())
                    .unwrap_or_default();
                CompileError::UnknownLoopLabel(name)
            })
    }

    fn push_stack(&mut self, n: usize) {
        self.cur_stack += n;
        if self.cur_stack > self.max_stack {
            self.max_stack = self.cur_stack;
        }
    }

    fn pop_stack(&mut self, n: usize) {
        self.cur_stack -= n;
    }

    fn saved_stack_top(&self) -> Option<Offset> {
        self.saved_stack
    }

    fn save_stack_top(&mut self) -> Option<Offset> {
        let old = self.saved_stack;
        self.saved_stack = Some((self.cur_stack - 1).into());
        old
    }

    fn restore_stack_top(&mut self, old: Option<Offset>) {
        self.saved_stack = old
    }

    fn generate_assign(&mut self, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        self.push_lvalue(left, false)?;
        self.generate_expr(right)?;
        match left {
            Expr::Range { .. } | Expr::Index(..) => self.emit(Op::PutTemp),
            _ => {}
        }
        let mut is_indexed = false;
        let mut e = left;
        loop {
            // Figure out the form of assignment, then walk through chained
            // index/range assignments rebuilding outward.
            match e {
                Expr::Range { base, .. } => {
                    self.emit(Op::RangeSet);
                    self.pop_stack(3);
                    e = base;
                    is_indexed = true;
                }
                Expr::Index(lhs, _) => {
                    self.emit(Op::IndexSet);
                    self.pop_stack(2);
                    e = lhs;
                    is_indexed = true;
                }
                Expr::Id(name) => {
                    self.emit(Op::Put(*name));
                    break;
                }
                Expr::Prop { .. } => {
                    self.emit(Op::PutProp);
                    self.pop_stack(2);
                    break;
                }
                _ => return Err(CompileError::BadAssignmentTarget),
            }
        }
        if is_indexed {
            self.emit(Op::Pop);
            self.emit(Op::PushTemp);
        }
        Ok(())
    }

    fn generate_scatter_assign(
        &mut self,
        scatter: &[ScatterItem],
        right: &Expr,
    ) -> Result<(), CompileError> {
        self.generate_expr(right)?;
        let labels: Vec<(&ScatterItem, ScatterLabel)> = scatter
            .iter()
            .map(|s| {
                let kind_label = match s.kind {
                    ScatterKind::Required => ScatterLabel::Required(s.id),
                    ScatterKind::Optional => ScatterLabel::Optional(
                        s.id,
                        s.expr.as_ref().map(|_| self.make_jump_label(None)),
                    ),
                    ScatterKind::Rest => ScatterLabel::Rest(s.id),
                };
                (s, kind_label)
            })
            .collect();
        let done = self.make_jump_label(None);
        self.emit(Op::Scatter(Box::new(ScatterArgs {
            labels: labels.iter().map(|(_, l)| l.clone()).collect(),
            done,
        })));
        for (s, label) in labels {
            if let ScatterLabel::Optional(_, Some(label)) = label {
                let Some(expr) = &s.expr else {
                    continue;
                };
                self.commit_jump_label(label);
                self.generate_expr(expr)?;
                self.emit(Op::Put(s.id));
                self.emit(Op::Pop);
                self.pop_stack(1);
            }
        }
        self.commit_jump_label(done);
        Ok(())
    }

    fn push_lvalue(&mut self, expr: &Expr, indexed_above: bool) -> Result<(), CompileError> {
        match expr {
            Expr::Range { base, from, to } => {
                self.push_lvalue(base.as_ref(), true)?;
                let old = self.save_stack_top();
                self.generate_expr(from.as_ref())?;
                self.generate_expr(to.as_ref())?;
                self.restore_stack_top(old);
            }
            Expr::Index(lhs, rhs) => {
                self.push_lvalue(lhs.as_ref(), true)?;
                let old = self.save_stack_top();
                self.generate_expr(rhs.as_ref())?;
                self.restore_stack_top(old);
                if indexed_above {
                    self.emit(Op::IndexPush);
                    self.push_stack(1);
                }
            }
            Expr::Id(id) => {
                if indexed_above {
                    self.emit(Op::Push(*id));
                    self.push_stack(1);
                }
            }
            Expr::Prop { property, location } => {
                self.generate_expr(location.as_ref())?;
                self.generate_expr(property.as_ref())?;
                if indexed_above {
                    self.emit(Op::PushGetProp);
                    self.push_stack(1);
                }
            }
            _ => return Err(CompileError::BadAssignmentTarget),
        }
        Ok(())
    }

    fn catch_codes(codes: &AstCatchCodes) -> CatchCodes {
        match codes {
            AstCatchCodes::Codes(codes) => CatchCodes::Codes(codes.clone()),
            AstCatchCodes::Any => CatchCodes::Any,
        }
    }

    fn generate_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Value(v) => {
                match v.variant() {
                    Variant::Obj(oid) => self.emit(Op::ImmObj(*oid)),
                    Variant::Int(i) => self.emit(Op::ImmInt(*i)),
                    Variant::Float(f) => self.emit(Op::ImmFloat(*f)),
                    Variant::Err(e) if e.msg.is_none() && e.value.is_none() => {
                        self.emit(Op::ImmErr(e.code))
                    }
                    Variant::List(l) if l.is_empty() => self.emit(Op::ImmEmptyList),
                    _ => {
                        let literal = self.add_literal(v);
                        self.emit(Op::Imm(literal));
                    }
                };
                self.push_stack(1);
            }
            Expr::Id(ident) => {
                self.emit(Op::Push(*ident));
                self.push_stack(1);
            }
            Expr::And(left, right) => {
                self.generate_expr(left.as_ref())?;
                let end_label = self.make_jump_label(None);
                self.emit(Op::And(end_label));
                self.pop_stack(1);
                self.generate_expr(right.as_ref())?;
                self.commit_jump_label(end_label);
            }
            Expr::Or(left, right) => {
                self.generate_expr(left.as_ref())?;
                let end_label = self.make_jump_label(None);
                self.emit(Op::Or(end_label));
                self.pop_stack(1);
                self.generate_expr(right.as_ref())?;
                self.commit_jump_label(end_label);
            }
            Expr::Binary(op, l, r) => {
                self.generate_expr(l)?;
                self.generate_expr(r)?;
                let binop = match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Mod => Op::Mod,
                    BinaryOp::Exp => Op::Exp,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::NEq => Op::Ne,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::GtE => Op::Ge,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::LtE => Op::Le,
                    BinaryOp::In => Op::In,
                };
                self.emit(binop);
                self.pop_stack(1);
            }
            Expr::Index(lhs, rhs) => {
                self.generate_expr(lhs.as_ref())?;
                let old = self.save_stack_top();
                self.generate_expr(rhs.as_ref())?;
                self.restore_stack_top(old);
                self.emit(Op::Index);
                self.pop_stack(1);
            }
            Expr::Range { base, from, to } => {
                self.generate_expr(base.as_ref())?;
                let old = self.save_stack_top();
                self.generate_expr(from.as_ref())?;
                self.generate_expr(to.as_ref())?;
                self.restore_stack_top(old);
                self.emit(Op::RangeRef);
                self.pop_stack(2);
            }
            Expr::RangeEnd => {
                let saved = self.saved_stack_top().unwrap_or(OFFSET_NONE);
                self.emit(Op::RangeEnd(saved));
                self.push_stack(1);
            }
            Expr::RangeStart => {
                let saved = self.saved_stack_top().unwrap_or(OFFSET_NONE);
                self.emit(Op::RangeStart(saved));
                self.push_stack(1);
            }
            Expr::Unary(op, expr) => {
                self.generate_expr(expr.as_ref())?;
                self.emit(match op {
                    UnaryOp::Neg => Op::UnaryMinus,
                    UnaryOp::Not => Op::Not,
                });
            }
            Expr::Prop { location, property } => {
                self.generate_expr(location.as_ref())?;
                self.generate_expr(property.as_ref())?;
                self.emit(Op::GetProp);
                self.pop_stack(1);
            }
            Expr::Pass { args } => {
                self.generate_arg_list(args)?;
                self.emit(Op::Pass);
            }
            Expr::Call { function, args } => {
                let Some(id) = BUILTINS.find_builtin(&function.to_lowercase()) else {
                    return Err(CompileError::UnknownBuiltinFunction(function.to_string()));
                };
                self.generate_arg_list(args)?;
                self.emit(Op::CallBuiltin(id));
            }
            Expr::Verb {
                location,
                verb,
                args,
            } => {
                self.generate_expr(location.as_ref())?;
                self.generate_expr(verb.as_ref())?;
                self.generate_arg_list(args)?;
                self.emit(Op::CallVerb);
                self.pop_stack(2);
            }
            Expr::Cond {
                condition,
                consequence,
                alternative,
            } => {
                self.generate_expr(condition.as_ref())?;
                let else_label = self.make_jump_label(None);
                self.emit(Op::IfFalse(else_label));
                self.pop_stack(1);
                self.generate_expr(consequence.as_ref())?;
                let end_label = self.make_jump_label(None);
                self.emit(Op::Jump { label: end_label });
                self.pop_stack(1);
                self.commit_jump_label(else_label);
                self.generate_expr(alternative.as_ref())?;
                self.commit_jump_label(end_label);
            }
            Expr::Catch {
                trye,
                codes,
                except,
            } => {
                let depth = Offset(self.cur_stack as u16);
                let start = Offset(self.ops.len() as u16);
                self.generate_expr(trye.as_ref())?;
                let end = Offset(self.ops.len() as u16);
                let end_label = self.make_jump_label(None);
                self.emit(Op::Jump { label: end_label });
                let handler_label = self.make_jump_label(None);
                self.commit_jump_label(handler_label);
                // On entry here the unwinder has cut the stack to `depth` and
                // pushed the error value.
                match except {
                    Some(except) => {
                        self.emit(Op::Pop);
                        self.pop_stack(1);
                        self.generate_expr(except.as_ref())?;
                    }
                    None => {
                        // The error value itself is the expression's value.
                    }
                }
                self.commit_jump_label(end_label);
                self.handlers.push(Handler {
                    start,
                    end,
                    target: handler_label,
                    depth,
                    kind: HandlerKind::Catch {
                        codes: Self::catch_codes(codes),
                        bind: None,
                        push: true,
                    },
                });
            }
            Expr::List(l) => {
                self.generate_arg_list(l)?;
            }
            Expr::Map(pairs) => {
                self.emit(Op::MakeMap);
                self.push_stack(1);
                for (k, v) in pairs {
                    self.generate_expr(k)?;
                    self.generate_expr(v)?;
                    self.emit(Op::MapInsert);
                    self.pop_stack(2);
                }
            }
            Expr::Scatter(scatter, right) => self.generate_scatter_assign(scatter, right)?,
            Expr::Assign { left, right } => self.generate_assign(left, right)?,
        }
        Ok(())
    }

    fn generate_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        self.line_spans.push((self.ops.len(), stmt.line));
        match &stmt.node {
            StmtNode::Cond { arms, otherwise } => {
                let end_label = self.make_jump_label(None);
                for arm in arms {
                    self.generate_expr(&arm.condition)?;
                    let otherwise_label = self.make_jump_label(None);
                    self.emit(Op::IfFalse(otherwise_label));
                    self.pop_stack(1);
                    for stmt in &arm.statements {
                        self.generate_stmt(stmt)?;
                    }
                    self.emit(Op::Jump { label: end_label });
                    self.commit_jump_label(otherwise_label);
                }
                for stmt in otherwise {
                    self.generate_stmt(stmt)?;
                }
                self.commit_jump_label(end_label);
            }
            StmtNode::ForList { id, expr, body } => {
                self.generate_expr(expr)?;
                // The iteration counter rides the stack under the container.
                self.emit(Op::ImmInt(0));
                self.push_stack(1);
                let loop_top = self.make_jump_label(Some(*id));
                self.commit_jump_label(loop_top);
                let end_label = self.make_jump_label(Some(*id));
                self.emit(Op::ForList {
                    id: *id,
                    end_label,
                });
                self.loops.push(Loop {
                    loop_name: Some(*id),
                    top_label: loop_top,
                    top_stack: self.cur_stack.into(),
                    bottom_label: end_label,
                    bottom_stack: (self.cur_stack - 2).into(),
                });
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                self.emit(Op::Jump { label: loop_top });
                self.commit_jump_label(end_label);
                self.pop_stack(2);
                self.loops.pop();
            }
            StmtNode::ForRange { id, from, to, body } => {
                self.generate_expr(from)?;
                self.generate_expr(to)?;
                let loop_top = self.make_jump_label(Some(*id));
                self.commit_jump_label(loop_top);
                let end_label = self.make_jump_label(Some(*id));
                self.emit(Op::ForRange {
                    id: *id,
                    end_label,
                });
                self.loops.push(Loop {
                    loop_name: Some(*id),
                    top_label: loop_top,
                    top_stack: self.cur_stack.into(),
                    bottom_label: end_label,
                    bottom_stack: (self.cur_stack - 2).into(),
                });
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                self.emit(Op::Jump { label: loop_top });
                self.commit_jump_label(end_label);
                self.pop_stack(2);
                self.loops.pop();
            }
            StmtNode::While {
                id,
                condition,
                body,
            } => {
                let loop_top = self.make_jump_label(*id);
                self.commit_jump_label(loop_top);
                let end_label = self.make_jump_label(*id);
                self.generate_expr(condition)?;
                if let Some(id) = id {
                    self.emit(Op::Put(*id));
                }
                self.emit(Op::IfFalse(end_label));
                self.pop_stack(1);
                self.loops.push(Loop {
                    loop_name: *id,
                    top_label: loop_top,
                    top_stack: self.cur_stack.into(),
                    bottom_label: end_label,
                    bottom_stack: self.cur_stack.into(),
                });
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                self.emit(Op::Jump { label: loop_top });
                self.commit_jump_label(end_label);
                self.loops.pop();
            }
            StmtNode::Fork { id, time, body } => {
                self.generate_expr(time)?;
                let fork_idx = self.fork_table.len();
                self.fork_table.push(ForkBody {
                    offset: Offset(0),
                    len: 0,
                    var: *id,
                });
                self.emit(Op::Fork {
                    fork: Offset(fork_idx as u16),
                });
                self.pop_stack(1);
                // The parent jumps over the body; the child enters at its start.
                let after_label = self.make_jump_label(None);
                self.emit(Op::Jump { label: after_label });
                let body_start = self.ops.len();
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                self.emit(Op::Done);
                let body_len = self.ops.len() - body_start;
                self.commit_jump_label(after_label);
                self.fork_table[fork_idx].offset = body_start.into();
                self.fork_table[fork_idx].len = body_len as u16;
            }
            StmtNode::TryExcept { body, excepts } => {
                let depth = Offset(self.cur_stack as u16);
                let start = Offset(self.ops.len() as u16);
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                let end = Offset(self.ops.len() as u16);
                let end_label = self.make_jump_label(None);
                self.emit(Op::Jump { label: end_label });
                for (i, ex) in excepts.iter().enumerate() {
                    let arm_label = self.make_jump_label(None);
                    self.commit_jump_label(arm_label);
                    for stmt in &ex.statements {
                        self.generate_stmt(stmt)?;
                    }
                    if i + 1 < excepts.len() {
                        self.emit(Op::Jump { label: end_label });
                    }
                    self.handlers.push(Handler {
                        start,
                        end,
                        target: arm_label,
                        depth,
                        kind: HandlerKind::Catch {
                            codes: Self::catch_codes(&ex.codes),
                            bind: ex.id,
                            push: false,
                        },
                    });
                }
                self.commit_jump_label(end_label);
            }
            StmtNode::TryFinally { body, handler } => {
                let depth = Offset(self.cur_stack as u16);
                let start = Offset(self.ops.len() as u16);
                for stmt in body {
                    self.generate_stmt(stmt)?;
                }
                let end = Offset(self.ops.len() as u16);
                self.emit(Op::EndFinally);
                let handler_label = self.make_jump_label(None);
                self.commit_jump_label(handler_label);
                for stmt in handler {
                    self.generate_stmt(stmt)?;
                }
                self.emit(Op::FinallyContinue);
                self.handlers.push(Handler {
                    start,
                    end,
                    target: handler_label,
                    depth,
                    kind: HandlerKind::Finally,
                });
            }
            StmtNode::Break { exit } => {
                let (stack, label) = match exit {
                    None => {
                        let l = self.loops.last().ok_or(CompileError::NoLoopContext)?;
                        (l.bottom_stack, l.bottom_label)
                    }
                    Some(name) => {
                        let l = self.find_loop(name)?;
                        (l.bottom_stack, l.bottom_label)
                    }
                };
                self.emit(Op::Exit { stack, label });
            }
            StmtNode::Continue { exit } => {
                let (stack, label) = match exit {
                    None => {
                        let l = self.loops.last().ok_or(CompileError::NoLoopContext)?;
                        (l.top_stack, l.top_label)
                    }
                    Some(name) => {
                        let l = self.find_loop(name)?;
                        (l.top_stack, l.top_label)
                    }
                };
                self.emit(Op::Exit { stack, label });
            }
            StmtNode::Return(Some(expr)) => {
                self.generate_expr(expr)?;
                self.emit(Op::Return);
                self.pop_stack(1);
            }
            StmtNode::Return(None) => self.emit(Op::Return0),
            StmtNode::Expr(e) => {
                self.generate_expr(e)?;
                self.emit(Op::Pop);
                self.pop_stack(1);
            }
        }
        Ok(())
    }

    fn generate_arg_list(&mut self, args: &Vec<Arg>) -> Result<(), CompileError> {
        if args.is_empty() {
            self.emit(Op::ImmEmptyList);
            self.push_stack(1);
            return Ok(());
        }

        let mut normal_op = Op::MakeSingletonList;
        let mut splice_op = Op::CheckListForSplice;
        let mut pop = 0;
        for a in args {
            match a {
                Arg::Normal(a) => {
                    self.generate_expr(a)?;
                    self.emit(normal_op.clone());
                }
                Arg::Splice(s) => {
                    self.generate_expr(s)?;
                    self.emit(splice_op.clone());
                }
            }
            self.pop_stack(pop);
            pop = 1;
            normal_op = Op::ListAddTail;
            splice_op = Op::ListAppend;
        }
        Ok(())
    }
}

/// Compile a parsed program into bytecode.
pub fn compile(parse: Parse) -> Result<Program, CompileError> {
    let mut cg_state = CodegenState::new(parse.names);
    for stmt in &parse.stmts {
        cg_state.generate_stmt(stmt)?;
    }
    cg_state.emit(Op::Done);

    assert!(
        cg_state.cur_stack == 0 && cg_state.saved_stack.is_none(),
        "stack not empty at end of compilation: {} ({:?})",
        cg_state.cur_stack,
        cg_state.saved_stack
    );

    Ok(Program {
        literals: cg_state.literals,
        jump_labels: cg_state.jumps,
        var_names: cg_state.var_names,
        main_vector: Arc::new(cg_state.ops),
        handlers: cg_state.handlers,
        fork_table: cg_state.fork_table,
        line_spans: cg_state.line_spans,
    })
}
