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

use crate::ast::{AstCatchCodes, BinaryOp, StmtNode};
use crate::codegen::compile;
use crate::opcode::Op;
use crate::program::HandlerKind;
use crate::testing::*;
use barn_var::ErrorCode::{E_DIV, E_PERM};
use pretty_assertions::assert_eq;

#[test]
fn simple_return() {
    let mut b = AstBuilder::new();
    b.ret(add(int(1), int(2)));
    let program = compile(b.parse()).unwrap();
    assert_eq!(
        *program.main_vector,
        vec![Op::ImmInt(1), Op::ImmInt(2), Op::Add, Op::Return, Op::Done]
    );
}

#[test]
fn literal_pooling_is_case_sensitive() {
    let mut b = AstBuilder::new();
    b.expr_stmt(stre("Foo"));
    b.expr_stmt(stre("foo"));
    b.expr_stmt(stre("Foo"));
    let program = compile(b.parse()).unwrap();
    // Distinct casings pool separately; identical strings share a slot.
    assert_eq!(program.literals.len(), 2);
}

#[test]
fn while_loop_shape() {
    let mut b = AstBuilder::new();
    let x = b.name("x");
    let body = b.nested(|b| {
        let x = b.name("x");
        b.expr_stmt(assign_to(ident(x), add(ident(x), int(1))));
    });
    b.push(StmtNode::While {
        id: None,
        condition: binary(BinaryOp::Lt, ident(x), int(10)),
        body,
    });
    let program = compile(b.parse()).unwrap();
    let ops = &*program.main_vector;
    // Condition at top, conditional exit, backward jump at bottom.
    assert!(matches!(ops[0], Op::Push(_)));
    assert!(matches!(ops[2], Op::Lt));
    assert!(matches!(ops[3], Op::IfFalse(_)));
    assert!(matches!(ops[ops.len() - 2], Op::Jump { .. }));
}

#[test]
fn fork_body_is_inline_region() {
    let mut b = AstBuilder::new();
    let t = b.name("t");
    let body = b.nested(|b| {
        b.expr_stmt(builtin("notify", vec![obj(2), stre("hi")]));
    });
    b.push(StmtNode::Fork {
        id: Some(t),
        time: int(5),
        body,
    });
    let program = compile(b.parse()).unwrap();
    assert_eq!(program.fork_table.len(), 1);
    let fork = &program.fork_table[0];
    assert_eq!(fork.var, Some(t));
    // The recorded region ends with Done, inside the main vector.
    let start = fork.offset.0 as usize;
    let end = start + fork.len as usize;
    assert_eq!(program.main_vector[end - 1], Op::Done);
    // The parent path jumps over the body.
    assert!(matches!(
        program.main_vector[start - 1],
        Op::Jump { .. }
    ));
}

#[test]
fn try_except_handler_table() {
    let mut b = AstBuilder::new();
    let e = b.name("e");
    let body = b.nested(|b| {
        b.expr_stmt(div(int(1), int(0)));
    });
    let arm_body = b.nested(|b| {
        b.ret(int(99));
    });
    b.push(StmtNode::TryExcept {
        body,
        excepts: vec![except_arm(
            Some(e),
            AstCatchCodes::Codes(vec![E_DIV, E_PERM]),
            arm_body,
        )],
    });
    let program = compile(b.parse()).unwrap();
    assert_eq!(program.handlers.len(), 1);
    let h = &program.handlers[0];
    let HandlerKind::Catch { codes, bind, push } = &h.kind else {
        panic!("expected catch handler");
    };
    assert!(codes.matches(&E_DIV));
    assert!(codes.matches(&E_PERM));
    assert!(!codes.matches(&barn_var::ErrorCode::E_TYPE));
    assert_eq!(*bind, Some(e));
    assert!(!push);
    // Handler target lies beyond the protected region.
    let target_pos = program.jump_label(h.target).position.0;
    assert!(target_pos > h.end.0);
}

#[test]
fn nested_try_handlers_inner_first() {
    let mut b = AstBuilder::new();
    let inner_body = b.nested(|b| {
        b.expr_stmt(div(int(1), int(0)));
    });
    let inner_arm = b.nested(|b| {
        b.expr_stmt(int(1));
    });
    let outer_body = b.nested(move |b| {
        b.push(StmtNode::TryExcept {
            body: inner_body,
            excepts: vec![except_arm(None, AstCatchCodes::Codes(vec![E_DIV]), inner_arm)],
        });
    });
    let outer_arm = b.nested(|b| {
        b.expr_stmt(int(2));
    });
    b.push(StmtNode::TryExcept {
        body: outer_body,
        excepts: vec![except_arm(None, AstCatchCodes::Any, outer_arm)],
    });
    let program = compile(b.parse()).unwrap();
    assert_eq!(program.handlers.len(), 2);
    // Inner region is recorded first and nests within the outer.
    assert!(program.handlers[0].start >= program.handlers[1].start);
    assert!(program.handlers[0].end <= program.handlers[1].end);
}

#[test]
fn try_finally_region() {
    let mut b = AstBuilder::new();
    let body = b.nested(|b| {
        b.ret(int(10));
    });
    let handler = b.nested(|b| {
        b.ret(int(20));
    });
    b.push(StmtNode::TryFinally { body, handler });
    let program = compile(b.parse()).unwrap();
    assert_eq!(program.handlers.len(), 1);
    assert_eq!(program.handlers[0].kind, HandlerKind::Finally);
    let ops = &*program.main_vector;
    assert!(ops.contains(&Op::EndFinally));
    assert!(ops.contains(&Op::FinallyContinue));
    // The finally handler begins right after EndFinally.
    let end_finally_pos = ops.iter().position(|op| *op == Op::EndFinally).unwrap();
    let target_pos = program.jump_label(program.handlers[0].target).position.0 as usize;
    assert_eq!(target_pos, end_finally_pos + 1);
}

#[test]
fn scatter_compilation() {
    let mut b = AstBuilder::new();
    let a = b.name("a");
    let bn = b.name("b");
    let r = b.name("r");
    b.expr_stmt(scatter(
        vec![required(a), optional(bn, Some(int(7))), rest(r)],
        list(vec![int(1)]),
    ));
    let program = compile(b.parse()).unwrap();
    let scatter_op = program
        .main_vector
        .iter()
        .find_map(|op| match op {
            Op::Scatter(sa) => Some(sa.clone()),
            _ => None,
        })
        .expect("no scatter op");
    assert_eq!(scatter_op.labels.len(), 3);
}

#[test]
fn unknown_builtin_fails() {
    let mut b = AstBuilder::new();
    b.expr_stmt(builtin("look", vec![]));
    // "look" is a verb, not a builtin.
    assert!(compile(b.parse()).is_err());
}

#[test]
fn break_outside_loop_fails() {
    let mut b = AstBuilder::new();
    b.push(StmtNode::Break { exit: None });
    assert!(compile(b.parse()).is_err());
}

#[test]
fn line_spans_ascend() {
    let mut b = AstBuilder::new();
    b.expr_stmt(int(1));
    b.expr_stmt(int(2));
    b.ret(int(3));
    let program = compile(b.parse()).unwrap();
    let mut last = 0;
    for (offset, line) in &program.line_spans {
        assert!(*offset >= last);
        last = *offset;
        assert!(*line > 0);
    }
}
