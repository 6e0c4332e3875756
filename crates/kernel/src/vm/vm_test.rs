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

use crate::tasks::sessions::BufferedSessions;
use crate::tasks::NoSchedulerControl;
use crate::vm::{Activation, ExecutionResult, VmExec, VmExecParams, VM};
use barn_common::model::{VerbArgsSpec, VerbDef, VerbFlag};
use barn_compiler::ast::{AstCatchCodes, BinaryOp, StmtNode};
use barn_compiler::testing::*;
use barn_compiler::{compile, NullParser, Parse};
use barn_db::ObjectStore;
use barn_var::ErrorCode::{E_ARGS, E_DIV, E_RANGE, E_TYPE, E_VARNF, E_VERBNF};
use barn_var::{v_err, v_int, v_list, v_obj, v_str, Obj, Symbol, Var};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn params() -> VmExecParams {
    VmExecParams {
        parser: Arc::new(NullParser),
        max_stack_depth: 50,
    }
}

/// Run a compiled program as an eval frame until it yields something other
/// than More, handling forks by just continuing the parent.
fn run(world: &mut ObjectStore, parse: Parse) -> ExecutionResult {
    let program = compile(parse).expect("compile failed");
    let activation = Activation::for_eval(program, Obj(0), Obj(0));
    let mut state = VmExec::new(1, activation, 300_000, 5);
    run_state(world, &mut state)
}

fn run_state(world: &mut ObjectStore, state: &mut VmExec) -> ExecutionResult {
    let vm = VM::new();
    let params = params();
    let sessions = BufferedSessions::new();
    let mut sched = NoSchedulerControl;
    loop {
        match vm.exec(&params, state, world, &sessions, &mut sched) {
            ExecutionResult::More => continue,
            other => return other,
        }
    }
}

fn expect_value(result: ExecutionResult) -> Var {
    match result {
        ExecutionResult::Complete(v) => v,
        other => panic!("expected completion, got {other:?}"),
    }
}

fn expect_error(result: ExecutionResult) -> barn_var::Error {
    match result {
        ExecutionResult::Exception(e) => e.error,
        other => panic!("expected exception, got {other:?}"),
    }
}

/// Install a verb whose program comes precompiled from the AST builders,
/// sidestepping the (absent) source parser.
fn install_verb(world: &mut ObjectStore, on: &Obj, names: &str, parse: Parse) {
    let index = world
        .add_verb(
            on,
            VerbDef {
                names: names.into(),
                owner: Obj(0),
                flags: VerbFlag::rxd(),
                args: VerbArgsSpec::this_none_this(),
            },
            format!("-- compiled in tests: {names}"),
        )
        .unwrap();
    let program = compile(parse).expect("verb compile failed");
    world.cache_verb_program(on, index, program);
}

fn empty_world() -> ObjectStore {
    let mut world = ObjectStore::new();
    // #0, the system object.
    world.create(vec![], Obj(0), false, None).unwrap();
    world
}

#[test]
fn arithmetic_completes() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(add(int(1), binary(BinaryOp::Mul, int(2), int(3))));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(7));
}

#[test]
fn division_by_zero_raises() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(div(int(1), int(0)));
    let e = expect_error(run(&mut world, b.parse()));
    assert_eq!(e.code, E_DIV);
}

#[test]
fn unbound_variable_is_varnf() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let x = b.name("x");
    b.ret(ident(x));
    let e = expect_error(run(&mut world, b.parse()));
    assert_eq!(e.code, E_VARNF);
}

#[test]
fn copy_on_write_assignment() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let a = b.name("a");
    let bb = b.name("b");
    b.assign("a", list(vec![int(1), int(2), int(3)]));
    b.assign("b", ident(a));
    b.expr_stmt(assign_to(index(ident(bb), int(1)), int(99)));
    b.ret(list(vec![
        index(ident(a), int(1)),
        index(ident(bb), int(1)),
    ]));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_int(1), v_int(99)])
    );
}

#[test]
fn nested_index_assignment_rebuilds() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let a = b.name("a");
    b.assign("a", list(vec![list(vec![int(1), int(2)]), int(3)]));
    b.expr_stmt(assign_to(index(index(ident(a), int(1)), int(2)), int(42)));
    b.ret(ident(a));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_list(&[v_int(1), v_int(42)]), v_int(3)])
    );
}

#[test]
fn one_based_indexing_bounds() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(index(list(vec![int(10), int(20)]), int(0)));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_RANGE);

    let mut b = AstBuilder::new();
    b.ret(index(list(vec![int(10), int(20)]), int(3)));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_RANGE);
}

#[test]
fn dollar_is_length_inside_index() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(index(
        list(vec![int(10), int(20), int(30)]),
        barn_compiler::ast::Expr::RangeEnd,
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(30));
}

#[test]
fn range_expression() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(range(
        value(v_str("barnacle")),
        int(1),
        int(4),
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_str("barn"));
}

#[test]
fn in_operator_on_map_is_value_positional() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(binary(
        BinaryOp::In,
        int(20),
        map(vec![(stre("a"), int(10)), (stre("b"), int(20))]),
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(2));
}

#[test]
fn scatter_required_optional_rest() {
    // {a, ?b = 7, @rest} = {1}  =>  a == 1, b == 7, rest == {}
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let a = b.name("a");
    let bb = b.name("b");
    let r = b.name("rest");
    b.expr_stmt(scatter(
        vec![required(a), optional(bb, Some(int(7))), rest(r)],
        list(vec![int(1)]),
    ));
    b.ret(list(vec![ident(a), ident(bb), ident(r)]));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_int(1), v_int(7), v_list(&[])])
    );
}

#[test]
fn scatter_spreads_remainder() {
    // {a, ?b, @rest} = {1,2,3,4}  =>  a == 1, b == 2, rest == {3,4}
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let a = b.name("a");
    let bb = b.name("b");
    let r = b.name("rest");
    b.expr_stmt(scatter(
        vec![required(a), optional(bb, None), rest(r)],
        list(vec![int(1), int(2), int(3), int(4)]),
    ));
    b.ret(list(vec![ident(a), ident(bb), ident(r)]));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_int(1), v_int(2), v_list(&[v_int(3), v_int(4)])])
    );
}

#[test]
fn scatter_arity_and_type_errors() {
    // {a, b} = {1,2,3} raises E_ARGS.
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let a = b.name("a");
    let bb = b.name("b");
    b.expr_stmt(scatter(
        vec![required(a), required(bb)],
        list(vec![int(1), int(2), int(3)]),
    ));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_ARGS);

    // {a, b} = 42 raises E_TYPE.
    let mut b = AstBuilder::new();
    let a = b.name("a");
    let bb = b.name("b");
    b.expr_stmt(scatter(vec![required(a), required(bb)], int(42)));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_TYPE);
}

#[test]
fn while_loop_with_break() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let x = b.name("x");
    b.assign("x", int(0));
    let body = b.nested(|b| {
        let x = b.name("x");
        b.expr_stmt(assign_to(ident(x), add(ident(x), int(1))));
        let break_body = b.nested(|b| {
            b.push(StmtNode::Break { exit: None });
        });
        b.push(StmtNode::Cond {
            arms: vec![cond_arm(
                binary(BinaryOp::GtE, ident(x), int(5)),
                break_body,
            )],
            otherwise: vec![],
        });
    });
    b.push(StmtNode::While {
        id: None,
        condition: int(1),
        body,
    });
    b.ret(ident(x));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(5));
}

#[test]
fn for_range_accumulates() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let total = b.name("total");
    let i = b.name("i");
    b.assign("total", int(0));
    let body = b.nested(|b| {
        let total = b.name("total");
        let i = b.name("i");
        b.expr_stmt(assign_to(ident(total), add(ident(total), ident(i))));
    });
    b.push(StmtNode::ForRange {
        id: i,
        from: int(1),
        to: int(4),
        body,
    });
    b.ret(ident(total));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(10));
}

#[test]
fn for_list_iterates_elements_and_map_values() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let acc = b.name("acc");
    let v = b.name("v");
    b.assign("acc", list(vec![]));
    let body = b.nested(|b| {
        let acc = b.name("acc");
        let v = b.name("v");
        b.expr_stmt(assign_to(
            ident(acc),
            builtin("listappend", vec![ident(acc), ident(v)]),
        ));
    });
    b.push(StmtNode::ForList {
        id: v,
        expr: map(vec![(stre("a"), int(1)), (stre("b"), int(2))]),
        body,
    });
    b.ret(ident(acc));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_int(1), v_int(2)])
    );
}

#[test]
fn try_except_catches_and_binds() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let e = b.name("e");
    let body = b.nested(|b| {
        b.expr_stmt(div(int(1), int(0)));
    });
    let arm = b.nested(|b| {
        let e = b.name("e");
        b.ret(ident(e));
    });
    b.push(StmtNode::TryExcept {
        body,
        excepts: vec![except_arm(Some(e), AstCatchCodes::Codes(vec![E_DIV]), arm)],
    });
    b.ret(int(-1));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_err(E_DIV));
}

#[test]
fn try_except_skips_unmatched_codes() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let body = b.nested(|b| {
        b.expr_stmt(div(int(1), int(0)));
    });
    let arm = b.nested(|b| {
        b.ret(int(1));
    });
    b.push(StmtNode::TryExcept {
        body,
        excepts: vec![except_arm(None, AstCatchCodes::Codes(vec![E_RANGE]), arm)],
    });
    b.ret(int(2));
    // E_RANGE does not match E_DIV; the error escapes.
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_DIV);
}

#[test]
fn catch_expression_with_default() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(catch_expr(
        div(int(1), int(0)),
        AstCatchCodes::Codes(vec![E_DIV]),
        Some(int(42)),
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(42));
}

#[test]
fn catch_expression_without_default_yields_error() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(catch_expr(
        div(int(1), int(0)),
        AstCatchCodes::Any,
        None,
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_err(E_DIV));
}

#[test]
fn catch_expression_passes_through_success() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(catch_expr(
        add(int(40), int(2)),
        AstCatchCodes::Any,
        Some(int(0)),
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(42));
}

#[test]
fn try_finally_return_precedence() {
    // try return 10; finally return 20; endtry  =>  20
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let body = b.nested(|b| {
        b.ret(int(10));
    });
    let handler = b.nested(|b| {
        b.ret(int(20));
    });
    b.push(StmtNode::TryFinally { body, handler });
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(20));
}

#[test]
fn try_finally_reraises_with_side_effect() {
    // try 1/0; finally #0.x = 99; endtry  =>  E_DIV, with the write visible.
    let mut world = empty_world();
    world
        .define_property(
            &Obj(0),
            Symbol::mk("x"),
            Obj(0),
            barn_common::model::PropFlag::rw(),
            Some(v_int(0)),
        )
        .unwrap();
    let mut b = AstBuilder::new();
    let body = b.nested(|b| {
        b.expr_stmt(div(int(1), int(0)));
    });
    let handler = b.nested(|b| {
        b.expr_stmt(assign_to(prop(obj(0), "x"), int(99)));
    });
    b.push(StmtNode::TryFinally { body, handler });
    b.ret(int(0));
    let e = expect_error(run(&mut world, b.parse()));
    assert_eq!(e.code, E_DIV);
    assert_eq!(
        world.resolve_property(&Obj(0), Symbol::mk("x")).unwrap().0,
        v_int(99)
    );
}

#[test]
fn finally_runs_on_normal_exit_too() {
    let mut world = empty_world();
    world
        .define_property(
            &Obj(0),
            Symbol::mk("x"),
            Obj(0),
            barn_common::model::PropFlag::rw(),
            Some(v_int(0)),
        )
        .unwrap();
    let mut b = AstBuilder::new();
    let body = b.nested(|b| {
        b.expr_stmt(int(1));
    });
    let handler = b.nested(|b| {
        b.expr_stmt(assign_to(prop(obj(0), "x"), int(7)));
    });
    b.push(StmtNode::TryFinally { body, handler });
    b.ret(prop(obj(0), "x"));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(7));
}

#[test]
fn verb_call_and_this_binding() {
    let mut world = empty_world();
    let target = world.create(vec![], Obj(0), false, None).unwrap();

    // target:double(n) => return n * 2 + this-is-target marker
    let mut vb = AstBuilder::new();
    let args_slot = vb.names.find_name("args").unwrap();
    vb.ret(list(vec![
        ident(vb.names.find_name("this").unwrap()),
        binary(
            BinaryOp::Mul,
            index(ident(args_slot), int(1)),
            int(2),
        ),
    ]));
    install_verb(&mut world, &target, "double", vb.parse());

    let mut b = AstBuilder::new();
    b.ret(verb_call(obj(target.0), "double", vec![int(21)]));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_obj(target), v_int(42)])
    );
}

#[test]
fn verb_wildcard_match_and_verbnf() {
    let mut world = empty_world();
    let ten = world.create(vec![], Obj(0), false, None).unwrap();
    let mut vb = AstBuilder::new();
    vb.ret(int(1));
    install_verb(&mut world, &ten, "co*nnect", vb.parse());

    for name in ["connect", "connnnect"] {
        let mut b = AstBuilder::new();
        b.ret(verb_call(obj(ten.0), name, vec![]));
        assert_eq!(expect_value(run(&mut world, b.parse())), v_int(1));
    }

    let mut b = AstBuilder::new();
    b.ret(verb_call(obj(ten.0), "co", vec![]));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_VERBNF);
}

#[test]
fn pass_reaches_the_overridden_verb() {
    let mut world = empty_world();
    let parent = world.create(vec![], Obj(0), false, None).unwrap();
    let child = world.create(vec![parent], Obj(0), false, None).unwrap();

    let mut pb = AstBuilder::new();
    pb.ret(int(100));
    install_verb(&mut world, &parent, "greet", pb.parse());

    let mut cb = AstBuilder::new();
    cb.ret(add(pass_expr(vec![]), int(1)));
    install_verb(&mut world, &child, "greet", cb.parse());

    let mut b = AstBuilder::new();
    b.ret(verb_call(obj(child.0), "greet", vec![]));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(101));
}

#[test]
fn frame_depth_is_bounded() {
    let mut world = empty_world();
    let target = world.create(vec![], Obj(0), false, None).unwrap();
    // target:loop() => return target:loop();  (unbounded recursion)
    let mut vb = AstBuilder::new();
    vb.ret(verb_call(obj(target.0), "loop", vec![]));
    install_verb(&mut world, &target, "loop", vb.parse());

    let mut b = AstBuilder::new();
    b.ret(verb_call(obj(target.0), "loop", vec![]));
    let e = expect_error(run(&mut world, b.parse()));
    assert_eq!(e.code, barn_var::ErrorCode::E_MAXREC);
}

#[test]
fn tick_exhaustion_aborts_uncatchably() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    // try while (1) endwhile; except ANY: return 1; endtry: the abort must not
    // be interceptable.
    let loop_body = b.nested(|_| {});
    let body = b.nested(move |b| {
        b.push(StmtNode::While {
            id: None,
            condition: int(1),
            body: loop_body,
        });
    });
    let arm = b.nested(|b| {
        b.ret(int(1));
    });
    b.push(StmtNode::TryExcept {
        body,
        excepts: vec![except_arm(None, AstCatchCodes::Any, arm)],
    });

    let program = compile(b.parse()).unwrap();
    let activation = Activation::for_eval(program, Obj(0), Obj(0));
    let mut state = VmExec::new(1, activation, 1_000, 5);
    match run_state(&mut world, &mut state) {
        ExecutionResult::Abort(barn_common::tasks::AbortLimitReason::Ticks(_)) => {}
        other => panic!("expected tick abort, got {other:?}"),
    }
}

#[test]
fn fork_yields_to_scheduler_and_parent_continues() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let t = b.name("t");
    let body = b.nested(|b| {
        b.expr_stmt(int(0));
    });
    b.push(StmtNode::Fork {
        id: Some(t),
        time: int(1),
        body,
    });
    b.ret(ident(t));

    let program = compile(b.parse()).unwrap();
    let activation = Activation::for_eval(program, Obj(0), Obj(0));
    let mut state = VmExec::new(1, activation, 300_000, 5);

    let vm = VM::new();
    let params = params();
    let sessions = BufferedSessions::new();
    let mut sched = NoSchedulerControl;
    let fork = loop {
        match vm.exec(&params, &mut state, &mut world, &sessions, &mut sched) {
            ExecutionResult::More => continue,
            ExecutionResult::DispatchFork(fork) => break fork,
            other => panic!("expected fork, got {other:?}"),
        }
    };
    assert_eq!(fork.delay, Some(Duration::from_secs(1)));
    assert_eq!(fork.var, Some(t));

    // The scheduler's half: bind the child id into the parent and continue.
    state.top_mut().frame.set_env(&t, v_int(77));
    assert_eq!(expect_value(run_state(&mut world, &mut state)), v_int(77));

    // The child half runs the body region to completion independently.
    let mut child_activation = fork.activation;
    child_activation.frame.set_env(&t, v_int(77));
    let mut child_state = VmExec::new(2, child_activation, 300_000, 5);
    expect_value(run_state(&mut world, &mut child_state));
}

#[test]
fn fork_body_errors_do_not_reach_parent_handlers() {
    // A try/except around a fork does not catch errors raised in the child.
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let fork_body = b.nested(|b| {
        b.expr_stmt(div(int(1), int(0)));
    });
    let body = b.nested(move |b| {
        b.push(StmtNode::Fork {
            id: None,
            time: int(0),
            body: fork_body,
        });
    });
    let arm = b.nested(|b| {
        b.ret(int(-1));
    });
    b.push(StmtNode::TryExcept {
        body,
        excepts: vec![except_arm(None, AstCatchCodes::Any, arm)],
    });
    b.ret(int(0));

    let program = compile(b.parse()).unwrap();
    let activation = Activation::for_eval(program, Obj(0), Obj(0));
    let mut state = VmExec::new(1, activation, 300_000, 5);
    let vm = VM::new();
    let params = params();
    let sessions = BufferedSessions::new();
    let mut sched = NoSchedulerControl;
    let fork = loop {
        match vm.exec(&params, &mut state, &mut world, &sessions, &mut sched) {
            ExecutionResult::More => continue,
            ExecutionResult::DispatchFork(fork) => break fork,
            other => panic!("expected fork, got {other:?}"),
        }
    };
    // Parent completes normally.
    assert_eq!(expect_value(run_state(&mut world, &mut state)), v_int(0));
    // Child raises and its exception escapes uncaught despite the parent's
    // handler table entry, which is fenced outside the fork body span.
    let mut child_state = VmExec::new(2, fork.activation, 300_000, 5);
    let e = expect_error(run_state(&mut world, &mut child_state));
    assert_eq!(e.code, E_DIV);
}

#[test]
fn builtin_arity_is_enforced() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(builtin("typeof", vec![]));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_ARGS);
}

#[test]
fn builtin_tostr_and_typeof() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(builtin(
        "tostr",
        vec![stre("x="), int(5), stre("/"), obj(2)],
    ));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_str("x=5/#2"));

    let mut b = AstBuilder::new();
    b.ret(builtin("typeof", vec![stre("s")]));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_int(barn_var::VarType::TYPE_STR as i64)
    );
}

#[test]
fn property_read_write_through_vm() {
    let mut world = empty_world();
    world
        .define_property(
            &Obj(0),
            Symbol::mk("counter"),
            Obj(0),
            barn_common::model::PropFlag::rw(),
            Some(v_int(5)),
        )
        .unwrap();
    let mut b = AstBuilder::new();
    b.expr_stmt(assign_to(
        prop(obj(0), "counter"),
        add(prop(obj(0), "counter"), int(1)),
    ));
    b.ret(prop(obj(0), "counter"));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(6));
}

#[test]
fn property_not_found_raises() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(prop(obj(0), "missing"));
    assert_eq!(
        expect_error(run(&mut world, b.parse())).code,
        barn_var::ErrorCode::E_PROPNF
    );
}

#[test]
fn builtin_property_name_access() {
    let mut world = empty_world();
    world.get_mut(&Obj(0)).unwrap().name = "System Object".into();
    let mut b = AstBuilder::new();
    b.ret(prop(obj(0), "name"));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_str("System Object")
    );
}

#[test]
fn ternary_and_logic_short_circuit() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(barn_compiler::ast::Expr::Cond {
        condition: Box::new(barn_compiler::ast::Expr::And(
            Box::new(int(1)),
            Box::new(int(0)),
        )),
        consequence: Box::new(stre("yes")),
        alternative: Box::new(stre("no")),
    });
    assert_eq!(expect_value(run(&mut world, b.parse())), v_str("no"));
}

#[test]
fn error_value_returned_under_non_debug_verb() {
    // Without the 'd' flag an error becomes the expression value instead of
    // raising.
    let mut world = empty_world();
    let target = world.create(vec![], Obj(0), false, None).unwrap();
    let mut vb = AstBuilder::new();
    vb.ret(div(int(1), int(0)));
    let index = world
        .add_verb(
            &target,
            VerbDef {
                names: "quiet".into(),
                owner: Obj(0),
                flags: VerbFlag::parse_str("rx").unwrap(),
                args: VerbArgsSpec::this_none_this(),
            },
            String::new(),
        )
        .unwrap();
    world.cache_verb_program(&target, index, compile(vb.parse()).unwrap());

    let mut b = AstBuilder::new();
    b.ret(verb_call(obj(target.0), "quiet", vec![]));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_err(E_DIV));
}

#[test]
fn eq_is_case_insensitive_for_strings() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    b.ret(binary(BinaryOp::Eq, stre("Hello"), stre("HELLO")));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(1));

    // equal() is the case-sensitive form.
    let mut b = AstBuilder::new();
    b.ret(builtin("equal", vec![stre("Hello"), stre("HELLO")]));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(0));
}

#[test]
fn map_constructor_and_index() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let m = b.name("m");
    b.assign("m", map(vec![(stre("k"), int(5))]));
    b.ret(index(ident(m), stre("K")));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(5));

    let mut b = AstBuilder::new();
    let m = b.name("m");
    b.assign("m", map(vec![(stre("k"), int(5))]));
    b.ret(index(ident(m), stre("missing")));
    assert_eq!(expect_error(run(&mut world, b.parse())).code, E_RANGE);
}

#[test]
fn splice_in_list_construction() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let l = b.name("l");
    b.assign("l", list(vec![int(2), int(3)]));
    b.ret(splice_list(vec![
        barn_compiler::ast::Arg::Normal(int(1)),
        barn_compiler::ast::Arg::Splice(ident(l)),
        barn_compiler::ast::Arg::Normal(int(4)),
    ]));
    assert_eq!(
        expect_value(run(&mut world, b.parse())),
        v_list(&[v_int(1), v_int(2), v_int(3), v_int(4)])
    );
}

#[test]
fn traceback_names_all_frames() {
    let mut world = empty_world();
    let target = world.create(vec![], Obj(0), false, None).unwrap();
    let mut vb = AstBuilder::new();
    vb.ret(div(int(1), int(0)));
    install_verb(&mut world, &target, "inner", vb.parse());
    let mut vb = AstBuilder::new();
    vb.ret(verb_call(obj(target.0), "inner", vec![]));
    install_verb(&mut world, &target, "outer", vb.parse());

    let mut b = AstBuilder::new();
    b.ret(verb_call(obj(target.0), "outer", vec![]));
    let result = run(&mut world, b.parse());
    let ExecutionResult::Exception(e) = result else {
        panic!("expected exception");
    };
    // Three frames deep: eval -> outer -> inner; traceback is innermost-first
    // and ends with the closing line.
    assert_eq!(e.frames.len(), 3);
    let lines = e.traceback_lines();
    assert!(lines[0].starts_with(&format!("{target}:inner, line ")));
    assert!(lines[0].ends_with("E_DIV"));
    assert!(lines[1].starts_with("... called from "));
    assert_eq!(lines.last().unwrap(), "(End of traceback)");
}

#[test]
fn waif_property_and_invalidated_class() {
    let mut world = empty_world();
    let class = world.create(vec![], Obj(0), false, None).unwrap();
    world
        .get_mut(&class)
        .unwrap()
        .flags
        .set(barn_common::model::ObjFlag::Fertile);

    let mut b = AstBuilder::new();
    let w = b.name("w");
    b.assign("w", builtin("new_waif", vec![obj(class.0)]));
    b.expr_stmt(assign_to(prop(ident(w), "hp"), int(10)));
    b.ret(prop(ident(w), "hp"));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(10));
}

#[test]
fn exit_through_finally_runs_handler() {
    // while (1) try break; finally #0.x = 1; endtry endwhile
    let mut world = empty_world();
    world
        .define_property(
            &Obj(0),
            Symbol::mk("x"),
            Obj(0),
            barn_common::model::PropFlag::rw(),
            Some(v_int(0)),
        )
        .unwrap();
    let mut b = AstBuilder::new();
    let try_body = b.nested(|b| {
        b.push(StmtNode::Break { exit: None });
    });
    let handler = b.nested(|b| {
        b.expr_stmt(assign_to(prop(obj(0), "x"), int(1)));
    });
    let while_body = b.nested(move |b| {
        b.push(StmtNode::TryFinally {
            body: try_body,
            handler,
        });
    });
    b.push(StmtNode::While {
        id: None,
        condition: int(1),
        body: while_body,
    });
    b.ret(prop(obj(0), "x"));
    assert_eq!(expect_value(run(&mut world, b.parse())), v_int(1));
}

#[test]
fn anonymous_object_reference() {
    let mut world = empty_world();
    let parent = world.create(vec![], Obj(0), false, None).unwrap();
    world
        .get_mut(&parent)
        .unwrap()
        .flags
        .set(barn_common::model::ObjFlag::Fertile);
    world
        .define_property(
            &parent,
            Symbol::mk("tag"),
            Obj(0),
            barn_common::model::PropFlag::rw(),
            Some(v_int(7)),
        )
        .unwrap();

    let mut b = AstBuilder::new();
    let a = b.name("a");
    b.assign("a", builtin("create", vec![obj(parent.0), int(1)]));
    b.ret(list(vec![
        builtin("typeof", vec![ident(a)]),
        prop(ident(a), "tag"),
        builtin("valid", vec![ident(a)]),
    ]));
    let result = expect_value(run(&mut world, b.parse()));
    assert_eq!(
        result,
        v_list(&[
            v_int(barn_var::VarType::TYPE_ANON as i64),
            v_int(7),
            v_int(1)
        ])
    );
}

#[test]
fn checkpointed_vm_state_round_trips() {
    let mut world = empty_world();
    let mut b = AstBuilder::new();
    let x = b.name("x");
    b.assign("x", int(5));
    b.ret(ident(x));
    let program = compile(b.parse()).unwrap();
    let activation = Activation::for_eval(program, Obj(0), Obj(0));
    let state = VmExec::new(9, activation, 300_000, 5);

    let bytes = bincode::encode_to_vec(&state, bincode::config::standard()).unwrap();
    let (mut restored, _): (VmExec, _) =
        bincode::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
    assert_eq!(restored.task_id, 9);
    assert_eq!(
        expect_value(run_state(&mut world, &mut restored)),
        v_int(5)
    );
}
