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

//! Builders for constructing ASTs directly, standing in for the external parser
//! in compiler and kernel tests.

use crate::ast::{
    Arg, AstCatchCodes, BinaryOp, CondArm, ExceptArm, Expr, ScatterItem, ScatterKind, Stmt,
    StmtNode, UnaryOp,
};
use crate::names::{Name, Names};
use crate::parse::Parse;
use barn_var::{v_float, v_int, v_obj, v_str, ErrorCode, Obj, Symbol, Var};

/// Accumulates statements and name bindings the way a parser would.
pub struct AstBuilder {
    pub names: Names,
    stmts: Vec<Stmt>,
    line: usize,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        Self {
            names: Names::new(),
            stmts: vec![],
            line: 0,
        }
    }

    pub fn name(&mut self, s: &str) -> Name {
        self.names.find_or_add_name(s)
    }

    pub fn push(&mut self, node: StmtNode) {
        self.line += 1;
        self.stmts.push(Stmt::new(node, self.line));
    }

    pub fn expr_stmt(&mut self, e: Expr) {
        self.push(StmtNode::Expr(e));
    }

    pub fn ret(&mut self, e: Expr) {
        self.push(StmtNode::Return(Some(e)));
    }

    pub fn ret0(&mut self) {
        self.push(StmtNode::Return(None));
    }

    pub fn assign(&mut self, name: &str, e: Expr) {
        let id = self.name(name);
        self.expr_stmt(Expr::Assign {
            left: Box::new(Expr::Id(id)),
            right: Box::new(e),
        });
    }

    pub fn parse(self) -> Parse {
        Parse {
            stmts: self.stmts,
            names: self.names,
        }
    }

    /// Build nested statements with the same line counter.
    pub fn nested(&mut self, f: impl FnOnce(&mut AstBuilder)) -> Vec<Stmt> {
        let mut inner = AstBuilder {
            names: std::mem::take(&mut self.names),
            stmts: vec![],
            line: self.line,
        };
        f(&mut inner);
        self.names = inner.names;
        self.line = inner.line;
        inner.stmts
    }
}

pub fn int(i: i64) -> Expr {
    Expr::Value(v_int(i))
}

pub fn flt(f: f64) -> Expr {
    Expr::Value(v_float(f))
}

pub fn stre(s: &str) -> Expr {
    Expr::Value(v_str(s))
}

pub fn obj(id: i64) -> Expr {
    Expr::Value(v_obj(Obj(id)))
}

pub fn errlit(code: ErrorCode) -> Expr {
    Expr::Value(barn_var::v_err(code))
}

pub fn value(v: Var) -> Expr {
    Expr::Value(v)
}

pub fn ident(n: Name) -> Expr {
    Expr::Id(n)
}

pub fn binary(op: BinaryOp, l: Expr, r: Expr) -> Expr {
    Expr::Binary(op, Box::new(l), Box::new(r))
}

pub fn add(l: Expr, r: Expr) -> Expr {
    binary(BinaryOp::Add, l, r)
}

pub fn div(l: Expr, r: Expr) -> Expr {
    binary(BinaryOp::Div, l, r)
}

pub fn neg(e: Expr) -> Expr {
    Expr::Unary(UnaryOp::Neg, Box::new(e))
}

pub fn not(e: Expr) -> Expr {
    Expr::Unary(UnaryOp::Not, Box::new(e))
}

pub fn index(base: Expr, idx: Expr) -> Expr {
    Expr::Index(Box::new(base), Box::new(idx))
}

pub fn range(base: Expr, from: Expr, to: Expr) -> Expr {
    Expr::Range {
        base: Box::new(base),
        from: Box::new(from),
        to: Box::new(to),
    }
}

pub fn prop(location: Expr, name: &str) -> Expr {
    Expr::Prop {
        location: Box::new(location),
        property: Box::new(stre(name)),
    }
}

pub fn verb_call(location: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Verb {
        location: Box::new(location),
        verb: Box::new(stre(name)),
        args: args.into_iter().map(Arg::Normal).collect(),
    }
}

pub fn builtin(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call {
        function: Symbol::mk(name),
        args: args.into_iter().map(Arg::Normal).collect(),
    }
}

pub fn pass_expr(args: Vec<Expr>) -> Expr {
    Expr::Pass {
        args: args.into_iter().map(Arg::Normal).collect(),
    }
}

pub fn list(items: Vec<Expr>) -> Expr {
    Expr::List(items.into_iter().map(Arg::Normal).collect())
}

pub fn splice_list(items: Vec<Arg>) -> Expr {
    Expr::List(items)
}

pub fn map(pairs: Vec<(Expr, Expr)>) -> Expr {
    Expr::Map(pairs)
}

pub fn catch_expr(trye: Expr, codes: AstCatchCodes, except: Option<Expr>) -> Expr {
    Expr::Catch {
        trye: Box::new(trye),
        codes,
        except: except.map(Box::new),
    }
}

pub fn assign_to(left: Expr, right: Expr) -> Expr {
    Expr::Assign {
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn scatter(items: Vec<ScatterItem>, rhs: Expr) -> Expr {
    Expr::Scatter(items, Box::new(rhs))
}

pub fn required(id: Name) -> ScatterItem {
    ScatterItem {
        kind: ScatterKind::Required,
        id,
        expr: None,
    }
}

pub fn optional(id: Name, default: Option<Expr>) -> ScatterItem {
    ScatterItem {
        kind: ScatterKind::Optional,
        id,
        expr: default,
    }
}

pub fn rest(id: Name) -> ScatterItem {
    ScatterItem {
        kind: ScatterKind::Rest,
        id,
        expr: None,
    }
}

pub fn cond_arm(condition: Expr, statements: Vec<Stmt>) -> CondArm {
    CondArm {
        condition,
        statements,
    }
}

pub fn except_arm(id: Option<Name>, codes: AstCatchCodes, statements: Vec<Stmt>) -> ExceptArm {
    ExceptArm {
        id,
        codes,
        statements,
    }
}
