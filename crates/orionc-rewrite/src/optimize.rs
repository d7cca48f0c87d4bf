//! Optimizer passes (`spec.md` §4.6, `SPEC_FULL.md` §5), selected by the
//! `-O` driver flag: level 0 runs nothing, level 1 runs constant folding and
//! dead-code elimination, level 2 additionally runs redundant-assignment
//! removal, constant propagation, common-subexpression elimination, and
//! scope narrowing. Each pass is idempotent by construction — re-running it
//! over its own output is a no-op — following `faxc-mir::optimize`'s pass
//! shape (a fixed, ordered list, each incrementing its own counter in a
//! shared statistics record) reused here directly over the AST.

use orionc_par::{Expr, Item, Program, Stmt, VarDecl, OP_ADD, OP_AND, OP_DIV, OP_MUL, OP_OR, OP_SUB};
use orionc_util::Span;

use crate::stats::RewriteStats;

pub fn optimize(mut program: Program, opt_level: u8, stats: &mut RewriteStats) -> Program {
    if opt_level == 0 {
        return program;
    }
    program.items = program
        .items
        .into_iter()
        .map(|item| optimize_item(item, opt_level, stats))
        .collect();
    program
}

fn optimize_item(item: Item, opt_level: u8, stats: &mut RewriteStats) -> Item {
    match item {
        Item::FuncDef(mut f) => {
            f.body = run_passes(f.body, opt_level, stats);
            Item::FuncDef(f)
        }
        Item::ClassDef(mut c) => {
            c.methods = c
                .methods
                .into_iter()
                .map(|mut m| {
                    m.body = run_passes(m.body, opt_level, stats);
                    m
                })
                .collect();
            Item::ClassDef(c)
        }
        Item::Stmt(s) => {
            let mut body = run_passes(vec![s], opt_level, stats);
            Item::Stmt(body.pop().unwrap_or(Stmt::Break))
        }
        other => other,
    }
}

fn run_passes(mut block: Vec<Stmt>, opt_level: u8, stats: &mut RewriteStats) -> Vec<Stmt> {
    block = constant_fold_block(block, stats);
    block = dead_code_eliminate(block, stats);
    if opt_level >= 2 {
        block = redundant_assignment_remove(block, stats);
        block = constant_propagate(block, &mut Default::default(), stats);
        block = common_subexpr_eliminate(block, stats);
        block = scope_narrow(block, stats);
    }
    block
}

// ===========================================================================
// Constant folding
// ===========================================================================

fn constant_fold_block(block: Vec<Stmt>, stats: &mut RewriteStats) -> Vec<Stmt> {
    block
        .into_iter()
        .map(|s| constant_fold_stmt(s, stats))
        .collect()
}

fn constant_fold_stmt(stmt: Stmt, stats: &mut RewriteStats) -> Stmt {
    match stmt {
        Stmt::Expr(e) => Stmt::Expr(constant_fold_expr(e, stats)),
        Stmt::Print(e) => Stmt::Print(constant_fold_expr(e, stats)),
        Stmt::Return(e) => Stmt::Return(e.map(|e| constant_fold_expr(e, stats))),
        Stmt::Throw(e) => Stmt::Throw(constant_fold_expr(e, stats)),
        Stmt::VarDecl(mut v) => {
            v.init = v.init.map(|e| constant_fold_expr(e, stats));
            Stmt::VarDecl(v)
        }
        Stmt::VarAssign {
            target,
            compound_op,
            value,
        } => Stmt::VarAssign {
            target: constant_fold_expr(target, stats),
            compound_op,
            value: constant_fold_expr(value, stats),
        },
        Stmt::Block(b) => Stmt::Block(constant_fold_block(b, stats)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond: constant_fold_expr(cond, stats),
            then_branch: constant_fold_block(then_branch, stats),
            else_branch: else_branch.map(|b| constant_fold_block(b, stats)),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond: constant_fold_expr(cond, stats),
            body: constant_fold_block(body, stats),
        },
        Stmt::DoWhile { body, cond } => Stmt::DoWhile {
            body: constant_fold_block(body, stats),
            cond: constant_fold_expr(cond, stats),
        },
        other => other,
    }
}

fn constant_fold_expr(expr: Expr, stats: &mut RewriteStats) -> Expr {
    match expr {
        Expr::BinOp { op, lhs, rhs } => {
            let lhs = constant_fold_expr(*lhs, stats);
            let rhs = constant_fold_expr(*rhs, stats);
            if let Some(folded) = try_fold(op, &lhs, &rhs) {
                stats.constant_folds += 1;
                return folded;
            }
            Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }
        Expr::UnOp { op, operand } => Expr::UnOp {
            op,
            operand: Box::new(constant_fold_expr(*operand, stats)),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: Box::new(constant_fold_expr(*callee, stats)),
            args: args
                .into_iter()
                .map(|a| constant_fold_expr(a, stats))
                .collect(),
        },
        other => other,
    }
}

fn try_fold(op: char, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    match (lhs, rhs) {
        (Expr::NumberLit(a, af), Expr::NumberLit(b, bf)) => {
            let is_float = *af || *bf;
            let value = match op {
                OP_ADD => a + b,
                OP_SUB => a - b,
                OP_MUL => a * b,
                OP_DIV => {
                    if *b == 0.0 {
                        return None;
                    }
                    a / b
                }
                '<' => return Some(Expr::BoolLit(a < b)),
                '>' => return Some(Expr::BoolLit(a > b)),
                'E' => return Some(Expr::BoolLit(a == b)),
                'N' => return Some(Expr::BoolLit(a != b)),
                'G' => return Some(Expr::BoolLit(a >= b)),
                'L' => return Some(Expr::BoolLit(a <= b)),
                _ => return None,
            };
            Some(Expr::NumberLit(value, is_float))
        }
        (Expr::StringLit(a), Expr::StringLit(b)) if op == OP_ADD => {
            Some(Expr::StringLit(format!("{a}{b}")))
        }
        (Expr::BoolLit(a), Expr::BoolLit(b)) => match op {
            OP_AND => Some(Expr::BoolLit(*a && *b)),
            OP_OR => Some(Expr::BoolLit(*a || *b)),
            'E' => Some(Expr::BoolLit(a == b)),
            'N' => Some(Expr::BoolLit(a != b)),
            _ => None,
        },
        _ => None,
    }
}

// ===========================================================================
// Dead-code elimination
// ===========================================================================

/// Drops statements strictly after a `Return`/`Throw` in the same block, and
/// prunes an `If` whose (already constant-folded) condition is a literal
/// `Bool` down to just the taken branch.
fn dead_code_eliminate(block: Vec<Stmt>, stats: &mut RewriteStats) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(block.len());
    let mut terminated = false;
    for stmt in block {
        if terminated {
            stats.dead_code_eliminations += 1;
            continue;
        }
        let stmt = dead_code_eliminate_nested(stmt, stats);
        if matches!(stmt, Stmt::Return(_) | Stmt::Throw(_)) {
            terminated = true;
        }
        match stmt {
            Stmt::If {
                cond: Expr::BoolLit(true),
                then_branch,
                ..
            } => {
                stats.dead_code_eliminations += 1;
                out.extend(then_branch);
            }
            Stmt::If {
                cond: Expr::BoolLit(false),
                else_branch,
                ..
            } => {
                stats.dead_code_eliminations += 1;
                out.extend(else_branch.unwrap_or_default());
            }
            other => out.push(other),
        }
    }
    out
}

fn dead_code_eliminate_nested(stmt: Stmt, stats: &mut RewriteStats) -> Stmt {
    match stmt {
        Stmt::Block(b) => Stmt::Block(dead_code_eliminate(b, stats)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond,
            then_branch: dead_code_eliminate(then_branch, stats),
            else_branch: else_branch.map(|b| dead_code_eliminate(b, stats)),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond,
            body: dead_code_eliminate(body, stats),
        },
        other => other,
    }
}

// ===========================================================================
// Redundant-assignment removal
// ===========================================================================

/// Drops a `VarAssign` that is immediately overwritten by the next
/// statement's assignment to the same target, with no statement in between
/// — the conservative case the spec calls out ("before any intervening
/// read"); a non-adjacent overwrite is left alone rather than risk deleting
/// past an intervening use.
fn redundant_assignment_remove(block: Vec<Stmt>, stats: &mut RewriteStats) -> Vec<Stmt> {
    let mut out: Vec<Stmt> = Vec::with_capacity(block.len());
    for stmt in block {
        let stmt = redundant_assignment_remove_nested(stmt, stats);
        if let (Some(prev), Stmt::VarAssign { target: new_target, .. }) = (out.last(), &stmt) {
            if let Stmt::VarAssign {
                target: prev_target,
                ..
            } = prev
            {
                if same_ident(prev_target, new_target) {
                    stats.redundant_assignments_removed += 1;
                    out.pop();
                }
            }
        }
        out.push(stmt);
    }
    out
}

fn redundant_assignment_remove_nested(stmt: Stmt, stats: &mut RewriteStats) -> Stmt {
    match stmt {
        Stmt::Block(b) => Stmt::Block(redundant_assignment_remove(b, stats)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond,
            then_branch: redundant_assignment_remove(then_branch, stats),
            else_branch: else_branch.map(|b| redundant_assignment_remove(b, stats)),
        },
        other => other,
    }
}

fn same_ident(a: &Expr, b: &Expr) -> bool {
    matches!((a, b), (Expr::Ident(x), Expr::Ident(y)) if x == y)
}

// ===========================================================================
// Constant propagation
// ===========================================================================

/// Substitutes a variable's last known literal value forward within a
/// straight-line run of statements, clearing the known-value map at any
/// branch or loop boundary (the point past which "straight-line" no longer
/// holds).
fn constant_propagate(
    block: Vec<Stmt>,
    known: &mut orionc_util::FxHashMap<String, Expr>,
    stats: &mut RewriteStats,
) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(block.len());
    for stmt in block {
        let stmt = match stmt {
            Stmt::VarDecl(mut v) => {
                v.init = v.init.map(|e| propagate_expr(e, known, stats));
                if let Some(init) = &v.init {
                    if is_literal(init) {
                        known.insert(v.name.clone(), init.clone());
                    } else {
                        known.remove(&v.name);
                    }
                }
                Stmt::VarDecl(v)
            }
            Stmt::VarAssign {
                target,
                compound_op,
                value,
            } => {
                let value = propagate_expr(value, known, stats);
                if compound_op.is_none() {
                    if let Expr::Ident(name) = &target {
                        if is_literal(&value) {
                            known.insert(name.clone(), value.clone());
                        } else {
                            known.remove(name);
                        }
                    }
                } else if let Expr::Ident(name) = &target {
                    known.remove(name);
                }
                Stmt::VarAssign {
                    target,
                    compound_op,
                    value,
                }
            }
            Stmt::Expr(e) => Stmt::Expr(propagate_expr(e, known, stats)),
            Stmt::Print(e) => Stmt::Print(propagate_expr(e, known, stats)),
            Stmt::Return(e) => Stmt::Return(e.map(|e| propagate_expr(e, known, stats))),
            Stmt::Throw(e) => Stmt::Throw(propagate_expr(e, known, stats)),
            // Branches and loops invalidate straight-line propagation past
            // this point; each nested block restarts from a fresh map.
            Stmt::Block(b) => {
                let mut inner = known.clone();
                Stmt::Block(constant_propagate(b, &mut inner, stats))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = propagate_expr(cond, known, stats);
                let mut then_known = known.clone();
                let then_branch = constant_propagate(then_branch, &mut then_known, stats);
                let else_branch = else_branch.map(|b| {
                    let mut else_known = known.clone();
                    constant_propagate(b, &mut else_known, stats)
                });
                known.clear();
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                }
            }
            other @ (Stmt::While { .. }
            | Stmt::DoWhile { .. }
            | Stmt::ForRange { .. }
            | Stmt::ForCollection { .. }
            | Stmt::ForTraditional { .. }) => {
                known.clear();
                other
            }
            other => other,
        };
        out.push(stmt);
    }
    out
}

fn propagate_expr(
    expr: Expr,
    known: &orionc_util::FxHashMap<String, Expr>,
    stats: &mut RewriteStats,
) -> Expr {
    match expr {
        Expr::Ident(name) => match known.get(&name) {
            Some(value) => {
                stats.constant_propagations += 1;
                value.clone()
            }
            None => Expr::Ident(name),
        },
        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op,
            lhs: Box::new(propagate_expr(*lhs, known, stats)),
            rhs: Box::new(propagate_expr(*rhs, known, stats)),
        },
        Expr::UnOp { op, operand } => Expr::UnOp {
            op,
            operand: Box::new(propagate_expr(*operand, known, stats)),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee,
            args: args
                .into_iter()
                .map(|a| propagate_expr(a, known, stats))
                .collect(),
        },
        other => other,
    }
}

fn is_literal(e: &Expr) -> bool {
    matches!(
        e,
        Expr::NumberLit(..) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::NullLit
    )
}

// ===========================================================================
// Common-subexpression elimination
// ===========================================================================

/// Hoists a `BinOp` whose two operands are structurally identical and
/// non-trivial to a single evaluation via a fresh local, within one
/// statement's expression tree.
fn common_subexpr_eliminate(block: Vec<Stmt>, stats: &mut RewriteStats) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(block.len());
    let mut counter = 0u32;
    for stmt in block {
        let (decls, stmt) = cse_stmt(stmt, stats, &mut counter);
        out.extend(decls);
        out.push(stmt);
    }
    out
}

fn cse_stmt(stmt: Stmt, stats: &mut RewriteStats, counter: &mut u32) -> (Vec<Stmt>, Stmt) {
    let mut decls = Vec::new();
    let stmt = match stmt {
        Stmt::Expr(e) => Stmt::Expr(cse_expr(e, stats, counter, &mut decls)),
        Stmt::Print(e) => Stmt::Print(cse_expr(e, stats, counter, &mut decls)),
        Stmt::Return(e) => Stmt::Return(e.map(|e| cse_expr(e, stats, counter, &mut decls))),
        Stmt::VarDecl(mut v) => {
            v.init = v.init.map(|e| cse_expr(e, stats, counter, &mut decls));
            Stmt::VarDecl(v)
        }
        Stmt::VarAssign {
            target,
            compound_op,
            value,
        } => Stmt::VarAssign {
            target,
            compound_op,
            value: cse_expr(value, stats, counter, &mut decls),
        },
        other => other,
    };
    (decls, stmt)
}

fn cse_expr(expr: Expr, stats: &mut RewriteStats, counter: &mut u32, decls: &mut Vec<Stmt>) -> Expr {
    match expr {
        Expr::BinOp { op, lhs, rhs } if !is_trivial(&lhs) && *lhs == *rhs => {
            stats.common_subexprs_eliminated += 1;
            *counter += 1;
            let temp = format!("__cse_{counter}");
            decls.push(Stmt::VarDecl(VarDecl {
                name: temp.clone(),
                ty: None,
                init: Some(*lhs),
                span: Span::DUMMY,
            }));
            Expr::BinOp {
                op,
                lhs: Box::new(Expr::Ident(temp.clone())),
                rhs: Box::new(Expr::Ident(temp)),
            }
        }
        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op,
            lhs: Box::new(cse_expr(*lhs, stats, counter, decls)),
            rhs: Box::new(cse_expr(*rhs, stats, counter, decls)),
        },
        other => other,
    }
}

fn is_trivial(e: &Expr) -> bool {
    matches!(e, Expr::Ident(_) | Expr::NumberLit(..) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::NullLit | Expr::This)
}

// ===========================================================================
// Scope narrowing
// ===========================================================================

/// Shrinks a `VarDecl`'s visible scope into the single immediately
/// following `If`/`While` statement when that variable is used nowhere else
/// in the remainder of the block — a conservative, single-hop version of
/// "narrow to the tightest enclosing block when safe (no use before the
/// narrowed point)".
fn scope_narrow(block: Vec<Stmt>, stats: &mut RewriteStats) -> Vec<Stmt> {
    let mut out: Vec<Stmt> = Vec::with_capacity(block.len());
    let mut i = 0;
    let stmts = block;
    while i < stmts.len() {
        if let Stmt::VarDecl(v) = &stmts[i] {
            if let Some(next) = stmts.get(i + 1) {
                let rest = &stmts[i + 2..];
                if !rest.iter().any(|s| stmt_uses_ident(s, &v.name)) {
                    match next {
                        Stmt::If {
                            cond,
                            then_branch,
                            else_branch,
                        } if !expr_uses_ident(cond, &v.name)
                            && else_branch
                                .as_ref()
                                .map(|b| !b.iter().any(|s| stmt_uses_ident(s, &v.name)))
                                .unwrap_or(true) =>
                        {
                            stats.scopes_narrowed += 1;
                            let mut narrowed_then = vec![Stmt::VarDecl(v.clone())];
                            narrowed_then.extend(then_branch.clone());
                            out.push(Stmt::If {
                                cond: cond.clone(),
                                then_branch: narrowed_then,
                                else_branch: else_branch.clone(),
                            });
                            i += 2;
                            continue;
                        }
                        Stmt::While { cond, body }
                            if !expr_uses_ident(cond, &v.name) =>
                        {
                            stats.scopes_narrowed += 1;
                            let mut narrowed_body = vec![Stmt::VarDecl(v.clone())];
                            narrowed_body.extend(body.clone());
                            out.push(Stmt::While {
                                cond: cond.clone(),
                                body: narrowed_body,
                            });
                            i += 2;
                            continue;
                        }
                        _ => {}
                    }
                }
            }
        }
        out.push(stmts[i].clone());
        i += 1;
    }
    out
}

fn stmt_uses_ident(stmt: &Stmt, name: &str) -> bool {
    match stmt {
        Stmt::Expr(e) | Stmt::Print(e) | Stmt::Throw(e) => expr_uses_ident(e, name),
        Stmt::Return(e) => e.as_ref().map(|e| expr_uses_ident(e, name)).unwrap_or(false),
        Stmt::VarDecl(v) => v.init.as_ref().map(|e| expr_uses_ident(e, name)).unwrap_or(false),
        Stmt::VarAssign { target, value, .. } => {
            expr_uses_ident(target, name) || expr_uses_ident(value, name)
        }
        Stmt::Block(b) => b.iter().any(|s| stmt_uses_ident(s, name)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => {
            expr_uses_ident(cond, name)
                || then_branch.iter().any(|s| stmt_uses_ident(s, name))
                || else_branch
                    .as_ref()
                    .map(|b| b.iter().any(|s| stmt_uses_ident(s, name)))
                    .unwrap_or(false)
        }
        Stmt::While { cond, body } | Stmt::DoWhile { body, cond } => {
            expr_uses_ident(cond, name) || body.iter().any(|s| stmt_uses_ident(s, name))
        }
        _ => true, // unmodeled shapes conservatively count as a use
    }
}

fn expr_uses_ident(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::Ident(n) => n == name,
        Expr::BinOp { lhs, rhs, .. } => expr_uses_ident(lhs, name) || expr_uses_ident(rhs, name),
        Expr::UnOp { operand, .. } => expr_uses_ident(operand, name),
        Expr::Call { callee, args } => {
            expr_uses_ident(callee, name) || args.iter().any(|a| expr_uses_ident(a, name))
        }
        Expr::Member { object, .. } => expr_uses_ident(object, name),
        Expr::Index { object, index } => {
            expr_uses_ident(object, name) || expr_uses_ident(index, name)
        }
        Expr::ArrayLit(items) => items.iter().any(|i| expr_uses_ident(i, name)),
        Expr::Compose { lhs, rhs } => expr_uses_ident(lhs, name) || expr_uses_ident(rhs, name),
        Expr::New { args, .. } => args.iter().any(|a| expr_uses_ident(a, name)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_util::Handler;

    fn optimize_src(src: &str, level: u8) -> (Program, RewriteStats) {
        let handler = Handler::new();
        let program = orionc_par::parse(src, &handler);
        let mut stats = RewriteStats::default();
        let optimized = optimize(program, level, &mut stats);
        (optimized, stats)
    }

    #[test]
    fn folds_a_literal_arithmetic_expression() {
        let (program, stats) = optimize_src("main { print 2 + 3; }", 1);
        assert_eq!(stats.constant_folds, 1);
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!()
        };
        assert_eq!(body[0], Stmt::Print(Expr::NumberLit(5.0, false)));
    }

    #[test]
    fn eliminates_statements_after_return() {
        let (program, stats) = optimize_src(
            "func f() { return 1; print \"unreachable\"; }",
            1,
        );
        assert_eq!(stats.dead_code_eliminations, 1);
        let Item::FuncDef(f) = &program.items[0] else {
            panic!()
        };
        assert_eq!(f.body.len(), 1);
    }

    #[test]
    fn prunes_a_literal_true_branch() {
        let (program, stats) = optimize_src(
            "main { if (true) { print \"a\"; } else { print \"b\"; } }",
            1,
        );
        assert_eq!(stats.dead_code_eliminations, 1);
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!()
        };
        assert_eq!(body.len(), 1);
        assert_eq!(body[0], Stmt::Print(Expr::StringLit("a".to_string())));
    }

    #[test]
    fn level_zero_runs_no_passes() {
        let (program, stats) = optimize_src("main { print 2 + 3; }", 0);
        assert_eq!(stats.constant_folds, 0);
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!()
        };
        assert_eq!(
            body[0],
            Stmt::Print(Expr::BinOp {
                op: OP_ADD,
                lhs: Box::new(Expr::NumberLit(2.0, false)),
                rhs: Box::new(Expr::NumberLit(3.0, false)),
            })
        );
    }

    #[test]
    fn constant_propagates_within_straight_line_code() {
        let (program, stats) = optimize_src("main { x = 5; print x; }", 2);
        assert!(stats.constant_propagations >= 1);
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!()
        };
        assert_eq!(body[1], Stmt::Print(Expr::NumberLit(5.0, false)));
    }
}
