//! Macro expansion (`spec.md` §4.6, `SPEC_FULL.md` §5).
//!
//! A macro binds a name and parameter list to a template body (a statement
//! block, since `orionc-par`'s `MacroDef::body` is `Vec<Stmt>`). Expansion
//! walks the tree bottom-up, substituting each parameter identifier with
//! the corresponding argument subtree, resolving `#x` (stringify) and
//! `x##y` (paste) within the substituted body, and splicing the result back
//! in place of the call — repeating until a fixed point or `max_depth`
//! expansions have been spent.
//!
//! A macro invoked as a standalone statement (`LOG(x);`) splices its full,
//! possibly multi-statement body in place. A macro invoked from inside a
//! larger expression (`y = DOUBLE(x) + 1;`) can only be reduced to a value
//! when its body is a single `Stmt::Expr` or `Stmt::Return` — there is no
//! block-expression AST node to fall back to, so a multi-statement body
//! invoked that way is left unexpanded (documented in `DESIGN.md`).

use orionc_par::{Block, Case, Catch, Expr, Item, LambdaBody, MacroDef, MatchArm, Program, Stmt};
use orionc_util::diagnostic::DiagnosticBuilder;
use orionc_util::{DiagnosticCode, FxHashMap, Handler, Span};

use crate::stats::RewriteStats;

pub const DEFAULT_MAX_DEPTH: u32 = 64;

#[derive(Clone, Debug)]
pub struct MacroDefRt {
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

pub type MacroTable = FxHashMap<String, MacroDefRt>;

/// Collects every top-level `macro` definition in `program` into a lookup
/// table keyed by name.
pub fn table_from_program(program: &Program) -> MacroTable {
    let mut table = MacroTable::default();
    for item in &program.items {
        if let Item::MacroDef(MacroDef {
            name, params, body, ..
        }) = item
        {
            table.insert(
                name.clone(),
                MacroDefRt {
                    params: params.clone(),
                    body: body.clone(),
                },
            );
        }
    }
    table
}

pub fn expand_macros(
    program: Program,
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
) -> Program {
    let mut budget = DEFAULT_MAX_DEPTH;
    let items = expand_items(program.items, table, handler, stats, &mut budget);
    Program { items }
}

fn expand_items(
    items: Vec<Item>,
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
    budget: &mut u32,
) -> Vec<Item> {
    items
        .into_iter()
        .flat_map(|item| expand_item(item, table, handler, stats, budget))
        .collect()
}

fn expand_item(
    item: Item,
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
    budget: &mut u32,
) -> Vec<Item> {
    match item {
        Item::FuncDef(mut f) => {
            f.body = expand_block(f.body, table, handler, stats, budget);
            vec![Item::FuncDef(f)]
        }
        Item::ClassDef(mut c) => {
            c.methods = c
                .methods
                .into_iter()
                .map(|mut m| {
                    m.body = expand_block(m.body, table, handler, stats, budget);
                    m
                })
                .collect();
            vec![Item::ClassDef(c)]
        }
        Item::AspectDef(mut a) => {
            a.advice = a
                .advice
                .into_iter()
                .map(|mut adv| {
                    adv.body = expand_block(adv.body, table, handler, stats, budget);
                    adv
                })
                .collect();
            vec![Item::AspectDef(a)]
        }
        Item::VarDecl(mut v) => {
            v.init = v
                .init
                .map(|e| expand_expr(e, table, handler, stats, budget));
            vec![Item::VarDecl(v)]
        }
        Item::Stmt(s) => expand_stmt(s, table, handler, stats, budget)
            .into_iter()
            .map(Item::Stmt)
            .collect(),
        other @ (Item::Module(_) | Item::Import(_) | Item::MacroDef(_)) => vec![other],
    }
}

fn expand_block(
    block: Block,
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
    budget: &mut u32,
) -> Block {
    block
        .into_iter()
        .flat_map(|s| expand_stmt(s, table, handler, stats, budget))
        .collect()
}

fn expand_stmt(
    stmt: Stmt,
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
    budget: &mut u32,
) -> Vec<Stmt> {
    match stmt {
        Stmt::Expr(e) => {
            if let Expr::Call { callee, args } = &e {
                if let Expr::Ident(name) = callee.as_ref() {
                    if let Some(mdef) = table.get(name).cloned() {
                        return expand_macro_call_as_stmts(
                            &mdef, args, table, handler, stats, budget, name,
                        );
                    }
                }
            }
            vec![Stmt::Expr(expand_expr(e, table, handler, stats, budget))]
        }
        Stmt::Block(b) => vec![Stmt::Block(expand_block(b, table, handler, stats, budget))],
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => vec![Stmt::If {
            cond: expand_expr(cond, table, handler, stats, budget),
            then_branch: expand_block(then_branch, table, handler, stats, budget),
            else_branch: else_branch.map(|b| expand_block(b, table, handler, stats, budget)),
        }],
        Stmt::While { cond, body } => vec![Stmt::While {
            cond: expand_expr(cond, table, handler, stats, budget),
            body: expand_block(body, table, handler, stats, budget),
        }],
        Stmt::DoWhile { body, cond } => vec![Stmt::DoWhile {
            body: expand_block(body, table, handler, stats, budget),
            cond: expand_expr(cond, table, handler, stats, budget),
        }],
        Stmt::ForRange {
            var,
            start,
            end,
            step,
            body,
        } => vec![Stmt::ForRange {
            var,
            start: expand_expr(start, table, handler, stats, budget),
            end: expand_expr(end, table, handler, stats, budget),
            step: step.map(|s| expand_expr(s, table, handler, stats, budget)),
            body: expand_block(body, table, handler, stats, budget),
        }],
        Stmt::ForCollection { var, iter, body } => vec![Stmt::ForCollection {
            var,
            iter: expand_expr(iter, table, handler, stats, budget),
            body: expand_block(body, table, handler, stats, budget),
        }],
        Stmt::ForTraditional {
            init,
            cond,
            step,
            body,
        } => vec![Stmt::ForTraditional {
            init: init.map(|s| {
                Box::new(
                    expand_stmt(*s, table, handler, stats, budget)
                        .into_iter()
                        .next()
                        .unwrap_or(Stmt::Break),
                )
            }),
            cond: cond.map(|c| expand_expr(c, table, handler, stats, budget)),
            step: step.map(|s| {
                Box::new(
                    expand_stmt(*s, table, handler, stats, budget)
                        .into_iter()
                        .next()
                        .unwrap_or(Stmt::Break),
                )
            }),
            body: expand_block(body, table, handler, stats, budget),
        }],
        Stmt::Switch {
            subject,
            cases,
            default,
        } => vec![Stmt::Switch {
            subject: expand_expr(subject, table, handler, stats, budget),
            cases: cases
                .into_iter()
                .map(|c| Case {
                    values: c
                        .values
                        .into_iter()
                        .map(|v| expand_expr(v, table, handler, stats, budget))
                        .collect(),
                    body: expand_block(c.body, table, handler, stats, budget),
                })
                .collect(),
            default: default.map(|b| expand_block(b, table, handler, stats, budget)),
        }],
        Stmt::Return(e) => vec![Stmt::Return(
            e.map(|e| expand_expr(e, table, handler, stats, budget)),
        )],
        Stmt::VarDecl(mut v) => {
            v.init = v
                .init
                .map(|e| expand_expr(e, table, handler, stats, budget));
            vec![Stmt::VarDecl(v)]
        }
        Stmt::VarAssign {
            target,
            compound_op,
            value,
        } => vec![Stmt::VarAssign {
            target: expand_expr(target, table, handler, stats, budget),
            compound_op,
            value: expand_expr(value, table, handler, stats, budget),
        }],
        Stmt::Print(e) => vec![Stmt::Print(expand_expr(e, table, handler, stats, budget))],
        Stmt::Break => vec![Stmt::Break],
        Stmt::Continue => vec![Stmt::Continue],
        Stmt::Try {
            body,
            catches,
            finally,
        } => vec![Stmt::Try {
            body: expand_block(body, table, handler, stats, budget),
            catches: catches
                .into_iter()
                .map(|c| Catch {
                    error_type: c.error_type,
                    binding: c.binding,
                    body: expand_block(c.body, table, handler, stats, budget),
                })
                .collect(),
            finally: finally.map(|b| expand_block(b, table, handler, stats, budget)),
        }],
        Stmt::Throw(e) => vec![Stmt::Throw(expand_expr(e, table, handler, stats, budget))],
        Stmt::Match { subject, arms } => vec![Stmt::Match {
            subject: expand_expr(subject, table, handler, stats, budget),
            arms: arms
                .into_iter()
                .map(|a| MatchArm {
                    pattern: a.pattern,
                    guard: a.guard.map(|g| expand_expr(g, table, handler, stats, budget)),
                    body: expand_expr(a.body, table, handler, stats, budget),
                })
                .collect(),
        }],
    }
}

#[allow(clippy::too_many_arguments)]
fn expand_macro_call_as_stmts(
    mdef: &MacroDefRt,
    args: &[Expr],
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
    budget: &mut u32,
    name: &str,
) -> Vec<Stmt> {
    let args: Vec<Expr> = args
        .iter()
        .cloned()
        .map(|a| expand_expr(a, table, handler, stats, budget))
        .collect();
    if *budget == 0 {
        report_recursion_limit(handler, name);
        return vec![Stmt::Expr(Expr::Call {
            callee: Box::new(Expr::Ident(name.to_string())),
            args,
        })];
    }
    *budget -= 1;
    stats.macro_expansions += 1;
    let map = build_subst_map(&mdef.params, &args);
    let substituted = subst_block(&mdef.body, &map);
    let resolved = resolve_stringify_paste_block(substituted);
    expand_block(resolved, table, handler, stats, budget)
}

fn expand_expr(
    e: Expr,
    table: &MacroTable,
    handler: &Handler,
    stats: &mut RewriteStats,
    budget: &mut u32,
) -> Expr {
    let e = match e {
        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op,
            lhs: Box::new(expand_expr(*lhs, table, handler, stats, budget)),
            rhs: Box::new(expand_expr(*rhs, table, handler, stats, budget)),
        },
        Expr::UnOp { op, operand } => Expr::UnOp {
            op,
            operand: Box::new(expand_expr(*operand, table, handler, stats, budget)),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: Box::new(expand_expr(*callee, table, handler, stats, budget)),
            args: args
                .into_iter()
                .map(|a| expand_expr(a, table, handler, stats, budget))
                .collect(),
        },
        Expr::Member { object, field } => Expr::Member {
            object: Box::new(expand_expr(*object, table, handler, stats, budget)),
            field,
        },
        Expr::Index { object, index } => Expr::Index {
            object: Box::new(expand_expr(*object, table, handler, stats, budget)),
            index: Box::new(expand_expr(*index, table, handler, stats, budget)),
        },
        Expr::ArrayLit(items) => Expr::ArrayLit(
            items
                .into_iter()
                .map(|i| expand_expr(i, table, handler, stats, budget))
                .collect(),
        ),
        Expr::Lambda {
            params,
            return_type,
            body,
        } => Expr::Lambda {
            params,
            return_type,
            body: match body {
                LambdaBody::Expr(inner) => {
                    LambdaBody::Expr(Box::new(expand_expr(*inner, table, handler, stats, budget)))
                }
                LambdaBody::Block(b) => {
                    LambdaBody::Block(expand_block(b, table, handler, stats, budget))
                }
            },
        },
        Expr::Compose { lhs, rhs } => Expr::Compose {
            lhs: Box::new(expand_expr(*lhs, table, handler, stats, budget)),
            rhs: Box::new(expand_expr(*rhs, table, handler, stats, budget)),
        },
        Expr::New { class_name, args } => Expr::New {
            class_name,
            args: args
                .into_iter()
                .map(|a| expand_expr(a, table, handler, stats, budget))
                .collect(),
        },
        other => other,
    };

    if let Expr::Call { callee, args } = &e {
        if let Expr::Ident(name) = callee.as_ref() {
            if let Some(mdef) = table.get(name).cloned() {
                if *budget == 0 {
                    report_recursion_limit(handler, name);
                    return e;
                }
                *budget -= 1;
                stats.macro_expansions += 1;
                let map = build_subst_map(&mdef.params, args);
                let substituted = subst_block(&mdef.body, &map);
                let resolved = resolve_stringify_paste_block(substituted);
                return match block_as_expr(&resolved) {
                    Some(value) => expand_expr(value, table, handler, stats, budget),
                    None => e,
                };
            }
        }
    }
    e
}

fn block_as_expr(block: &[Stmt]) -> Option<Expr> {
    if block.len() != 1 {
        return None;
    }
    match &block[0] {
        Stmt::Expr(e) => Some(e.clone()),
        Stmt::Return(Some(e)) => Some(e.clone()),
        _ => None,
    }
}

fn report_recursion_limit(handler: &Handler, name: &str) {
    DiagnosticBuilder::error(format!(
        "macro '{name}' expansion exceeded the {DEFAULT_MAX_DEPTH}-expansion recursion limit"
    ))
    .code(DiagnosticCode::E_REWRITE_MACRO_RECURSION_LIMIT)
    .span(Span::DUMMY)
    .emit(handler);
}

fn build_subst_map(params: &[String], args: &[Expr]) -> FxHashMap<String, Expr> {
    params
        .iter()
        .cloned()
        .zip(args.iter().cloned())
        .collect()
}

// ===========================================================================
// Parameter substitution
// ===========================================================================

fn subst_block(block: &[Stmt], map: &FxHashMap<String, Expr>) -> Vec<Stmt> {
    block.iter().map(|s| subst_stmt(s, map)).collect()
}

fn subst_stmt(stmt: &Stmt, map: &FxHashMap<String, Expr>) -> Stmt {
    match stmt {
        Stmt::Expr(e) => Stmt::Expr(subst_expr(e, map)),
        Stmt::Block(b) => Stmt::Block(subst_block(b, map)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond: subst_expr(cond, map),
            then_branch: subst_block(then_branch, map),
            else_branch: else_branch.as_ref().map(|b| subst_block(b, map)),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond: subst_expr(cond, map),
            body: subst_block(body, map),
        },
        Stmt::DoWhile { body, cond } => Stmt::DoWhile {
            body: subst_block(body, map),
            cond: subst_expr(cond, map),
        },
        Stmt::ForRange {
            var,
            start,
            end,
            step,
            body,
        } => Stmt::ForRange {
            var: var.clone(),
            start: subst_expr(start, map),
            end: subst_expr(end, map),
            step: step.as_ref().map(|s| subst_expr(s, map)),
            body: subst_block(body, map),
        },
        Stmt::ForCollection { var, iter, body } => Stmt::ForCollection {
            var: var.clone(),
            iter: subst_expr(iter, map),
            body: subst_block(body, map),
        },
        Stmt::ForTraditional {
            init,
            cond,
            step,
            body,
        } => Stmt::ForTraditional {
            init: init.as_ref().map(|s| Box::new(subst_stmt(s, map))),
            cond: cond.as_ref().map(|c| subst_expr(c, map)),
            step: step.as_ref().map(|s| Box::new(subst_stmt(s, map))),
            body: subst_block(body, map),
        },
        Stmt::Switch {
            subject,
            cases,
            default,
        } => Stmt::Switch {
            subject: subst_expr(subject, map),
            cases: cases
                .iter()
                .map(|c| Case {
                    values: c.values.iter().map(|v| subst_expr(v, map)).collect(),
                    body: subst_block(&c.body, map),
                })
                .collect(),
            default: default.as_ref().map(|b| subst_block(b, map)),
        },
        Stmt::Return(e) => Stmt::Return(e.as_ref().map(|e| subst_expr(e, map))),
        Stmt::VarDecl(v) => Stmt::VarDecl(orionc_par::VarDecl {
            name: v.name.clone(),
            ty: v.ty.clone(),
            init: v.init.as_ref().map(|e| subst_expr(e, map)),
            span: v.span,
        }),
        Stmt::VarAssign {
            target,
            compound_op,
            value,
        } => Stmt::VarAssign {
            target: subst_expr(target, map),
            compound_op: *compound_op,
            value: subst_expr(value, map),
        },
        Stmt::Print(e) => Stmt::Print(subst_expr(e, map)),
        Stmt::Break => Stmt::Break,
        Stmt::Continue => Stmt::Continue,
        Stmt::Try {
            body,
            catches,
            finally,
        } => Stmt::Try {
            body: subst_block(body, map),
            catches: catches
                .iter()
                .map(|c| Catch {
                    error_type: c.error_type.clone(),
                    binding: c.binding.clone(),
                    body: subst_block(&c.body, map),
                })
                .collect(),
            finally: finally.as_ref().map(|b| subst_block(b, map)),
        },
        Stmt::Throw(e) => Stmt::Throw(subst_expr(e, map)),
        Stmt::Match { subject, arms } => Stmt::Match {
            subject: subst_expr(subject, map),
            arms: arms
                .iter()
                .map(|a| MatchArm {
                    pattern: a.pattern.clone(),
                    guard: a.guard.as_ref().map(|g| subst_expr(g, map)),
                    body: subst_expr(&a.body, map),
                })
                .collect(),
        },
    }
}

fn subst_expr(expr: &Expr, map: &FxHashMap<String, Expr>) -> Expr {
    match expr {
        Expr::Ident(name) => map.get(name).cloned().unwrap_or_else(|| expr.clone()),
        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op: *op,
            lhs: Box::new(subst_expr(lhs, map)),
            rhs: Box::new(subst_expr(rhs, map)),
        },
        Expr::UnOp { op, operand } => Expr::UnOp {
            op: *op,
            operand: Box::new(subst_expr(operand, map)),
        },
        Expr::Call { callee, args } => Expr::Call {
            callee: Box::new(subst_expr(callee, map)),
            args: args.iter().map(|a| subst_expr(a, map)).collect(),
        },
        Expr::Member { object, field } => Expr::Member {
            object: Box::new(subst_expr(object, map)),
            field: field.clone(),
        },
        Expr::Index { object, index } => Expr::Index {
            object: Box::new(subst_expr(object, map)),
            index: Box::new(subst_expr(index, map)),
        },
        Expr::ArrayLit(items) => Expr::ArrayLit(items.iter().map(|i| subst_expr(i, map)).collect()),
        Expr::Lambda {
            params,
            return_type,
            body,
        } => Expr::Lambda {
            params: params.clone(),
            return_type: return_type.clone(),
            body: match body {
                LambdaBody::Expr(inner) => LambdaBody::Expr(Box::new(subst_expr(inner, map))),
                LambdaBody::Block(b) => LambdaBody::Block(subst_block(b, map)),
            },
        },
        Expr::Compose { lhs, rhs } => Expr::Compose {
            lhs: Box::new(subst_expr(lhs, map)),
            rhs: Box::new(subst_expr(rhs, map)),
        },
        Expr::New { class_name, args } => Expr::New {
            class_name: class_name.clone(),
            args: args.iter().map(|a| subst_expr(a, map)).collect(),
        },
        other => other.clone(),
    }
}

// ===========================================================================
// `#x` stringify / `x##y` paste resolution
// ===========================================================================

fn resolve_stringify_paste_block(block: Vec<Stmt>) -> Vec<Stmt> {
    block.into_iter().map(resolve_stringify_paste_stmt).collect()
}

fn resolve_stringify_paste_stmt(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Expr(e) => Stmt::Expr(resolve_stringify_paste_expr(e)),
        Stmt::Block(b) => Stmt::Block(resolve_stringify_paste_block(b)),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond: resolve_stringify_paste_expr(cond),
            then_branch: resolve_stringify_paste_block(then_branch),
            else_branch: else_branch.map(resolve_stringify_paste_block),
        },
        Stmt::While { cond, body } => Stmt::While {
            cond: resolve_stringify_paste_expr(cond),
            body: resolve_stringify_paste_block(body),
        },
        Stmt::Return(e) => Stmt::Return(e.map(resolve_stringify_paste_expr)),
        Stmt::VarDecl(mut v) => {
            v.init = v.init.map(resolve_stringify_paste_expr);
            Stmt::VarDecl(v)
        }
        Stmt::VarAssign {
            target,
            compound_op,
            value,
        } => Stmt::VarAssign {
            target: resolve_stringify_paste_expr(target),
            compound_op,
            value: resolve_stringify_paste_expr(value),
        },
        Stmt::Print(e) => Stmt::Print(resolve_stringify_paste_expr(e)),
        Stmt::Throw(e) => Stmt::Throw(resolve_stringify_paste_expr(e)),
        other => other,
    }
}

fn resolve_stringify_paste_expr(expr: Expr) -> Expr {
    match expr {
        Expr::Call { callee, args } => {
            if let Expr::Ident(name) = callee.as_ref() {
                if name == "#stringify" && args.len() == 1 {
                    return Expr::StringLit(pretty_expr(&args[0]));
                }
                if name == "##paste" && args.len() == 2 {
                    if let (Expr::Ident(a), Expr::Ident(b)) = (&args[0], &args[1]) {
                        return Expr::Ident(format!("{a}{b}"));
                    }
                }
            }
            Expr::Call {
                callee: Box::new(resolve_stringify_paste_expr(*callee)),
                args: args.into_iter().map(resolve_stringify_paste_expr).collect(),
            }
        }
        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op,
            lhs: Box::new(resolve_stringify_paste_expr(*lhs)),
            rhs: Box::new(resolve_stringify_paste_expr(*rhs)),
        },
        other => other,
    }
}

/// A small source-form pretty-printer, used only by `#x` stringify — the
/// result is embedded as a `StringLit`, not reparsed, so it only needs to
/// read naturally, not round-trip exactly.
pub fn pretty_expr(expr: &Expr) -> String {
    match expr {
        Expr::NumberLit(v, is_float) => {
            if *is_float {
                format!("{v}")
            } else {
                format!("{}", *v as i64)
            }
        }
        Expr::StringLit(s) => s.clone(),
        Expr::BoolLit(b) => b.to_string(),
        Expr::NullLit => "null".to_string(),
        Expr::Ident(name) => name.clone(),
        Expr::BinOp { op, lhs, rhs } => {
            format!("{} {} {}", pretty_expr(lhs), op, pretty_expr(rhs))
        }
        Expr::UnOp { operand, .. } => format!("-{}", pretty_expr(operand)),
        Expr::Call { callee, args } => format!(
            "{}({})",
            pretty_expr(callee),
            args.iter().map(pretty_expr).collect::<Vec<_>>().join(", ")
        ),
        Expr::Member { object, field } => format!("{}.{}", pretty_expr(object), field),
        Expr::Index { object, index } => format!("{}[{}]", pretty_expr(object), pretty_expr(index)),
        Expr::This => "this".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_util::Handler;

    fn run(src: &str) -> (Program, RewriteStats, Handler) {
        let handler = Handler::new();
        let program = orionc_par::parse(src, &handler);
        let table = table_from_program(&program);
        let mut stats = RewriteStats::default();
        let expanded = expand_macros(program, &table, &handler, &mut stats);
        (expanded, stats, handler)
    }

    #[test]
    fn expands_a_statement_macro_call() {
        let (program, stats, handler) = run(
            "macro LOG(x) { print x; } main { LOG(42); }",
        );
        assert!(!handler.has_errors());
        assert_eq!(stats.macro_expansions, 1);
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!("expected main block");
        };
        assert!(matches!(body[0], Stmt::Print(_)));
    }

    #[test]
    fn expands_an_expression_macro_call() {
        let (program, stats, _handler) =
            run("macro DOUBLE(x) { return x + x; } main { y = DOUBLE(3) + 1; }");
        assert_eq!(stats.macro_expansions, 1);
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!("expected main block");
        };
        match &body[0] {
            Stmt::VarDecl(v) => assert!(matches!(v.init, Some(Expr::BinOp { .. }))),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn stringify_embeds_the_argument_source_form() {
        let (program, _stats, _handler) =
            run("macro NAME(x) { print #x; } main { NAME(count); }");
        let Item::Stmt(Stmt::Block(body)) = &program.items[0] else {
            panic!("expected main block");
        };
        assert_eq!(body[0], Stmt::Print(Expr::StringLit("count".to_string())));
    }
}
