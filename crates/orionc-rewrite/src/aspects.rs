//! Aspect weaving (`spec.md` §4.6, resolved Open Question in `spec.md` §9
//! and `SPEC_FULL.md` §5).
//!
//! An aspect declares pointcuts (a name plus a glob pattern over function
//! names) and advice (`before`/`after`/`around`, each bound to a pointcut).
//! `weave` walks every `FuncDef`/method whose name matches any pointcut's
//! glob and applies every matching advice, in **declaration order across
//! aspects, then declaration order within an aspect** — the rule this
//! project fixes for the donor's unspecified composition order. The
//! earliest-declared `around` advice wraps innermost (its `proceed()`
//! reaches the original body directly); each subsequent `around` advice
//! wraps one layer further outward, so the last-declared advice's
//! `proceed()` is the outermost call a caller actually observes.

use orionc_par::{AdviceKind, Expr, FuncDef, Item, Program, Stmt};

use crate::stats::RewriteStats;

#[derive(Clone, Debug)]
pub struct WeaveAdvice {
    pub pointcut: String,
    pub kind: AdviceKind,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, Default)]
pub struct AspectTable {
    /// `(pointcut_name, glob_pattern)` pairs, in declaration order across
    /// every aspect definition.
    pointcuts: Vec<(String, String)>,
    /// Advice, in declaration order across every aspect (aspect declaration
    /// order, then within-aspect declaration order) — the fixed composition
    /// rule this module documents above.
    advice: Vec<WeaveAdvice>,
}

impl AspectTable {
    pub fn from_program(program: &Program) -> Self {
        let mut table = AspectTable::default();
        for item in &program.items {
            if let Item::AspectDef(a) = item {
                for pc in &a.pointcuts {
                    table.pointcuts.push((pc.name.clone(), pc.pattern.clone()));
                }
                for adv in &a.advice {
                    table.advice.push(WeaveAdvice {
                        pointcut: adv.pointcut.clone(),
                        kind: adv.kind,
                        body: adv.body.clone(),
                    });
                }
            }
        }
        table
    }

    fn matching_advice(&self, func_name: &str) -> Vec<&WeaveAdvice> {
        let matching_pointcuts: Vec<&str> = self
            .pointcuts
            .iter()
            .filter(|(_, pattern)| glob_match(pattern, func_name))
            .map(|(name, _)| name.as_str())
            .collect();
        self.advice
            .iter()
            .filter(|adv| matching_pointcuts.contains(&adv.pointcut.as_str()))
            .collect()
    }
}

/// A minimal glob matcher supporting a single trailing/leading/embedded `*`
/// wildcard — the only form `spec.md`'s pointcut patterns (`"fib*"`-style)
/// need.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == candidate,
        Some((prefix, suffix)) => {
            candidate.len() >= prefix.len() + suffix.len()
                && candidate.starts_with(prefix)
                && candidate.ends_with(suffix)
        }
    }
}

pub fn weave(mut program: Program, table: &AspectTable, stats: &mut RewriteStats) -> Program {
    program.items = program
        .items
        .into_iter()
        .map(|item| match item {
            Item::FuncDef(f) => Item::FuncDef(weave_func(f, table, stats)),
            Item::ClassDef(mut c) => {
                c.methods = c
                    .methods
                    .into_iter()
                    .map(|m| weave_func(m, table, stats))
                    .collect();
                Item::ClassDef(c)
            }
            other => other,
        })
        .collect();
    program
}

fn weave_func(mut f: FuncDef, table: &AspectTable, stats: &mut RewriteStats) -> FuncDef {
    let matches = table.matching_advice(&f.name);
    if matches.is_empty() {
        return f;
    }
    let mut body = f.body;
    for adv in matches {
        stats.aspects_woven += 1;
        body = match adv.kind {
            AdviceKind::Before => {
                let mut new_body = adv.body.clone();
                new_body.extend(body);
                new_body
            }
            AdviceKind::After => {
                let mut new_body = body;
                new_body.extend(adv.body.clone());
                new_body
            }
            AdviceKind::Around => substitute_proceed(&adv.body, &body),
        };
    }
    f.body = body;
    f
}

/// Replaces every `proceed()` call site in `advice_body` with
/// `target_body`'s statements spliced in place — the mechanism by which
/// each successive `around` advice wraps the previous result.
fn substitute_proceed(advice_body: &[Stmt], target_body: &[Stmt]) -> Vec<Stmt> {
    advice_body
        .iter()
        .flat_map(|s| substitute_proceed_stmt(s, target_body))
        .collect()
}

fn substitute_proceed_stmt(stmt: &Stmt, target_body: &[Stmt]) -> Vec<Stmt> {
    match stmt {
        Stmt::Expr(Expr::Call { callee, args }) if args.is_empty() && is_proceed(callee) => {
            target_body.to_vec()
        }
        Stmt::Block(b) => vec![Stmt::Block(substitute_proceed(b, target_body))],
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => vec![Stmt::If {
            cond: cond.clone(),
            then_branch: substitute_proceed(then_branch, target_body),
            else_branch: else_branch
                .as_ref()
                .map(|b| substitute_proceed(b, target_body)),
        }],
        other => vec![other.clone()],
    }
}

fn is_proceed(callee: &Expr) -> bool {
    matches!(callee, Expr::Ident(name) if name == "proceed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_util::Handler;

    #[test]
    fn before_advice_is_prepended() {
        let handler = Handler::new();
        let program = orionc_par::parse(
            "aspect Logging { pointcut all = \"fib*\"; before all { print \"enter\"; } } func fib(n) { return n; }",
            &handler,
        );
        let table = AspectTable::from_program(&program);
        let mut stats = RewriteStats::default();
        let woven = weave(program, &table, &mut stats);
        let Item::FuncDef(f) = woven
            .items
            .iter()
            .find(|i| matches!(i, Item::FuncDef(f) if f.name == "fib"))
            .unwrap()
        else {
            panic!()
        };
        assert_eq!(f.body.len(), 2);
        assert_eq!(stats.aspects_woven, 1);
    }

    #[test]
    fn around_advice_wraps_proceed() {
        let handler = Handler::new();
        let program = orionc_par::parse(
            "aspect Timing { pointcut all = \"work\"; around all { print \"before\"; proceed(); print \"after\"; } } func work() { return 1; }",
            &handler,
        );
        let table = AspectTable::from_program(&program);
        let mut stats = RewriteStats::default();
        let woven = weave(program, &table, &mut stats);
        let Item::FuncDef(f) = woven
            .items
            .iter()
            .find(|i| matches!(i, Item::FuncDef(f) if f.name == "work"))
            .unwrap()
        else {
            panic!()
        };
        assert_eq!(f.body.len(), 3);
        assert!(matches!(f.body[1], Stmt::Return(_)));
    }

    #[test]
    fn glob_matches_prefix_star() {
        assert!(glob_match("fib*", "fib_helper"));
        assert!(!glob_match("fib*", "helper_fib"));
        assert!(glob_match("exact", "exact"));
    }
}
