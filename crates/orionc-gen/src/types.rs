//! The emitter's own C type lattice (`spec.md` §4.5, "Variable declaration").
//!
//! This is deliberately a different, smaller type than `orionc_sem::Type`:
//! the emitter only needs to know enough to pick a C declaration spelling
//! and a `printf` conversion, not the full structural/nominal type system
//! `orionc-sem` enforces during analysis. `CType::from_sem` bridges the two
//! when a `orionc_sem::Type` is already on hand (e.g. from a function
//! signature); `infer_expr` falls back to syntactic inference over the AST
//! for contexts (the emitter's own variable table) that don't carry a
//! `orionc_sem::Type` at all.

use orionc_par::Expr;
use orionc_sem::{ClassTable, FuncSig, Type};
use orionc_util::FxHashMap;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CType {
    Int,
    Double,
    Bool,
    Str,
    Void,
    /// Pointer to a class struct, e.g. `Circle*`.
    Object(String),
}

impl CType {
    pub fn from_sem(ty: &Type) -> CType {
        match ty {
            Type::Int => CType::Int,
            Type::Float => CType::Double,
            Type::Bool => CType::Bool,
            Type::Str => CType::Str,
            Type::Void | Type::Null | Type::Unknown => CType::Void,
            Type::Class(name) => CType::Object(name.clone()),
            Type::Array(_) | Type::Function(..) | Type::Lambda(..) | Type::Curried(..) => {
                CType::Object("void".to_string())
            }
            Type::Object(name) => CType::Object(name.clone()),
        }
    }

    /// The C spelling of this type as a declaration prefix, e.g. `"int"` or
    /// `"Circle*"`.
    pub fn c_spelling(&self) -> String {
        match self {
            CType::Int => "int".to_string(),
            CType::Double => "double".to_string(),
            CType::Bool => "bool".to_string(),
            CType::Str => "const char*".to_string(),
            CType::Void => "void".to_string(),
            CType::Object(name) => format!("{name}*"),
        }
    }

    /// The `printf` conversion specifier `spec.md` §4.5 assigns: `int` uses
    /// `%d`, `double`/`float` uses `%g`, string uses `%s`, object prints as
    /// `%p`.
    pub fn printf_spec(&self) -> &'static str {
        match self {
            CType::Int => "%d",
            CType::Double => "%g",
            CType::Bool => "%d",
            CType::Str => "%s",
            CType::Void => "%p",
            CType::Object(_) => "%p",
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Object(_) | CType::Str)
    }
}

/// Context available while inferring the type of an expression for codegen
/// purposes: the local variable table built up so far, the class table, and
/// free-function signatures (for `Call` expressions to top-level functions).
pub struct InferCtx<'a> {
    pub vars: &'a FxHashMap<String, CType>,
    pub classes: &'a ClassTable,
    pub functions: &'a FxHashMap<String, FuncSig>,
}

/// Shallow, syntax-directed type inference for an expression, matching
/// `spec.md` §4.5: an integer numeric literal infers `int`, a fractional one
/// `double`, a string literal `const char*`, `new C(...)` the pointer type
/// `C*`. Anything that can't be inferred this way (we have no full
/// type-checked tree here, only the AST) falls back to `Int` as the
/// generator's least-surprising default for arithmetic contexts.
pub fn infer_expr(expr: &Expr, ctx: &InferCtx) -> CType {
    match expr {
        Expr::NumberLit(_, is_float) => {
            if *is_float {
                CType::Double
            } else {
                CType::Int
            }
        }
        Expr::StringLit(_) => CType::Str,
        Expr::BoolLit(_) => CType::Bool,
        Expr::NullLit => CType::Object("void".to_string()),
        Expr::Ident(name) => ctx.vars.get(name).cloned().unwrap_or(CType::Int),
        Expr::This => CType::Object("void".to_string()),
        Expr::New { class_name, .. } => CType::Object(class_name.clone()),
        Expr::BinOp { op, lhs, rhs } => match op {
            '<' | '>' | 'E' | 'N' | 'G' | 'L' | 'A' | 'O' => CType::Bool,
            _ => {
                let lt = infer_expr(lhs, ctx);
                let rt = infer_expr(rhs, ctx);
                if lt == CType::Str || rt == CType::Str {
                    CType::Str
                } else if lt == CType::Double || rt == CType::Double {
                    CType::Double
                } else {
                    CType::Int
                }
            }
        },
        Expr::UnOp { op, operand } => match op {
            orionc_par::UnOp::Not => CType::Bool,
            orionc_par::UnOp::Neg => infer_expr(operand, ctx),
        },
        Expr::Call { callee, .. } => {
            if let Expr::Ident(name) = callee.as_ref() {
                if let Some(sig) = ctx.functions.get(name) {
                    return CType::from_sem(&sig.ret);
                }
            }
            CType::Int
        }
        Expr::Member { object, field } => {
            if let CType::Object(class_name) = infer_expr(object, ctx) {
                if let Some(info) = ctx.classes.get(&class_name) {
                    if let Some(ty) = info.fields.get(field) {
                        return CType::from_sem(ty);
                    }
                }
            }
            CType::Int
        }
        Expr::Index { object, .. } => infer_expr(object, ctx),
        Expr::ArrayLit(items) => items
            .first()
            .map(|e| infer_expr(e, ctx))
            .unwrap_or(CType::Int),
        Expr::Lambda { .. } => CType::Object("void".to_string()),
        Expr::Compose { .. } => CType::Object("void".to_string()),
    }
}
