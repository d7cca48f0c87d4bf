//! orionc-sem - Semantic analysis: symbol table, type system, and module
//! resolver for the Orion language.
//!
//! Analysis runs in two passes over a [`Program`]:
//!
//! 1. [`ClassTable::build`] and a signature pass collect every class and
//!    function signature first, so forward references (a function calling
//!    one declared later in the file, a class `extends` a class declared
//!    later) resolve correctly.
//! 2. [`Analyzer::analyze`] walks every function and method body, resolving
//!    names against a lexically-scoped [`SymbolTable`] and checking
//!    expression types against the signatures collected in pass one.
//!
//! Class inheritance is flattened at this stage ([`ClassTable::flattened_fields`])
//! because the code generator lowers a class hierarchy to one C struct per
//! class with the base class's fields copied in at the front — there is no
//! runtime notion of a base-class sub-object, so the semantic layer commits
//! to the flattened field order here rather than leaving it to codegen.
//!
//! [`ModuleGraph`] is a separate, file-level concern: it tracks which module
//! imports which, independent of the symbol/type analysis of any one file's
//! AST, and is built up by the driver as it discovers source files.

use indexmap::IndexMap;
use orionc_par::{
    AdviceKind, AspectDef, Block, Case, ClassDef, Expr, FuncDef, Import, Item, LambdaBody,
    Literal, MatchArm, Param, Pattern, Program, Stmt, TypeExpr, VarDecl, OP_ADD, OP_AND, OP_DIV,
    OP_EQ, OP_GE, OP_GT, OP_LE, OP_LT, OP_MUL, OP_NE, OP_OR, OP_SUB,
};
use orionc_util::diagnostic::{DiagnosticBuilder, DiagnosticCode};
use orionc_util::{FxHashMap, Handler, Span};

// ===========================================================================
// Type system
// ===========================================================================

/// A type in the Orion type system. `Unknown` is the type of an expression
/// whose shape couldn't be determined (e.g. a call to an undeclared
/// function) — it unifies with everything so one error doesn't cascade into
/// a wall of follow-on type-mismatch diagnostics.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    Void,
    Null,
    Unknown,
    Array(Box<Type>),
    Class(String),
    Function(Vec<Type>, Box<Type>),
    Lambda(Vec<Type>, Box<Type>),
    /// A function partially applied to one argument; further `Call`s peel
    /// off one parameter at a time until `Type::Function`'s arity is
    /// exhausted. Orion has no distinct curry syntax — `f(a)(b)` and
    /// `f(a, b)` both type through this node — so there is no separate
    /// `Curry` AST form, only this type-level representation.
    Curried(Box<Type>, Box<Type>),
    Object(String),
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Float => write!(f, "Float"),
            Type::Bool => write!(f, "Bool"),
            Type::Str => write!(f, "String"),
            Type::Void => write!(f, "Void"),
            Type::Null => write!(f, "Null"),
            Type::Unknown => write!(f, "Unknown"),
            Type::Array(t) => write!(f, "[{}]", t),
            Type::Class(n) => write!(f, "{}", n),
            Type::Object(n) => write!(f, "{}", n),
            Type::Function(params, ret) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Lambda(params, ret) => {
                write!(f, "lambda(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Curried(from, to) => write!(f, "{} -> {}", from, to),
        }
    }
}

impl Type {
    pub fn from_type_expr(te: &TypeExpr) -> Type {
        match te {
            TypeExpr::Named(name) => match name.as_str() {
                "Int" => Type::Int,
                "Float" => Type::Float,
                "Bool" => Type::Bool,
                "String" => Type::Str,
                "Void" => Type::Void,
                other => Type::Class(other.to_string()),
            },
            TypeExpr::Array(inner) => Type::Array(Box::new(Type::from_type_expr(inner))),
            TypeExpr::Function(params, ret) => Type::Function(
                params.iter().map(Type::from_type_expr).collect(),
                Box::new(Type::from_type_expr(ret)),
            ),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Structural equality for primitives and arrays, nominal for classes
    /// (through [`ClassTable::is_subclass`], not here — this method only
    /// decides whether two types are the *same* type, not whether one is a
    /// subtype of the other).
    pub fn is_same(&self, other: &Type) -> bool {
        self == other
    }

    /// Widens two numeric types the way arithmetic does: `Int op Int =
    /// Int`, anything involving a `Float` widens to `Float`. Returns
    /// `Unknown` if the pair can't be unified without loss (e.g. `Bool` and
    /// `Int`); `Unknown` unifies with anything so it never itself causes a
    /// further diagnostic.
    pub fn unify_numeric(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Unknown, t) | (t, Type::Unknown) => t.clone(),
            (Type::Int, Type::Int) => Type::Int,
            (Type::Float, Type::Float) => Type::Float,
            (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
            _ => Type::Unknown,
        }
    }
}

/// Free-standing assignment-compatibility predicate (`spec.md` §4.3's
/// `compatible(a, b)`), usable outside an [`Analyzer`] instance — `rewrite`'s
/// template instantiator validates type-parameter constraints against this
/// directly, since it runs after semantic analysis has already finished and
/// has no live `Analyzer` to borrow. `classes` is consulted for class
/// subtyping; pass `None` when no class hierarchy is in scope (e.g. a
/// template constrained to a primitive type), in which case two distinct
/// class names are never compatible.
pub fn compatible(expected: &Type, actual: &Type, classes: Option<&ClassTable>) -> bool {
    match (expected, actual) {
        (Type::Unknown, _) | (_, Type::Unknown) => true,
        (Type::Float, Type::Int) => true,
        (Type::Class(a), Type::Class(b)) | (Type::Object(a), Type::Object(b)) => {
            a == b || classes.map(|c| c.is_subclass(b, a)).unwrap_or(false)
        }
        (Type::Array(a), Type::Array(b)) => compatible(a, b, classes),
        _ => expected == actual,
    }
}

// ===========================================================================
// Class table
// ===========================================================================

#[derive(Clone, Debug)]
pub struct FuncSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub name: String,
    pub base: Option<String>,
    /// Own fields only, in declaration order; use
    /// [`ClassTable::flattened_fields`] for the base-then-own layout the
    /// code generator emits.
    pub fields: IndexMap<String, Type>,
    pub methods: FxHashMap<String, FuncSig>,
    pub span: Span,
}

pub struct ClassTable {
    classes: FxHashMap<String, ClassInfo>,
}

impl ClassTable {
    /// Collects every class declaration in `program` and validates that
    /// `extends` chains are acyclic and refer to declared classes.
    pub fn build(program: &Program, handler: &Handler) -> Self {
        let mut classes = FxHashMap::default();
        for item in &program.items {
            if let Item::ClassDef(c) = item {
                classes.insert(c.name.clone(), class_info_from_def(c));
            }
        }
        let table = ClassTable { classes };
        table.check_inheritance(handler);
        table
    }

    fn check_inheritance(&self, handler: &Handler) {
        for info in self.classes.values() {
            if let Some(base) = &info.base {
                if !self.classes.contains_key(base) {
                    DiagnosticBuilder::error(format!(
                        "class '{}' extends undefined class '{}'",
                        info.name, base
                    ))
                    .code(DiagnosticCode::E_NAME_UNRESOLVED)
                    .span(info.span)
                    .emit(handler);
                    continue;
                }
            }
            let mut seen = vec![info.name.clone()];
            let mut cur = info.base.clone();
            while let Some(name) = cur {
                if seen.contains(&name) {
                    DiagnosticBuilder::error(format!(
                        "cyclic inheritance detected: {} -> {}",
                        seen.join(" -> "),
                        name
                    ))
                    .code(DiagnosticCode::E_MODULE_CYCLE)
                    .span(info.span)
                    .emit(handler);
                    break;
                }
                seen.push(name.clone());
                cur = self.classes.get(&name).and_then(|c| c.base.clone());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Every declared class name, in no particular order — the code
    /// generator uses this to find a class's subclasses (it has no reverse
    /// index of its own) when deciding whether a method call needs a
    /// type-tag dispatch or can call the statically-known method directly.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn has_subclasses(&self, name: &str) -> bool {
        self.classes
            .values()
            .any(|info| info.base.as_deref() == Some(name))
    }

    pub fn is_subclass(&self, sub: &str, base: &str) -> bool {
        if sub == base {
            return true;
        }
        let mut cur = self.classes.get(sub).and_then(|c| c.base.clone());
        let mut guard = 0;
        while let Some(name) = cur {
            if name == base {
                return true;
            }
            if guard > 64 {
                return false;
            }
            guard += 1;
            cur = self.classes.get(&name).and_then(|c| c.base.clone());
        }
        false
    }

    /// Fields in the order the C struct lays them out: the root base
    /// class's fields first, then each derived class's own fields, ending
    /// with `name`'s own fields last.
    pub fn flattened_fields(&self, name: &str) -> Vec<(String, Type)> {
        let mut chain = Vec::new();
        let mut cur = Some(name.to_string());
        let mut guard = 0;
        while let Some(n) = cur {
            if guard > 64 {
                break;
            }
            guard += 1;
            let Some(info) = self.classes.get(&n) else {
                break;
            };
            chain.push(n.clone());
            cur = info.base.clone();
        }
        chain.reverse();
        let mut out = Vec::new();
        for n in chain {
            if let Some(info) = self.classes.get(&n) {
                for (fname, fty) in &info.fields {
                    out.push((fname.clone(), fty.clone()));
                }
            }
        }
        out
    }

    /// Resolves a method by walking the `extends` chain from `class` up;
    /// this is the whole of Orion's polymorphic dispatch rule at the type
    /// level (the generator implements it at runtime with an integer type
    /// tag, not a vtable, but the *resolution* order is decided here).
    pub fn lookup_method(&self, class: &str, method: &str) -> Option<&FuncSig> {
        let mut cur = Some(class.to_string());
        let mut guard = 0;
        while let Some(n) = cur {
            if guard > 64 {
                return None;
            }
            guard += 1;
            let info = self.classes.get(&n)?;
            if let Some(sig) = info.methods.get(method) {
                return Some(sig);
            }
            cur = info.base.clone();
        }
        None
    }

    pub fn lookup_field(&self, class: &str, field: &str) -> Option<Type> {
        self.flattened_fields(class)
            .into_iter()
            .find(|(n, _)| n == field)
            .map(|(_, t)| t)
    }
}

fn class_info_from_def(c: &ClassDef) -> ClassInfo {
    let mut fields = IndexMap::new();
    for f in &c.fields {
        let ty = f
            .ty
            .as_ref()
            .map(Type::from_type_expr)
            .unwrap_or(Type::Unknown);
        fields.insert(f.name.clone(), ty);
    }
    let mut methods = FxHashMap::default();
    for m in &c.methods {
        methods.insert(m.name.clone(), func_sig_from_def(m));
    }
    ClassInfo {
        name: c.name.clone(),
        base: c.base.clone(),
        fields,
        methods,
        span: c.span,
    }
}

fn func_sig_from_def(f: &FuncDef) -> FuncSig {
    FuncSig {
        params: f
            .params
            .iter()
            .map(|p| p.ty.as_ref().map(Type::from_type_expr).unwrap_or(Type::Unknown))
            .collect(),
        ret: f
            .return_type
            .as_ref()
            .map(Type::from_type_expr)
            .unwrap_or(Type::Unknown),
    }
}

// ===========================================================================
// Symbol table
// ===========================================================================

#[derive(Clone, Debug)]
pub struct SymbolInfo {
    pub ty: Type,
    pub span: Span,
}

/// A stack of lexical scopes. Lookup walks from the innermost scope
/// outward, matching the shadowing rules of nested blocks, `for`/`while`
/// bodies, and lambda parameter lists.
pub struct SymbolTable {
    scopes: Vec<FxHashMap<String, SymbolInfo>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![FxHashMap::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn define(&mut self, name: String, info: SymbolInfo) {
        self.scopes
            .last_mut()
            .expect("symbol table always has a root scope")
            .insert(name, info);
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolInfo> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Analyzer
// ===========================================================================

/// Everything later compiler stages (`orionc-rewrite`, `orionc-gen`) need
/// from semantic analysis: the class hierarchy and the set of top-level
/// function signatures.
pub struct SemInfo {
    pub classes: ClassTable,
    pub functions: FxHashMap<String, FuncSig>,
}

pub struct Analyzer<'h> {
    handler: &'h Handler,
    functions: FxHashMap<String, FuncSig>,
    classes: Option<ClassTable>,
    symbols: SymbolTable,
    current_class: Option<String>,
    return_stack: Vec<Type>,
    loop_depth: u32,
}

impl<'h> Analyzer<'h> {
    pub fn new(handler: &'h Handler) -> Self {
        Analyzer {
            handler,
            functions: FxHashMap::default(),
            classes: None,
            symbols: SymbolTable::new(),
            current_class: None,
            return_stack: Vec::new(),
            loop_depth: 0,
        }
    }

    pub fn analyze(mut self, program: &Program) -> SemInfo {
        let classes = ClassTable::build(program, self.handler);
        for item in &program.items {
            if let Item::FuncDef(f) = item {
                self.functions.insert(f.name.clone(), func_sig_from_def(f));
            }
        }
        self.classes = Some(classes);

        for item in &program.items {
            self.check_item(item);
        }

        SemInfo {
            classes: self.classes.take().unwrap(),
            functions: self.functions,
        }
    }

    fn classes(&self) -> &ClassTable {
        self.classes.as_ref().expect("class table built before body checks")
    }

    fn error(&self, msg: impl Into<String>, code: DiagnosticCode, span: Span) {
        DiagnosticBuilder::error(msg).code(code).span(span).emit(self.handler);
    }

    fn check_item(&mut self, item: &Item) {
        match item {
            Item::FuncDef(f) => self.check_func(f, None),
            Item::ClassDef(c) => self.check_class(c),
            Item::VarDecl(v) => self.check_var_decl(v),
            Item::Stmt(s) => self.check_stmt(s),
            Item::Module(_) | Item::Import(_) => {}
            Item::AspectDef(a) => self.check_aspect(a),
            Item::MacroDef(_) => {
                // Macro bodies are checked after expansion by orionc-rewrite,
                // against the call-site's argument types; checking the
                // unexpanded template here would reject legitimate uses of
                // macro parameters in positions no concrete type fits yet.
            }
        }
    }

    fn check_aspect(&mut self, a: &AspectDef) {
        for advice in &a.advice {
            if !a.pointcuts.iter().any(|p| p.name == advice.pointcut) {
                self.error(
                    format!(
                        "advice refers to undefined pointcut '{}' in aspect '{}'",
                        advice.pointcut, a.name
                    ),
                    DiagnosticCode::E_NAME_UNRESOLVED,
                    a.span,
                );
            }
            let kind_ok = matches!(advice.kind, AdviceKind::Before | AdviceKind::After | AdviceKind::Around);
            debug_assert!(kind_ok);
            self.symbols.push_scope();
            self.check_block(&advice.body);
            self.symbols.pop_scope();
        }
    }

    fn check_func(&mut self, f: &FuncDef, self_class: Option<&str>) {
        self.symbols.push_scope();
        for p in &f.params {
            self.symbols.define(
                p.name.clone(),
                SymbolInfo {
                    ty: p.ty.as_ref().map(Type::from_type_expr).unwrap_or(Type::Unknown),
                    span: f.span,
                },
            );
        }
        let ret = f
            .return_type
            .as_ref()
            .map(Type::from_type_expr)
            .unwrap_or(Type::Unknown);
        self.return_stack.push(ret);
        let prev_class = self.current_class.clone();
        self.current_class = self_class.map(|s| s.to_string());
        self.check_block(&f.body);
        self.current_class = prev_class;
        self.return_stack.pop();
        self.symbols.pop_scope();
    }

    fn check_class(&mut self, c: &ClassDef) {
        for field in &c.fields {
            self.check_var_decl(field);
        }
        for m in &c.methods {
            self.check_func(m, Some(&c.name));
        }
    }

    fn check_var_decl(&mut self, v: &VarDecl) {
        let declared = v.ty.as_ref().map(Type::from_type_expr);
        let inferred = v.init.as_ref().map(|e| self.infer_expr(e));
        let ty = match (&declared, &inferred) {
            (Some(d), Some(i)) => {
                if !self.compatible(d, i) {
                    self.error(
                        format!("cannot assign value of type '{}' to variable of type '{}'", i, d),
                        DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                        v.span,
                    );
                }
                d.clone()
            }
            (Some(d), None) => d.clone(),
            (None, Some(i)) => i,
            (None, None) => Type::Unknown,
        };
        self.symbols.define(v.name.clone(), SymbolInfo { ty, span: v.span });
    }

    fn check_block(&mut self, block: &Block) {
        self.symbols.push_scope();
        for s in block {
            self.check_stmt(s);
        }
        self.symbols.pop_scope();
    }

    fn check_stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Block(b) => self.check_block(b),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.infer_expr(cond);
                self.check_block(then_branch);
                if let Some(e) = else_branch {
                    self.check_block(e);
                }
            }
            Stmt::While { cond, body } => {
                self.infer_expr(cond);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
            }
            Stmt::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.infer_expr(cond);
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            } => {
                self.infer_expr(start);
                self.infer_expr(end);
                if let Some(s) = step {
                    self.infer_expr(s);
                }
                self.symbols.push_scope();
                self.symbols.define(
                    var.clone(),
                    SymbolInfo {
                        ty: Type::Int,
                        span: Span::DUMMY,
                    },
                );
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
            }
            Stmt::ForCollection { var, iter, body } => {
                let iter_ty = self.infer_expr(iter);
                let elem_ty = match iter_ty {
                    Type::Array(inner) => *inner,
                    _ => Type::Unknown,
                };
                self.symbols.push_scope();
                self.symbols.define(
                    var.clone(),
                    SymbolInfo {
                        ty: elem_ty,
                        span: Span::DUMMY,
                    },
                );
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
            }
            Stmt::ForTraditional {
                init,
                cond,
                step,
                body,
            } => {
                self.symbols.push_scope();
                if let Some(i) = init {
                    self.check_stmt(i);
                }
                if let Some(c) = cond {
                    self.infer_expr(c);
                }
                if let Some(st) = step {
                    self.check_stmt(st);
                }
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.symbols.pop_scope();
            }
            Stmt::Switch {
                subject,
                cases,
                default,
            } => {
                self.infer_expr(subject);
                for case in cases {
                    for v in &case.values {
                        self.infer_expr(v);
                    }
                    self.check_block(&case.body);
                }
                if let Some(d) = default {
                    self.check_block(d);
                }
            }
            Stmt::Return(value) => {
                let ty = value.as_ref().map(|e| self.infer_expr(e)).unwrap_or(Type::Void);
                if let Some(expected) = self.return_stack.last().cloned() {
                    if !self.compatible(&expected, &ty) {
                        self.error(
                            format!("function returns '{}' but '{}' was expected", ty, expected),
                            DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                            Span::DUMMY,
                        );
                    }
                }
            }
            Stmt::VarDecl(v) => self.check_var_decl(v),
            Stmt::VarAssign {
                target,
                compound_op: _,
                value,
            } => {
                let value_ty = self.infer_expr(value);
                match target {
                    Expr::Ident(name) => {
                        if self.symbols.lookup(name).is_none() && !self.functions.contains_key(name) {
                            self.error(
                                format!("assignment to undeclared variable '{}'", name),
                                DiagnosticCode::E_SEMANTIC_UNDEFINED_VAR,
                                Span::DUMMY,
                            );
                        }
                    }
                    other => {
                        self.infer_expr(other);
                    }
                }
                let _ = value_ty;
            }
            Stmt::Print(e) => {
                self.infer_expr(e);
            }
            Stmt::Break | Stmt::Continue => {
                if self.loop_depth == 0 {
                    self.error(
                        "'break'/'continue' used outside of a loop",
                        DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                        Span::DUMMY,
                    );
                }
            }
            Stmt::Try {
                body,
                catches,
                finally,
            } => {
                self.check_block(body);
                for c in catches {
                    self.symbols.push_scope();
                    self.symbols.define(
                        c.binding.clone(),
                        SymbolInfo {
                            ty: Type::Str,
                            span: Span::DUMMY,
                        },
                    );
                    self.check_block(&c.body);
                    self.symbols.pop_scope();
                }
                if let Some(f) = finally {
                    self.check_block(f);
                }
            }
            Stmt::Throw(e) => {
                self.infer_expr(e);
            }
            Stmt::Match { subject, arms } => {
                self.infer_expr(subject);
                for arm in arms {
                    self.symbols.push_scope();
                    if let Pattern::Ident(name) = &arm.pattern {
                        self.symbols.define(
                            name.clone(),
                            SymbolInfo {
                                ty: Type::Unknown,
                                span: Span::DUMMY,
                            },
                        );
                    }
                    if let Some(g) = &arm.guard {
                        self.infer_expr(g);
                    }
                    self.infer_expr(&arm.body);
                    self.symbols.pop_scope();
                }
            }
            Stmt::Expr(e) => {
                self.infer_expr(e);
            }
        }
    }

    /// `Unknown` is compatible with anything; otherwise numeric widening
    /// (`Int` into an expected `Float`) is allowed but not the reverse, and
    /// every other pair requires exact agreement modulo subclassing.
    fn compatible(&self, expected: &Type, actual: &Type) -> bool {
        compatible(expected, actual, Some(self.classes()))
    }

    fn infer_expr(&mut self, e: &Expr) -> Type {
        match e {
            Expr::NumberLit(_, is_float) => {
                if *is_float {
                    Type::Float
                } else {
                    Type::Int
                }
            }
            Expr::StringLit(_) => Type::Str,
            Expr::BoolLit(_) => Type::Bool,
            Expr::NullLit => Type::Null,
            Expr::This => self
                .current_class
                .clone()
                .map(Type::Class)
                .unwrap_or(Type::Unknown),
            Expr::Ident(name) => {
                if let Some(info) = self.symbols.lookup(name) {
                    return info.ty.clone();
                }
                if let Some(sig) = self.functions.get(name) {
                    return Type::Function(sig.params.clone(), Box::new(sig.ret.clone()));
                }
                self.error(
                    format!("use of undeclared identifier '{}'", name),
                    DiagnosticCode::E_SEMANTIC_UNDEFINED_VAR,
                    Span::DUMMY,
                );
                Type::Unknown
            }
            Expr::BinOp { op, lhs, rhs } => {
                let lt = self.infer_expr(lhs);
                let rt = self.infer_expr(rhs);
                self.check_binop(*op, &lt, &rt)
            }
            Expr::UnOp { operand, .. } => self.infer_expr(operand),
            Expr::Call { callee, args } => self.check_call(callee, args),
            Expr::Member { object, field } => {
                let obj_ty = self.infer_expr(object);
                match obj_ty {
                    Type::Class(name) | Type::Object(name) => {
                        match self.classes().lookup_field(&name, field) {
                            Some(ty) => ty,
                            None => {
                                if self.classes().lookup_method(&name, field).is_none() {
                                    self.error(
                                        format!("class '{}' has no field or method '{}'", name, field),
                                        DiagnosticCode::E_SEMANTIC_UNDEFINED_VAR,
                                        Span::DUMMY,
                                    );
                                }
                                Type::Unknown
                            }
                        }
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(
                            format!("type '{}' has no member '{}'", other, field),
                            DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                            Span::DUMMY,
                        );
                        Type::Unknown
                    }
                }
            }
            Expr::Index { object, index } => {
                let obj_ty = self.infer_expr(object);
                let idx_ty = self.infer_expr(index);
                if idx_ty != Type::Int && idx_ty != Type::Unknown {
                    self.error(
                        format!("array index must be Int, found '{}'", idx_ty),
                        DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                        Span::DUMMY,
                    );
                }
                match obj_ty {
                    Type::Array(inner) => *inner,
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(
                            format!("cannot index into type '{}'", other),
                            DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                            Span::DUMMY,
                        );
                        Type::Unknown
                    }
                }
            }
            Expr::ArrayLit(elems) => {
                let mut elem_ty = Type::Unknown;
                for el in elems {
                    let t = self.infer_expr(el);
                    if elem_ty == Type::Unknown {
                        elem_ty = t;
                    }
                }
                Type::Array(Box::new(elem_ty))
            }
            Expr::Lambda {
                params,
                return_type,
                body,
            } => self.check_lambda(params, return_type, body),
            Expr::Compose { lhs, rhs } => {
                let lt = self.infer_expr(lhs);
                let rt = self.infer_expr(rhs);
                // `f >> g` has the type of `g`'s result applied after `f`;
                // since Orion functions are not generically typed we only
                // validate both sides are callable, and report the
                // composed function's own inferred return type.
                let lhs_ret = match lt {
                    Type::Function(_, ret) | Type::Lambda(_, ret) => *ret,
                    _ => Type::Unknown,
                };
                let _ = lhs_ret;
                match rt {
                    Type::Function(params, ret) | Type::Lambda(params, ret) => {
                        Type::Function(params, ret)
                    }
                    _ => Type::Unknown,
                }
            }
            Expr::New { class_name, args } => {
                for a in args {
                    self.infer_expr(a);
                }
                if self.classes().get(class_name).is_none() {
                    self.error(
                        format!("use of undeclared class '{}'", class_name),
                        DiagnosticCode::E_NAME_UNRESOLVED,
                        Span::DUMMY,
                    );
                }
                Type::Class(class_name.clone())
            }
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Expr]) -> Type {
        let arg_types: Vec<Type> = args.iter().map(|a| self.infer_expr(a)).collect();

        // Method calls (`obj.method(...)`) dispatch through the class
        // hierarchy rather than through a bare function signature.
        if let Expr::Member { object, field } = callee {
            let obj_ty = self.infer_expr(object);
            if let Type::Class(name) | Type::Object(name) = obj_ty {
                return match self.classes().lookup_method(&name, field) {
                    Some(sig) => {
                        self.check_arity(&sig.params, &arg_types, field);
                        sig.ret.clone()
                    }
                    None => Type::Unknown,
                };
            }
            return Type::Unknown;
        }

        let callee_ty = self.infer_expr(callee);
        match callee_ty {
            Type::Function(params, ret) | Type::Lambda(params, ret) => {
                let name = match callee {
                    Expr::Ident(n) => n.clone(),
                    _ => "<lambda>".to_string(),
                };
                self.check_arity(&params, &arg_types, &name);
                *ret
            }
            Type::Curried(_, to) => *to,
            Type::Unknown => Type::Unknown,
            other => {
                self.error(
                    format!("type '{}' is not callable", other),
                    DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                    Span::DUMMY,
                );
                Type::Unknown
            }
        }
    }

    fn check_arity(&self, params: &[Type], args: &[Type], name: &str) {
        if params.is_empty() {
            // Unannotated signatures (no param types recorded) skip the
            // arity check entirely rather than guessing.
            return;
        }
        if params.len() != args.len() {
            self.error(
                format!(
                    "'{}' expects {} argument(s), found {}",
                    name,
                    params.len(),
                    args.len()
                ),
                DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                Span::DUMMY,
            );
            return;
        }
        for (p, a) in params.iter().zip(args.iter()) {
            if !self.compatible(p, a) {
                self.error(
                    format!("argument of type '{}' does not match expected type '{}'", a, p),
                    DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
                    Span::DUMMY,
                );
            }
        }
    }

    fn check_lambda(
        &mut self,
        params: &[Param],
        return_type: &Option<TypeExpr>,
        body: &LambdaBody,
    ) -> Type {
        self.symbols.push_scope();
        let param_tys: Vec<Type> = params
            .iter()
            .map(|p| {
                let ty = p.ty.as_ref().map(Type::from_type_expr).unwrap_or(Type::Unknown);
                self.symbols.define(
                    p.name.clone(),
                    SymbolInfo {
                        ty: ty.clone(),
                        span: Span::DUMMY,
                    },
                );
                ty
            })
            .collect();
        let ret_ty = match body {
            LambdaBody::Expr(e) => {
                let inferred = self.infer_expr(e);
                return_type.as_ref().map(Type::from_type_expr).unwrap_or(inferred)
            }
            LambdaBody::Block(b) => {
                let ret = return_type
                    .as_ref()
                    .map(Type::from_type_expr)
                    .unwrap_or(Type::Unknown);
                self.return_stack.push(ret.clone());
                self.check_block(b);
                self.return_stack.pop();
                ret
            }
        };
        self.symbols.pop_scope();
        Type::Lambda(param_tys, Box::new(ret_ty))
    }

    fn check_binop(&mut self, op: char, lt: &Type, rt: &Type) -> Type {
        match op {
            OP_ADD if *lt == Type::Str || *rt == Type::Str => Type::Str,
            OP_ADD | OP_SUB | OP_MUL | OP_DIV => {
                if !lt.is_numeric() && *lt != Type::Unknown {
                    self.type_error_binop(op, lt, rt);
                } else if !rt.is_numeric() && *rt != Type::Unknown {
                    self.type_error_binop(op, lt, rt);
                }
                lt.unify_numeric(rt)
            }
            OP_LT | OP_GT | OP_LE | OP_GE => {
                if (!lt.is_numeric() && *lt != Type::Unknown) || (!rt.is_numeric() && *rt != Type::Unknown) {
                    self.type_error_binop(op, lt, rt);
                }
                Type::Bool
            }
            OP_EQ | OP_NE => Type::Bool,
            OP_AND | OP_OR => {
                if (*lt != Type::Bool && *lt != Type::Unknown) || (*rt != Type::Bool && *rt != Type::Unknown) {
                    self.type_error_binop(op, lt, rt);
                }
                Type::Bool
            }
            _ => Type::Unknown,
        }
    }

    fn type_error_binop(&self, op: char, lt: &Type, rt: &Type) {
        self.error(
            format!("operator '{}' cannot be applied to '{}' and '{}'", op, lt, rt),
            DiagnosticCode::E_SEMANTIC_TYPE_MISMATCH,
            Span::DUMMY,
        );
    }
}

// ===========================================================================
// Module resolver
// ===========================================================================

/// Extracts the module names a program imports, independent of which
/// symbols are selected from each (`import X`, `import X as Y`, and
/// `from X import ...` all reference the same dependency `X`).
pub fn collect_imports(program: &Program) -> Vec<String> {
    program
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Import(Import::Whole { name }) => Some(name.clone()),
            Item::Import(Import::Aliased { name, .. }) => Some(name.clone()),
            Item::Import(Import::Selective { name, .. }) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// The module being declared by a program's own `module` statement, if any.
pub fn module_name(program: &Program) -> Option<String> {
    program.items.iter().find_map(|item| match item {
        Item::Module(m) => Some(m.name.clone()),
        _ => None,
    })
}

/// A directed graph of module-to-module `import` dependencies, built up
/// across every source file the driver compiles together. Caching this
/// graph by source modification time was considered and rejected — see
/// `DESIGN.md` — in favor of recomputing it each run, since mtimes are
/// unreliable across filesystems and checkouts.
pub struct ModuleGraph {
    edges: FxHashMap<String, Vec<String>>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        ModuleGraph {
            edges: FxHashMap::default(),
        }
    }

    pub fn add_module(&mut self, name: &str, imports: &[String]) {
        self.edges
            .entry(name.to_string())
            .or_default()
            .extend(imports.iter().cloned());
    }

    /// Depth-first search with a recursion stack; on finding a back-edge,
    /// emits a single diagnostic naming the full cycle and returns `true`.
    pub fn detect_cycle(&self, handler: &Handler) -> bool {
        let mut visited = FxHashMap::default();
        let mut stack = Vec::new();
        for name in self.edges.keys() {
            if self.dfs_cycle(name, &mut visited, &mut stack, handler) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut FxHashMap<String, u8>,
        stack: &mut Vec<String>,
        handler: &Handler,
    ) -> bool {
        match visited.get(node) {
            Some(1) => return false,
            Some(2) => {
                let cycle_start = stack.iter().position(|n| n == node).unwrap_or(0);
                let mut cycle = stack[cycle_start..].to_vec();
                cycle.push(node.to_string());
                DiagnosticBuilder::error(format!("circular module dependency: {}", cycle.join(" -> ")))
                    .code(DiagnosticCode::E_MODULE_CYCLE)
                    .span(orionc_util::Span::DUMMY)
                    .emit(handler);
                return true;
            }
            _ => {}
        }
        visited.insert(node.to_string(), 2);
        stack.push(node.to_string());
        if let Some(deps) = self.edges.get(node) {
            for dep in deps {
                if self.dfs_cycle(dep, visited, stack, handler) {
                    return true;
                }
            }
        }
        stack.pop();
        visited.insert(node.to_string(), 1);
        false
    }

    /// A dependency-respecting compilation order (dependencies first), or
    /// `None` if the graph is cyclic.
    pub fn topo_order(&self) -> Option<Vec<String>> {
        let mut order = Vec::new();
        let mut visited = FxHashMap::default();
        for name in self.edges.keys() {
            if !self.topo_visit(name, &mut visited, &mut order) {
                return None;
            }
        }
        Some(order)
    }

    fn topo_visit(
        &self,
        node: &str,
        visited: &mut FxHashMap<String, u8>,
        order: &mut Vec<String>,
    ) -> bool {
        match visited.get(node) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        visited.insert(node.to_string(), 2);
        if let Some(deps) = self.edges.get(node) {
            for dep in deps.clone() {
                if !self.topo_visit(&dep, visited, order) {
                    return false;
                }
            }
        }
        visited.insert(node.to_string(), 1);
        order.push(node.to_string());
        true
    }
}

impl Default for ModuleGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs both passes of semantic analysis over a single parsed file.
pub fn analyze(program: &Program, handler: &Handler) -> SemInfo {
    Analyzer::new(handler).analyze(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_par::parse;

    fn analyze_src(src: &str) -> (SemInfo, Handler) {
        let handler = Handler::new();
        let program = parse(src, &handler);
        let info = analyze(&program, &handler);
        (info, handler)
    }

    #[test]
    fn resolves_simple_function() {
        let (_info, handler) = analyze_src("func main() { x = 1; y = 2; print x + y; }");
        assert!(!handler.has_errors());
    }

    #[test]
    fn reports_undefined_variable() {
        let (_info, handler) = analyze_src("func main() { print undefined_var; }");
        assert!(handler.has_errors());
    }

    #[test]
    fn flattens_inherited_fields_base_first() {
        let (info, handler) = analyze_src(
            "class Animal { name = \"\"; } class Dog extends Animal { breed = \"\"; }",
        );
        assert!(!handler.has_errors());
        let fields = info.classes.flattened_fields("Dog");
        assert_eq!(fields[0].0, "name");
        assert_eq!(fields[1].0, "breed");
    }

    #[test]
    fn detects_inheritance_cycle() {
        let (_info, handler) = analyze_src("class A extends B {} class B extends A {}");
        assert!(handler.has_errors());
    }

    #[test]
    fn method_resolves_through_base_class() {
        let (info, handler) = analyze_src(
            "class Shape { func area() => 0; } class Circle extends Shape { radius = 0; }",
        );
        assert!(!handler.has_errors());
        assert!(info.classes.lookup_method("Circle", "area").is_some());
    }

    #[test]
    fn reports_type_mismatch_on_binop() {
        let (_info, handler) = analyze_src("func main() { x = true + 1; }");
        assert!(handler.has_errors());
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_info, handler) = analyze_src("func main() { break; }");
        assert!(handler.has_errors());
    }

    #[test]
    fn string_concatenation_with_plus_is_allowed() {
        let (_info, handler) = analyze_src("func main() { s = \"a\" + \"b\"; }");
        assert!(!handler.has_errors());
    }

    #[test]
    fn module_graph_detects_cycle() {
        let mut graph = ModuleGraph::new();
        graph.add_module("a", &["b".to_string()]);
        graph.add_module("b", &["a".to_string()]);
        let handler = Handler::new();
        assert!(graph.detect_cycle(&handler));
    }

    #[test]
    fn module_graph_topo_orders_dependencies_first() {
        let mut graph = ModuleGraph::new();
        graph.add_module("app", &["util".to_string()]);
        graph.add_module("util", &[]);
        let order = graph.topo_order().unwrap();
        let util_pos = order.iter().position(|n| n == "util").unwrap();
        let app_pos = order.iter().position(|n| n == "app").unwrap();
        assert!(util_pos < app_pos);
    }

    #[test]
    fn collects_selective_import_module_name() {
        let handler = Handler::new();
        let program = parse("from math_lib import sqrt, pow as power;", &handler);
        assert_eq!(collect_imports(&program), vec!["math_lib".to_string()]);
    }
}
