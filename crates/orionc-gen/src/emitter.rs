//! The C emitter (`spec.md` §4.5, `SPEC_FULL.md` §7).
//!
//! [`Emitter`] is the explicit state-machine context the Design Notes ask
//! for: output buffer, indent level, per-function variable table, the
//! uniqueness counters for hoisted lambdas/composition wrappers/print
//! temporaries, and the cumulative [`CodeGenStats`] record. There is no
//! module-level mutable state; every `emit*` entry point takes `&mut self`
//! and nested emissions always restore the indent level they found on
//! entry. `std::fmt::Write` builds the whole translation unit in memory;
//! [`emit`] only touches the filesystem once, on the final flush, so an
//! emitter fault never leaves a partial `.c` file behind.

use std::fmt::Write as _;
use std::path::Path;

use orionc_par::{
    Case, Catch, Expr, FuncDef, Import, Item, LambdaBody, MatchArm, Param, Pattern, Program,
    Stmt, TypeExpr, UnOp, OP_ADD,
};
use orionc_sem::{ClassTable, FuncSig, SemInfo, Type};
use orionc_util::{FxHashMap, FxHashSet};

use crate::error::{CodeGenError, Result};
use crate::stats::CodeGenStats;
use crate::types::{infer_expr, CType, InferCtx};

const TRY_STACK_DEPTH: u32 = 32;

pub struct Emitter<'a> {
    /// Forward declarations (opaque struct typedefs + function/method
    /// prototypes) so definition order in the source file never constrains
    /// call order in the generated C — every name is callable from every
    /// other function regardless of which was emitted first.
    prototypes: String,
    out: String,
    hoisted: String,
    main_section: String,
    indent: usize,
    classes: &'a ClassTable,
    functions: &'a FxHashMap<String, FuncSig>,
    imports: &'a FxHashMap<String, Vec<String>>,
    /// Maps the name a module is referred to *by* in this source file (its
    /// own name for a plain `import X`, the alias for `import X as Y`) to
    /// the module's real, exported-function-mangling name. Populated by
    /// [`Emitter::emit_import`]; consulted by [`Emitter::emit_call`] so a
    /// qualified call `m.multiply(args)` can be recognized as a module call
    /// before it is ever mistaken for a method call on an object named `m`.
    module_aliases: FxHashMap<String, String>,
    vars: FxHashMap<String, CType>,
    declared: FxHashSet<String>,
    tag_of: FxHashMap<String, u32>,
    lambda_counter: u32,
    compose_counter: u32,
    print_tmp_counter: u32,
    dispatchers: FxHashSet<(String, String)>,
    constructors_with_init: FxHashSet<String>,
    uses_exceptions: bool,
    stats: CodeGenStats,
}

/// Writes the emitted translation unit for `program` to `output_path`.
/// `imports` maps a whole/aliased-imported module's name to its exported
/// symbol list, as resolved by `orionc-resolve`; it is consulted only for
/// `import X`/`import X as Y` (a `from X import a, b` selective import
/// already names its own symbols in the AST).
pub fn emit(
    program: &Program,
    sem: &SemInfo,
    imports: &FxHashMap<String, Vec<String>>,
    output_path: &Path,
) -> Result<CodeGenStats> {
    let (source, stats) = emit_to_string(program, sem, imports)?;
    std::fs::write(output_path, source).map_err(|source| CodeGenError::Io {
        path: output_path.display().to_string(),
        source,
    })?;
    Ok(stats)
}

/// Same as [`emit`] but returns the generated C source as a `String`
/// instead of writing it to disk — used by the driver's `-d 3` dump mode
/// and by this crate's own tests.
pub fn emit_to_string(
    program: &Program,
    sem: &SemInfo,
    imports: &FxHashMap<String, Vec<String>>,
) -> Result<(String, CodeGenStats)> {
    let mut emitter = Emitter::new(&sem.classes, &sem.functions, imports);
    emitter.run(program)?;
    let mut source = String::new();
    source.push_str(&emitter.preamble_text());
    source.push_str(&emitter.prototypes);
    source.push_str(&emitter.out);
    source.push_str(&emitter.hoisted);
    source.push_str(&emitter.main_section);
    Ok((source, emitter.stats))
}

impl<'a> Emitter<'a> {
    fn new(
        classes: &'a ClassTable,
        functions: &'a FxHashMap<String, FuncSig>,
        imports: &'a FxHashMap<String, Vec<String>>,
    ) -> Self {
        Emitter {
            prototypes: String::new(),
            out: String::new(),
            hoisted: String::new(),
            main_section: String::new(),
            indent: 0,
            classes,
            functions,
            imports,
            module_aliases: FxHashMap::default(),
            vars: FxHashMap::default(),
            declared: FxHashSet::default(),
            tag_of: FxHashMap::default(),
            lambda_counter: 0,
            compose_counter: 0,
            print_tmp_counter: 0,
            dispatchers: FxHashSet::default(),
            constructors_with_init: FxHashSet::default(),
            uses_exceptions: false,
            stats: CodeGenStats::default(),
        }
    }

    fn run(&mut self, program: &Program) -> Result<()> {
        self.uses_exceptions = program_uses_try(program);
        let mut next_tag = 0u32;
        for item in &program.items {
            if let Item::ClassDef(c) = item {
                self.tag_of.insert(c.name.clone(), next_tag);
                next_tag += 1;
            }
        }
        self.write_tag_defines();
        self.write_prototypes(program);

        let mut main_body: Vec<Stmt> = Vec::new();
        for item in &program.items {
            match item {
                Item::ClassDef(c) => {
                    self.emit_class(c)?;
                    self.stats.classes_emitted += 1;
                }
                Item::FuncDef(f) => {
                    self.emit_free_function(f)?;
                    self.stats.functions_emitted += 1;
                }
                Item::Import(imp) => {
                    self.emit_import(imp)?;
                    self.stats.modules_lowered += 1;
                }
                Item::Stmt(Stmt::Block(inner)) => main_body.extend(inner.clone()),
                Item::Stmt(s) => main_body.push(s.clone()),
                Item::VarDecl(v) => main_body.push(Stmt::VarDecl(v.clone())),
                // A bare `module <name>` declaration and aspect/macro
                // definitions are compile-time-only: they have already done
                // their work (naming this file, weaving, expanding) by the
                // time the rewritten tree reaches code generation.
                Item::Module(_) | Item::AspectDef(_) | Item::MacroDef(_) => {}
            }
        }

        // `main` is built through the same buffer `self.out` every other
        // body uses (so lambdas/composes/dispatchers it triggers hoist the
        // same way), then moved aside so it can be placed after every
        // hoisted helper in the final assembly.
        let saved_out = std::mem::take(&mut self.out);
        self.emit_main(&main_body)?;
        self.main_section = std::mem::replace(&mut self.out, saved_out);
        Ok(())
    }

    /// Forward declarations for every class and function/method, emitted
    /// from the AST's own parameter/return-type annotations — independent
    /// of `orionc-sem`'s inferred signatures, since a prototype only needs
    /// to match C's notion of a declaration, not a fully resolved type.
    fn write_prototypes(&mut self, program: &Program) {
        for item in &program.items {
            if let Item::ClassDef(c) = item {
                self.prototypes
                    .push_str(&format!("typedef struct {0} {0};\n", c.name));
            }
        }
        self.prototypes.push('\n');
        for item in &program.items {
            match item {
                Item::ClassDef(c) => {
                    self.prototypes
                        .push_str(&format!("static {0}* new_{0}(void);\n", c.name));
                    for m in &c.methods {
                        let params = std::iter::once(format!("{}* self", c.name))
                            .chain(m.params.iter().map(|p| self.param_decl(p)))
                            .collect::<Vec<_>>()
                            .join(", ");
                        let ret = self.return_ctype(m).c_spelling();
                        let line = format!("static {ret} {}_{}({params});\n", c.name, m.name);
                        self.prototypes.push_str(&line);
                    }
                }
                Item::FuncDef(f) => {
                    let params = f
                        .params
                        .iter()
                        .map(|p| self.param_decl(p))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let ret = self.return_ctype(f).c_spelling();
                    let line = format!("static {ret} {}({params});\n", f.name);
                    self.prototypes.push_str(&line);
                }
                _ => {}
            }
        }
        self.prototypes.push('\n');
    }

    // -----------------------------------------------------------------
    // Preamble
    // -----------------------------------------------------------------

    fn preamble_text(&self) -> String {
        let mut p = String::new();
        p.push_str("#include <stdio.h>\n");
        p.push_str("#include <stdlib.h>\n");
        p.push_str("#include <string.h>\n");
        p.push_str("#include <math.h>\n");
        p.push_str("#include <setjmp.h>\n");
        p.push_str("#include <stdbool.h>\n");
        p.push_str("#include <stddef.h>\n\n");
        p.push_str("#define TRUE 1\n#define FALSE 0\n\n");
        p.push_str("static inline const char* to_string(double v) {\n");
        p.push_str("    static char buf[64];\n");
        p.push_str("    snprintf(buf, sizeof(buf), \"%g\", v);\n");
        p.push_str("    return buf;\n}\n\n");
        p.push_str("static inline const char* concat_any(const char* a, const char* b) {\n");
        p.push_str("    static char buf[1024];\n");
        p.push_str("    snprintf(buf, sizeof(buf), \"%s%s\", a, b);\n");
        p.push_str("    return buf;\n}\n\n");
        if self.uses_exceptions {
            p.push_str(&format!("static jmp_buf __try_stack[{TRY_STACK_DEPTH}];\n"));
            p.push_str("static int __try_depth = 0;\n");
            p.push_str("static char _error_message[1024];\n");
            p.push_str("static char _error_type[128];\n");
            p.push_str("static int finally_executed = 0;\n\n");
        }
        p
    }

    fn write_tag_defines(&mut self) {
        let mut tags: Vec<(&String, &u32)> = self.tag_of.iter().collect();
        tags.sort_by_key(|(_, tag)| **tag);
        for (name, tag) in tags {
            writeln!(self.prototypes, "#define TAG_{name} {tag}").ok();
        }
        if !self.tag_of.is_empty() {
            self.prototypes.push('\n');
        }
    }

    // -----------------------------------------------------------------
    // Classes
    // -----------------------------------------------------------------

    fn emit_class(&mut self, c: &orionc_par::ClassDef) -> Result<()> {
        let fields = self.classes.flattened_fields(&c.name);
        self.write_line(&format!("struct {} {{", c.name));
        self.indent += 1;
        self.write_line("int __type_tag;");
        for (fname, fty) in &fields {
            self.write_line(&format!("{} {};", CType::from_sem(fty).c_spelling(), fname));
        }
        self.indent -= 1;
        self.write_line("};\n");

        self.write_line(&format!("static {0}* new_{0}(void) {{", c.name));
        self.indent += 1;
        self.write_line(&format!(
            "{0}* self = ({0}*)calloc(1, sizeof({0}));",
            c.name
        ));
        if let Some(tag) = self.tag_of.get(&c.name) {
            self.write_line(&format!("self->__type_tag = {tag};"));
        }
        self.write_line("return self;");
        self.indent -= 1;
        self.write_line("}\n");

        for m in &c.methods {
            self.emit_method(&c.name, m)?;
        }
        Ok(())
    }

    fn emit_method(&mut self, class_name: &str, m: &FuncDef) -> Result<()> {
        self.vars.clear();
        self.declared.clear();
        self.vars
            .insert("self".to_string(), CType::Object(class_name.to_string()));
        let params = std::iter::once(format!("{class_name}* self"))
            .chain(m.params.iter().map(|p| self.param_decl(p)))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.return_ctype(m);
        self.write_line(&format!(
            "static {} {}_{}({params}) {{",
            ret.c_spelling(),
            class_name,
            m.name
        ));
        self.indent += 1;
        for p in &m.params {
            let pty = self.param_ctype(p);
            self.vars.insert(p.name.clone(), pty);
            self.declared.insert(p.name.clone());
        }
        for s in &m.body {
            self.emit_stmt(s)?;
        }
        self.indent -= 1;
        self.write_line("}\n");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Free functions & main
    // -----------------------------------------------------------------

    fn emit_free_function(&mut self, f: &FuncDef) -> Result<()> {
        self.vars.clear();
        self.declared.clear();
        let params = f
            .params
            .iter()
            .map(|p| self.param_decl(p))
            .collect::<Vec<_>>()
            .join(", ");
        let ret = self.return_ctype(f);
        self.write_line(&format!(
            "static {} {}({params}) {{",
            ret.c_spelling(),
            f.name
        ));
        self.indent += 1;
        for p in &f.params {
            let pty = self.param_ctype(p);
            self.vars.insert(p.name.clone(), pty);
            self.declared.insert(p.name.clone());
        }
        for s in &f.body {
            self.emit_stmt(s)?;
        }
        self.indent -= 1;
        self.write_line("}\n");
        Ok(())
    }

    fn emit_main(&mut self, body: &[Stmt]) -> Result<()> {
        self.vars.clear();
        self.declared.clear();
        self.write_line("int main(void) {");
        self.indent += 1;
        for s in body {
            self.emit_stmt(s)?;
        }
        self.write_line("return 0;");
        self.indent -= 1;
        self.write_line("}\n");
        Ok(())
    }

    fn param_decl(&self, p: &Param) -> String {
        format!("{} {}", self.param_ctype(p).c_spelling(), p.name)
    }

    fn param_ctype(&self, p: &Param) -> CType {
        p.ty
            .as_ref()
            .map(|t| CType::from_sem(&Type::from_type_expr(t)))
            .unwrap_or(CType::Int)
    }

    fn return_ctype(&self, f: &FuncDef) -> CType {
        f.return_type
            .as_ref()
            .map(|t| CType::from_sem(&Type::from_type_expr(t)))
            .unwrap_or(CType::Void)
    }

    // -----------------------------------------------------------------
    // Modules
    // -----------------------------------------------------------------

    fn emit_import(&mut self, imp: &Import) -> Result<()> {
        match imp {
            Import::Selective { name, symbols } => {
                self.write_line(&format!("typedef struct {name}_Module {{"));
                self.indent += 1;
                for (sym, _) in symbols {
                    self.write_line(&format!("void (*{sym})(void);"));
                }
                self.indent -= 1;
                self.write_line(&format!("}} {name}_Module;\n"));
                for (sym, alias) in symbols {
                    self.write_line(&format!("extern void {name}_{sym}(void);"));
                    let alias_name = alias.clone().unwrap_or_else(|| sym.clone());
                    self.write_line(&format!("#define {alias_name} {name}_{sym}"));
                }
                self.out.push('\n');
                Ok(())
            }
            Import::Whole { name } => {
                self.module_aliases.insert(name.clone(), name.clone());
                self.emit_whole_import(name)
            }
            Import::Aliased { name, alias } => {
                self.module_aliases.insert(alias.clone(), name.clone());
                self.emit_whole_import(name)
            }
        }
    }

    /// Shared body of `import X` / `import X as Y`: the `<ModName>_Module`
    /// struct, the mangled `extern` declarations, and the constant struct
    /// instance (`spec.md` §4.5). `name` is always the module's real,
    /// declared name — never the local alias it may be referred to by in
    /// this file — since every mangled symbol is `<ModName>_<symbol>`
    /// regardless of how the importer spells the module locally.
    fn emit_whole_import(&mut self, name: &str) -> Result<()> {
        let exports = self
            .imports
            .get(name)
            .ok_or_else(|| CodeGenError::UnresolvedName(name.to_string()))?
            .clone();
        self.write_line(&format!("typedef struct {name}_Module {{"));
        self.indent += 1;
        for sym in &exports {
            self.write_line(&format!("void (*{sym})(void);"));
        }
        self.indent -= 1;
        self.write_line(&format!("}} {name}_Module;\n"));
        for sym in &exports {
            self.write_line(&format!("extern void {name}_{sym}(void);"));
        }
        self.write_line(&format!("static const {name}_Module {name} = {{"));
        self.indent += 1;
        for sym in &exports {
            self.write_line(&format!(".{sym} = {name}_{sym},"));
        }
        self.indent -= 1;
        self.write_line("};\n");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn emit_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(b) => {
                self.write_line("{");
                self.indent += 1;
                for s in b {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_str = self.emit_expr(cond)?;
                self.write_line(&format!("if ({cond_str}) {{"));
                self.indent += 1;
                for s in then_branch {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                if let Some(else_b) = else_branch {
                    self.write_line("} else {");
                    self.indent += 1;
                    for s in else_b {
                        self.emit_stmt(s)?;
                    }
                    self.indent -= 1;
                }
                self.write_line("}");
            }
            Stmt::While { cond, body } => {
                let cond_str = self.emit_expr(cond)?;
                self.write_line(&format!("while ({cond_str}) {{"));
                self.indent += 1;
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            Stmt::DoWhile { body, cond } => {
                self.write_line("do {");
                self.indent += 1;
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                let cond_str = self.emit_expr(cond)?;
                self.write_line(&format!("}} while ({cond_str});"));
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start_str = self.emit_expr(start)?;
                let end_str = self.emit_expr(end)?;
                let step_str = match step {
                    Some(e) => self.emit_expr(e)?,
                    None => "1".to_string(),
                };
                self.vars.insert(var.clone(), CType::Int);
                self.declared.insert(var.clone());
                self.write_line(&format!(
                    "for (int {var} = {start_str}; {var} < {end_str}; {var} += {step_str}) {{"
                ));
                self.indent += 1;
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            Stmt::ForCollection { var, iter, body } => {
                let iter_str = self.emit_expr(iter)?;
                let elem_ty = match infer_expr(iter, &self.infer_ctx()) {
                    CType::Object(name) if name != "void" => CType::Object(name),
                    _ => CType::Int,
                };
                self.vars.insert(var.clone(), elem_ty.clone());
                self.declared.insert(var.clone());
                let idx = format!("__i_{}", self.print_tmp_counter);
                self.print_tmp_counter += 1;
                self.write_line(&format!(
                    "for (size_t {idx} = 0; {idx} < sizeof({iter_str}) / sizeof({iter_str}[0]); {idx}++) {{"
                ));
                self.indent += 1;
                self.write_line(&format!(
                    "{} {var} = {iter_str}[{idx}];",
                    elem_ty.c_spelling()
                ));
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            Stmt::ForTraditional {
                init,
                cond,
                step,
                body,
            } => {
                let init_str = match init {
                    Some(s) => self.emit_expr_stmt_inline(s.as_ref())?,
                    None => String::new(),
                };
                let cond_str = match cond {
                    Some(e) => self.emit_expr(e)?,
                    None => String::new(),
                };
                let step_str = match step {
                    Some(s) => self.emit_expr_stmt_inline(s.as_ref())?,
                    None => String::new(),
                };
                self.write_line(&format!("for ({init_str}; {cond_str}; {step_str}) {{"));
                self.indent += 1;
                for s in body {
                    self.emit_stmt(s)?;
                }
                self.indent -= 1;
                self.write_line("}");
            }
            Stmt::Switch {
                subject,
                cases,
                default,
            } => self.emit_switch(subject, cases, default)?,
            Stmt::Return(e) => match e {
                Some(e) => {
                    let s = self.emit_expr(e)?;
                    self.write_line(&format!("return {s};"));
                }
                None => self.write_line("return;"),
            },
            Stmt::VarDecl(v) => self.emit_var_decl(v)?,
            Stmt::VarAssign {
                target,
                compound_op,
                value,
            } => self.emit_var_assign(target, *compound_op, value)?,
            Stmt::Print(e) => self.emit_print(e)?,
            Stmt::Break => self.write_line("break;"),
            Stmt::Continue => self.write_line("continue;"),
            Stmt::Try {
                body,
                catches,
                finally,
            } => self.emit_try(body, catches, finally)?,
            Stmt::Throw(e) => self.emit_throw(e)?,
            Stmt::Match { subject, arms } => self.emit_match(subject, arms)?,
            Stmt::Expr(e) => {
                let s = self.emit_expr(e)?;
                self.write_line(&format!("{s};"));
            }
        }
        Ok(())
    }

    fn emit_expr_stmt_inline(&mut self, stmt: &Stmt) -> Result<String> {
        match stmt {
            Stmt::VarAssign {
                target,
                compound_op,
                value,
            } => {
                let t = self.emit_expr(target)?;
                let v = self.emit_expr(value)?;
                Ok(match compound_op {
                    Some(op) => format!("{t} {} {v}", compound_c_op(*op)),
                    None => {
                        if let Expr::Ident(name) = target {
                            if !self.declared.contains(name) {
                                let ty = infer_expr(value, &self.infer_ctx());
                                self.vars.insert(name.clone(), ty);
                                self.declared.insert(name.clone());
                            }
                        }
                        format!("{t} = {v}")
                    }
                })
            }
            Stmt::Expr(e) => self.emit_expr(e),
            other => Err(CodeGenError::Unsupported(format!(
                "statement shape not valid inside a for-loop's init/step clause: {other:?}"
            ))),
        }
    }

    fn emit_var_decl(&mut self, v: &orionc_par::VarDecl) -> Result<()> {
        let ty = v
            .ty
            .as_ref()
            .map(|t| CType::from_sem(&Type::from_type_expr(t)))
            .or_else(|| v.init.as_ref().map(|e| infer_expr(e, &self.infer_ctx())))
            .unwrap_or(CType::Int);
        self.vars.insert(v.name.clone(), ty.clone());
        let already_declared = self.declared.contains(&v.name);
        self.declared.insert(v.name.clone());
        let init_str = match &v.init {
            Some(e) => Some(self.emit_expr(e)?),
            None => None,
        };
        if already_declared {
            if let Some(init_str) = init_str {
                self.write_line(&format!("{} = {init_str};", v.name));
            }
        } else {
            match init_str {
                Some(init_str) => {
                    self.write_line(&format!("{} {} = {init_str};", ty.c_spelling(), v.name))
                }
                None => self.write_line(&format!("{} {};", ty.c_spelling(), v.name)),
            }
        }
        Ok(())
    }

    fn emit_var_assign(&mut self, target: &Expr, compound_op: Option<char>, value: &Expr) -> Result<()> {
        let value_str = self.emit_expr(value)?;
        if compound_op.is_none() {
            if let Expr::Ident(name) = target {
                if !self.declared.contains(name) {
                    let ty = infer_expr(value, &self.infer_ctx());
                    self.vars.insert(name.clone(), ty.clone());
                    self.declared.insert(name.clone());
                    self.write_line(&format!("{} {name} = {value_str};", ty.c_spelling()));
                    return Ok(());
                }
            }
        }
        let target_str = self.emit_expr(target)?;
        match compound_op {
            Some(op) => self.write_line(&format!(
                "{target_str} {} {value_str};",
                compound_c_op(op)
            )),
            None => self.write_line(&format!("{target_str} = {value_str};")),
        }
        Ok(())
    }

    fn emit_print(&mut self, e: &Expr) -> Result<()> {
        let ty = infer_expr(e, &self.infer_ctx());
        let expr_str = self.emit_expr(e)?;
        let spec = ty.printf_spec();
        if is_trivial_print_operand(e) {
            self.write_line(&format!("printf(\"{spec}\\n\", {expr_str});"));
        } else {
            let tmp = format!("__print_tmp_{}", self.print_tmp_counter);
            self.print_tmp_counter += 1;
            self.write_line(&format!("{} {tmp} = {expr_str};", ty.c_spelling()));
            self.write_line(&format!("printf(\"{spec}\\n\", {tmp});"));
        }
        Ok(())
    }

    fn emit_switch(
        &mut self,
        subject: &Expr,
        cases: &[Case],
        default: &Option<Vec<Stmt>>,
    ) -> Result<()> {
        let subject_str = self.emit_expr(subject)?;
        self.write_line(&format!("switch ({subject_str}) {{"));
        self.indent += 1;
        for case in cases {
            for value in &case.values {
                let value_str = self.emit_expr(value)?;
                self.write_line(&format!("case {value_str}:"));
            }
            self.indent += 1;
            for s in &case.body {
                self.emit_stmt(s)?;
            }
            if !matches!(case.body.last(), Some(Stmt::Break) | Some(Stmt::Return(_))) {
                self.write_line("break;");
            }
            self.indent -= 1;
        }
        if let Some(default) = default {
            self.write_line("default:");
            self.indent += 1;
            for s in default {
                self.emit_stmt(s)?;
            }
            if !matches!(default.last(), Some(Stmt::Break) | Some(Stmt::Return(_))) {
                self.write_line("break;");
            }
            self.indent -= 1;
        }
        self.indent -= 1;
        self.write_line("}");
        Ok(())
    }

    fn emit_match(&mut self, subject: &Expr, arms: &[MatchArm]) -> Result<()> {
        let subject_str = self.emit_expr(subject)?;
        let tmp = format!("__match_subject_{}", self.print_tmp_counter);
        self.print_tmp_counter += 1;
        let subject_ty = infer_expr(subject, &self.infer_ctx());
        self.write_line(&format!(
            "{} {tmp} = {subject_str};",
            subject_ty.c_spelling()
        ));
        let mut first = true;
        for arm in arms {
            let (mut cond, bind) = match &arm.pattern {
                Pattern::Literal(lit) => (format!("{tmp} == {}", literal_c(lit)), None),
                Pattern::Ident(name) => ("1".to_string(), Some(name.clone())),
                Pattern::Otherwise => ("1".to_string(), None),
            };
            if let Some(name) = &bind {
                self.vars.insert(name.clone(), subject_ty.clone());
                self.declared.insert(name.clone());
            }
            if let Some(guard) = &arm.guard {
                let guard_str = self.emit_expr(guard)?;
                cond = format!("({cond}) && ({guard_str})");
            }
            let keyword = if first { "if" } else { "else if" };
            first = false;
            self.write_line(&format!("{keyword} ({cond}) {{"));
            self.indent += 1;
            if let Some(name) = &bind {
                self.write_line(&format!("{} {name} = {tmp};", subject_ty.c_spelling()));
            }
            let body_str = self.emit_expr(&arm.body)?;
            self.write_line(&format!("{body_str};"));
            self.indent -= 1;
            self.write_line("}");
        }
        Ok(())
    }

    fn emit_try(
        &mut self,
        body: &[Stmt],
        catches: &[Catch],
        finally: &Option<Vec<Stmt>>,
    ) -> Result<()> {
        self.stats.try_blocks_lowered += 1;
        self.write_line("{");
        self.indent += 1;
        self.write_line("int __d = __try_depth++;");
        self.write_line("if (setjmp(__try_stack[__d]) == 0) {");
        self.indent += 1;
        for s in body {
            self.emit_stmt(s)?;
        }
        self.write_line("__try_depth--;");
        self.indent -= 1;
        self.write_line("} else {");
        self.indent += 1;
        self.write_line("__try_depth--;");
        self.write_line("{");
        self.indent += 1;
        self.write_line("const char* __colon = strchr(_error_message, ':');");
        self.write_line(
            "size_t __len = __colon ? (size_t)(__colon - _error_message) : strlen(_error_message);",
        );
        self.write_line("if (__len >= sizeof(_error_type)) __len = sizeof(_error_type) - 1;");
        self.write_line("memcpy(_error_type, _error_message, __len);");
        self.write_line("_error_type[__len] = '\\0';");
        self.indent -= 1;
        self.write_line("}");
        let mut first = true;
        for catch in catches {
            let cond = match &catch.error_type {
                Some(ty) => format!("strcmp(_error_type, \"{ty}\") == 0"),
                None => "1".to_string(),
            };
            let keyword = if first { "if" } else { "else if" };
            first = false;
            self.write_line(&format!("{keyword} ({cond}) {{"));
            self.indent += 1;
            self.vars.insert(catch.binding.clone(), CType::Str);
            self.declared.insert(catch.binding.clone());
            self.write_line(&format!("const char* {} = _error_message;", catch.binding));
            for s in &catch.body {
                self.emit_stmt(s)?;
            }
            self.indent -= 1;
            self.write_line("}");
        }
        self.indent -= 1;
        self.write_line("}");
        if let Some(finally) = finally {
            for s in finally {
                self.emit_stmt(s)?;
            }
        }
        self.write_line("finally_executed = 1;");
        self.indent -= 1;
        self.write_line("}");
        Ok(())
    }

    fn emit_throw(&mut self, e: &Expr) -> Result<()> {
        let s = self.stringify_for_throw(e)?;
        self.write_line(&format!(
            "strncpy(_error_message, {s}, sizeof(_error_message) - 1);"
        ));
        self.write_line("_error_message[sizeof(_error_message) - 1] = '\\0';");
        self.write_line("longjmp(__try_stack[__try_depth - 1], 1);");
        Ok(())
    }

    fn stringify_for_throw(&mut self, e: &Expr) -> Result<String> {
        let ty = infer_expr(e, &self.infer_ctx());
        let s = self.emit_expr(e)?;
        Ok(match ty {
            CType::Str => s,
            CType::Bool => format!("(({s}) ? \"true\" : \"false\")"),
            _ => format!("to_string({s})"),
        })
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn emit_expr(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::NumberLit(n, is_float) => Ok(format_number(*n, *is_float)),
            Expr::StringLit(s) => Ok(format!("{:?}", s)),
            Expr::BoolLit(b) => Ok(if *b { "true".to_string() } else { "false".to_string() }),
            Expr::NullLit => Ok("NULL".to_string()),
            Expr::Ident(name) => Ok(name.clone()),
            Expr::This => Ok("self".to_string()),
            Expr::BinOp { op, lhs, rhs } => self.emit_binop(*op, lhs, rhs),
            Expr::UnOp { op, operand } => {
                let s = self.emit_expr(operand)?;
                Ok(match op {
                    UnOp::Neg => format!("(-({s}))"),
                    UnOp::Not => format!("(!({s}))"),
                })
            }
            Expr::Member { object, field } => {
                let obj = self.emit_expr(object)?;
                Ok(format!("{obj}->{field}"))
            }
            Expr::Index { object, index } => {
                let obj = self.emit_expr(object)?;
                let idx = self.emit_expr(index)?;
                Ok(format!("{obj}[{idx}]"))
            }
            Expr::ArrayLit(items) => {
                let parts = items
                    .iter()
                    .map(|e| self.emit_expr(e))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("{{{}}}", parts.join(", ")))
            }
            Expr::New { class_name, args } => self.emit_new(class_name, args),
            Expr::Call { callee, args } => self.emit_call(callee, args),
            Expr::Lambda {
                params,
                return_type,
                body,
            } => {
                let name = self.ensure_lambda(params, return_type, body)?;
                Ok(name)
            }
            Expr::Compose { lhs, rhs } => {
                let name = self.ensure_compose(lhs, rhs)?;
                Ok(name)
            }
        }
    }

    fn emit_binop(&mut self, op: char, lhs: &Expr, rhs: &Expr) -> Result<String> {
        let lhs_ty = infer_expr(lhs, &self.infer_ctx());
        let rhs_ty = infer_expr(rhs, &self.infer_ctx());
        let lhs_str = self.emit_expr(lhs)?;
        let rhs_str = self.emit_expr(rhs)?;
        if op == OP_ADD && (lhs_ty == CType::Str || rhs_ty == CType::Str) {
            let l = if lhs_ty == CType::Str {
                lhs_str
            } else {
                format!("to_string({lhs_str})")
            };
            let r = if rhs_ty == CType::Str {
                rhs_str
            } else {
                format!("to_string({rhs_str})")
            };
            return Ok(format!("concat_any({l}, {r})"));
        }
        let c_op = match op {
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '<' => "<",
            '>' => ">",
            'E' => "==",
            'N' => "!=",
            'G' => ">=",
            'L' => "<=",
            'A' => "&&",
            'O' => "||",
            other => return Err(CodeGenError::Unsupported(format!("binary operator '{other}'"))),
        };
        Ok(format!("({lhs_str} {c_op} {rhs_str})"))
    }

    fn emit_new(&mut self, class_name: &str, args: &[Expr]) -> Result<String> {
        let args_str = args
            .iter()
            .map(|e| self.emit_expr(e))
            .collect::<Result<Vec<_>>>()?;
        match self.ensure_construct_wrapper(class_name)? {
            Some(wrapper) => Ok(format!("{wrapper}({})", args_str.join(", "))),
            None => Ok(format!("new_{class_name}()")),
        }
    }

    fn emit_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<String> {
        if let Expr::Member { object, field } = callee {
            if let Expr::Ident(local_name) = object.as_ref() {
                if let Some(module_name) = self.module_aliases.get(local_name).cloned() {
                    return self.emit_module_call(&module_name, field, args);
                }
            }
            return self.emit_method_call(object, field, args);
        }
        let callee_str = self.emit_expr(callee)?;
        let args_str = args
            .iter()
            .map(|e| self.emit_expr(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{callee_str}({})", args_str.join(", ")))
    }

    /// Lowers a qualified call `mod.f(args)` (where `mod` names an imported
    /// module, directly or through its local alias) straight to the
    /// mangled free function `<ModName>_f(args)`, per `spec.md` §4.5 —
    /// there is no receiver argument and no struct-field dispatch, unlike a
    /// method call on a class instance.
    fn emit_module_call(&mut self, module_name: &str, field: &str, args: &[Expr]) -> Result<String> {
        let args_str = args
            .iter()
            .map(|e| self.emit_expr(e))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("{module_name}_{field}({})", args_str.join(", ")))
    }

    fn emit_method_call(&mut self, object: &Expr, field: &str, args: &[Expr]) -> Result<String> {
        let obj_str = self.emit_expr(object)?;
        let args_str = args
            .iter()
            .map(|e| self.emit_expr(e))
            .collect::<Result<Vec<_>>>()?;
        let class_name = match infer_expr(object, &self.infer_ctx()) {
            CType::Object(name) if self.classes.get(&name).is_some() => name,
            other => {
                return Err(CodeGenError::Unsupported(format!(
                    "method call on a receiver that isn't a known class (inferred {other:?})"
                )))
            }
        };
        let mut call_args = vec![obj_str];
        call_args.extend(args_str);
        if self.classes.has_subclasses(&class_name) {
            let dispatcher = self.ensure_dispatcher(&class_name, field)?;
            Ok(format!("{dispatcher}({})", call_args.join(", ")))
        } else {
            Ok(format!("{class_name}_{field}({})", call_args.join(", ")))
        }
    }

    fn infer_ctx(&self) -> InferCtx {
        InferCtx {
            vars: &self.vars,
            classes: self.classes,
            functions: self.functions,
        }
    }

    // -----------------------------------------------------------------
    // Hoisted helpers: lambdas, composition wrappers, dispatchers,
    // construct-and-init wrappers.
    // -----------------------------------------------------------------

    fn ensure_lambda(
        &mut self,
        params: &[Param],
        return_type: &Option<TypeExpr>,
        body: &LambdaBody,
    ) -> Result<String> {
        self.stats.lambdas_hoisted += 1;
        let name = format!("__lambda_{}", self.lambda_counter);
        self.lambda_counter += 1;
        let ret = return_type
            .as_ref()
            .map(|t| CType::from_sem(&Type::from_type_expr(t)))
            .unwrap_or(CType::Int);
        let param_list = params
            .iter()
            .map(|p| self.param_decl(p))
            .collect::<Vec<_>>()
            .join(", ");

        let saved_out = std::mem::take(&mut self.out);
        let saved_vars = self.vars.clone();
        let saved_declared = self.declared.clone();
        self.vars.clear();
        self.declared.clear();
        for p in params {
            let pty = self.param_ctype(p);
            self.vars.insert(p.name.clone(), pty);
            self.declared.insert(p.name.clone());
        }

        self.write_line(&format!(
            "static {} {name}({param_list}) {{",
            ret.c_spelling()
        ));
        self.indent += 1;
        match body {
            LambdaBody::Expr(e) => {
                let s = self.emit_expr(e)?;
                self.write_line(&format!("return {s};"));
            }
            LambdaBody::Block(stmts) => {
                for s in stmts {
                    self.emit_stmt(s)?;
                }
            }
        }
        self.indent -= 1;
        self.write_line("}\n");

        let generated = std::mem::replace(&mut self.out, saved_out);
        self.hoisted.push_str(&generated);
        self.vars = saved_vars;
        self.declared = saved_declared;
        Ok(name)
    }

    fn ensure_compose(&mut self, lhs: &Expr, rhs: &Expr) -> Result<String> {
        self.stats.compositions_hoisted += 1;
        let name = format!("compose_{}", self.compose_counter);
        self.compose_counter += 1;
        let f = self.emit_expr(lhs)?;
        let g = self.emit_expr(rhs)?;
        let saved_out = std::mem::take(&mut self.out);
        self.write_line(&format!("static double {name}(double x) {{"));
        self.indent += 1;
        self.write_line(&format!("return {g}({f}(x));"));
        self.indent -= 1;
        self.write_line("}\n");
        let generated = std::mem::replace(&mut self.out, saved_out);
        self.hoisted.push_str(&generated);
        Ok(name)
    }

    fn ensure_dispatcher(&mut self, base_class: &str, method: &str) -> Result<String> {
        let key = (base_class.to_string(), method.to_string());
        let name = format!("{base_class}_{method}_dispatch");
        if self.dispatchers.contains(&key) {
            return Ok(name);
        }
        self.dispatchers.insert(key);

        let sig = self
            .classes
            .lookup_method(base_class, method)
            .cloned()
            .ok_or_else(|| CodeGenError::UnresolvedName(format!("{base_class}::{method}")))?;
        let ret = CType::from_sem(&sig.ret);
        let param_names: Vec<String> = (0..sig.params.len()).map(|i| format!("p{i}")).collect();
        let param_decls = param_names
            .iter()
            .zip(sig.params.iter())
            .map(|(name, ty)| format!("{} {name}", CType::from_sem(ty).c_spelling()))
            .collect::<Vec<_>>()
            .join(", ");
        let call_args = param_names.join(", ");

        let mut subclasses: Vec<String> = self
            .classes
            .names()
            .filter(|n| *n != base_class && self.classes.is_subclass(n, base_class))
            .map(|s| s.to_string())
            .collect();
        subclasses.sort();

        let saved_out = std::mem::take(&mut self.out);
        let self_param = if param_decls.is_empty() {
            format!("{base_class}* self")
        } else {
            format!("{base_class}* self, {param_decls}")
        };
        self.write_line(&format!(
            "static {} {name}({self_param}) {{",
            ret.c_spelling()
        ));
        self.indent += 1;
        self.write_line("switch (self->__type_tag) {");
        self.indent += 1;
        for sub in &subclasses {
            let owner = self.defining_class(sub, method).unwrap_or_else(|| sub.clone());
            self.write_line(&format!("case TAG_{sub}:"));
            self.indent += 1;
            let call = format!("{owner}_{method}(({owner}*)self, {call_args})");
            if ret == CType::Void {
                self.write_line(&format!("{call};"));
                self.write_line("break;");
            } else {
                self.write_line(&format!("return {call};"));
            }
            self.indent -= 1;
        }
        self.write_line("default:");
        self.indent += 1;
        let call = format!("{base_class}_{method}(self, {call_args})");
        if ret == CType::Void {
            self.write_line(&format!("{call};"));
            self.write_line("break;");
        } else {
            self.write_line(&format!("return {call};"));
        }
        self.indent -= 1;
        self.indent -= 1;
        self.write_line("}");
        self.indent -= 1;
        self.write_line("}\n");
        let generated = std::mem::replace(&mut self.out, saved_out);
        self.hoisted.push_str(&generated);
        Ok(name)
    }

    /// Walks `sub`'s `extends` chain (including `sub` itself) to find which
    /// ancestor actually defines `method` — the class whose emitted
    /// `Ancestor_method` the dispatcher for `sub`'s tag should call.
    fn defining_class(&self, sub: &str, method: &str) -> Option<String> {
        let mut cur = Some(sub.to_string());
        while let Some(name) = cur {
            let info = self.classes.get(&name)?;
            if info.methods.contains_key(method) {
                return Some(name);
            }
            cur = info.base.clone();
        }
        None
    }

    fn ensure_construct_wrapper(&mut self, class_name: &str) -> Result<Option<String>> {
        if self.classes.lookup_method(class_name, "init").is_none() {
            return Ok(None);
        }
        let name = format!("{class_name}_construct");
        if self.constructors_with_init.contains(class_name) {
            return Ok(Some(name));
        }
        self.constructors_with_init.insert(class_name.to_string());

        let sig = self
            .classes
            .lookup_method(class_name, "init")
            .cloned()
            .expect("checked above");
        let param_names: Vec<String> = (0..sig.params.len()).map(|i| format!("p{i}")).collect();
        let param_decls = param_names
            .iter()
            .zip(sig.params.iter())
            .map(|(name, ty)| format!("{} {name}", CType::from_sem(ty).c_spelling()))
            .collect::<Vec<_>>()
            .join(", ");
        let call_args = param_names.join(", ");

        let saved_out = std::mem::take(&mut self.out);
        self.write_line(&format!(
            "static {class_name}* {name}({param_decls}) {{"
        ));
        self.indent += 1;
        self.write_line(&format!("{class_name}* self = new_{class_name}();"));
        self.write_line(&format!("{class_name}_init(self, {call_args});"));
        self.write_line("return self;");
        self.indent -= 1;
        self.write_line("}\n");
        let generated = std::mem::replace(&mut self.out, saved_out);
        self.hoisted.push_str(&generated);
        Ok(Some(name))
    }

    // -----------------------------------------------------------------
    // Output plumbing
    // -----------------------------------------------------------------

    fn write_line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(line);
        self.out.push('\n');
    }
}

fn compound_c_op(op: char) -> &'static str {
    match op {
        '+' => "+=",
        '-' => "-=",
        '*' => "*=",
        '/' => "/=",
        _ => "=",
    }
}

fn format_number(n: f64, is_float: bool) -> String {
    if is_float {
        format!("{n}")
    } else {
        format!("{}", n as i64)
    }
}

fn literal_c(lit: &orionc_par::Literal) -> String {
    match lit {
        orionc_par::Literal::Number(n, is_float) => format_number(*n, *is_float),
        orionc_par::Literal::Str(s) => format!("{:?}", s),
        orionc_par::Literal::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        orionc_par::Literal::Null => "NULL".to_string(),
    }
}

/// A print operand is "trivial" (doesn't need a temporary, per `spec.md`
/// §4.5) when it's already a single value with no computation behind it.
fn is_trivial_print_operand(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Ident(_) | Expr::NumberLit(..) | Expr::StringLit(_) | Expr::BoolLit(_) | Expr::This
    )
}

fn program_uses_try(program: &Program) -> bool {
    program.items.iter().any(|item| match item {
        Item::FuncDef(f) => block_uses_try(&f.body),
        Item::ClassDef(c) => c.methods.iter().any(|m| block_uses_try(&m.body)),
        Item::Stmt(s) => stmt_uses_try(s),
        _ => false,
    })
}

fn block_uses_try(body: &[Stmt]) -> bool {
    body.iter().any(stmt_uses_try)
}

fn stmt_uses_try(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Try { .. } => true,
        Stmt::Block(b) => block_uses_try(b),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            block_uses_try(then_branch)
                || else_branch.as_ref().map(|b| block_uses_try(b)).unwrap_or(false)
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => block_uses_try(body),
        Stmt::ForRange { body, .. }
        | Stmt::ForCollection { body, .. }
        | Stmt::ForTraditional { body, .. } => block_uses_try(body),
        Stmt::Switch { cases, default, .. } => {
            cases.iter().any(|c| block_uses_try(&c.body))
                || default.as_ref().map(|b| block_uses_try(b)).unwrap_or(false)
        }
        _ => false,
    }
}
