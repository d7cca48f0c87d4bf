//! Code generator: lowers a type-checked, rewritten [`orionc_par::Program`]
//! to portable C (`spec.md` §4.5).
//!
//! The emitter does not consult `orionc-sem`'s diagnostics directly — by
//! the time a program reaches this crate the driver has already confirmed
//! the error count is zero. A [`CodeGenError`] here means an AST shape with
//! no lowering rule reached the generator, or an I/O fault on the final
//! write; either aborts the whole run rather than producing a partial file.

pub mod emitter;
pub mod error;
pub mod stats;
pub mod types;

pub use emitter::{emit, emit_to_string};
pub use error::{CodeGenError, Result};
pub use stats::CodeGenStats;
pub use types::CType;

#[cfg(test)]
mod tests {
    use orionc_par::parse;
    use orionc_sem::analyze;
    use orionc_util::{FxHashMap, Handler};

    use super::*;

    fn generate(source: &str) -> (String, CodeGenStats) {
        generate_with_imports(source, &FxHashMap::default())
    }

    fn generate_with_imports(
        source: &str,
        imports: &FxHashMap<String, Vec<String>>,
    ) -> (String, CodeGenStats) {
        let handler = Handler::new();
        let program = parse(source, &handler);
        let sem = analyze(&program, &handler);
        assert_eq!(handler.error_count(), 0, "source failed to analyze");
        emit_to_string(&program, &sem, imports).expect("emission should succeed")
    }

    #[test]
    fn emits_a_free_function_and_main() {
        let (src, stats) = generate("func add(a: int, b: int) -> int { return a + b; } main { print add(1, 2); }");
        assert!(src.contains("static int add(int a, int b)"));
        assert!(src.contains("int main(void)"));
        assert_eq!(stats.functions_emitted, 1);
    }

    #[test]
    fn emits_a_class_with_a_constructor_and_method() {
        let (src, stats) = generate(
            "class Counter { count: int; func bump() -> int { return self.count + 1; } } main { c = new Counter(); }",
        );
        assert!(src.contains("struct Counter {"));
        assert!(src.contains("static Counter* new_Counter(void)"));
        assert!(src.contains("static int Counter_bump(Counter* self)"));
        assert_eq!(stats.classes_emitted, 1);
    }

    #[test]
    fn dispatches_a_polymorphic_method_call_by_type_tag() {
        let (src, _) = generate(
            "class Shape { func area() -> int { return 0; } } \
             class Circle extends Shape { func area() -> int { return 1; } } \
             main { s = new Shape(); print s.area(); }",
        );
        assert!(src.contains("Shape_area_dispatch"));
        assert!(src.contains("case TAG_Circle:"));
    }

    #[test]
    fn hoists_a_lambda_to_a_static_function() {
        let (src, stats) = generate("main { f = (x: int) -> int => x + 1; print f(2); }");
        assert!(src.contains("static int __lambda_0(int x)"));
        assert_eq!(stats.lambdas_hoisted, 1);
    }

    #[test]
    fn lowers_try_catch_to_setjmp_longjmp() {
        let (src, stats) = generate(
            "main { try { throw \"boom\"; } catch (e) { print e; } }",
        );
        assert!(src.contains("setjmp(__try_stack[__d])"));
        assert!(src.contains("longjmp(__try_stack[__try_depth - 1], 1);"));
        assert_eq!(stats.try_blocks_lowered, 1);
    }

    #[test]
    fn lowers_an_aliased_module_call_to_the_mangled_function_directly() {
        let mut imports = FxHashMap::default();
        imports.insert("math_lib".to_string(), vec!["multiply".to_string()]);
        let (src, stats) = generate_with_imports(
            "import math_lib as m\nmain { print m.multiply(4, 5); }",
            &imports,
        );
        assert!(src.contains("extern void math_lib_multiply(void);"));
        assert!(src.contains("math_lib_multiply(4, 5)"));
        // A module call is not a method call: no dispatcher or receiver
        // argument should ever appear for it.
        assert!(!src.contains("m_multiply"));
        assert_eq!(stats.modules_lowered, 1);
    }

    #[test]
    fn lowers_an_unaliased_module_call_the_same_way() {
        let mut imports = FxHashMap::default();
        imports.insert("math_lib".to_string(), vec!["multiply".to_string()]);
        let (src, _) = generate_with_imports(
            "import math_lib\nmain { print math_lib.multiply(4, 5); }",
            &imports,
        );
        assert!(src.contains("math_lib_multiply(4, 5)"));
    }
}
