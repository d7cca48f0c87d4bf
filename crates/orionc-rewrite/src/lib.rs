//! orionc-rewrite - AST-to-AST rewriters run before code generation.
//!
//! `spec.md` §4.6 specifies macro expansion, template instantiation, aspect
//! weaving, and the optimizer at the interface level only ("AST-to-AST
//! rewriters plugged before code generation"). `SPEC_FULL.md` §5 supplies
//! the concrete algorithms; this crate implements them directly over
//! `orionc_par::Program`, in the donor's optimizer-pass shape
//! (`faxc-mir::optimize` runs a fixed, ordered pass list over an IR and
//! records a per-pass statistics counter) reused here over the AST since
//! this compiler has no separate mid-level IR.
//!
//! Rewriter order is fixed, per `spec.md` §4.6: macros, then templates,
//! then aspects, then the optimizer.

pub mod aspects;
pub mod macros;
pub mod optimize;
pub mod stats;
pub mod templates;

pub use aspects::{weave, AspectTable};
pub use macros::{expand_macros, MacroTable};
pub use optimize::optimize;
pub use stats::RewriteStats;
pub use templates::{instantiate_all, TemplateBody, TemplateDef, TemplateTable};

use orionc_par::Program;
use orionc_util::Handler;

/// Runs every configured rewriter over `program` in the fixed order
/// `spec.md` §4.6 mandates, returning the rewritten program and the
/// accumulated statistics record `orionc-drv` surfaces under `-d 2`+.
pub fn run_all(
    mut program: Program,
    macros: &MacroTable,
    templates: &TemplateTable,
    aspects: &AspectTable,
    opt_level: u8,
    handler: &Handler,
) -> (Program, RewriteStats) {
    let mut stats = RewriteStats::default();
    program = expand_macros(program, macros, handler, &mut stats);
    program = instantiate_all(program, templates, None, handler, &mut stats);
    program = weave(program, aspects, &mut stats);
    program = optimize(program, opt_level, &mut stats);
    (program, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orionc_util::Handler;

    #[test]
    fn empty_program_round_trips_through_every_rewriter() {
        let handler = Handler::new();
        let program = orionc_par::parse("main { a = 1; }", &handler);
        let (rewritten, stats) = run_all(
            program,
            &MacroTable::default(),
            &TemplateTable::default(),
            &AspectTable::default(),
            2,
            &handler,
        );
        assert_eq!(rewritten.items.len(), 1);
        assert_eq!(stats.macro_expansions, 0);
    }
}
