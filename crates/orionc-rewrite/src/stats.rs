//! Per-pass rewrite statistics, surfaced by `orionc-drv` under `-d 2`+.
//!
//! Mirrors the donor's `faxc-mir::optimize` statistics record: every pass
//! increments its own counter rather than sharing one aggregate, so the
//! driver can report which passes actually did something on a given file.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub macro_expansions: u32,
    pub template_instantiations: u32,
    pub aspects_woven: u32,
    pub constant_folds: u32,
    pub dead_code_eliminations: u32,
    pub redundant_assignments_removed: u32,
    pub constant_propagations: u32,
    pub common_subexprs_eliminated: u32,
    pub scopes_narrowed: u32,
}

impl std::fmt::Display for RewriteStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "macros={} templates={} aspects={} fold={} dce={} redundant_assign={} const_prop={} cse={} scope_narrow={}",
            self.macro_expansions,
            self.template_instantiations,
            self.aspects_woven,
            self.constant_folds,
            self.dead_code_eliminations,
            self.redundant_assignments_removed,
            self.constant_propagations,
            self.common_subexprs_eliminated,
            self.scopes_narrowed,
        )
    }
}
