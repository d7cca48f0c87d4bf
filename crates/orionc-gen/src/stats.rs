//! Cumulative statistics record the emitter carries through one `emit` run
//! (`spec.md` §4.5, "State machine for the emitter"), surfaced by
//! `orionc-drv` under `-d 2`+ alongside `orionc_rewrite::RewriteStats`.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeGenStats {
    pub classes_emitted: u32,
    pub functions_emitted: u32,
    pub lambdas_hoisted: u32,
    pub compositions_hoisted: u32,
    pub modules_lowered: u32,
    pub try_blocks_lowered: u32,
}

impl std::fmt::Display for CodeGenStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "classes={} functions={} lambdas={} compositions={} modules={} try_blocks={}",
            self.classes_emitted,
            self.functions_emitted,
            self.lambdas_hoisted,
            self.compositions_hoisted,
            self.modules_lowered,
            self.try_blocks_lowered,
        )
    }
}
