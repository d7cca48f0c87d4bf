//! Error type for the C emitter.
//!
//! The emitter is not recoverable (`spec.md` §4.5, "Failure semantics"): any
//! one of these faults aborts emission outright rather than producing a
//! partial C file, so there is no variant here carrying a "continue anyway"
//! payload the way `orionc-sem`'s diagnostics do.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodeGenError {
    /// The output path couldn't be created or written to.
    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An identifier exceeded the emitter's length budget once mangled
    /// (e.g. `<ModName>_<symbol>` for a module with a very long name).
    #[error("identifier '{0}' is too long once mangled for emission")]
    OversizeIdentifier(String),

    /// An AST shape with no lowering rule reached the emitter — typically a
    /// construct the type checker should have rejected first (a closure
    /// capturing an outer variable) or a future-syntax node.
    #[error("unsupported construct in code generation: {0}")]
    Unsupported(String),

    /// A name the emitter needs to resolve (a class, a method, an imported
    /// module) wasn't found in the semantic-analysis output it was handed.
    #[error("code generation could not resolve '{0}'")]
    UnresolvedName(String),
}

pub type Result<T> = std::result::Result<T, CodeGenError>;
