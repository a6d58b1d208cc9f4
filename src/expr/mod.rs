//! The restricted logic-expression language.
//!
//! - `ast`: the closed expression tree and its JSON wire format
//! - `eval`: evaluation with trace, coercion rules, short-circuiting
//! - `deps`: base-variable read/write dependency extraction

pub mod ast;
pub mod deps;
pub mod eval;

pub use ast::Expression;
pub use deps::{extract_reads, extract_reads_many, extract_writes, reads_variable};
pub use eval::{evaluate, is_truthy, ExecutionTrace, TraceStep};
