//! Read/write dependency extraction.
//!
//! Dependency tracking operates at *base variable* granularity: a reference
//! to `"settlement.population"` reads the variable `settlement`. Writes are
//! tracked at the same granularity, taken from the first path segment after
//! `/variables/` in an effect's patch payload. The graph builder consumes
//! both sets.

use rustc_hash::FxHashSet;

use crate::core::Effect;
use crate::patch::{pointer, PatchOpKind};

use super::ast::Expression;

/// The set of base variable names an expression reads.
///
/// Expressions with no `var` node yield the empty set; duplicate references
/// collapse; an empty `var` path contributes nothing.
#[must_use]
pub fn extract_reads(expr: &Expression) -> FxHashSet<String> {
    let mut reads = FxHashSet::default();
    collect_reads(expr, &mut reads);
    reads
}

/// De-duplicated union of [`extract_reads`] across several expressions.
#[must_use]
pub fn extract_reads_many<'a>(
    exprs: impl IntoIterator<Item = &'a Expression>,
) -> FxHashSet<String> {
    let mut reads = FxHashSet::default();
    for expr in exprs {
        collect_reads(expr, &mut reads);
    }
    reads
}

/// Check whether an expression reads a given base variable.
#[must_use]
pub fn reads_variable(expr: &Expression, name: &str) -> bool {
    extract_reads(expr).contains(name)
}

fn collect_reads(expr: &Expression, reads: &mut FxHashSet<String>) {
    match expr {
        Expression::Literal(_) => {}
        Expression::Var { path, .. } => {
            if let Some(base) = base_segment(path) {
                reads.insert(base.to_string());
            }
        }
        Expression::Op { args, .. } => {
            for arg in args {
                collect_reads(arg, reads);
            }
        }
    }
}

/// The root segment of a dotted path, if any.
fn base_segment(path: &str) -> Option<&str> {
    path.split('.').next().filter(|s| !s.is_empty())
}

/// The set of base variable names an effect's patch payload writes.
///
/// Each op whose `path` is rooted at `/variables/` contributes the first
/// segment after that prefix (JSON-Pointer unescaped). A `move` op also
/// contributes a `/variables/`-rooted `from` - moving away from a variable
/// mutates it. A `copy` only reads its `from`, so it contributes nothing
/// there. Ops targeting paths outside `/variables/` (non-tracked state) and
/// ops with unparseable pointers contribute nothing; the latter surface
/// through patch validation instead.
#[must_use]
pub fn extract_writes(effect: &Effect) -> FxHashSet<String> {
    let mut writes = FxHashSet::default();
    for op in &effect.payload {
        if let Some(name) = variable_target(&op.path) {
            writes.insert(name);
        }
        if op.kind() == Some(PatchOpKind::Move) {
            if let Some(name) = op.from.as_deref().and_then(variable_target) {
                writes.insert(name);
            }
        }
    }
    writes
}

fn variable_target(path: &str) -> Option<String> {
    let tokens = pointer::parse(path).ok()?;
    match tokens.as_slice() {
        [root, name, ..] if root.as_str() == "variables" => Some(name.clone()),
        _ => None,
    }
}
