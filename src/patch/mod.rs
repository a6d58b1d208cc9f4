//! The patch engine: structured mutation of entity variable state.
//!
//! - `op`: the RFC-6902-style op model and two-tier validation
//! - `pointer`: RFC-6901 pointer parsing and resolution
//! - `apply`: in-order atomic application with a structural diff

pub mod apply;
pub mod op;
pub(crate) mod pointer;

pub use apply::{apply, StateDiff, ValueChange};
pub use op::{validate, PatchOp, PatchOpKind, PatchValidation};
