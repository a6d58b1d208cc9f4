//! # campaign-rules
//!
//! A rule and effect resolution engine for tabletop campaign management.
//!
//! ## Design Principles
//!
//! 1. **Data-Driven Rules**: Conditions are JSON-logic-style expression
//!    trees; effects are RFC-6902-style patch payloads. Nothing about a
//!    particular campaign is hardcoded.
//!
//! 2. **Engine, Not Store**: Persistence, scheduling, and the outer API
//!    belong to the caller. The engine is handed loaded records and
//!    returns values.
//!
//! 3. **Failures Are Data**: Inside a resolution run, an effect that
//!    cannot apply is tallied and reported; it never aborts the run or
//!    corrupts state.
//!
//! ## Architecture
//!
//! - **Persistent State**: Entity variable state is an `im-rs` map, so
//!   snapshots and atomic patch application are O(1) clones.
//!
//! - **Traced Evaluation**: Every expression evaluation produces a
//!   step-by-step trace for rule debugging.
//!
//! - **Arena Graph**: The dependency graph is a flat index arena with
//!   exact cycle membership via strongly-connected components.
//!
//! ## Modules
//!
//! - `core`: Entities, conditions, effects, variable state, records
//! - `expr`: Expression parsing, evaluation, dependency extraction
//! - `patch`: Patch validation, atomic application, state diffs
//! - `graph`: Dependency graph construction and traversal
//! - `pipeline`: PRE / ON_RESOLVE / POST effect resolution
//! - `engine`: The facade tying rules, state, and records together

pub mod core;
pub mod engine;
pub mod error;
pub mod expr;
pub mod graph;
pub mod patch;
pub mod pipeline;

// Re-export commonly used types
pub use crate::core::{
    BranchId, CampaignId, Condition, ConditionId, Effect, EffectId, EffectTiming, EncounterId,
    EncounterRecord, EntityRef, EntityType, EventId, EventRecord, VariableState,
};

pub use crate::engine::{ConditionEvaluation, RulesEngine};

pub use crate::error::{EngineError, ExpressionError, PatchError};

pub use crate::expr::{
    evaluate, extract_reads, extract_writes, is_truthy, ExecutionTrace, Expression, TraceStep,
};

pub use crate::graph::{
    DependencyEdge, DependencyGraph, DependencyNode, EdgeKind, GraphStats, GraphView, Neighborhood,
    NodeKind,
};

pub use crate::patch::{apply, validate, PatchOp, PatchOpKind, PatchValidation, StateDiff};

pub use crate::pipeline::{
    EffectExecutionSummary, EffectFailure, PhaseStatus, ResolutionPipeline, ResolutionResult,
};
