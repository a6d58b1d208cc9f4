//! Dependency graph over conditions, effects, variables, and entities.
//!
//! - `build`: arena construction from rule records (and precomputed parts)
//! - `traverse`: cycle flagging and upstream/downstream queries

pub mod build;
pub mod traverse;

pub use build::{
    condition_node_id, effect_node_id, entity_node_id, variable_node_id, DependencyEdge,
    DependencyGraph, DependencyNode, EdgeKind, GraphStats, GraphView, NodeKind,
};
pub use traverse::Neighborhood;
