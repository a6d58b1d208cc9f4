//! Dependency graph construction.
//!
//! The graph is a computed, ephemeral view over a consistent snapshot of
//! Conditions and Effects - rebuilt on demand, never persisted. Nodes live
//! in a flat arena keyed by string id with index-based adjacency lists, so
//! cyclic graphs need no pointer juggling. Cycles are legal at the data
//! level; [`mark_cycles`](super::traverse) flags the participants.
//!
//! Malformed records degrade to warnings and are skipped; a bad effect
//! payload never aborts the build.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::core::{Condition, ConditionId, Effect, EffectId, EntityRef};
use crate::expr::{extract_reads, extract_writes};
use crate::patch;

/// Node kinds in the dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Variable,
    Condition,
    Effect,
    Entity,
}

/// Edge kinds in the dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    Reads,
    Writes,
    DependsOn,
}

/// A node in the dependency multigraph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub id: String,
    pub kind: NodeKind,
    pub entity_id: Option<Uuid>,
    pub label: String,
    /// Set when the node participates in at least one cycle.
    pub in_cycle: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A directed edge in the dependency multigraph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Node/edge counts plus cycle participation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub variables: usize,
    pub conditions: usize,
    pub effects: usize,
    pub entities: usize,
    pub edges: usize,
    pub cycle_participants: usize,
}

/// Serializable snapshot of a built graph, the shape the API layer ships
/// to the visualization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<DependencyNode>,
    pub edges: Vec<DependencyEdge>,
    pub stats: GraphStats,
    pub warnings: Vec<String>,
}

/// The dependency graph arena.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    pub(super) nodes: Vec<DependencyNode>,
    pub(super) edges: Vec<DependencyEdge>,
    /// Node id -> arena index.
    pub(super) index: FxHashMap<String, usize>,
    /// Edge endpoints as arena indices, parallel to `edges`.
    pub(super) endpoints: Vec<(usize, usize)>,
    /// Outgoing/incoming edge indices per node.
    pub(super) outgoing: Vec<Vec<usize>>,
    pub(super) incoming: Vec<Vec<usize>>,
    stats: GraphStats,
    warnings: Vec<String>,
}

/// Stable node id for a base variable.
#[must_use]
pub fn variable_node_id(name: &str) -> String {
    format!("variable:{name}")
}

/// Stable node id for a condition.
#[must_use]
pub fn condition_node_id(id: ConditionId) -> String {
    format!("condition:{id}")
}

/// Stable node id for an effect.
#[must_use]
pub fn effect_node_id(id: EffectId) -> String {
    format!("effect:{id}")
}

/// Stable node id for an entity (type-level refs use `*`).
#[must_use]
pub fn entity_node_id(entity: &EntityRef) -> String {
    format!("entity:{entity}")
}

impl DependencyGraph {
    /// Build the graph for one campaign/branch snapshot.
    ///
    /// Inactive conditions and effects are excluded entirely. `entities`
    /// seeds ENTITY nodes; entities referenced by records are added as
    /// encountered.
    #[must_use]
    pub fn build(conditions: &[Condition], effects: &[Effect], entities: &[EntityRef]) -> Self {
        let mut graph = Self::default();

        for entity in entities {
            graph.ensure_entity(entity);
        }

        for condition in conditions.iter().filter(|c| c.is_active) {
            graph.add_condition(condition);
        }
        for effect in effects.iter().filter(|e| e.is_active) {
            graph.add_effect(effect, conditions);
        }

        graph.mark_cycles();
        graph.stats = graph.compute_stats();
        graph
    }

    /// Assemble a graph from precomputed nodes and edges, for callers that
    /// merge scoped graphs or construct views directly. Duplicate node ids
    /// keep the first occurrence; edges naming unknown nodes are dropped
    /// with a warning. Cycle flags and stats are recomputed.
    #[must_use]
    pub fn from_parts(nodes: Vec<DependencyNode>, edges: Vec<DependencyEdge>) -> Self {
        let mut graph = Self::default();
        for node in nodes {
            if graph.index.contains_key(&node.id) {
                graph.warnings.push(format!("duplicate node id `{}`", node.id));
                continue;
            }
            let index = graph.nodes.len();
            graph.index.insert(node.id.clone(), index);
            graph.nodes.push(DependencyNode {
                in_cycle: false,
                ..node
            });
            graph.outgoing.push(Vec::new());
            graph.incoming.push(Vec::new());
        }
        for edge in edges {
            match (graph.index.get(&edge.from), graph.index.get(&edge.to)) {
                (Some(&from), Some(&to)) => {
                    let edge_index = graph.edges.len();
                    graph.edges.push(edge);
                    graph.endpoints.push((from, to));
                    graph.outgoing[from].push(edge_index);
                    graph.incoming[to].push(edge_index);
                }
                _ => graph.warnings.push(format!(
                    "edge `{}` -> `{}` references an unknown node",
                    edge.from, edge.to
                )),
            }
        }
        graph.mark_cycles();
        graph.stats = graph.compute_stats();
        graph
    }

    fn add_condition(&mut self, condition: &Condition) {
        let mut metadata = Map::new();
        metadata.insert("field".to_string(), Value::String(condition.field.clone()));
        metadata.insert("priority".to_string(), Value::from(condition.priority));

        let node = self.ensure_node(
            condition_node_id(condition.id),
            NodeKind::Condition,
            condition.field.clone(),
            condition.entity.entity_id,
            metadata,
        );

        for name in sorted(extract_reads(&condition.expression)) {
            let variable = self.ensure_variable(&name);
            self.add_edge(node, variable, EdgeKind::Reads);
        }

        let entity = self.ensure_entity(&condition.entity);
        self.add_edge(entity, node, EdgeKind::DependsOn);
    }

    fn add_effect(&mut self, effect: &Effect, conditions: &[Condition]) {
        let validation = patch::validate(&effect.payload);
        if !validation.is_valid() {
            self.warnings.push(format!(
                "effect {} payload failed validation: {}",
                effect.id,
                validation.errors.join("; ")
            ));
            tracing::warn!(effect = %effect.id, "skipping effect with invalid payload");
            return;
        }

        let mut metadata = Map::new();
        metadata.insert(
            "timing".to_string(),
            Value::String(effect.timing.as_str().to_string()),
        );
        metadata.insert("priority".to_string(), Value::from(effect.priority));

        let node = self.ensure_node(
            effect_node_id(effect.id),
            NodeKind::Effect,
            format!("{} @ {}", effect.timing, effect.entity),
            effect.entity.entity_id,
            metadata,
        );

        if let Some(guard_id) = effect.condition_id {
            match conditions.iter().find(|c| c.id == guard_id && c.is_active) {
                Some(guard) => {
                    for name in sorted(extract_reads(&guard.expression)) {
                        let variable = self.ensure_variable(&name);
                        self.add_edge(node, variable, EdgeKind::Reads);
                    }
                }
                None => {
                    self.warnings.push(format!(
                        "effect {} guard condition {guard_id} not found or inactive",
                        effect.id
                    ));
                }
            }
        }

        for name in sorted(extract_writes(effect)) {
            let variable = self.ensure_variable(&name);
            self.add_edge(node, variable, EdgeKind::Writes);
        }

        let entity = self.ensure_entity(&effect.entity);
        self.add_edge(entity, node, EdgeKind::DependsOn);
    }

    fn ensure_variable(&mut self, name: &str) -> usize {
        self.ensure_node(
            variable_node_id(name),
            NodeKind::Variable,
            name.to_string(),
            None,
            Map::new(),
        )
    }

    fn ensure_entity(&mut self, entity: &EntityRef) -> usize {
        self.ensure_node(
            entity_node_id(entity),
            NodeKind::Entity,
            entity.to_string(),
            entity.entity_id,
            Map::new(),
        )
    }

    fn ensure_node(
        &mut self,
        id: String,
        kind: NodeKind,
        label: String,
        entity_id: Option<Uuid>,
        metadata: Map<String, Value>,
    ) -> usize {
        if let Some(&existing) = self.index.get(&id) {
            return existing;
        }
        let index = self.nodes.len();
        self.index.insert(id.clone(), index);
        self.nodes.push(DependencyNode {
            id,
            kind,
            entity_id,
            label,
            in_cycle: false,
            metadata,
        });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        index
    }

    fn add_edge(&mut self, from: usize, to: usize, kind: EdgeKind) {
        let edge_index = self.edges.len();
        self.edges.push(DependencyEdge {
            from: self.nodes[from].id.clone(),
            to: self.nodes[to].id.clone(),
            kind,
            metadata: Map::new(),
        });
        self.endpoints.push((from, to));
        self.outgoing[from].push(edge_index);
        self.incoming[to].push(edge_index);
    }

    fn compute_stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            edges: self.edges.len(),
            ..GraphStats::default()
        };
        for node in &self.nodes {
            match node.kind {
                NodeKind::Variable => stats.variables += 1,
                NodeKind::Condition => stats.conditions += 1,
                NodeKind::Effect => stats.effects += 1,
                NodeKind::Entity => stats.entities += 1,
            }
            if node.in_cycle {
                stats.cycle_participants += 1;
            }
        }
        stats
    }

    /// All nodes, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    /// All edges, in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&DependencyNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Counts per node kind, edge count, cycle participants.
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        self.stats
    }

    /// Warnings collected for skipped or partially-indexed records.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether any node participates in a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        self.stats.cycle_participants > 0
    }

    /// Clone into the serializable wire shape.
    #[must_use]
    pub fn view(&self) -> GraphView {
        GraphView {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            stats: self.stats,
            warnings: self.warnings.clone(),
        }
    }
}

/// FxHashSet iteration order is arbitrary; sort for deterministic builds.
fn sorted(set: rustc_hash::FxHashSet<String>) -> Vec<String> {
    let mut names: Vec<String> = set.into_iter().collect();
    names.sort();
    names
}
