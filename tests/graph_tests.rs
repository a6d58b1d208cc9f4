//! Dependency graph scenario tests.
//!
//! A small campaign rule set built into a graph: read/write edges,
//! entity ownership, guard wiring, cycle flagging, and the traversal
//! queries a rule-debugging UI would issue.

use campaign_rules::core::{Condition, Effect, EffectTiming, EntityRef, EntityType};
use campaign_rules::expr::Expression;
use campaign_rules::graph::{
    condition_node_id, effect_node_id, entity_node_id, variable_node_id, DependencyEdge,
    DependencyGraph, DependencyNode, EdgeKind, NodeKind,
};
use campaign_rules::patch::PatchOp;
use serde_json::json;

fn kingdom() -> EntityRef {
    EntityRef::type_level(EntityType::Kingdom)
}

fn condition(field: &str, expr: serde_json::Value) -> Condition {
    Condition::new(kingdom(), field, Expression::parse(&expr).unwrap())
}

/// One condition reading two variables, one guarded effect writing a
/// third: the full shape a rules UI renders.
#[test]
fn test_small_campaign_graph() {
    let unstable = condition(
        "unstable",
        json!({"and": [
            {">": [{"var": "unrest"}, 5]},
            {"<": [{"var": "loyalty"}, 50]}
        ]}),
    );
    let effect = Effect::new(
        kingdom(),
        EffectTiming::OnResolve,
        vec![PatchOp::add("/variables/revolt_risk", json!(true))],
    )
    .guarded_by(unstable.id);

    let conditions = vec![unstable];
    let effects = vec![effect.clone()];
    let graph = DependencyGraph::build(&conditions, &effects, &[kingdom()]);

    let stats = graph.stats();
    assert_eq!(stats.conditions, 1);
    assert_eq!(stats.effects, 1);
    assert_eq!(stats.entities, 1);
    // unrest + loyalty (reads) + revolt_risk (write)
    assert_eq!(stats.variables, 3);
    assert_eq!(stats.cycle_participants, 0);
    assert!(graph.warnings().is_empty());

    // The condition reads both variables.
    let condition_id = condition_node_id(conditions[0].id);
    let reads = graph.downstream(&condition_id, Some(1));
    assert!(reads.contains(&variable_node_id("loyalty")));
    assert!(reads.contains(&variable_node_id("unrest")));

    // The guarded effect reads the guard's variables and writes its own.
    let effect_node = effect_node_id(effect.id);
    let touched = graph.downstream(&effect_node, Some(1));
    assert!(touched.contains(&variable_node_id("revolt_risk")));
    assert!(touched.contains(&variable_node_id("unrest")));

    // Both records hang off the entity node.
    let owned = graph.downstream(&entity_node_id(&kingdom()), Some(1));
    assert!(owned.contains(&condition_id));
    assert!(owned.contains(&effect_node));
}

#[test]
fn test_inactive_records_excluded() {
    let active = condition("on", json!({"var": "a"}));
    let inactive = condition("off", json!({"var": "b"})).inactive();
    let sleeping_effect = Effect::new(
        kingdom(),
        EffectTiming::Post,
        vec![PatchOp::add("/variables/c", json!(1))],
    )
    .inactive();

    let graph = DependencyGraph::build(&[active, inactive], &[sleeping_effect], &[]);
    assert_eq!(graph.stats().conditions, 1);
    assert_eq!(graph.stats().effects, 0);
    // Only the active condition's variable appears.
    assert!(graph.node(&variable_node_id("a")).is_some());
    assert!(graph.node(&variable_node_id("b")).is_none());
    assert!(graph.node(&variable_node_id("c")).is_none());
}

#[test]
fn test_invalid_payload_warns_and_skips() {
    let mut op = PatchOp::add("/variables/x", json!(1));
    op.op = "frobnicate".to_string();
    let effect = Effect::new(kingdom(), EffectTiming::Pre, vec![op]);

    let graph = DependencyGraph::build(&[], &[effect], &[]);
    assert_eq!(graph.stats().effects, 0);
    assert_eq!(graph.warnings().len(), 1);
    assert!(graph.warnings()[0].contains("payload failed validation"));
}

#[test]
fn test_dangling_guard_warns() {
    let effect = Effect::new(
        kingdom(),
        EffectTiming::Pre,
        vec![PatchOp::add("/variables/x", json!(1))],
    )
    .guarded_by(campaign_rules::ConditionId::new());

    let graph = DependencyGraph::build(&[], &[effect], &[]);
    // The effect node still exists with its write edge; only the guard
    // reads are missing.
    assert_eq!(graph.stats().effects, 1);
    assert_eq!(graph.warnings().len(), 1);
    assert!(graph.warnings()[0].contains("not found or inactive"));
}

#[test]
fn test_move_counts_as_write() {
    let effect = Effect::new(
        kingdom(),
        EffectTiming::OnResolve,
        vec![PatchOp::move_from("/variables/silver", "/variables/war_chest")],
    );
    let graph = DependencyGraph::build(&[], &[effect.clone()], &[]);

    let writes: Vec<&DependencyEdge> = graph
        .edges()
        .iter()
        .filter(|e| e.kind == EdgeKind::Writes)
        .collect();
    let targets: Vec<&str> = writes.iter().map(|e| e.to.as_str()).collect();
    // Both endpoints of a move are mutated.
    assert!(targets.contains(&variable_node_id("silver").as_str()));
    assert!(targets.contains(&variable_node_id("war_chest").as_str()));
}

fn variable_node(name: &str) -> DependencyNode {
    DependencyNode {
        id: variable_node_id(name),
        kind: NodeKind::Variable,
        entity_id: None,
        label: name.to_string(),
        in_cycle: false,
        metadata: serde_json::Map::new(),
    }
}

fn read_edge(from: &str, to: &str) -> DependencyEdge {
    DependencyEdge {
        from: variable_node_id(from),
        to: variable_node_id(to),
        kind: EdgeKind::Reads,
        metadata: serde_json::Map::new(),
    }
}

/// A ring of reads: every participant is flagged, and traversal still
/// terminates.
#[test]
fn test_read_cycle_detection() {
    let names = ["tax_rate", "income", "budget", "tax_rate_target"];
    let nodes = names.iter().map(|n| variable_node(n)).collect();
    let edges = vec![
        read_edge("tax_rate", "income"),
        read_edge("income", "budget"),
        read_edge("budget", "tax_rate"),
        // A tail outside the ring.
        read_edge("tax_rate_target", "tax_rate"),
    ];
    let graph = DependencyGraph::from_parts(nodes, edges);

    assert!(graph.has_cycles());
    assert_eq!(graph.stats().cycle_participants, 3);
    let flagged = |name: &str| graph.node(&variable_node_id(name)).is_some_and(|n| n.in_cycle);
    assert!(flagged("tax_rate"));
    assert!(flagged("income"));
    assert!(flagged("budget"));
    assert!(!flagged("tax_rate_target"));

    // Traversal from inside the cycle terminates and reaches the ring.
    let downstream = graph.downstream(&variable_node_id("tax_rate"), None);
    assert_eq!(downstream.len(), 2);
}

#[test]
fn test_from_parts_sanitizes_input() {
    let nodes = vec![variable_node("a"), variable_node("a"), variable_node("b")];
    let edges = vec![
        read_edge("a", "b"),
        read_edge("a", "ghost"),
    ];
    let graph = DependencyGraph::from_parts(nodes, edges);

    assert_eq!(graph.nodes().len(), 2);
    assert_eq!(graph.edges().len(), 1);
    assert_eq!(graph.warnings().len(), 2);
}

#[test]
fn test_view_serializes() {
    let cond = condition("watch", json!({"var": "alert_level"}));
    let graph = DependencyGraph::build(&[cond], &[], &[]);
    let view = graph.view();

    let serialized = serde_json::to_value(&view).unwrap();
    assert!(serialized["nodes"].is_array());
    assert!(serialized["edges"].is_array());
    assert!(serialized["stats"]["variables"].is_number());
}

#[test]
fn test_neighborhood_query() {
    let a = condition("a", json!({"var": "shared"}));
    let b = condition("b", json!({"var": "shared"}));
    let graph = DependencyGraph::build(&[a.clone(), b.clone()], &[], &[]);

    let shared = variable_node_id("shared");
    let selection = graph.neighborhood(&[shared.as_str()], None);
    // Both conditions sit upstream of the shared variable; nothing sits
    // downstream of it.
    assert!(selection.upstream.contains(&condition_node_id(a.id)));
    assert!(selection.upstream.contains(&condition_node_id(b.id)));
    assert!(selection.downstream.is_empty());
}

#[test]
fn test_entity_seeding() {
    let graph = DependencyGraph::build(&[], &[], &[kingdom()]);
    assert_eq!(graph.stats().entities, 1);
    assert!(graph.node(&entity_node_id(&kingdom())).is_some());
}
