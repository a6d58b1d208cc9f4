//! The three-phase resolution pipeline.
//!
//! `resolve` runs PRE effects against the entity's state, hands the
//! intermediate state to the caller's resolution action (the only step
//! that can abort the pipeline), then runs ON_RESOLVE and POST. Within a
//! phase, effects apply in descending priority with ties kept in input
//! order; each effect's payload is atomic, and a failed effect leaves
//! state exactly as the previous effect left it.

use tracing::{debug, warn};

use crate::core::{Condition, Effect, EffectTiming, EntityRef, VariableState};
use crate::expr::{evaluate, is_truthy};
use crate::graph::{effect_node_id, DependencyGraph};
use crate::patch;
use crate::pipeline::{EffectExecutionSummary, EffectFailure, ResolutionResult};

/// Resolves events and encounters against a rule set.
///
/// Borrows the rule records; the engine facade owns them and constructs a
/// pipeline per resolution.
pub struct ResolutionPipeline<'a> {
    conditions: &'a [Condition],
    effects: &'a [Effect],
    graph: Option<&'a DependencyGraph>,
}

impl<'a> ResolutionPipeline<'a> {
    #[must_use]
    pub fn new(conditions: &'a [Condition], effects: &'a [Effect]) -> Self {
        Self {
            conditions,
            effects,
            graph: None,
        }
    }

    /// Skip (and report) any effect whose graph node sits on a dependency
    /// cycle. Without a graph, no cycle screening happens.
    #[must_use]
    pub fn with_cycle_guard(mut self, graph: &'a DependencyGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Run the full PRE -> action -> ON_RESOLVE -> POST sequence.
    ///
    /// Only the caller's `action` can abort: effect failures are tallied
    /// in the phase summaries and resolution continues. On abort the
    /// entity's stored state is untouched (the partially-patched working
    /// state is dropped with the error).
    pub fn resolve<E>(
        &self,
        entity: &EntityRef,
        state: &VariableState,
        action: impl FnOnce(&VariableState) -> Result<(), E>,
    ) -> Result<ResolutionResult, E> {
        let mut working = state.clone();

        let pre = self.run_phase(EffectTiming::Pre, entity, &mut working);
        action(&working)?;
        let on_resolve = self.run_phase(EffectTiming::OnResolve, entity, &mut working);
        let post = self.run_phase(EffectTiming::Post, entity, &mut working);

        Ok(ResolutionResult {
            entity: entity.clone(),
            state: working,
            pre,
            on_resolve,
            post,
        })
    }

    fn run_phase(
        &self,
        timing: EffectTiming,
        entity: &EntityRef,
        state: &mut VariableState,
    ) -> EffectExecutionSummary {
        let mut selected: Vec<&Effect> = self
            .effects
            .iter()
            .filter(|e| e.is_active && e.timing == timing && e.entity.applies_to(entity))
            .collect();
        // Stable sort keeps input order among equal priorities.
        selected.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut summary = EffectExecutionSummary::default();
        for effect in selected {
            match self.run_effect(effect, state) {
                EffectOutcome::Applied(next) => {
                    *state = next;
                    summary.succeeded += 1;
                }
                EffectOutcome::Skipped => {}
                EffectOutcome::Failed(message) => {
                    warn!(effect = %effect.id, phase = %timing, %message, "effect failed");
                    summary.failed += 1;
                    summary.errors.push(EffectFailure {
                        effect_id: effect.id,
                        message,
                    });
                }
            }
        }
        debug!(
            phase = %timing,
            entity = %entity,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "phase complete"
        );
        summary
    }

    fn run_effect(&self, effect: &Effect, state: &VariableState) -> EffectOutcome {
        if let Some(graph) = self.graph {
            let on_cycle = graph
                .node(&effect_node_id(effect.id))
                .is_some_and(|node| node.in_cycle);
            if on_cycle {
                return EffectOutcome::Failed("effect participates in a dependency cycle".into());
            }
        }

        if let Some(condition_id) = effect.condition_id {
            let Some(guard) = self.conditions.iter().find(|c| c.id == condition_id) else {
                return EffectOutcome::Failed(format!("guard condition {condition_id} not found"));
            };
            if !guard.is_active {
                // Deactivated guard disables the effect without noise.
                return EffectOutcome::Skipped;
            }
            match evaluate(&guard.expression, state) {
                Ok((value, _)) if is_truthy(&value) => {}
                Ok(_) => return EffectOutcome::Skipped,
                // A guard that cannot be evaluated fails closed.
                Err(err) => return EffectOutcome::Failed(format!("guard evaluation failed: {err}")),
            }
        }

        match patch::apply(state, &effect.payload) {
            Ok((next, _diff)) => EffectOutcome::Applied(next),
            Err(err) => EffectOutcome::Failed(err.to_string()),
        }
    }
}

enum EffectOutcome {
    Applied(VariableState),
    Skipped,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityType;
    use crate::expr::Expression;
    use crate::patch::PatchOp;
    use crate::pipeline::PhaseStatus;
    use serde_json::json;

    fn settlement() -> EntityRef {
        EntityRef::type_level(EntityType::Settlement)
    }

    fn seed_state() -> VariableState {
        VariableState::new().with_var("population", json!(100))
    }

    fn never_fails(_: &VariableState) -> Result<(), std::convert::Infallible> {
        Ok(())
    }

    #[test]
    fn test_phases_run_in_order() {
        let effects = vec![
            Effect::new(
                settlement(),
                EffectTiming::Post,
                vec![PatchOp::replace("/variables/stage", json!("post"))],
            ),
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/stage", json!("pre"))],
            ),
            Effect::new(
                settlement(),
                EffectTiming::OnResolve,
                vec![PatchOp::replace("/variables/stage", json!("on_resolve"))],
            ),
        ];
        let pipeline = ResolutionPipeline::new(&[], &effects);

        let result = pipeline
            .resolve(&settlement(), &seed_state(), |mid| {
                // The action observes the PRE result, not later phases.
                assert_eq!(mid.get("stage"), Some(&json!("pre")));
                never_fails(mid)
            })
            .unwrap();

        assert_eq!(result.state.get("stage"), Some(&json!("on_resolve")));
        // POST replace on the same key ran after ON_RESOLVE.
        assert_eq!(result.post.succeeded, 0);
        assert_eq!(result.post.failed, 1);
    }

    #[test]
    fn test_priority_orders_within_phase() {
        let effects = vec![
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/winner", json!("low"))],
            )
            .with_priority(1),
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/winner", json!("high"))],
            )
            .with_priority(10),
        ];
        let pipeline = ResolutionPipeline::new(&[], &effects);
        let result = pipeline
            .resolve(&settlement(), &seed_state(), never_fails)
            .unwrap();

        // High priority ran first; the low-priority add overwrote it last.
        assert_eq!(result.state.get("winner"), Some(&json!("low")));
        assert_eq!(result.pre.succeeded, 2);
    }

    #[test]
    fn test_failed_effect_is_isolated() {
        let effects = vec![
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::remove("/variables/missing")],
            )
            .with_priority(10),
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/ok", json!(true))],
            ),
        ];
        let pipeline = ResolutionPipeline::new(&[], &effects);
        let result = pipeline
            .resolve(&settlement(), &seed_state(), never_fails)
            .unwrap();

        assert_eq!(result.pre.failed, 1);
        assert_eq!(result.pre.succeeded, 1);
        assert_eq!(result.pre.status(), PhaseStatus::CompletedWithWarnings);
        assert_eq!(result.state.get("ok"), Some(&json!(true)));
        // The failing effect changed nothing.
        assert_eq!(result.state.get("population"), Some(&json!(100)));
    }

    #[test]
    fn test_guard_gates_effect() {
        let guard = Condition::new(
            settlement(),
            "big_enough",
            Expression::parse(&json!({">": [{"var": "population"}, 500]})).unwrap(),
        );
        let effects = vec![Effect::new(
            settlement(),
            EffectTiming::OnResolve,
            vec![PatchOp::add("/variables/metropolis", json!(true))],
        )
        .guarded_by(guard.id)];
        let conditions = vec![guard];
        let pipeline = ResolutionPipeline::new(&conditions, &effects);

        // Falsy guard: silent skip, not a failure.
        let result = pipeline
            .resolve(&settlement(), &seed_state(), never_fails)
            .unwrap();
        assert_eq!(result.on_resolve.succeeded, 0);
        assert_eq!(result.on_resolve.failed, 0);
        assert_eq!(result.state.get("metropolis"), None);

        // Truthy guard: the effect applies.
        let big = VariableState::new().with_var("population", json!(900));
        let result = pipeline.resolve(&settlement(), &big, never_fails).unwrap();
        assert_eq!(result.on_resolve.succeeded, 1);
        assert_eq!(result.state.get("metropolis"), Some(&json!(true)));
    }

    #[test]
    fn test_guard_error_fails_closed() {
        let guard = Condition::new(
            settlement(),
            "broken",
            Expression::parse(&json!({"+": [{"var": "population"}, "oops"]})).unwrap(),
        );
        let effects = vec![Effect::new(
            settlement(),
            EffectTiming::Pre,
            vec![PatchOp::add("/variables/x", json!(1))],
        )
        .guarded_by(guard.id)];
        let conditions = vec![guard];
        let pipeline = ResolutionPipeline::new(&conditions, &effects);

        let result = pipeline
            .resolve(&settlement(), &seed_state(), never_fails)
            .unwrap();
        assert_eq!(result.pre.failed, 1);
        assert!(result.pre.errors[0].message.contains("guard evaluation failed"));
    }

    #[test]
    fn test_missing_and_inactive_guards() {
        let inactive = Condition::new(
            settlement(),
            "off",
            Expression::parse(&json!(true)).unwrap(),
        )
        .inactive();
        let effects = vec![
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/a", json!(1))],
            )
            .guarded_by(crate::core::ConditionId::new()),
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/b", json!(1))],
            )
            .guarded_by(inactive.id),
        ];
        let conditions = vec![inactive];
        let pipeline = ResolutionPipeline::new(&conditions, &effects);

        let result = pipeline
            .resolve(&settlement(), &seed_state(), never_fails)
            .unwrap();
        // Dangling guard reference is an error; inactive guard is a skip.
        assert_eq!(result.pre.failed, 1);
        assert_eq!(result.pre.succeeded, 0);
        assert!(result.pre.errors[0].message.contains("not found"));
        assert_eq!(result.state.get("a"), None);
        assert_eq!(result.state.get("b"), None);
    }

    #[test]
    fn test_action_error_aborts() {
        let effects = vec![Effect::new(
            settlement(),
            EffectTiming::OnResolve,
            vec![PatchOp::add("/variables/never", json!(true))],
        )];
        let pipeline = ResolutionPipeline::new(&[], &effects);

        let err = pipeline
            .resolve(&settlement(), &seed_state(), |_| Err("combat crashed"))
            .unwrap_err();
        assert_eq!(err, "combat crashed");
    }

    #[test]
    fn test_entity_scoping() {
        let instance = EntityRef::instance(EntityType::Settlement, uuid::Uuid::new_v4());
        let other = EntityRef::instance(EntityType::Settlement, uuid::Uuid::new_v4());
        let effects = vec![
            // Type-level effect applies to every settlement.
            Effect::new(
                settlement(),
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/typed", json!(true))],
            ),
            // Instance effect applies only to its own settlement.
            Effect::new(
                other,
                EffectTiming::Pre,
                vec![PatchOp::add("/variables/instanced", json!(true))],
            ),
        ];
        let pipeline = ResolutionPipeline::new(&[], &effects);

        let result = pipeline
            .resolve(&instance, &seed_state(), never_fails)
            .unwrap();
        assert_eq!(result.state.get("typed"), Some(&json!(true)));
        assert_eq!(result.state.get("instanced"), None);
    }

    #[test]
    fn test_cycle_guard_blocks_cyclic_effect() {
        use crate::graph::{DependencyEdge, DependencyGraph, DependencyNode, EdgeKind, NodeKind};

        let effect = Effect::new(
            settlement(),
            EffectTiming::Pre,
            vec![PatchOp::add("/variables/x", json!(1))],
        );
        let node_id = crate::graph::effect_node_id(effect.id);
        let graph = DependencyGraph::from_parts(
            vec![DependencyNode {
                id: node_id.clone(),
                kind: NodeKind::Effect,
                entity_id: None,
                label: "cyclic".into(),
                in_cycle: false,
                metadata: serde_json::Map::new(),
            }],
            vec![DependencyEdge {
                from: node_id.clone(),
                to: node_id,
                kind: EdgeKind::Writes,
                metadata: serde_json::Map::new(),
            }],
        );

        let effects = vec![effect];
        let pipeline = ResolutionPipeline::new(&[], &effects).with_cycle_guard(&graph);
        let result = pipeline
            .resolve(&settlement(), &seed_state(), never_fails)
            .unwrap();
        assert_eq!(result.pre.failed, 1);
        assert!(result.pre.errors[0].message.contains("cycle"));
    }
}
