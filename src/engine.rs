//! The engine facade.
//!
//! [`RulesEngine`] holds the rule records and per-entity variable
//! snapshots, and exposes the three operations callers actually invoke:
//! evaluating a single condition, resolving an event or encounter, and
//! building the dependency graph for a campaign branch. Persistence stays
//! with the caller; the engine is handed fully-loaded records.

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::info;

use crate::core::{
    BranchId, CampaignId, Condition, ConditionId, Effect, EncounterId, EncounterRecord, EntityRef,
    EventId, EventRecord, VariableState,
};
use crate::error::EngineError;
use crate::expr::{evaluate, ExecutionTrace};
use crate::graph::DependencyGraph;
use crate::pipeline::{ResolutionPipeline, ResolutionResult};

/// A condition's evaluated value together with the step-by-step trace.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionEvaluation {
    pub value: Value,
    pub trace: ExecutionTrace,
}

/// In-memory rule set plus entity state snapshots.
pub struct RulesEngine {
    conditions: Vec<Condition>,
    effects: Vec<Effect>,
    entities: FxHashMap<EntityRef, VariableState>,
    events: FxHashMap<EventId, EventRecord>,
    encounters: FxHashMap<EncounterId, EncounterRecord>,
}

impl RulesEngine {
    #[must_use]
    pub fn new(conditions: Vec<Condition>, effects: Vec<Effect>) -> Self {
        Self {
            conditions,
            effects,
            entities: FxHashMap::default(),
            events: FxHashMap::default(),
            encounters: FxHashMap::default(),
        }
    }

    /// Attach (or replace) an entity's variable snapshot.
    pub fn insert_entity(&mut self, entity: EntityRef, state: VariableState) {
        self.entities.insert(entity, state);
    }

    /// Register an event awaiting resolution.
    pub fn insert_event(&mut self, event: EventRecord) {
        self.events.insert(event.id, event);
    }

    /// Register an encounter awaiting resolution.
    pub fn insert_encounter(&mut self, encounter: EncounterRecord) {
        self.encounters.insert(encounter.id, encounter);
    }

    #[must_use]
    pub fn entity_state(&self, entity: &EntityRef) -> Option<&VariableState> {
        self.entities.get(entity)
    }

    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    #[must_use]
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    /// Evaluate one condition against a caller-supplied variable context.
    pub fn evaluate_condition(
        &self,
        condition_id: ConditionId,
        context: &VariableState,
    ) -> Result<ConditionEvaluation, EngineError> {
        let condition = self
            .conditions
            .iter()
            .find(|c| c.id == condition_id)
            .ok_or(EngineError::ConditionNotFound(condition_id))?;
        if !condition.is_active {
            return Err(EngineError::InactiveCondition(condition_id));
        }

        let (value, trace) = evaluate(&condition.expression, context)?;
        Ok(ConditionEvaluation { value, trace })
    }

    /// Resolve a registered event, committing the resulting state.
    pub fn resolve_event(&mut self, event_id: EventId) -> Result<ResolutionResult, EngineError> {
        let entity = self
            .events
            .get(&event_id)
            .map(|event| event.entity)
            .ok_or(EngineError::EventNotFound(event_id))?;
        info!(event = %event_id, %entity, "resolving event");
        self.resolve_entity(entity)
    }

    /// Resolve a registered encounter, committing the resulting state.
    pub fn resolve_encounter(
        &mut self,
        encounter_id: EncounterId,
    ) -> Result<ResolutionResult, EngineError> {
        let entity = self
            .encounters
            .get(&encounter_id)
            .map(|encounter| encounter.entity)
            .ok_or(EngineError::EncounterNotFound(encounter_id))?;
        info!(encounter = %encounter_id, %entity, "resolving encounter");
        self.resolve_entity(entity)
    }

    fn resolve_entity(&mut self, entity: EntityRef) -> Result<ResolutionResult, EngineError> {
        let state = self
            .entities
            .get(&entity)
            .ok_or(EngineError::EntityNotFound(entity))?;

        let pipeline = ResolutionPipeline::new(&self.conditions, &self.effects);
        let result = pipeline.resolve(&entity, state, |_| Ok::<(), EngineError>(()))?;
        self.entities.insert(entity, result.state.clone());
        Ok(result)
    }

    /// Build the dependency graph for one campaign branch.
    ///
    /// Entities come from the rule records themselves: every entity a
    /// scoped condition or effect targets gets a node.
    #[must_use]
    pub fn dependency_graph(
        &self,
        campaign_id: CampaignId,
        branch_id: BranchId,
    ) -> DependencyGraph {
        let in_scope = |c: CampaignId, b: BranchId| c == campaign_id && b == branch_id;
        let conditions: Vec<Condition> = self
            .conditions
            .iter()
            .filter(|c| in_scope(c.campaign_id, c.branch_id))
            .cloned()
            .collect();
        let effects: Vec<Effect> = self
            .effects
            .iter()
            .filter(|e| in_scope(e.campaign_id, e.branch_id))
            .cloned()
            .collect();

        let mut entities: Vec<EntityRef> = conditions
            .iter()
            .map(|c| c.entity)
            .chain(effects.iter().map(|e| e.entity))
            .collect();
        entities.sort_by_key(|e| (e.entity_type.as_str(), e.entity_id));
        entities.dedup();

        DependencyGraph::build(&conditions, &effects, &entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EntityType;
    use crate::expr::Expression;
    use crate::patch::PatchOp;
    use serde_json::json;

    fn kingdom() -> EntityRef {
        EntityRef::type_level(EntityType::Kingdom)
    }

    #[test]
    fn test_evaluate_condition_with_trace() {
        let condition = Condition::new(
            kingdom(),
            "unstable",
            Expression::parse(&json!({">": [{"var": "unrest"}, 5]})).unwrap(),
        );
        let id = condition.id;
        let engine = RulesEngine::new(vec![condition], vec![]);
        let context = VariableState::new().with_var("unrest", json!(7));

        let evaluation = engine.evaluate_condition(id, &context).unwrap();
        assert_eq!(evaluation.value, json!(true));
        assert!(!evaluation.trace.steps().is_empty());
    }

    #[test]
    fn test_evaluate_missing_and_inactive() {
        let inactive = Condition::new(
            kingdom(),
            "off",
            Expression::parse(&json!(true)).unwrap(),
        )
        .inactive();
        let inactive_id = inactive.id;
        let engine = RulesEngine::new(vec![inactive], vec![]);

        let context = VariableState::new();
        let unknown = ConditionId::new();
        assert_eq!(
            engine.evaluate_condition(unknown, &context),
            Err(EngineError::ConditionNotFound(unknown))
        );
        assert_eq!(
            engine.evaluate_condition(inactive_id, &context),
            Err(EngineError::InactiveCondition(inactive_id))
        );
    }

    #[test]
    fn test_resolve_event_commits_state() {
        let effect = Effect::new(
            kingdom(),
            crate::core::EffectTiming::OnResolve,
            vec![PatchOp::add("/variables/gold", json!(50))],
        );
        let mut engine = RulesEngine::new(vec![], vec![effect]);
        engine.insert_entity(kingdom(), VariableState::new());
        let event = EventRecord::new(kingdom());
        let event_id = event.id;
        engine.insert_event(event);

        let result = engine.resolve_event(event_id).unwrap();
        assert_eq!(result.on_resolve.succeeded, 1);
        assert_eq!(
            engine.entity_state(&kingdom()).and_then(|s| s.get("gold")),
            Some(&json!(50))
        );
    }

    #[test]
    fn test_resolve_unknown_records() {
        let mut engine = RulesEngine::new(vec![], vec![]);
        let event_id = EventId::new();
        assert_eq!(
            engine.resolve_event(event_id),
            Err(EngineError::EventNotFound(event_id))
        );
        let encounter_id = EncounterId::new();
        assert_eq!(
            engine.resolve_encounter(encounter_id),
            Err(EngineError::EncounterNotFound(encounter_id))
        );
    }

    #[test]
    fn test_resolve_without_snapshot() {
        let mut engine = RulesEngine::new(vec![], vec![]);
        let event = EventRecord::new(kingdom());
        let event_id = event.id;
        engine.insert_event(event);
        assert_eq!(
            engine.resolve_event(event_id),
            Err(EngineError::EntityNotFound(kingdom()))
        );
    }

    #[test]
    fn test_graph_scoped_to_branch() {
        let campaign = CampaignId::new();
        let branch = BranchId::new();
        let in_scope = Condition::new(
            kingdom(),
            "scoped",
            Expression::parse(&json!({"var": "a"})).unwrap(),
        )
        .in_scope(campaign, branch);
        let out_of_scope = Condition::new(
            kingdom(),
            "other",
            Expression::parse(&json!({"var": "b"})).unwrap(),
        );
        let engine = RulesEngine::new(vec![in_scope, out_of_scope], vec![]);

        let graph = engine.dependency_graph(campaign, branch);
        assert_eq!(graph.stats().conditions, 1);
        assert_eq!(graph.stats().variables, 1);
    }
}
