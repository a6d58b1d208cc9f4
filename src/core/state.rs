//! Entity variable state.
//!
//! Each entity instance owns a [`VariableState`]: a map from variable name
//! to arbitrary JSON value. The engine never mutates it in place - the patch
//! engine derives a new state from an old one, and the resolution pipeline
//! threads states through its phases.
//!
//! Backed by `im::HashMap`, so cloning a snapshot is O(1) with structural
//! sharing. That is what makes atomic per-effect application cheap: the
//! pipeline keeps the last good state and a failed patch simply discards its
//! working copy.

use im::HashMap as ImHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Variable state for one entity instance.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableState {
    vars: ImHashMap<String, Value>,
}

impl VariableState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a variable by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Resolve a dotted path (`"settlement.population"`) by descending
    /// through nested objects, and through arrays by numeric index.
    ///
    /// Returns `None` when any segment is missing. The empty path is not a
    /// reference and resolves to `None`.
    #[must_use]
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let base = segments.next().filter(|s| !s.is_empty())?;
        let mut current = self.vars.get(base)?;
        for segment in segments {
            current = descend(current, segment)?;
        }
        Some(current)
    }

    /// Set a variable. Intended for assembling snapshots and test fixtures;
    /// runtime mutation goes through the patch engine.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.vars.iter()
    }

    /// Iterate over variable names.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.vars.keys()
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Check if there are no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Render as the patch target document `{"variables": {...}}`.
    pub(crate) fn to_document(&self) -> Value {
        let vars: Map<String, Value> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut root = Map::new();
        root.insert("variables".to_string(), Value::Object(vars));
        Value::Object(root)
    }

    /// Extract the `variables` object back out of a patch target document.
    ///
    /// Anything a patch placed outside `/variables/` is discarded here; the
    /// engine tracks variable state only.
    pub(crate) fn from_document(doc: &Value) -> Option<Self> {
        let vars = doc.get("variables")?.as_object()?;
        Some(Self {
            vars: vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
    }
}

impl FromIterator<(String, Value)> for VariableState {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

/// Descend one path segment into a JSON value.
pub(crate) fn descend<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
