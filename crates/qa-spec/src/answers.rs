use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::visibility::Resolution;

/// Questionnaire answers keyed by question id. A present key means answered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet {
    values: BTreeMap<String, Value>,
}

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(id.into(), value)
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Answers to questions that are currently visible. Answers to hidden
    /// questions stay in the set but are not sent for scoring.
    pub fn visible(&self, resolution: &Resolution) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .filter(|(id, _)| resolution.is_visible(id))
            .map(|(id, value)| (id.clone(), value.clone()))
            .collect()
    }
}

impl FromIterator<(String, Value)> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
