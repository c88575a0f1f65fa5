//! Per-identifier test outcomes
//!
//! Outcomes are recorded at most once. Checks whose failures are
//! deferred (match failures, unmet requirements) land here and are
//! surfaced together at scenario end, so one failing check does not
//! hide the others.

use std::collections::BTreeMap;

/// Durable result of one named check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

/// Session-scoped map from test identifier to outcome
#[derive(Debug, Default)]
pub struct OutcomeStore {
    outcomes: BTreeMap<String, Outcome>,
}

impl OutcomeStore {
    /// Record an outcome for `identifier`, exactly once
    ///
    /// Recording a second outcome under the same identifier is a
    /// programming error in the calling scenario and panics.
    pub fn record(&mut self, identifier: &str, outcome: Outcome) -> &Outcome {
        if self.outcomes.contains_key(identifier) {
            panic!("a result has already been recorded for test {:?}", identifier);
        }
        self.outcomes.insert(identifier.to_string(), outcome);
        &self.outcomes[identifier]
    }

    /// Memoized outcome of an identifier, if one was recorded
    pub fn get(&self, identifier: &str) -> Option<&Outcome> {
        self.outcomes.get(identifier)
    }

    pub fn is_recorded(&self, identifier: &str) -> bool {
        self.outcomes.contains_key(identifier)
    }

    /// All recorded failures, in identifier order
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            Outcome::Failed(cause) => Some((id.as_str(), cause.as_str())),
            Outcome::Passed => None,
        })
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
