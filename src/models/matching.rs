// src/models/matching.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::core::RecordId;

/// One similarity score (or missing indicator) per feature slot of a `FieldSchema`.
pub type FeatureVector = Vec<f64>;

/// An unordered pair of record ids, stored with `id_1 < id_2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidatePair {
    pub id_1: RecordId,
    pub id_2: RecordId,
}

impl CandidatePair {
    /// Returns `None` for a self-pair.
    pub fn new(a: impl Into<RecordId>, b: impl Into<RecordId>) -> Option<Self> {
        let (a, b) = (a.into(), b.into());
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Some(Self { id_1: a, id_2: b }),
            std::cmp::Ordering::Greater => Some(Self { id_1: b, id_2: a }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_1 == id || self.id_2 == id
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id_1, self.id_2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Match,
    Distinct,
}

impl Label {
    /// Training target for the classifier.
    pub fn target(&self) -> f64 {
        match self {
            Label::Match => 1.0,
            Label::Distinct => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabeledExample {
    #[serde(flatten)]
    pub pair: CandidatePair,
    pub label: Label,
}

impl LabeledExample {
    pub fn new(pair: CandidatePair, label: Label) -> Self {
        Self { pair, label }
    }
}

/// A candidate pair with its match probability from the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPair {
    pub pair: CandidatePair,
    pub probability: f64,
}

impl ScoredPair {
    pub fn new(pair: CandidatePair, probability: f64) -> Self {
        Self { pair, probability }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_pair_is_unordered() {
        let a = CandidatePair::new("b", "a").unwrap();
        let b = CandidatePair::new("a", "b").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.id_1, "a");
        assert!(a.contains("b"));
        assert!(CandidatePair::new("a", "a").is_none());
    }

    #[test]
    fn test_labeled_example_json_shape() {
        let example = LabeledExample::new(CandidatePair::new("2", "1").unwrap(), Label::Match);
        let json = serde_json::to_value(&example).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id_1": "1", "id_2": "2", "label": "match"})
        );
    }
}
