// src/models/mod.rs
pub mod core;
pub mod matching;
pub mod stats_models;

pub use self::core::{ComparatorKind, FieldDefinition, FieldSchema, Record, RecordId, RecordSet};
pub use self::matching::{CandidatePair, FeatureVector, Label, LabeledExample, ScoredPair};
