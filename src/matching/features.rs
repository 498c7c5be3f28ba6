// src/matching/features.rs
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::BTreeSet;
use std::sync::Arc;
use strsim::jaro_winkler;

use crate::errors::{DedupeError, Result};
use crate::matching::normalize::tokenize;
use crate::models::core::{ComparatorKind, FieldSchema, Record, RecordSet};
use crate::models::matching::{CandidatePair, FeatureVector};
use crate::utils::workers::build_worker_pool;

/// Similarity placeholder used when a value is absent.
pub const MISSING_PLACEHOLDER: f64 = 0.0;

/// Turns a pair of records into the feature vector laid out by a `FieldSchema`.
///
/// The same comparator instance serves both labeling and bulk scoring, so the
/// two can never disagree on a pair's features.
#[derive(Debug, Clone)]
pub struct FeatureComparator {
    schema: FieldSchema,
    workers: usize,
    // Built on first parallel use and shared by every later call and clone.
    pool: Arc<OnceCell<ThreadPool>>,
}

impl FeatureComparator {
    pub fn new(schema: FieldSchema, workers: usize) -> Self {
        Self {
            schema,
            workers: workers.max(1),
            pool: Arc::new(OnceCell::new()),
        }
    }

    fn worker_pool(&self) -> Result<&ThreadPool> {
        self.pool.get_or_try_init(|| build_worker_pool(self.workers))
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn compare(&self, left: &Record, right: &Record) -> FeatureVector {
        let mut features = Vec::with_capacity(self.schema.feature_len());
        for field in self.schema.fields() {
            match (left.value(&field.name), right.value(&field.name)) {
                (Some(a), Some(b)) => {
                    features.push(field_similarity(field.kind, a, b));
                    if field.has_missing {
                        features.push(0.0);
                    }
                }
                _ => {
                    features.push(MISSING_PLACEHOLDER);
                    if field.has_missing {
                        features.push(1.0);
                    }
                }
            }
        }
        features
    }

    pub fn compare_pair(&self, records: &RecordSet, pair: &CandidatePair) -> Result<FeatureVector> {
        let left = lookup(records, &pair.id_1)?;
        let right = lookup(records, &pair.id_2)?;
        Ok(self.compare(left, right))
    }

    /// Features for every pair, in the order given, computed across the worker pool.
    pub fn compare_pairs(
        &self,
        records: &RecordSet,
        pairs: &[CandidatePair],
    ) -> Result<Vec<FeatureVector>> {
        self.worker_pool()?.install(|| {
            pairs
                .par_iter()
                .map(|pair| self.compare_pair(records, pair))
                .collect()
        })
    }
}

fn lookup<'a>(records: &'a RecordSet, id: &str) -> Result<&'a Record> {
    records
        .get(id)
        .ok_or_else(|| DedupeError::Input(format!("candidate pair references unknown record '{}'", id)))
}

/// Similarity of two present values in [0, 1]; 1.0 means identical.
pub fn field_similarity(kind: ComparatorKind, a: &str, b: &str) -> f64 {
    let score = match kind {
        ComparatorKind::String => jaro_winkler(a, b),
        ComparatorKind::Exact => {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
        ComparatorKind::Text => token_jaccard(a, b),
    };
    score.clamp(0.0, 1.0)
}

fn token_jaccard(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = tokenize(a).into_iter().collect();
    let tb: BTreeSet<&str> = tokenize(b).into_iter().collect();
    if ta.is_empty() && tb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}
