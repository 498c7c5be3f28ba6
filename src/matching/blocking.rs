// src/matching/blocking.rs
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::{DedupeError, Result};
use crate::matching::normalize::tokenize;
use crate::models::core::{ComparatorKind, FieldSchema, Record, RecordSet};
use crate::models::matching::CandidatePair;
use crate::models::stats_models::BlockingStats;
use crate::utils::workers::build_worker_pool;

pub const DEFAULT_MAX_BLOCK_SIZE: usize = 1000;
const DEFAULT_PREFIX_LENGTH: usize = 4;

/// A cheap key function over one normalized field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingPredicate {
    WholeValue,
    Token,
    Prefix(usize),
    Ngram(usize),
    SortedTokens,
}

impl BlockingPredicate {
    fn tag(&self) -> String {
        match self {
            BlockingPredicate::WholeValue => "whole".to_string(),
            BlockingPredicate::Token => "token".to_string(),
            BlockingPredicate::Prefix(n) => format!("prefix{}", n),
            BlockingPredicate::Ngram(n) => format!("ngram{}", n),
            BlockingPredicate::SortedTokens => "sorted".to_string(),
        }
    }

    /// The distinct block keys this predicate derives from `value`.
    pub fn keys(&self, value: &str) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        match self {
            BlockingPredicate::WholeValue => {
                keys.insert(value.to_string());
            }
            BlockingPredicate::Token => {
                keys.extend(tokenize(value).into_iter().map(str::to_string));
            }
            BlockingPredicate::Prefix(n) => {
                keys.insert(value.chars().take((*n).max(1)).collect());
            }
            BlockingPredicate::Ngram(n) => {
                let chars: Vec<char> = value.chars().filter(|c| !c.is_whitespace()).collect();
                let n = (*n).max(1);
                if chars.len() <= n {
                    keys.insert(chars.into_iter().collect());
                } else {
                    keys.extend(chars.windows(n).map(|w| w.iter().collect::<String>()));
                }
            }
            BlockingPredicate::SortedTokens => {
                let mut tokens = tokenize(value);
                if !tokens.is_empty() {
                    tokens.sort_unstable();
                    tokens.dedup();
                    keys.insert(tokens.join(" "));
                }
            }
        }
        keys
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingRule {
    pub field: String,
    pub predicate: BlockingPredicate,
}

impl BlockingRule {
    pub fn new(field: impl Into<String>, predicate: BlockingPredicate) -> Self {
        Self {
            field: field.into(),
            predicate,
        }
    }

    /// Whole-value and token blocks on every field; exact fields only block on
    /// their whole value.
    pub fn defaults_for(schema: &FieldSchema) -> Vec<Self> {
        let mut rules = Vec::new();
        for field in schema.fields() {
            rules.push(Self::new(field.name.clone(), BlockingPredicate::WholeValue));
            if field.kind != ComparatorKind::Exact {
                rules.push(Self::new(field.name.clone(), BlockingPredicate::Token));
            }
        }
        rules
    }

    /// Blocks on the first few characters of the field, for looser recall.
    pub fn prefix(field: impl Into<String>) -> Self {
        Self::new(field, BlockingPredicate::Prefix(DEFAULT_PREFIX_LENGTH))
    }
}

#[derive(Debug, Clone)]
pub struct Blocker {
    rules: Vec<BlockingRule>,
    max_block_size: usize,
    workers: usize,
}

#[derive(Debug, Clone)]
pub struct BlockingResult {
    /// Sorted and free of duplicates.
    pub pairs: Vec<CandidatePair>,
    pub stats: BlockingStats,
}

impl Blocker {
    pub fn new(rules: Vec<BlockingRule>, max_block_size: usize, workers: usize) -> Self {
        Self {
            rules,
            max_block_size: max_block_size.max(2),
            workers: workers.max(1),
        }
    }

    pub fn for_schema(schema: &FieldSchema, max_block_size: usize, workers: usize) -> Self {
        Self::new(BlockingRule::defaults_for(schema), max_block_size, workers)
    }

    pub fn rules(&self) -> &[BlockingRule] {
        &self.rules
    }

    fn record_keys(&self, record: &Record) -> Vec<String> {
        let mut keys = Vec::new();
        for (rule_idx, rule) in self.rules.iter().enumerate() {
            if let Some(value) = record.value(&rule.field) {
                for key in rule.predicate.keys(value) {
                    keys.push(format!("{}:{}:{}", rule_idx, rule.predicate.tag(), key));
                }
            }
        }
        keys
    }

    /// Candidate pairs of records that share at least one block key.
    ///
    /// Blocks larger than the configured maximum are skipped and reported.
    /// Zero resulting pairs is an error, never an empty success.
    pub fn block(&self, records: &RecordSet) -> Result<BlockingResult> {
        let pool = build_worker_pool(self.workers)?;
        let all = records.records();

        let keys_per_record: Vec<Vec<String>> =
            pool.install(|| all.par_iter().map(|r| self.record_keys(r)).collect());

        let mut blocks: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, keys) in keys_per_record.into_iter().enumerate() {
            for key in keys {
                blocks.entry(key).or_default().push(idx);
            }
        }

        let mut stats = BlockingStats {
            records: all.len(),
            block_keys: blocks.len(),
            ..Default::default()
        };

        let mut comparable: Vec<&Vec<usize>> = Vec::new();
        for (key, members) in &blocks {
            if members.len() < 2 {
                continue;
            }
            if members.len() > self.max_block_size {
                warn!(
                    "Blocking explosion: block '{}' holds {} records (limit {}); skipping it",
                    key,
                    members.len(),
                    self.max_block_size
                );
                stats.oversized_blocks += 1;
                stats.largest_oversized_block = stats.largest_oversized_block.max(members.len());
                continue;
            }
            comparable.push(members);
        }
        stats.blocks_compared = comparable.len();

        let mut index_pairs: Vec<(usize, usize)> = pool.install(|| {
            comparable
                .par_iter()
                .flat_map_iter(|members| {
                    let members: &[usize] = members;
                    (0..members.len()).flat_map(move |i| {
                        ((i + 1)..members.len()).map(move |j| {
                            let (a, b) = (members[i], members[j]);
                            if a < b {
                                (a, b)
                            } else {
                                (b, a)
                            }
                        })
                    })
                })
                .collect()
        });
        index_pairs.par_sort_unstable();
        index_pairs.dedup();

        let mut pairs: Vec<CandidatePair> = index_pairs
            .into_iter()
            .filter_map(|(a, b)| CandidatePair::new(all[a].id.clone(), all[b].id.clone()))
            .collect();
        pairs.sort_unstable();
        stats.candidate_pairs = pairs.len();

        debug!(
            "Blocking: {} keys, {} blocks compared, {} oversized",
            stats.block_keys, stats.blocks_compared, stats.oversized_blocks
        );

        if pairs.is_empty() {
            return Err(DedupeError::NoCandidatePairs {
                records: all.len(),
            });
        }

        info!(
            "Blocking generated {} candidate pairs from {} records",
            pairs.len(),
            all.len()
        );
        Ok(BlockingResult { pairs, stats })
    }
}
