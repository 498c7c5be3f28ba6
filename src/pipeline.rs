// src/pipeline.rs
use indicatif::MultiProgress;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use uuid::Uuid;

use crate::clustering::entity_clustering::{assign_memberships, cluster, with_singletons, Cluster, Membership};
use crate::errors::{DedupeError, Result};
use crate::matching::blocking::{Blocker, BlockingRule};
use crate::matching::features::FeatureComparator;
use crate::models::core::{FieldSchema, RecordId, RecordSet};
use crate::models::matching::{CandidatePair, ScoredPair};
use crate::models::stats_models::RunStats;
use crate::persistence::ModelStore;
use crate::rl::active_learning::{ActiveLearner, Oracle};
use crate::rl::classifier::{ClassifierModel, ClassifierTrainer};
use crate::utils::dedupe_config::DedupeConfig;
use crate::utils::progress_bars::logging::{log_run_summary, StageLogger};
use crate::utils::progress_bars::progress_config::{stage_bar, ProgressConfig};

const SCORING_CHUNK_SIZE: usize = 10_000;

/// Result of one run: the clusters and, for every input record, where it ended up.
#[derive(Debug, Clone)]
pub struct DedupeOutcome {
    pub clusters: Vec<Cluster>,
    pub memberships: BTreeMap<RecordId, Membership>,
    /// True when blocking found nothing to compare, as opposed to finding
    /// pairs that all scored below the threshold.
    pub no_candidate_pairs: bool,
    pub stats: RunStats,
}

/// Blocking, labeling or model loading, training, scoring and clustering for
/// one record set.
pub struct DedupePipeline {
    schema: FieldSchema,
    config: DedupeConfig,
    store: ModelStore,
    progress: ProgressConfig,
    blocking_rules: Vec<BlockingRule>,
}

impl DedupePipeline {
    pub fn new(schema: FieldSchema, config: DedupeConfig, store: ModelStore) -> Self {
        let blocking_rules = BlockingRule::defaults_for(&schema);
        Self {
            schema,
            config,
            store,
            progress: ProgressConfig::disabled(),
            blocking_rules,
        }
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_blocking_rules(mut self, rules: Vec<BlockingRule>) -> Self {
        self.blocking_rules = rules;
        self
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    /// Runs the whole pipeline. With a settings file the stored model is used
    /// directly and `oracle` is never asked; otherwise a labeling session
    /// (seeded from the training file, if any) produces the model, and both
    /// artifacts are written.
    pub fn run(
        &self,
        records: &RecordSet,
        oracle: &mut dyn Oracle,
        cancel: Option<&AtomicBool>,
    ) -> Result<DedupeOutcome> {
        let run_start = Instant::now();
        let mut stats = RunStats {
            run_id: Uuid::new_v4().to_string(),
            records: records.len(),
            ..Default::default()
        };
        info!(
            "Starting deduplication run {} over {} records and {} fields",
            stats.run_id,
            records.len(),
            self.schema.len()
        );

        let multi_progress = self.progress.create_multi_progress();
        let main_pb = stage_bar(multi_progress.as_ref(), 4, "Loading settings...");

        let stored_model = self.store.load_settings(&self.schema)?;
        let comparator = FeatureComparator::new(self.schema.clone(), self.config.workers);

        // Blocking
        if let Some(pb) = &main_pb {
            pb.set_message("Blocking...");
        }
        let logger = StageLogger::blocking();
        logger.log_start(&stats.run_id, records.len(), "records");
        let blocker = Blocker::new(
            self.blocking_rules.clone(),
            self.config.max_block_size,
            self.config.workers,
        );
        let blocked = match blocker.block(records) {
            Ok(blocked) => blocked,
            Err(DedupeError::NoCandidatePairs { records: n }) => {
                warn!(
                    "Blocking produced no candidate pairs from {} records; every record is reported unclustered",
                    n
                );
                stats.blocking.records = n;
                stats.model_from_settings = stored_model.is_some();
                stats
                    .stage_times_secs
                    .push(("blocking".to_string(), logger.elapsed().as_secs_f64()));
                if let Some(pb) = &main_pb {
                    pb.finish_with_message("No candidate pairs");
                }
                return Ok(self.finish(records, Vec::new(), true, stats));
            }
            Err(e) => return Err(e),
        };
        logger.log_blocking_summary(&blocked.stats);
        logger.log_memory();
        stats.blocking = blocked.stats.clone();
        stats
            .stage_times_secs
            .push(("blocking".to_string(), logger.elapsed().as_secs_f64()));
        if let Some(pb) = &main_pb {
            pb.inc(1);
        }

        // Model
        let model = match stored_model {
            Some(model) => {
                info!("Using stored settings; skipping labeling and training");
                stats.model_from_settings = true;
                model
            }
            None => {
                if let Some(pb) = &main_pb {
                    pb.set_message("Labeling...");
                }
                self.learn(records, &comparator, &blocked.pairs, oracle, cancel, &mut stats)?
            }
        };
        if let Some(pb) = &main_pb {
            pb.inc(1);
            pb.set_message("Scoring...");
        }

        // Scoring
        let logger = StageLogger::scoring();
        logger.log_start(&stats.run_id, blocked.pairs.len(), "candidate pairs");
        let detailed = if self.progress.should_show_detailed() {
            multi_progress.as_ref()
        } else {
            None
        };
        let scored = score_pairs(&comparator, &model, records, &blocked.pairs, detailed)?;
        stats.scored_pairs = scored.len();
        stats.accepted_pairs = scored
            .iter()
            .filter(|s| s.probability >= self.config.threshold)
            .count();
        logger.log_memory();
        logger.log_completion(scored.len(), "scored pairs");
        stats
            .stage_times_secs
            .push(("scoring".to_string(), logger.elapsed().as_secs_f64()));
        if let Some(pb) = &main_pb {
            pb.inc(1);
            pb.set_message("Clustering...");
        }

        // Clustering
        let logger = StageLogger::clustering();
        logger.log_start(&stats.run_id, scored.len(), "scored pairs");
        let clusters = cluster(&scored, self.config.threshold);
        logger.log_completion(clusters.len(), "clusters");
        stats
            .stage_times_secs
            .push(("clustering".to_string(), logger.elapsed().as_secs_f64()));
        if let Some(pb) = &main_pb {
            pb.inc(1);
            pb.finish_with_message(format!("Done in {:.1?}", run_start.elapsed()));
        }

        Ok(self.finish(records, clusters, false, stats))
    }

    fn learn(
        &self,
        records: &RecordSet,
        comparator: &FeatureComparator,
        pairs: &[CandidatePair],
        oracle: &mut dyn Oracle,
        cancel: Option<&AtomicBool>,
        stats: &mut RunStats,
    ) -> Result<ClassifierModel> {
        let logger = StageLogger::labeling();
        logger.log_start(&stats.run_id, pairs.len(), "candidate pairs");
        let trainer = ClassifierTrainer::new(self.config.trainer_config());
        let mut learner = ActiveLearner::new(records, comparator, trainer, pairs.to_vec())?;
        if let Some(examples) = self.store.load_training()? {
            logger.log_phase("Resuming from training file", Some(&format!("{} examples", examples.len())));
            learner.seed(examples)?;
        }
        let labeling = learner.run(oracle, cancel)?;
        logger.log_labeling_progress(&labeling);
        stats.labeling = Some(labeling);
        stats
            .stage_times_secs
            .push(("labeling".to_string(), logger.elapsed().as_secs_f64()));

        // Labels are kept on disk even when training below fails.
        self.store.save_training(learner.examples())?;

        let logger = StageLogger::training();
        logger.log_phase("Fitting classifier", None);
        let model = learner.train()?;
        self.store.save_settings(&model)?;
        debug!("Learned feature weights: {:?}", model.feature_weights());
        stats
            .stage_times_secs
            .push(("training".to_string(), logger.elapsed().as_secs_f64()));
        Ok(model)
    }

    fn finish(
        &self,
        records: &RecordSet,
        clusters: Vec<Cluster>,
        no_candidate_pairs: bool,
        mut stats: RunStats,
    ) -> DedupeOutcome {
        let linked = clusters.len();
        let clusters = if self.config.include_singletons {
            with_singletons(clusters, records.ids())
        } else {
            clusters
        };
        let memberships = assign_memberships(records.ids(), &clusters);

        let linked_members: Vec<f64> = clusters[..linked]
            .iter()
            .flat_map(|c| c.members.iter().map(|m| m.confidence))
            .collect();
        stats.clusters = linked;
        stats.clustered_records = linked_members.len();
        stats.avg_confidence = if linked_members.is_empty() {
            0.0
        } else {
            linked_members.iter().sum::<f64>() / linked_members.len() as f64
        };
        log_run_summary(&stats);

        DedupeOutcome {
            clusters,
            memberships,
            no_candidate_pairs,
            stats,
        }
    }
}

/// Scores every pair with `model`, in the order given. Features come from the
/// same comparator used while labeling.
pub fn score_pairs(
    comparator: &FeatureComparator,
    model: &ClassifierModel,
    records: &RecordSet,
    pairs: &[CandidatePair],
    multi_progress: Option<&MultiProgress>,
) -> Result<Vec<ScoredPair>> {
    if model.fingerprint() != comparator.schema().fingerprint() {
        return Err(DedupeError::ModelFingerprintMismatch {
            expected: comparator.schema().fingerprint(),
            found: model.fingerprint(),
        });
    }
    let pb = stage_bar(multi_progress, pairs.len() as u64, "Scoring pairs...");
    let mut scored = Vec::with_capacity(pairs.len());
    for chunk in pairs.chunks(SCORING_CHUNK_SIZE) {
        let features = comparator.compare_pairs(records, chunk)?;
        for (pair, fv) in chunk.iter().zip(features) {
            scored.push(ScoredPair::new(pair.clone(), model.score(&fv)?));
        }
        if let Some(pb) = &pb {
            pb.inc(chunk.len() as u64);
        }
    }
    if let Some(pb) = &pb {
        pb.finish_with_message(format!("Scored {} pairs", scored.len()));
    }
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{ComparatorKind, FieldDefinition, Record};
    use crate::rl::active_learning::{OracleResponse, PairForReview};
    use tempfile::tempdir;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDefinition::string("name").with_missing(),
            FieldDefinition::new("phone", ComparatorKind::Exact).with_missing(),
        ])
        .unwrap()
    }

    fn config() -> DedupeConfig {
        DedupeConfig {
            workers: 2,
            ..DedupeConfig::default()
        }
    }

    fn records() -> RecordSet {
        RecordSet::from_records(vec![
            Record::new("1", [("name", "Joe's Pizza"), ("phone", "555-0100")]),
            Record::new("2", [("name", "joes pizza"), ("phone", "555-0100")]),
            Record::new("3", [("name", "Pizza Hut"), ("phone", "555-0199")]),
            Record::new("4", [("name", "Hut Bar"), ("phone", "555-0142")]),
        ])
        .unwrap()
    }

    fn oracle(review: &PairForReview<'_>) -> OracleResponse {
        if review.pair == CandidatePair::new("1", "2").unwrap() {
            OracleResponse::Match
        } else {
            OracleResponse::Distinct
        }
    }

    #[test]
    fn test_run_writes_artifacts_and_reuses_settings() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("settings.json"), dir.path().join("training.json"));
        let pipeline = DedupePipeline::new(schema(), config(), store.clone());
        let set = records();

        let first = pipeline.run(&set, &mut oracle, None).unwrap();
        assert!(store.has_settings());
        assert!(store.load_training().unwrap().is_some());
        assert_eq!(first.memberships.len(), 4);
        assert!(!first.stats.model_from_settings);
        assert!(first.stats.labeling.is_some());

        let mut never = |_: &PairForReview<'_>| -> OracleResponse { panic!("oracle must not be asked") };
        let second = pipeline.run(&set, &mut never, None).unwrap();
        assert!(second.stats.model_from_settings);
        assert_eq!(first.clusters, second.clusters);
    }

    #[test]
    fn test_no_candidate_pairs_reports_everyone_unclustered() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("s.json"), dir.path().join("t.json"));
        let set = RecordSet::from_records(vec![
            Record::new("a", [("name", "alpha"), ("phone", "1")]),
            Record::new("b", [("name", "omega"), ("phone", "2")]),
        ])
        .unwrap();
        let outcome = DedupePipeline::new(schema(), config(), store.clone())
            .run(&set, &mut oracle, None)
            .unwrap();
        assert!(outcome.no_candidate_pairs);
        assert!(outcome.clusters.is_empty());
        assert!(outcome.memberships.values().all(|m| *m == Membership::Unclustered));
        assert!(!store.has_settings());
    }

    #[test]
    fn test_score_pairs_rejects_foreign_model() {
        let other = FieldSchema::new(vec![FieldDefinition::string("name")]).unwrap();
        let model = ClassifierModel::from_parts(other, vec![1.0, 0.0], 1).unwrap();
        let comparator = FeatureComparator::new(schema(), 1);
        let err = score_pairs(&comparator, &model, &records(), &[], None).unwrap_err();
        assert!(matches!(err, DedupeError::ModelFingerprintMismatch { .. }));
    }
}
