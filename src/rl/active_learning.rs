// src/rl/active_learning.rs
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::errors::{DedupeError, Result};
use crate::matching::features::FeatureComparator;
use crate::models::core::{FieldSchema, Record, RecordSet};
use crate::models::matching::{CandidatePair, FeatureVector, Label, LabeledExample};
use crate::models::stats_models::LabelingStats;
use crate::rl::classifier::{ClassifierModel, ClassifierTrainer};

/// What the oracle answers for one presented pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleResponse {
    Match,
    Distinct,
    /// Unsure: no example is recorded and the pair goes back to the pool.
    Skip,
    /// Finish labeling now.
    Stop,
}

/// Everything an oracle needs to judge one candidate pair.
#[derive(Debug, Clone)]
pub struct PairForReview<'a> {
    pub pair: CandidatePair,
    pub left: &'a Record,
    pub right: &'a Record,
    pub schema: &'a FieldSchema,
    /// Current model's match probability, once a model exists.
    pub predicted_probability: Option<f64>,
    pub matches_so_far: usize,
    pub distincts_so_far: usize,
}

impl<'a> PairForReview<'a> {
    /// `(field, left value, right value)` in schema order.
    pub fn field_values(&self) -> Vec<(&'a str, Option<&'a str>, Option<&'a str>)> {
        let (left, right) = (self.left, self.right);
        self.schema
            .fields()
            .iter()
            .map(|f| (f.name.as_str(), left.value(&f.name), right.value(&f.name)))
            .collect()
    }
}

/// The source of labels: a console prompt, a review UI, or a scripted test.
pub trait Oracle {
    fn ask(&mut self, review: &PairForReview<'_>) -> OracleResponse;
}

impl<F> Oracle for F
where
    F: FnMut(&PairForReview<'_>) -> OracleResponse,
{
    fn ask(&mut self, review: &PairForReview<'_>) -> OracleResponse {
        self(review)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelerState {
    Idle,
    AwaitingLabel(CandidatePair),
    /// No askable pair is left in the pool.
    Converged,
    /// The oracle or the caller finished the session.
    Stopped,
}

#[derive(Debug, Clone)]
struct PoolEntry {
    pair: CandidatePair,
    features: FeatureVector,
    // Model generation in which the pair was skipped; it is not offered again
    // until the model changes.
    skipped_in: Option<usize>,
}

/// One interactive labeling session over the candidate pairs of a run.
pub struct ActiveLearner<'a> {
    records: &'a RecordSet,
    comparator: &'a FeatureComparator,
    trainer: ClassifierTrainer,
    similarity_slots: Vec<usize>,
    // Unlabeled pairs, sorted by pair.
    pool: Vec<PoolEntry>,
    examples: Vec<LabeledExample>,
    labeled_pairs: HashSet<CandidatePair>,
    training: Vec<(FeatureVector, Label)>,
    model: Option<ClassifierModel>,
    generation: usize,
    state: LabelerState,
    stats: LabelingStats,
}

impl<'a> ActiveLearner<'a> {
    pub fn new(
        records: &'a RecordSet,
        comparator: &'a FeatureComparator,
        trainer: ClassifierTrainer,
        mut pairs: Vec<CandidatePair>,
    ) -> Result<Self> {
        pairs.sort_unstable();
        pairs.dedup();
        let features = comparator.compare_pairs(records, &pairs)?;
        let pool = pairs
            .into_iter()
            .zip(features)
            .map(|(pair, features)| PoolEntry {
                pair,
                features,
                skipped_in: None,
            })
            .collect();

        let mut similarity_slots = Vec::new();
        let mut slot = 0;
        for field in comparator.schema().fields() {
            similarity_slots.push(slot);
            slot += if field.has_missing { 2 } else { 1 };
        }

        Ok(Self {
            records,
            comparator,
            trainer,
            similarity_slots,
            pool,
            examples: Vec::new(),
            labeled_pairs: HashSet::new(),
            training: Vec::new(),
            model: None,
            generation: 0,
            state: LabelerState::Idle,
            stats: LabelingStats::default(),
        })
    }

    /// Adds previously collected labels before the session starts. Examples
    /// whose records are not in this input are kept but cannot train.
    /// Returns the number of examples usable for training.
    pub fn seed(&mut self, examples: impl IntoIterator<Item = LabeledExample>) -> Result<usize> {
        let mut usable = 0;
        let mut unusable = 0;
        for example in examples {
            if self.labeled_pairs.contains(&example.pair) {
                warn!("Ignoring repeated training example for pair {}", example.pair);
                continue;
            }
            self.stats.seeded_examples += 1;
            if self.records.contains(&example.pair.id_1) && self.records.contains(&example.pair.id_2) {
                self.add_example(example);
                usable += 1;
            } else {
                self.labeled_pairs.insert(example.pair.clone());
                self.examples.push(example);
                unusable += 1;
            }
        }
        if unusable > 0 {
            warn!(
                "{} seeded training examples reference records missing from the input; they are kept but not trained on",
                unusable
            );
        }
        self.retrain()?;
        info!("Seeded labeling session with {} usable training examples", usable);
        Ok(usable)
    }

    pub fn state(&self) -> &LabelerState {
        &self.state
    }

    pub fn model(&self) -> Option<&ClassifierModel> {
        self.model.as_ref()
    }

    pub fn examples(&self) -> &[LabeledExample] {
        &self.examples
    }

    pub fn into_examples(self) -> Vec<LabeledExample> {
        self.examples
    }

    pub fn remaining_pairs(&self) -> usize {
        self.pool.len()
    }

    /// (match, distinct) counts over the examples usable for training.
    pub fn label_counts(&self) -> (usize, usize) {
        let matches = self.training.iter().filter(|(_, l)| *l == Label::Match).count();
        (matches, self.training.len() - matches)
    }

    pub fn stats(&self) -> LabelingStats {
        let (matches, distincts) = self.label_counts();
        LabelingStats {
            matches,
            distincts,
            ..self.stats.clone()
        }
    }

    /// Picks the next pair to present and moves to `AwaitingLabel`. Returns the
    /// pending pair again if one is already awaiting a label, and `None` once
    /// the session has stopped or converged.
    pub fn next_pair(&mut self) -> Result<Option<CandidatePair>> {
        match &self.state {
            LabelerState::AwaitingLabel(pair) => return Ok(Some(pair.clone())),
            LabelerState::Stopped | LabelerState::Converged => return Ok(None),
            LabelerState::Idle => {}
        }
        match self.select()? {
            Some(idx) => {
                let pair = self.pool[idx].pair.clone();
                self.stats.questions_asked += 1;
                self.state = LabelerState::AwaitingLabel(pair.clone());
                Ok(Some(pair))
            }
            None => {
                info!("No unlabeled candidate pairs left to ask about");
                self.state = LabelerState::Converged;
                Ok(None)
            }
        }
    }

    pub fn review(&self, pair: &CandidatePair) -> Result<PairForReview<'a>> {
        let lookup = |id: &str| {
            self.records
                .get(id)
                .ok_or_else(|| DedupeError::Input(format!("unknown record '{}'", id)))
        };
        let left = lookup(&pair.id_1)?;
        let right = lookup(&pair.id_2)?;
        let predicted_probability = match &self.model {
            Some(model) => Some(model.score(&self.comparator.compare(left, right))?),
            None => None,
        };
        let (matches_so_far, distincts_so_far) = self.label_counts();
        Ok(PairForReview {
            pair: pair.clone(),
            left,
            right,
            schema: self.comparator.schema(),
            predicted_probability,
            matches_so_far,
            distincts_so_far,
        })
    }

    /// Applies the oracle's answer for the pending pair and returns to `Idle`
    /// (or `Stopped` on a stop answer).
    pub fn submit(&mut self, response: OracleResponse) -> Result<&LabelerState> {
        let pair = match &self.state {
            LabelerState::AwaitingLabel(pair) => pair.clone(),
            _ => return Err(DedupeError::NotAwaitingLabel),
        };
        match response {
            OracleResponse::Match | OracleResponse::Distinct => {
                let label = if response == OracleResponse::Match {
                    Label::Match
                } else {
                    Label::Distinct
                };
                self.add_example(LabeledExample::new(pair, label));
                self.retrain()?;
                let (matches, distincts) = self.label_counts();
                debug!(
                    "Labeled pair as {:?}; {} match / {} distinct so far",
                    label, matches, distincts
                );
                self.state = LabelerState::Idle;
            }
            OracleResponse::Skip => {
                if let Ok(idx) = self.pool.binary_search_by(|e| e.pair.cmp(&pair)) {
                    self.pool[idx].skipped_in = Some(self.generation);
                }
                self.stats.skipped += 1;
                self.state = LabelerState::Idle;
            }
            OracleResponse::Stop => self.finish_labeling(),
        }
        Ok(&self.state)
    }

    /// Ends the session. Every example collected so far is kept.
    pub fn finish_labeling(&mut self) {
        if self.state != LabelerState::Stopped {
            info!(
                "Finished labeling after {} questions ({} examples collected)",
                self.stats.questions_asked,
                self.examples.len()
            );
        }
        self.state = LabelerState::Stopped;
    }

    /// Asks the oracle about one pair after another until it stops, the pool
    /// runs dry, or `cancel` is raised. Cancellation behaves like a stop.
    pub fn run(&mut self, oracle: &mut dyn Oracle, cancel: Option<&AtomicBool>) -> Result<LabelingStats> {
        loop {
            if cancel.map_or(false, |flag| flag.load(Ordering::SeqCst)) {
                info!("Labeling cancelled by caller");
                self.finish_labeling();
                break;
            }
            let Some(pair) = self.next_pair()? else {
                break;
            };
            let response = {
                let review = self.review(&pair)?;
                oracle.ask(&review)
            };
            if self.submit(response)? == &LabelerState::Stopped {
                break;
            }
        }
        Ok(self.stats())
    }

    /// Trains a model on every usable example collected so far.
    pub fn train(&self) -> Result<ClassifierModel> {
        self.trainer.train(self.comparator.schema(), &self.training)
    }

    // Records are known to exist for both ids.
    fn add_example(&mut self, example: LabeledExample) {
        let features = match self.pool.binary_search_by(|e| e.pair.cmp(&example.pair)) {
            Ok(idx) => self.pool.remove(idx).features,
            Err(_) => {
                match (self.records.get(&example.pair.id_1), self.records.get(&example.pair.id_2)) {
                    (Some(l), Some(r)) => self.comparator.compare(l, r),
                    _ => return,
                }
            }
        };
        self.labeled_pairs.insert(example.pair.clone());
        self.training.push((features, example.label));
        self.examples.push(example);
    }

    fn retrain(&mut self) -> Result<()> {
        let (matches, distincts) = self.label_counts();
        if matches == 0 || distincts == 0 {
            return Ok(());
        }
        self.model = Some(self.train()?);
        self.generation += 1;
        Ok(())
    }

    fn select(&self) -> Result<Option<usize>> {
        let mut best: Option<(usize, f64)> = None;
        let (matches, _) = self.label_counts();
        for (idx, entry) in self.pool.iter().enumerate() {
            if entry.skipped_in == Some(self.generation) {
                continue;
            }
            // Lower is better in every mode.
            let rank = match &self.model {
                Some(model) => (model.score(&entry.features)? - 0.5).abs(),
                None => {
                    // Bootstrap: look for a likely match first, then a likely
                    // distinct pair, so both classes get represented.
                    let mean = self.mean_similarity(&entry.features);
                    if matches == 0 {
                        -mean
                    } else {
                        mean
                    }
                }
            };
            if best.map_or(true, |(_, r)| rank < r) {
                best = Some((idx, rank));
            }
        }
        Ok(best.map(|(idx, _)| idx))
    }

    fn mean_similarity(&self, features: &[f64]) -> f64 {
        if self.similarity_slots.is_empty() {
            return 0.0;
        }
        let total: f64 = self.similarity_slots.iter().map(|&slot| features[slot]).sum();
        total / self.similarity_slots.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{ComparatorKind, FieldDefinition};

    fn records() -> RecordSet {
        RecordSet::from_records(vec![
            Record::new("a", [("name", "Joe Pizza"), ("phone", "555-1000")]),
            Record::new("b", [("name", "joe pizza"), ("phone", "555-1000")]),
            Record::new("c", [("name", "Blue Moon Diner"), ("phone", "555-2000")]),
            Record::new("d", [("name", "blue moon diner"), ("phone", "555-2000")]),
            Record::new("e", [("name", "Hardware Store"), ("phone", "555-3000")]),
        ])
        .unwrap()
    }

    fn comparator() -> FeatureComparator {
        let schema = FieldSchema::new(vec![
            FieldDefinition::string("name").with_missing(),
            FieldDefinition::new("phone", ComparatorKind::Exact),
        ])
        .unwrap();
        FeatureComparator::new(schema, 2)
    }

    fn all_pairs(set: &RecordSet) -> Vec<CandidatePair> {
        let ids: Vec<&str> = set.ids().collect();
        let mut pairs = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                pairs.extend(CandidatePair::new(ids[i], ids[j]));
            }
        }
        pairs
    }

    fn is_duplicate(pair: &CandidatePair) -> bool {
        matches!((pair.id_1.as_str(), pair.id_2.as_str()), ("a", "b") | ("c", "d"))
    }

    fn truthful(review: &PairForReview<'_>) -> OracleResponse {
        if is_duplicate(&review.pair) {
            OracleResponse::Match
        } else {
            OracleResponse::Distinct
        }
    }

    #[test]
    fn test_bootstrap_asks_for_a_match_then_a_distinct() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();

        let first = learner.next_pair().unwrap().unwrap();
        assert_eq!(first, CandidatePair::new("a", "b").unwrap());
        assert_eq!(learner.state(), &LabelerState::AwaitingLabel(first.clone()));
        // Asking again re-presents the pending pair.
        assert_eq!(learner.next_pair().unwrap(), Some(first));

        learner.submit(OracleResponse::Match).unwrap();
        let second = learner.next_pair().unwrap().unwrap();
        assert!(!is_duplicate(&second));
        learner.submit(OracleResponse::Distinct).unwrap();
        assert!(learner.model().is_some());
    }

    #[test]
    fn test_full_session_trains_a_useful_model() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        let mut oracle = truthful;
        let stats = learner.run(&mut oracle, None).unwrap();

        assert_eq!(learner.state(), &LabelerState::Converged);
        assert_eq!(stats.questions_asked, 10);
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.distincts, 8);
        assert_eq!(learner.remaining_pairs(), 0);

        let model = learner.train().unwrap();
        let dup = cmp.compare_pair(&set, &CandidatePair::new("c", "d").unwrap()).unwrap();
        let other = cmp.compare_pair(&set, &CandidatePair::new("a", "e").unwrap()).unwrap();
        assert!(model.score(&dup).unwrap() > 0.5);
        assert!(model.score(&other).unwrap() < 0.5);
    }

    #[test]
    fn test_model_picks_most_uncertain_pair_and_skips_wait_for_retrain() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        learner
            .seed(vec![
                LabeledExample::new(CandidatePair::new("a", "b").unwrap(), Label::Match),
                LabeledExample::new(CandidatePair::new("a", "e").unwrap(), Label::Distinct),
            ])
            .unwrap();
        let model = learner.model().unwrap().clone();

        let mut unlabeled: Vec<CandidatePair> = all_pairs(&set)
            .into_iter()
            .filter(|p| !learner.labeled_pairs.contains(p))
            .collect();
        unlabeled.sort();
        let mut expected: Option<(CandidatePair, f64)> = None;
        for pair in unlabeled {
            let features = cmp.compare_pair(&set, &pair).unwrap();
            let uncertainty = (model.score(&features).unwrap() - 0.5).abs();
            if expected.as_ref().map_or(true, |(_, u)| uncertainty < *u) {
                expected = Some((pair, uncertainty));
            }
        }
        let (expected, _) = expected.unwrap();

        let chosen = learner.next_pair().unwrap().unwrap();
        assert_eq!(chosen, expected);

        learner.submit(OracleResponse::Skip).unwrap();
        let next = learner.next_pair().unwrap().unwrap();
        assert_ne!(next, chosen);
        let generation = learner.generation;
        let answer = if is_duplicate(&next) {
            OracleResponse::Match
        } else {
            OracleResponse::Distinct
        };
        learner.submit(answer).unwrap();
        assert_eq!(learner.generation, generation + 1);

        // After the retrain every remaining pair, the skipped one included, is offered again.
        let remaining = learner.remaining_pairs();
        let mut offered = Vec::new();
        while let Some(pair) = learner.next_pair().unwrap() {
            offered.push(pair);
            learner.submit(OracleResponse::Skip).unwrap();
        }
        assert_eq!(offered.len(), remaining);
        assert!(offered.contains(&chosen));
        assert_eq!(learner.state(), &LabelerState::Converged);
    }

    #[test]
    fn test_stop_keeps_collected_examples() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        let mut answered = 0;
        let mut oracle = |review: &PairForReview<'_>| {
            answered += 1;
            if answered > 3 {
                OracleResponse::Stop
            } else {
                truthful(review)
            }
        };
        learner.run(&mut oracle, None).unwrap();
        assert_eq!(learner.state(), &LabelerState::Stopped);
        assert_eq!(learner.examples().len(), 3);
        assert_eq!(learner.next_pair().unwrap(), None);
    }

    #[test]
    fn test_skipping_everything_converges_without_examples() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        let mut oracle = |_: &PairForReview<'_>| OracleResponse::Skip;
        let stats = learner.run(&mut oracle, None).unwrap();
        assert_eq!(learner.state(), &LabelerState::Converged);
        assert_eq!(stats.skipped, 10);
        assert!(learner.examples().is_empty());
        assert!(matches!(
            learner.train(),
            Err(DedupeError::InsufficientTrainingData { matches: 0, distincts: 0 })
        ));
    }

    #[test]
    fn test_submit_requires_a_pending_pair() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        assert!(matches!(
            learner.submit(OracleResponse::Match),
            Err(DedupeError::NotAwaitingLabel)
        ));
    }

    #[test]
    fn test_seeded_examples_with_unknown_records_are_kept() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        let usable = learner
            .seed(vec![
                LabeledExample::new(CandidatePair::new("a", "b").unwrap(), Label::Match),
                LabeledExample::new(CandidatePair::new("a", "zz").unwrap(), Label::Distinct),
            ])
            .unwrap();
        assert_eq!(usable, 1);
        assert_eq!(learner.examples().len(), 2);
        assert_eq!(learner.label_counts(), (1, 0));
        assert_eq!(learner.remaining_pairs(), 9);
        assert!(learner.model().is_none());

        learner
            .seed(vec![LabeledExample::new(CandidatePair::new("a", "e").unwrap(), Label::Distinct)])
            .unwrap();
        assert!(learner.model().is_some());
        assert_eq!(learner.stats().seeded_examples, 3);
    }

    #[test]
    fn test_cancel_flag_stops_before_asking() {
        let set = records();
        let cmp = comparator();
        let mut learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        let cancel = AtomicBool::new(true);
        let mut oracle = truthful;
        let stats = learner.run(&mut oracle, Some(&cancel)).unwrap();
        assert_eq!(stats.questions_asked, 0);
        assert_eq!(learner.state(), &LabelerState::Stopped);
    }

    #[test]
    fn test_review_lists_field_values() {
        let set = records();
        let cmp = comparator();
        let learner = ActiveLearner::new(&set, &cmp, ClassifierTrainer::default(), all_pairs(&set)).unwrap();
        let review = learner.review(&CandidatePair::new("a", "e").unwrap()).unwrap();
        assert_eq!(review.predicted_probability, None);
        assert_eq!(
            review.field_values(),
            vec![
                ("name", Some("joe pizza"), Some("hardware store")),
                ("phone", Some("555-1000"), Some("555-3000")),
            ]
        );
    }
}
