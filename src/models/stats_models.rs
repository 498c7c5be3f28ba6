// src/models/stats_models.rs
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockingStats {
    pub records: usize,
    pub block_keys: usize,
    pub blocks_compared: usize,
    /// Blocks skipped because they exceeded the configured maximum size.
    pub oversized_blocks: usize,
    pub largest_oversized_block: usize,
    pub candidate_pairs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelingStats {
    pub questions_asked: usize,
    pub matches: usize,
    pub distincts: usize,
    pub skipped: usize,
    pub seeded_examples: usize,
}

/// Summary of one end-to-end run, logged by the binary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub run_id: String,
    pub records: usize,
    pub blocking: BlockingStats,
    pub labeling: Option<LabelingStats>,
    pub model_from_settings: bool,
    pub scored_pairs: usize,
    pub accepted_pairs: usize,
    pub clusters: usize,
    pub clustered_records: usize,
    pub avg_confidence: f64,
    pub stage_times_secs: Vec<(String, f64)>,
}
