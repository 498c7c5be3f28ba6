// src/utils/progress_bars/logging.rs - Logging helpers for the deduplication stages
use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::models::stats_models::{BlockingStats, LabelingStats, RunStats};
use crate::utils::get_memory_usage;

#[derive(Clone)]
pub struct StageLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl StageLogger {
    pub fn new(stage_name: &'static str, stage_emoji: &'static str) -> Self {
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn blocking() -> Self {
        Self::new("BLOCKING", "🧱")
    }

    pub fn labeling() -> Self {
        Self::new("LABELING", "🏷️")
    }

    pub fn training() -> Self {
        Self::new("TRAINING", "🧠")
    }

    pub fn scoring() -> Self {
        Self::new("SCORING", "🎯")
    }

    pub fn clustering() -> Self {
        Self::new("CLUSTERING", "🔗")
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn log_start(&self, run_id: &str, items: usize, item_type: &str) {
        info!(
            "[{}] {} 🚀 Starting {} (run ID: {}) over {} {}",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            run_id,
            items,
            item_type
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = if let Some(details) = details {
            format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            )
        } else {
            format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            )
        };
        info!("{}", msg);
    }

    pub fn log_blocking_summary(&self, stats: &BlockingStats) {
        info!(
            "[{}] {} 📈 {} records → {} block keys → {} blocks compared → {} candidate pairs",
            self.stage_name,
            self.stage_emoji,
            stats.records,
            stats.block_keys,
            stats.blocks_compared,
            stats.candidate_pairs
        );
        if stats.oversized_blocks > 0 {
            warn!(
                "[{}] {} 🚫 Skipped {} oversized blocks (largest held {} records)",
                self.stage_name, self.stage_emoji, stats.oversized_blocks, stats.largest_oversized_block
            );
        }
    }

    pub fn log_labeling_progress(&self, stats: &LabelingStats) {
        info!(
            "[{}] {} 📊 {} questions asked: {} match, {} distinct, {} skipped ({} seeded)",
            self.stage_name,
            self.stage_emoji,
            stats.questions_asked,
            stats.matches,
            stats.distincts,
            stats.skipped,
            stats.seeded_examples
        );
    }

    pub fn log_memory(&self) {
        debug!(
            "[{}] {} 💾 Memory in use: {} MB",
            self.stage_name,
            self.stage_emoji,
            get_memory_usage()
        );
    }

    pub fn log_completion(&self, produced: usize, item_type: &str) {
        info!(
            "[{}] {} ✅ Completed: {} {} in {:.2?}",
            self.stage_name,
            self.stage_emoji,
            produced,
            item_type,
            self.start_time.elapsed()
        );
    }
}

pub fn log_run_summary(stats: &RunStats) {
    info!("🎉 ===== DEDUPLICATION RUN COMPLETED =====");
    info!("📅 Run ID: {}", stats.run_id);
    info!("📊 Records: {}", stats.records);
    info!(
        "🧱 Candidate pairs: {} ({} oversized blocks skipped)",
        stats.blocking.candidate_pairs, stats.blocking.oversized_blocks
    );
    if let Some(labeling) = &stats.labeling {
        info!(
            "🏷️ Labels: {} match, {} distinct from {} questions",
            labeling.matches, labeling.distincts, labeling.questions_asked
        );
    }
    if stats.model_from_settings {
        info!("🧠 Model loaded from settings file");
    }
    info!(
        "🎯 Scored pairs: {} ({} accepted)",
        stats.scored_pairs, stats.accepted_pairs
    );
    info!(
        "🔗 Clusters: {} covering {} records (avg confidence: {:.3})",
        stats.clusters, stats.clustered_records, stats.avg_confidence
    );
    info!("");
    info!("⏱️  Stage timings:");
    for (stage, secs) in &stats.stage_times_secs {
        info!("  • {}: {:.2}s", stage, secs);
    }
    info!("===============================================");
}
