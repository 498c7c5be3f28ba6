// src/utils/progress_bars/progress_config.rs

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::env;

/// Configuration for progress tracking throughout the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressConfig {
    /// Whether to show progress bars at all
    pub enabled: bool,
    /// Whether to show per-pass bars inside a stage (blocking, scoring)
    pub detailed: bool,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            detailed: true,
        }
    }
}

impl ProgressConfig {
    /// Create progress configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_values(
            env::var("PROGRESS_ENABLED").ok().as_deref(),
            env::var("PROGRESS_DETAILED").ok().as_deref(),
        )
    }

    fn from_values(enabled: Option<&str>, detailed: Option<&str>) -> Self {
        Self {
            enabled: enabled.unwrap_or("true").trim().parse().unwrap_or(true),
            detailed: detailed.unwrap_or("true").trim().parse().unwrap_or(true),
        }
    }

    /// No bars at all, for tests and scripted runs.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            detailed: false,
        }
    }

    /// Create a MultiProgress instance if progress is enabled, None otherwise
    pub fn create_multi_progress(&self) -> Option<MultiProgress> {
        if self.enabled {
            Some(MultiProgress::new())
        } else {
            None
        }
    }

    /// Check if detailed progress should be shown
    pub fn should_show_detailed(&self) -> bool {
        self.enabled && self.detailed
    }
}

/// Adds a bar of `len` steps to `multi_progress`, or returns `None` when
/// progress display is off.
pub fn stage_bar(multi_progress: Option<&MultiProgress>, len: u64, message: &str) -> Option<ProgressBar> {
    let mp = multi_progress?;
    let pb = mp.add(ProgressBar::new(len));
    let style = ProgressStyle::default_bar()
        .template("    {spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
    pb.set_style(style);
    pb.set_message(message.to_string());
    Some(pb)
}
