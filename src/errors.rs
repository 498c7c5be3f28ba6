// src/errors.rs
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DedupeError>;

/// The pipeline stage an error is attributed to when a run fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Input,
    Blocking,
    Training,
    Clustering,
    Persistence,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Input => "input",
            Stage::Blocking => "blocking",
            Stage::Training => "training",
            Stage::Clustering => "clustering",
            Stage::Persistence => "persistence",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DedupeError {
    #[error("Input error: {0}")]
    Input(String),

    #[error(
        "Insufficient training data: {matches} match and {distincts} distinct examples \
         (at least one of each is required)"
    )]
    InsufficientTrainingData { matches: usize, distincts: usize },

    #[error(
        "Settings were trained against field fingerprint {found}, \
         but the current field configuration has fingerprint {expected}"
    )]
    ModelFingerprintMismatch { expected: String, found: String },

    #[error("Blocking produced no candidate pairs from {records} records")]
    NoCandidatePairs { records: usize },

    #[error("Corrupt {artifact} file {path}: {reason}")]
    CorruptArtifact {
        artifact: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid feature vector: expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("No candidate pair is awaiting a label")]
    NotAwaitingLabel,

    #[error("Model has non-finite weights; training diverged")]
    NonFiniteModel,
}

impl DedupeError {
    pub fn stage(&self) -> Stage {
        match self {
            DedupeError::Input(_) => Stage::Input,
            DedupeError::NoCandidatePairs { .. } | DedupeError::WorkerPool(_) => Stage::Blocking,
            DedupeError::InsufficientTrainingData { .. }
            | DedupeError::DimensionMismatch { .. }
            | DedupeError::NotAwaitingLabel
            | DedupeError::NonFiniteModel => Stage::Training,
            DedupeError::ModelFingerprintMismatch { .. }
            | DedupeError::CorruptArtifact { .. }
            | DedupeError::Io { .. } => Stage::Persistence,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DedupeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Wraps an error with the stage a failed run stopped in, for reporting at
/// the binary's edge.
pub fn stage_context(err: DedupeError) -> anyhow::Error {
    let stage = err.stage();
    anyhow::Error::new(err).context(format!("Run failed during {} stage", stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_attribution() {
        assert_eq!(DedupeError::Input("x".into()).stage(), Stage::Input);
        assert_eq!(
            DedupeError::NoCandidatePairs { records: 2 }.stage(),
            Stage::Blocking
        );
        assert_eq!(
            DedupeError::InsufficientTrainingData {
                matches: 3,
                distincts: 0
            }
            .stage(),
            Stage::Training
        );
        assert_eq!(
            DedupeError::ModelFingerprintMismatch {
                expected: "a".into(),
                found: "b".into()
            }
            .stage(),
            Stage::Persistence
        );
    }

    #[test]
    fn test_messages_name_the_problem() {
        let msg = DedupeError::InsufficientTrainingData {
            matches: 4,
            distincts: 0,
        }
        .to_string();
        assert!(msg.contains("4 match"));
        assert!(msg.contains("0 distinct"));
        assert_eq!(Stage::Clustering.to_string(), "clustering");
    }

    #[test]
    fn test_stage_context_names_the_stage() {
        let report = stage_context(DedupeError::Input("duplicate identifier '7'".into()));
        assert_eq!(report.to_string(), "Run failed during input stage");
        assert!(format!("{:#}", report).contains("duplicate identifier '7'"));

        let report = stage_context(DedupeError::NonFiniteModel);
        assert_eq!(report.to_string(), "Run failed during training stage");
    }
}
