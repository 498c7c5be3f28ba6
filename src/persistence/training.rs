// src/persistence/training.rs
use serde::Deserialize;
use std::path::Path;

use crate::errors::{DedupeError, Result};
use crate::models::core::RecordId;
use crate::models::matching::{CandidatePair, Label, LabeledExample};

const ARTIFACT: &str = "training";

// Accepts hand-edited files where the ids of a pair are in either order.
#[derive(Deserialize)]
struct RawExample {
    id_1: RecordId,
    id_2: RecordId,
    label: Label,
}

/// A pretty-printed JSON array of `{"id_1", "id_2", "label"}` objects.
pub(crate) fn encode(examples: &[LabeledExample], path: &Path) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(examples).map_err(|e| corrupt(path, e.to_string()))
}

pub(crate) fn decode(bytes: &[u8], path: &Path) -> Result<Vec<LabeledExample>> {
    let raw: Vec<RawExample> = serde_json::from_slice(bytes).map_err(|e| corrupt(path, e.to_string()))?;
    raw.into_iter()
        .enumerate()
        .map(|(idx, example)| {
            let id_1 = example.id_1.trim().to_string();
            let id_2 = example.id_2.trim().to_string();
            let pair = CandidatePair::new(id_1.clone(), id_2).ok_or_else(|| {
                corrupt(path, format!("example {} pairs record '{}' with itself", idx, id_1))
            })?;
            Ok(LabeledExample::new(pair, example.label))
        })
        .collect()
}

fn corrupt(path: &Path, reason: String) -> DedupeError {
    DedupeError::CorruptArtifact {
        artifact: ARTIFACT,
        path: path.to_path_buf(),
        reason,
    }
}
