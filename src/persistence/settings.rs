// src/persistence/settings.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::errors::{DedupeError, Result};
use crate::rl::classifier::ClassifierModel;

const ARTIFACT: &str = "settings";
const FORMAT_VERSION: u32 = 1;

/// The settings artifact: a trained model and the fingerprint of the field
/// configuration it was trained for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    pub format_version: u32,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub model: ClassifierModel,
}

impl StoredSettings {
    pub fn new(model: ClassifierModel) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            fingerprint: model.fingerprint(),
            created_at: Utc::now(),
            model,
        }
    }
}

pub(crate) fn encode(model: &ClassifierModel, path: &Path) -> Result<Vec<u8>> {
    if !model.is_finite() {
        return Err(DedupeError::NonFiniteModel);
    }
    serde_json::to_vec_pretty(&StoredSettings::new(model.clone())).map_err(|e| corrupt(path, e.to_string()))
}

/// Parses and integrity-checks a settings artifact. Whether it fits the
/// current field configuration is left to the caller.
pub fn decode(bytes: &[u8], path: &Path) -> Result<StoredSettings> {
    let stored: StoredSettings = serde_json::from_slice(bytes).map_err(|e| corrupt(path, e.to_string()))?;
    if stored.format_version != FORMAT_VERSION {
        return Err(corrupt(
            path,
            format!("unsupported format version {}", stored.format_version),
        ));
    }
    if stored.model.schema().is_empty() {
        return Err(corrupt(path, "model has no fields".to_string()));
    }
    if stored.model.fingerprint() != stored.fingerprint {
        return Err(corrupt(
            path,
            "recorded fingerprint does not match the model's fields".to_string(),
        ));
    }
    stored
        .model
        .check_dimensions()
        .map_err(|e| corrupt(path, e.to_string()))?;
    if !stored.model.is_finite() {
        return Err(corrupt(path, "model has non-finite weights".to_string()));
    }
    Ok(stored)
}

pub fn read(path: &Path) -> Result<StoredSettings> {
    let bytes = fs::read(path).map_err(|e| DedupeError::io(path, e))?;
    decode(&bytes, path)
}

fn corrupt(path: &Path, reason: String) -> DedupeError {
    DedupeError::CorruptArtifact {
        artifact: ARTIFACT,
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{FieldDefinition, FieldSchema};
    use serde_json::Value;

    fn model() -> ClassifierModel {
        let schema = FieldSchema::new(vec![FieldDefinition::string("name").with_missing()]).unwrap();
        ClassifierModel::from_parts(schema, vec![0.1 + 0.2, 1.0 / 3.0, -7.25], 3).unwrap()
    }

    fn reencode(value: &Value) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    #[test]
    fn test_encode_decode_is_lossless() {
        let path = Path::new("settings.json");
        let original = model();
        let stored = decode(&encode(&original, path).unwrap(), path).unwrap();
        assert_eq!(stored.model, original);
        assert_eq!(stored.fingerprint, original.fingerprint());
    }

    #[test]
    fn test_tampered_artifacts_are_corrupt() {
        let path = Path::new("settings.json");
        let good: Value = serde_json::from_slice(&encode(&model(), path).unwrap()).unwrap();

        let mut wrong_version = good.clone();
        wrong_version["format_version"] = Value::from(99);
        let mut wrong_fingerprint = good.clone();
        wrong_fingerprint["fingerprint"] = Value::from("abc");
        let mut short_weights = good.clone();
        short_weights["model"]["weights"] = serde_json::json!([1.0]);
        let mut no_fields = good;
        no_fields["model"]["schema"] = serde_json::json!([]);

        for tampered in [wrong_version, wrong_fingerprint, short_weights, no_fields] {
            assert!(matches!(
                decode(&reencode(&tampered), path),
                Err(DedupeError::CorruptArtifact { artifact: "settings", .. })
            ));
        }
        assert!(decode(b"", path).is_err());
    }

    #[test]
    fn test_non_finite_models_are_not_written() {
        let path = Path::new("settings.json");
        let schema = FieldSchema::new(vec![FieldDefinition::string("name").with_missing()]).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let model = ClassifierModel::from_parts(schema.clone(), vec![0.5, bad, 0.0], 2).unwrap();
            assert!(matches!(encode(&model, path), Err(DedupeError::NonFiniteModel)));
        }
    }
}
