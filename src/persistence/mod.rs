// src/persistence/mod.rs
pub mod settings;
pub mod training;

use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::errors::{DedupeError, Result};
use crate::models::core::FieldSchema;
use crate::models::matching::LabeledExample;
use crate::rl::classifier::ClassifierModel;

pub const DEFAULT_SETTINGS_FILE: &str = "dedupe_learned_settings.json";
pub const DEFAULT_TRAINING_FILE: &str = "dedupe_training.json";

/// Durable home of the learned settings and the labeled training pairs.
#[derive(Debug, Clone)]
pub struct ModelStore {
    settings_path: PathBuf,
    training_path: PathBuf,
}

impl ModelStore {
    pub fn new(settings_path: impl Into<PathBuf>, training_path: impl Into<PathBuf>) -> Self {
        Self {
            settings_path: settings_path.into(),
            training_path: training_path.into(),
        }
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn training_path(&self) -> &Path {
        &self.training_path
    }

    pub fn has_settings(&self) -> bool {
        self.settings_path.exists()
    }

    /// The stored model, or `None` when no settings file exists. A settings
    /// file that cannot be read back, or that was trained for another field
    /// configuration, is an error.
    pub fn load_settings(&self, schema: &FieldSchema) -> Result<Option<ClassifierModel>> {
        let Some(bytes) = read_if_exists(&self.settings_path)? else {
            return Ok(None);
        };
        let stored = settings::decode(&bytes, &self.settings_path)?;
        let expected = schema.fingerprint();
        if stored.fingerprint != expected {
            return Err(DedupeError::ModelFingerprintMismatch {
                expected,
                found: stored.fingerprint,
            });
        }
        info!(
            "Loaded settings from {} (trained on {} examples at {})",
            self.settings_path.display(),
            stored.model.trained_on(),
            stored.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        Ok(Some(stored.model))
    }

    pub fn save_settings(&self, model: &ClassifierModel) -> Result<()> {
        let bytes = settings::encode(model, &self.settings_path)?;
        write_atomic(&self.settings_path, &bytes)?;
        info!("Wrote settings to {}", self.settings_path.display());
        Ok(())
    }

    /// The stored labeled pairs, or `None` when no training file exists.
    pub fn load_training(&self) -> Result<Option<Vec<LabeledExample>>> {
        let Some(bytes) = read_if_exists(&self.training_path)? else {
            return Ok(None);
        };
        let examples = training::decode(&bytes, &self.training_path)?;
        info!(
            "Loaded {} labeled examples from {}",
            examples.len(),
            self.training_path.display()
        );
        Ok(Some(examples))
    }

    pub fn save_training(&self, examples: &[LabeledExample]) -> Result<()> {
        let bytes = training::encode(examples, &self.training_path)?;
        write_atomic(&self.training_path, &bytes)?;
        info!(
            "Wrote {} labeled examples to {}",
            examples.len(),
            self.training_path.display()
        );
        Ok(())
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist", path.display());
            Ok(None)
        }
        Err(e) => Err(DedupeError::io(path, e)),
    }
}

/// Replaces `path` with `bytes` through a temporary file in the same
/// directory, so readers only ever see the old or the new content.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| DedupeError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| DedupeError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| DedupeError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| DedupeError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::core::{ComparatorKind, FieldDefinition};
    use crate::models::matching::{CandidatePair, Label};
    use tempfile::tempdir;

    fn schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDefinition::string("name").with_missing(),
            FieldDefinition::new("phone_number", ComparatorKind::Exact),
        ])
        .unwrap()
    }

    fn model() -> ClassifierModel {
        ClassifierModel::from_parts(schema(), vec![2.5, -0.25, 4.0, -3.125], 12).unwrap()
    }

    #[test]
    fn test_missing_files_load_as_none() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("s.json"), dir.path().join("t.json"));
        assert!(!store.has_settings());
        assert!(store.load_settings(&schema()).unwrap().is_none());
        assert!(store.load_training().unwrap().is_none());
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("s.json"), dir.path().join("t.json"));
        let original = model();
        store.save_settings(&original).unwrap();
        assert!(store.has_settings());
        let loaded = store.load_settings(&schema()).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(loaded.score(&[1.0, 0.0, 1.0]).unwrap(), original.score(&[1.0, 0.0, 1.0]).unwrap());
    }

    #[test]
    fn test_training_round_trip() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("s.json"), dir.path().join("t.json"));
        let examples = vec![
            LabeledExample::new(CandidatePair::new("1", "2").unwrap(), Label::Match),
            LabeledExample::new(CandidatePair::new("3", "9").unwrap(), Label::Distinct),
        ];
        store.save_training(&examples).unwrap();
        assert_eq!(store.load_training().unwrap().unwrap(), examples);

        // Overwriting replaces the whole file.
        store.save_training(&examples[..1]).unwrap();
        assert_eq!(store.load_training().unwrap().unwrap(), examples[..1].to_vec());
    }

    #[test]
    fn test_fingerprint_mismatch_fails_fast() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("s.json"), dir.path().join("t.json"));
        store.save_settings(&model()).unwrap();
        let other = FieldSchema::new(vec![FieldDefinition::string("name")]).unwrap();
        assert!(matches!(
            store.load_settings(&other),
            Err(DedupeError::ModelFingerprintMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_settings_fail_fast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.json");
        fs::write(&path, b"{ not json").unwrap();
        let store = ModelStore::new(&path, dir.path().join("t.json"));
        assert!(matches!(
            store.load_settings(&schema()),
            Err(DedupeError::CorruptArtifact { artifact: "settings", .. })
        ));
    }

    #[test]
    fn test_atomic_write_into_nested_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        let path = nested.join("t.json");
        write_atomic(&path, b"[]").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"[]");
    }
}
