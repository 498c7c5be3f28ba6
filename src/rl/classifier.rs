// src/rl/classifier.rs
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::errors::{DedupeError, Result};
use crate::models::core::FieldSchema;
use crate::models::matching::{FeatureVector, Label};

pub const DEFAULT_LEARNING_RATE: f64 = 0.5;
pub const DEFAULT_EPOCHS: usize = 300;
pub const DEFAULT_L2_PENALTY: f64 = 0.001;
pub const DEFAULT_SEED: u64 = 42;
const LEARNING_RATE_DECAY: f64 = 0.01;

// Logistic regression over the feature layout of `schema`. `score` rejects
// vectors of any other length.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassifierModel {
    schema: FieldSchema,
    // One weight per feature followed by the bias term.
    weights: Vec<f64>,
    trained_on: usize,
}

impl ClassifierModel {
    pub(crate) fn from_parts(schema: FieldSchema, weights: Vec<f64>, trained_on: usize) -> Result<Self> {
        let model = Self {
            schema,
            weights,
            trained_on,
        };
        model.check_dimensions()?;
        Ok(model)
    }

    /// The weight count must be one per feature plus the bias; models read
    /// back from disk are checked with this before use.
    pub(crate) fn check_dimensions(&self) -> Result<()> {
        let expected = self.schema.feature_len() + 1;
        if self.weights.len() != expected {
            return Err(DedupeError::DimensionMismatch {
                expected,
                actual: self.weights.len(),
            });
        }
        Ok(())
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn fingerprint(&self) -> String {
        self.schema.fingerprint()
    }

    /// Feature weights, without the bias.
    pub fn weights(&self) -> &[f64] {
        &self.weights[..self.weights.len() - 1]
    }

    pub fn bias(&self) -> f64 {
        self.weights[self.weights.len() - 1]
    }

    pub fn is_finite(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite())
    }

    /// Number of labeled examples the model was fitted on.
    pub fn trained_on(&self) -> usize {
        self.trained_on
    }

    pub fn feature_weights(&self) -> Vec<(String, f64)> {
        self.schema
            .feature_names()
            .into_iter()
            .zip(self.weights().iter().copied())
            .collect()
    }

    /// Match probability in [0, 1]. Pure: identical inputs give identical scores.
    pub fn score(&self, features: &[f64]) -> Result<f64> {
        let expected = self.schema.feature_len();
        if features.len() != expected {
            return Err(DedupeError::DimensionMismatch {
                expected,
                actual: features.len(),
            });
        }
        Ok(predict(&self.weights, features))
    }
}

fn predict(weights: &[f64], features: &[f64]) -> f64 {
    // Add the bias term (1.0) to the features
    let features_with_bias = features.iter().chain(std::iter::once(&1.0));
    let logit: f64 = weights
        .iter()
        .zip(features_with_bias)
        .map(|(w, f)| w * f)
        .sum();
    sigmoid(logit)
}

fn sigmoid(z: f64) -> f64 {
    if z.is_nan() {
        return 0.5;
    }
    let p = if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    };
    p.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2_penalty: f64,
    /// Seeds the per-epoch shuffle; training is reproducible for a given seed.
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_EPOCHS,
            l2_penalty: DEFAULT_L2_PENALTY,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierTrainer {
    config: TrainerConfig,
}

impl ClassifierTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Fits a fresh model on the full example set. Nothing from any previous
    /// model is reused.
    pub fn train(&self, schema: &FieldSchema, examples: &[(FeatureVector, Label)]) -> Result<ClassifierModel> {
        let matches = examples.iter().filter(|(_, l)| *l == Label::Match).count();
        let distincts = examples.len() - matches;
        if matches == 0 || distincts == 0 {
            return Err(DedupeError::InsufficientTrainingData { matches, distincts });
        }

        let feature_count = schema.feature_len();
        if let Some((fv, _)) = examples.iter().find(|(fv, _)| fv.len() != feature_count) {
            return Err(DedupeError::DimensionMismatch {
                expected: feature_count,
                actual: fv.len(),
            });
        }

        // Class-balanced sample weights.
        let n = examples.len() as f64;
        let match_weight = n / (2.0 * matches as f64);
        let distinct_weight = n / (2.0 * distincts as f64);

        let mut weights = vec![0.0; feature_count + 1];
        let bias_index = feature_count;
        let mut order: Vec<usize> = (0..examples.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let learning_rate =
                self.config.learning_rate / (1.0 + LEARNING_RATE_DECAY * epoch as f64);
            for &i in &order {
                let (features, label) = &examples[i];
                let sample_weight = match label {
                    Label::Match => match_weight,
                    Label::Distinct => distinct_weight,
                };
                let error = label.target() - predict(&weights, features);
                for (j, feature_val) in features.iter().enumerate() {
                    weights[j] += learning_rate
                        * (sample_weight * error * feature_val - self.config.l2_penalty * weights[j]);
                }
                weights[bias_index] += learning_rate * sample_weight * error;
            }
        }

        let correct = examples
            .iter()
            .filter(|(fv, label)| (predict(&weights, fv) >= 0.5) == (*label == Label::Match))
            .count();
        info!(
            "Trained classifier on {} examples ({} match, {} distinct), training accuracy {:.1}%",
            examples.len(),
            matches,
            distincts,
            100.0 * correct as f64 / n
        );
        debug!("Classifier weights: {:?}", weights);
        if weights.iter().any(|w| !w.is_finite()) {
            warn!(
                "Training diverged with learning rate {} and L2 penalty {}",
                self.config.learning_rate, self.config.l2_penalty
            );
            return Err(DedupeError::NonFiniteModel);
        }

        ClassifierModel::from_parts(schema.clone(), weights, examples.len())
    }
}
