pub mod active_learning;
pub mod classifier;

pub use active_learning::{ActiveLearner, LabelerState, Oracle, OracleResponse, PairForReview};
pub use classifier::{ClassifierModel, ClassifierTrainer, TrainerConfig};
