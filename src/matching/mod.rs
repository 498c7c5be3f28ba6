// src/matching/mod.rs
pub mod blocking;
pub mod features;
pub mod normalize;

pub use blocking::{Blocker, BlockingPredicate, BlockingResult, BlockingRule};
pub use features::FeatureComparator;
pub use normalize::{normalize_field, normalize_value};
