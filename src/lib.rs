// src/lib.rs
pub mod clustering;
pub mod errors;
pub mod io;
pub mod matching;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod rl;
pub mod utils;

pub use errors::{DedupeError, Stage};
pub use pipeline::{DedupeOutcome, DedupePipeline};
