// src/utils/workers.rs
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::errors::Result;

/// Worker count to use when none is configured: one per available core.
pub fn default_worker_count() -> usize {
    num_cpus::get().max(1)
}

/// A pool of exactly `workers` threads for the blocking and scoring passes.
pub fn build_worker_pool(workers: usize) -> Result<ThreadPool> {
    let workers = workers.max(1);
    debug!("Starting worker pool with {} threads", workers);
    let pool = ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|idx| format!("dedupe-worker-{}", idx))
        .build()?;
    Ok(pool)
}
