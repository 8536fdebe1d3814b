//! Utilities for multithreading with `rayon`.

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;

/// A dedicated `rayon` thread pool for running the per-frame culling passes,
/// keeping them off the global pool shared with the rest of the application.
#[derive(Debug)]
pub struct RayonThreadPool {
    pool: ThreadPool,
    num_threads: NonZeroUsize,
}

impl RayonThreadPool {
    /// Creates a new thread pool with the given number of worker threads.
    ///
    /// # Panics
    /// If the underlying pool could not be created.
    pub fn new(num_threads: NonZeroUsize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads.get())
            .build()
            .unwrap();

        Self { pool, num_threads }
    }

    /// Returns the underlying `rayon` pool.
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Returns the number of worker threads in the pool.
    pub fn num_threads(&self) -> NonZeroUsize {
        self.num_threads
    }
}
