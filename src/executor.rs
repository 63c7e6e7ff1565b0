//! Fork-join parallel range executor.
//!
//! Every stage expresses its inner loop as a synchronous parallel range
//! call: the caller blocks until all chunks finish, so stage N+1 never
//! starts before stage N's parallel work has joined. This is the only
//! concurrency primitive the pipeline needs; a dedicated rayon pool does
//! the actual scheduling.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("parallel range submitted on a stopped executor")]
    Stopped,
    #[error("failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Fixed-size worker pool with a blocking fan-out/join primitive.
pub struct ParallelExecutor {
    pool: rayon::ThreadPool,
    stopped: AtomicBool,
}

impl ParallelExecutor {
    /// Pool sized to the available hardware parallelism.
    pub fn new() -> Result<Self, ExecutorError> {
        Self::with_threads(0)
    }

    /// Pool with an explicit worker count (0 = hardware parallelism).
    pub fn with_threads(num_threads: usize) -> Result<Self, ExecutorError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()?;
        Ok(Self {
            pool,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Refuse further work. In-flight parallel ranges complete normally.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Invoke `f` once for every index in `[start, end)`, partitioned into
    /// `ceil((end - start) / grain)` contiguous chunks with one task per
    /// chunk. Blocks until every chunk has completed. A panic inside a
    /// chunk propagates to the caller when the join collects it.
    pub fn parallel_range<F>(
        &self,
        start: usize,
        end: usize,
        f: F,
        grain: usize,
    ) -> Result<(), ExecutorError>
    where
        F: Fn(usize) + Sync,
    {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ExecutorError::Stopped);
        }
        if start >= end {
            return Ok(());
        }

        let grain = grain.max(1);
        let num_chunks = (end - start + grain - 1) / grain;

        self.pool.install(|| {
            (0..num_chunks).into_par_iter().for_each(|chunk| {
                let chunk_start = start + chunk * grain;
                let chunk_end = (chunk_start + grain).min(end);
                for idx in chunk_start..chunk_end {
                    f(idx);
                }
            });
        });

        Ok(())
    }
}
