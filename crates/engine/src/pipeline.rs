//! Concurrent job execution for a partition run.
//!
//! # Design
//!
//! - One fixed-size rayon pool per run, threads named `delta-worker-N`.
//! - Jobs are spawned FIFO, heaviest first, so the largest files start
//!   early and do not end up alone on the critical path.
//! - Each job reports `(index, result)` over a channel; results are
//!   reassembled by index, so completion order never shows in the output.
//! - Every dispatched job runs to completion. Deciding what a failure means
//!   is left to the caller.
//!
//! # Examples
//!
//! ```
//! use engine::pipeline::JobScheduler;
//!
//! # fn main() -> Result<(), engine::DeltaError> {
//! let jobs = vec![3u64, 10, 1];
//! let doubled = JobScheduler::new(2).run(&jobs, |job| *job, |_, job| job * 2)?;
//! assert_eq!(doubled, vec![6, 20, 2]);
//! # Ok(())
//! # }
//! ```

use crossbeam_channel::unbounded;
use rayon::ThreadPoolBuilder;

use crate::error::{DeltaError, DeltaResult};

/// Minimum worker count when it is derived from the host.
pub const MIN_WORKER_THREADS: usize = 4;

/// Runs jobs on a fixed-size worker pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobScheduler {
    threads: usize,
}

impl JobScheduler {
    /// Creates a scheduler with `threads` workers (at least one).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Number of workers.
    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Dispatch order: descending `weight`, ties by index.
    #[must_use]
    pub fn dispatch_order<J, W>(jobs: &[J], weight: W) -> Vec<usize>
    where
        W: Fn(&J) -> u64,
    {
        let mut order: Vec<usize> = (0..jobs.len()).collect();
        order.sort_by(|&a, &b| weight(&jobs[b]).cmp(&weight(&jobs[a])).then(a.cmp(&b)));
        order
    }

    /// Runs `work` for every job and returns the results in job order.
    pub fn run<J, R, W, F>(&self, jobs: &[J], weight: W, work: F) -> DeltaResult<Vec<R>>
    where
        J: Sync,
        R: Send,
        W: Fn(&J) -> u64,
        F: Fn(usize, &J) -> R + Sync,
    {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|index| format!("delta-worker-{index}"))
            .build()
            .map_err(|error| DeltaError::WorkerPool(error.to_string()))?;

        let order = Self::dispatch_order(jobs, weight);
        let (sender, receiver) = unbounded();
        let work = &work;
        pool.scope_fifo(|scope| {
            for index in order {
                let sender = sender.clone();
                let job = &jobs[index];
                scope.spawn_fifo(move |_| {
                    // The receiver outlives the scope, so the send cannot fail.
                    let _ = sender.send((index, work(index, job)));
                });
            }
        });
        drop(sender);

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(jobs.len()).collect();
        for (index, result) in receiver {
            slots[index] = Some(result);
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| DeltaError::WorkerPool(format!("job {index} produced no result")))
            })
            .collect()
    }
}
