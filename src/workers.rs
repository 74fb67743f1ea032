//! Worker spawning and joining for the two shapes of parallelism
//! SPEC_FULL.md §5 allows beyond the single synchronous worker: the
//! bidirectional test (one extra worker for the reverse direction) and
//! the multi-port test (one worker per enabled port). Every worker owns
//! its own [`IoAdapter`] and result slot; nothing but this module's
//! final join is shared across them.

use std::future::Future;

use crate::error::{BenchError, Result};
use crate::utils::spawn_with_affinity;

/// One worker's unit of work: a thunk producing its result, plus an
/// optional CPU core to pin the worker to via `core_affinity`
/// (SPEC_FULL.md §5/§10's `spawn_with_affinity`).
pub struct WorkerJob<T> {
    pub core_id: Option<usize>,
    pub task: Box<dyn FnOnce() -> Result<T> + Send>,
}

impl<T> WorkerJob<T> {
    pub fn new(core_id: Option<usize>, task: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self { core_id, task: Box::new(task) }
    }
}

/// Runs every job to completion on its own pinned (or unpinned) worker,
/// via the donor-derived `spawn_with_affinity` helper, and returns
/// results in job order once all have joined. Requires a Tokio runtime
/// context (an already-running one, or see [`run_workers_blocking`]).
pub async fn run_workers<T: Send + 'static>(jobs: Vec<WorkerJob<T>>) -> Vec<Result<T>> {
    let mut handles = Vec::with_capacity(jobs.len());
    for job in jobs {
        let core_id = job.core_id;
        let task = job.task;
        handles.push(tokio::spawn(run_one(task, core_id)));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle.await {
            Ok(result) => result,
            Err(_) => Err(BenchError::Unsupported("worker task panicked".into())),
        });
    }
    results
}

fn run_one<T: Send + 'static>(task: Box<dyn FnOnce() -> Result<T> + Send>, core_id: Option<usize>) -> impl Future<Output = Result<T>> {
    async move {
        let outcome = spawn_with_affinity(
            async move { task().map_err(|e| anyhow::anyhow!(e.to_string())) },
            core_id,
        )
        .await;
        outcome.map_err(|e| BenchError::Unsupported(e.to_string()))
    }
}

/// Builds a small multi-thread Tokio runtime and blocks on
/// [`run_workers`]. Entry point for callers (the orchestrator layer)
/// that are not themselves running inside a Tokio context, matching the
/// donor's `main.rs` pattern of owning the one top-level runtime.
pub fn run_workers_blocking<T: Send + 'static>(jobs: Vec<WorkerJob<T>>) -> Vec<Result<T>> {
    let worker_count = jobs.len().max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_count)
        .enable_all()
        .build()
        .expect("failed to build worker-joining runtime");
    runtime.block_on(run_workers(jobs))
}

/// A worker job's result tagged with a wall-clock start timestamp, used
/// when result consumers want to correlate multi-port output against
/// external logs rather than just the run-relative pacing clock (the
/// one legitimate non-pacing use of `current_timestamp_ns`, per
/// DESIGN.md).
#[derive(Debug, Clone)]
pub struct TimestampedOutcome<T> {
    pub started_at_unix_ns: u64,
    pub outcome: Result<T>,
}

/// Wraps each job so its result is tagged with the wall-clock instant
/// the job actually began executing on its worker.
pub fn run_workers_blocking_timestamped<T: Send + 'static>(jobs: Vec<WorkerJob<T>>) -> Vec<TimestampedOutcome<T>> {
    let wrapped: Vec<WorkerJob<(u64, T)>> = jobs
        .into_iter()
        .map(|job| {
            let task = job.task;
            WorkerJob::new(job.core_id, move || {
                let started_at_unix_ns = crate::utils::current_timestamp_ns();
                task().map(|value| (started_at_unix_ns, value))
            })
        })
        .collect();

    run_workers_blocking(wrapped)
        .into_iter()
        .map(|res| match res {
            Ok((started_at_unix_ns, value)) => TimestampedOutcome { started_at_unix_ns, outcome: Ok(value) },
            Err(e) => TimestampedOutcome { started_at_unix_ns: crate::utils::current_timestamp_ns(), outcome: Err(e) },
        })
        .collect()
}
