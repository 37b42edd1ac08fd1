//! Background execution of a registration run.
//!
//! ```text
//!  caller (async)                         blocking worker
//! ┌──────────────────────┐  CancelToken  ┌──────────────────────────┐
//! │ RegistrationHandle   │──────────────►│ RegistrationPipeline     │
//! │   next_progress()    │◄──────────────│   progress callback      │
//! │   finish()           │  bounded mpsc │   owns the PatchMatcher  │
//! └──────────────────────┘               └──────────────────────────┘
//! ```
//!
//! The pipeline runs on a single `spawn_blocking` task. The matcher is moved
//! into that task and returned by [`RegistrationHandle::finish`], so it is
//! never touched from more than one thread. Progress events and the cancel
//! flag are the only signals crossing the boundary.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::matcher::PatchMatcher;
use super::pipeline::{RegistrationPipeline, RunOutcome};
use super::progress::ProgressEvent;
use crate::config::RegistrationConfig;
use crate::error::RegistrationError;

/// Everything a worker needs for one run.
#[derive(Debug)]
pub struct RegistrationJob<M> {
    pub config: RegistrationConfig,
    pub slices: Vec<PathBuf>,
    pub matcher: M,
}

/// Cooperative cancellation flag, polled once before each slice.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the slice in flight is still completed.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Run result paired with the matcher handed back by the worker.
pub type WorkerResult<M> = (Result<RunOutcome, RegistrationError>, M);

/// Handle to a running registration.
pub struct RegistrationHandle<M> {
    progress: mpsc::Receiver<ProgressEvent>,
    cancel: CancelToken,
    task: JoinHandle<WorkerResult<M>>,
}

/// Start `job` on a blocking worker thread.
///
/// At most `queue_capacity` progress events are buffered; once the queue is
/// full the worker waits for the caller to drain it. Must be called from
/// within a tokio runtime.
pub fn spawn_registration<M>(
    job: RegistrationJob<M>,
    queue_capacity: usize,
) -> RegistrationHandle<M>
where
    M: PatchMatcher + Send + 'static,
{
    spawn_registration_with(job, queue_capacity, CancelToken::new())
}

/// Like [`spawn_registration`], but observes an existing `cancel` token.
///
/// A token that is already cancelled stops the run before the first slice.
pub fn spawn_registration_with<M>(
    job: RegistrationJob<M>,
    queue_capacity: usize,
    cancel: CancelToken,
) -> RegistrationHandle<M>
where
    M: PatchMatcher + Send + 'static,
{
    let (tx, rx) = mpsc::channel(queue_capacity.max(1));
    let token = cancel.clone();

    let RegistrationJob {
        config,
        slices,
        matcher,
    } = job;

    let task = tokio::task::spawn_blocking(move || {
        info!("Registration worker started ({} slice(s))", slices.len());

        let report = move |event: ProgressEvent| {
            // A dropped receiver only means nobody is listening anymore
            if tx.blocking_send(event).is_err() {
                debug!("Progress receiver closed; dropping event");
            }
        };

        let is_cancelled = move || token.is_cancelled();
        let mut pipeline = RegistrationPipeline::new(config, matcher, report, is_cancelled);
        let result = pipeline.run(&slices);
        (result, pipeline.into_matcher())
    });

    RegistrationHandle {
        progress: rx,
        cancel,
        task,
    }
}

impl<M> RegistrationHandle<M> {
    /// Next progress event, or `None` once the worker has stopped reporting.
    pub async fn next_progress(&mut self) -> Option<ProgressEvent> {
        self.progress.recv().await
    }

    /// Token that cancels this run; can be cloned into other tasks.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the worker and return the run result together with the matcher.
    ///
    /// Unread progress events are discarded.
    pub async fn finish(self) -> Result<(RunOutcome, M), RegistrationError> {
        let (result, matcher) = self.join().await?;
        result.map(|outcome| (outcome, matcher))
    }

    /// Like [`finish`](Self::finish), but hands the matcher back even when the
    /// run aborted.
    pub async fn join(self) -> Result<WorkerResult<M>, RegistrationError> {
        let RegistrationHandle { progress, task, .. } = self;
        drop(progress);

        task.await.map_err(|e| RegistrationError::Worker(e.to_string()))
    }
}
