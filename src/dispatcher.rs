//! Bounded-concurrency dispatcher for batch jobs.
//!
//! A fixed number of render workers drain the job's queue in order. Every
//! finished task produces one progress snapshot. The first failure stops
//! new work from being scheduled; tasks already running are allowed to
//! finish and the batch ends as failed.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinSet};

use crate::progress::{ProgressEstimator, ProgressSnapshot};
use crate::renderer::PageRenderer;
use crate::{BrowserBackend, Error, RenderOutcome, RenderTask, DEFAULT_CONCURRENCY};

/// A batch of pages rendered and packaged together
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub tasks: Vec<RenderTask>,
    pub archive_name: String,
    pub concurrency_limit: usize,
    pub started_at: Instant,
}

impl BatchJob {
    pub fn new(archive_name: impl Into<String>, tasks: Vec<RenderTask>) -> Self {
        Self {
            tasks,
            archive_name: archive_name.into(),
            concurrency_limit: DEFAULT_CONCURRENCY,
            started_at: Instant::now(),
        }
    }

    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Aggregate result of a batch run
#[derive(Debug)]
pub struct BatchReport {
    pub archive_name: String,
    /// Outcomes in completion order
    pub outcomes: Vec<RenderOutcome>,
    /// Number of tasks the job contained
    pub total: usize,
    pub elapsed: Duration,
}

impl BatchReport {
    /// True only when every task of the job ran and succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.len() == self.total && self.outcomes.iter().all(RenderOutcome::is_success)
    }

    /// The first failure observed, if any.
    pub fn first_failure(&self) -> Option<&RenderOutcome> {
        self.outcomes.iter().find(|o| !o.is_success())
    }

    /// Tasks that were never started because the batch aborted.
    pub fn unscheduled(&self) -> usize {
        self.total - self.outcomes.len()
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| o.output_path().map(PathBuf::from))
            .collect()
    }
}

/// Runs batch jobs against one shared renderer.
pub struct Dispatcher<B: BrowserBackend> {
    renderer: Arc<PageRenderer<B>>,
}

impl<B: BrowserBackend> Clone for Dispatcher<B> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
        }
    }
}

impl<B: BrowserBackend> Dispatcher<B> {
    pub fn new(renderer: Arc<PageRenderer<B>>) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &Arc<PageRenderer<B>> {
        &self.renderer
    }

    /// Run `job` to completion, sending a snapshot to `progress` after every
    /// finished task. A closed `progress` receiver does not stop the batch.
    pub async fn run(&self, job: BatchJob, progress: &mpsc::Sender<ProgressSnapshot>) -> BatchReport {
        let limit = job.concurrency_limit.max(1);
        let mut state = DispatchState::new(&job);
        let mut workers = JoinSet::new();

        for _ in 0..limit {
            if !state.spawn_next(&mut workers, &self.renderer) {
                break;
            }
        }

        while let Some(joined) = workers.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    state.running.remove(&id);
                    outcome
                }
                Err(join_err) => state.worker_fault(join_err),
            };

            let snapshot = state.record(outcome, job.started_at.elapsed());
            if progress.send(snapshot).await.is_err() {
                debug!("Progress receiver for {} went away", job.archive_name);
            }

            if !state.aborted {
                state.spawn_next(&mut workers, &self.renderer);
            }
        }

        if state.aborted {
            warn!(
                "Batch {} aborted: {} of {} tasks never started",
                job.archive_name,
                state.queue.len(),
                job.tasks.len()
            );
        }

        BatchReport {
            archive_name: job.archive_name,
            outcomes: state.outcomes,
            total: job.tasks.len(),
            elapsed: job.started_at.elapsed(),
        }
    }
}

/// Queue and aggregation owned by one `run` call
struct DispatchState {
    queue: VecDeque<RenderTask>,
    running: HashMap<Id, RenderTask>,
    outcomes: Vec<RenderOutcome>,
    estimator: ProgressEstimator,
    aborted: bool,
}

impl DispatchState {
    fn new(job: &BatchJob) -> Self {
        Self {
            queue: job.tasks.iter().cloned().collect(),
            running: HashMap::new(),
            outcomes: Vec::with_capacity(job.tasks.len()),
            estimator: ProgressEstimator::new(job.tasks.len()),
            aborted: false,
        }
    }

    /// Start the next queued task, if any. Returns whether one was started.
    fn spawn_next<B: BrowserBackend>(
        &mut self,
        workers: &mut JoinSet<RenderOutcome>,
        renderer: &Arc<PageRenderer<B>>,
    ) -> bool {
        let Some(task) = self.queue.pop_front() else {
            return false;
        };
        let renderer = Arc::clone(renderer);
        let worker_task = task.clone();
        let handle = workers.spawn(async move { renderer.render(worker_task).await });
        self.running.insert(handle.id(), task);
        true
    }

    /// Turn a crashed worker into a failed outcome for the task it ran.
    fn worker_fault(&mut self, join_err: tokio::task::JoinError) -> RenderOutcome {
        error!("Render worker crashed: {}", join_err);
        let task = self
            .running
            .remove(&join_err.id())
            .unwrap_or_else(|| RenderTask::new("<unknown>"));
        RenderOutcome {
            task,
            result: Err(Error::Other(format!("Render worker crashed: {}", join_err))),
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: RenderOutcome, elapsed: Duration) -> ProgressSnapshot {
        if !outcome.is_success() && !self.aborted {
            self.aborted = true;
            warn!(
                "Task {} failed, no further tasks will be scheduled",
                outcome.task.url
            );
        }
        self.outcomes.push(outcome);
        self.estimator.record_completion(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(url: &str, ok: bool) -> RenderOutcome {
        RenderOutcome {
            task: RenderTask::new(url),
            result: if ok {
                Ok(PathBuf::from(format!("{}.pdf", url)))
            } else {
                Err(Error::LoadError("net::ERR_NAME_NOT_RESOLVED".into()))
            },
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn report_requires_every_task() {
        let full = BatchReport {
            archive_name: "Book".into(),
            outcomes: vec![outcome("a", true), outcome("b", true)],
            total: 2,
            elapsed: Duration::from_secs(1),
        };
        assert!(full.is_success());
        assert_eq!(full.output_paths().len(), 2);

        let partial = BatchReport {
            archive_name: "Book".into(),
            outcomes: vec![outcome("a", true), outcome("b", false)],
            total: 5,
            elapsed: Duration::from_secs(1),
        };
        assert!(!partial.is_success());
        assert_eq!(partial.first_failure().map(|o| o.task.url.as_str()), Some("b"));
        assert_eq!(partial.unscheduled(), 3);
    }

    #[test]
    fn state_aborts_on_first_failure() {
        let job = BatchJob::new("Book", vec![RenderTask::new("a"), RenderTask::new("b")]);
        let mut state = DispatchState::new(&job);
        let first = state.record(outcome("a", false), Duration::from_secs(1));
        assert!(state.aborted);
        assert_eq!(first.completed, 1);
        let second = state.record(outcome("b", true), Duration::from_secs(2));
        assert_eq!(second.completed, 2);
        assert_eq!(second.percent, 100.0);
    }

    #[tokio::test]
    async fn crashed_worker_is_reported_against_its_task() {
        let job = BatchJob::new("Book", vec![RenderTask::new("a"), RenderTask::new("b")]);
        let mut state = DispatchState::new(&job);
        let mut workers: JoinSet<RenderOutcome> = JoinSet::new();
        let handle = workers.spawn(async { panic!("worker died") });
        state.running.insert(handle.id(), RenderTask::new("a"));

        let join_err = match workers.join_next().await {
            Some(Err(e)) => e,
            other => panic!("expected a crashed worker, got {:?}", other.map(|r| r.is_ok())),
        };
        let outcome = state.worker_fault(join_err);
        assert_eq!(outcome.task.url, "a");
        assert!(matches!(outcome.error(), Some(Error::Other(msg)) if msg.contains("crashed")));
        assert!(state.running.is_empty());

        state.record(outcome, Duration::from_secs(1));
        assert!(state.aborted);
    }

    #[test]
    fn concurrency_limit_is_at_least_one() {
        let job = BatchJob::new("Book", Vec::new()).with_concurrency_limit(0);
        assert_eq!(job.concurrency_limit, 1);
        assert!(job.is_empty());
    }
}
