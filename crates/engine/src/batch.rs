//! Batch orchestrator
//!
//! Fans one job per item out to a bounded worker pool. Every job produces
//! exactly one [`JobResult`]; a failing or panicking job never cancels its
//! siblings.

use crate::error::{ErrorKind, MediaError};
use crate::paths::{classify, MediaKind, MediaPath};
use crate::progress::TerminalProgress;
use crate::transform::{Operation, Outcome, TransformEngine};
use media_batch_config::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};
use walkdir::WalkDir;

/// One unit of work: immutable once dispatched, owned by its worker.
#[derive(Debug, Clone)]
pub struct TransformJob {
    pub id: usize,
    pub operation: Arc<Operation>,
    pub input: MediaPath,
}

/// Outcome of one job
#[derive(Debug)]
pub struct JobResult {
    pub id: usize,
    pub input: PathBuf,
    pub outcome: Result<Outcome, MediaError>,
}

impl JobResult {
    pub fn state(&self) -> &'static str {
        match &self.outcome {
            Ok(Outcome::Written(_)) => "succeeded",
            Ok(Outcome::Unchanged { .. }) => "unchanged",
            Err(_) => "failed",
        }
    }

    /// `<input>: <kind>: <message>` for failed jobs
    pub fn failure_line(&self) -> Option<String> {
        self.outcome.as_ref().err().map(|e| {
            format!("{}: {}: {}", self.input.display(), e.kind(), e)
        })
    }
}

/// All results of one batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub results: Vec<JobResult>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.count("succeeded")
    }

    pub fn unchanged(&self) -> usize {
        self.count("unchanged")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    fn count(&self, state: &str) -> usize {
        self.results.iter().filter(|r| r.state() == state).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.outcome.is_err())
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn log_summary(&self, operation: &str) {
        for failure in self.failures() {
            if let Some(line) = failure.failure_line() {
                error!("{}", line);
            }
        }
        info!(
            "{}: {} succeeded, {} unchanged, {} failed",
            operation,
            self.succeeded(),
            self.unchanged(),
            self.failed()
        );
    }
}

/// Media files of `kind` directly inside `dir`, sorted by path.
pub fn discover(dir: &Path, kind: MediaKind) -> Result<Vec<MediaPath>, MediaError> {
    if !dir.is_dir() {
        return Err(MediaError::InvalidPath(dir.to_path_buf()));
    }

    let mut found: Vec<MediaPath> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry in {}: {}", dir.display(), err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| classify(path) == kind)
        .map(MediaPath::from_path)
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// Runs batches against a shared [`TransformEngine`] with at most
/// `max_workers` jobs in flight.
pub struct BatchOrchestrator {
    engine: Arc<TransformEngine>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    terminal_progress: bool,
}

impl BatchOrchestrator {
    pub fn new(engine: Arc<TransformEngine>, settings: &Settings) -> Self {
        let max_workers = settings.max_workers.max(1) as usize;
        Self {
            engine,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            terminal_progress: false,
        }
    }

    /// Draw a progress bar on stderr for single-item batches.
    pub fn with_terminal_progress(mut self, enabled: bool) -> Self {
        self.terminal_progress = enabled;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Get the number of available permits (free worker slots)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Try to acquire a permit without waiting
    ///
    /// Returns None if every worker slot is taken.
    pub fn try_acquire_permit(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    pub async fn run_batch(&self, items: Vec<MediaPath>, operation: Operation) -> BatchResult {
        let operation = Arc::new(operation);
        let jobs: Vec<TransformJob> = items
            .into_iter()
            .enumerate()
            .map(|(id, input)| TransformJob {
                id,
                operation: Arc::clone(&operation),
                input,
            })
            .collect();

        info!(
            "{}: {} item(s), up to {} at a time",
            operation.name(),
            jobs.len(),
            self.max_workers
        );

        let result = if jobs.len() == 1 {
            self.run_single(jobs).await
        } else {
            self.run_pooled(jobs).await
        };
        result.log_summary(operation.name());
        result
    }

    /// Single item: no pool, optionally with a progress bar.
    async fn run_single(&self, jobs: Vec<TransformJob>) -> BatchResult {
        let mut results = Vec::with_capacity(1);
        for job in jobs {
            let id = job.id;
            let input = job.input.path.clone();
            let engine = Arc::clone(&self.engine);
            let show_progress = self.terminal_progress;

            let handle = tokio::task::spawn_blocking(move || {
                if show_progress {
                    let label = job
                        .input
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let mut sink = TerminalProgress::new(label);
                    engine.execute(&job.input, &job.operation, Some(&mut sink))
                } else {
                    engine.execute(&job.input, &job.operation, None)
                }
            });

            results.push(JobResult {
                id,
                input,
                outcome: join_outcome(handle.await),
            });
        }
        BatchResult { results }
    }

    async fn run_pooled(&self, jobs: Vec<TransformJob>) -> BatchResult {
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            let id = job.id;
            let input = job.input.path.clone();
            let engine = Arc::clone(&self.engine);
            let semaphore = Arc::clone(&self.semaphore);

            let handle = tokio::spawn(async move {
                // held until the blocking work returns
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| MediaError::WorkerPanicked(format!("worker pool closed: {}", e)))?;

                let work = tokio::task::spawn_blocking(move || {
                    engine.execute(&job.input, &job.operation, None)
                });
                join_outcome(work.await)
            });
            handles.push((id, input, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (id, input, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(MediaError::WorkerPanicked(e.to_string())),
            };
            if let Err(e) = &outcome {
                if e.kind() == ErrorKind::WorkerPanicked {
                    error!("worker for {} panicked: {}", input.display(), e);
                }
            }
            results.push(JobResult { id, input, outcome });
        }

        BatchResult { results }
    }
}

fn join_outcome(
    joined: Result<Result<Outcome, MediaError>, tokio::task::JoinError>,
) -> Result<Outcome, MediaError> {
    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(MediaError::WorkerPanicked(panic_message(e))),
        Err(e) => Err(MediaError::WorkerPanicked(e.to_string())),
    }
}

fn panic_message(e: tokio::task::JoinError) -> String {
    let payload = e.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
