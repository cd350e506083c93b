use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{job_status_repo, Database, JobState};
use crate::error::{IntakeError, WorkerError};
use crate::stats::StatsSink;
use crate::submission::{
    ExhaustReason, ExhaustedJob, ExhaustionHandler, RetryDecision, RetryPolicy, SubmitClaimJob,
};

use super::job::{JobResult, SubmissionTask};
use super::retry_queue::{RetryQueue, RetryScheduler};

/// Claims with a job that has not reached a terminal state.
type InFlight = Arc<Mutex<HashSet<String>>>;

/// Runs submission jobs on a fixed set of threads.
///
/// Owns the retry loop: retryable failures go back through a delay queue
/// until the policy's budget runs out, then the exhaustion handler runs.
/// Only terminal results (success or exhausted) are reported.
pub struct WorkerPool {
    job_sender: Sender<SubmissionTask>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    retry_queue: RetryQueue,
    shutdown: Arc<AtomicBool>,
    in_flight: InFlight,
    db: Database,
}

/// Everything a worker thread needs, shared by all of them.
struct WorkerContext {
    job: Arc<SubmitClaimJob>,
    exhaustion: ExhaustionHandler,
    policy: RetryPolicy,
    db: Database,
    stats: Arc<dyn StatsSink>,
    retry_key: String,
    retries: RetryScheduler,
    in_flight: InFlight,
}

impl WorkerPool {
    /// Builds the job, exhaustion handler and retry policy from `config`.
    pub fn from_config(
        config: &Config,
        db: Database,
        stats: Arc<dyn StatsSink>,
    ) -> Result<Self, IntakeError> {
        let job = SubmitClaimJob::from_config(config, db.clone(), stats)?;
        let pool = Self::new(
            Arc::new(job),
            db,
            RetryPolicy::from(&config.retry),
            config.worker_count,
        )?;
        Ok(pool)
    }

    pub fn new(
        job: Arc<SubmitClaimJob>,
        db: Database,
        policy: RetryPolicy,
        worker_count: usize,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::SpawnFailed(
                "worker_count must be > 0".to_string(),
            ));
        }

        let (job_sender, job_receiver) = bounded::<SubmissionTask>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<JobResult>();
        let shutdown = Arc::new(AtomicBool::new(false));
        let in_flight: InFlight = Arc::new(Mutex::new(HashSet::new()));

        let retry_queue = RetryQueue::start(job_sender.clone(), Arc::clone(&shutdown))?;

        let stats = job.stats();
        let keys = job.stat_keys().clone();
        let context = Arc::new(WorkerContext {
            exhaustion: ExhaustionHandler::new(db.clone(), Arc::clone(&stats), keys.clone()),
            job,
            policy,
            db: db.clone(),
            stats,
            retry_key: keys.retry(),
            retries: retry_queue.scheduler(),
            in_flight: Arc::clone(&in_flight),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let job_rx = job_receiver.clone();
            let result_tx = result_sender.clone();
            let shutdown_flag = Arc::clone(&shutdown);
            let worker_context = Arc::clone(&context);

            let handle = thread::Builder::new()
                .name(format!("intake-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, job_rx, result_tx, shutdown_flag, worker_context);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            job_sender,
            result_receiver,
            workers,
            retry_queue,
            shutdown,
            in_flight,
            db,
        })
    }

    /// Queues a first execution for `claim_id` and returns its job id.
    ///
    /// Fails with [`WorkerError::AlreadyInFlight`] while an earlier job for
    /// the same claim is still queued, running or waiting to retry.
    pub fn submit(&self, claim_id: &str) -> Result<String, IntakeError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(WorkerError::ChannelClosed.into());
        }

        {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| WorkerError::ChannelClosed)?;
            if !in_flight.insert(claim_id.to_string()) {
                return Err(WorkerError::AlreadyInFlight(claim_id.to_string()).into());
            }
        }

        let task = SubmissionTask::new(claim_id);
        let job_id = task.job_id.clone();

        let queued = job_status_repo::upsert(&self.db, &job_id, claim_id, JobState::Queued, 0)
            .map_err(IntakeError::from)
            .and_then(|()| {
                self.job_sender
                    .send(task)
                    .map_err(|_| IntakeError::from(WorkerError::ChannelClosed))
            });
        if let Err(e) = queued {
            release_claim(&self.in_flight, claim_id);
            return Err(e);
        }

        debug!("Queued job {} for claim {}", job_id, claim_id);
        Ok(job_id)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    pub fn recv_result(&self) -> Option<JobResult> {
        self.result_receiver.recv().ok()
    }

    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<JobResult> {
        self.result_receiver.recv_timeout(timeout).ok()
    }

    /// Claims whose job has not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Stops the workers after their current job and waits for them.
    pub fn wait(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        self.retry_queue.join();

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

fn release_claim(in_flight: &InFlight, claim_id: &str) {
    match in_flight.lock() {
        Ok(mut set) => {
            set.remove(claim_id);
        }
        Err(poisoned) => {
            poisoned.into_inner().remove(claim_id);
        }
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<SubmissionTask>,
    result_sender: Sender<JobResult>,
    shutdown: Arc<AtomicBool>,
    context: Arc<WorkerContext>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match job_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                debug!(
                    "Worker {} processing claim {} (job {}, retry {})",
                    worker_id, task.claim_id, task.job_id, task.retry_count
                );

                if let Some(result) = process_task(&context, task) {
                    if let Err(e) = result_sender.send(result) {
                        error!("Worker {} failed to send result: {}", worker_id, e);
                        break;
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Runs one execution and applies the retry policy to its outcome. Returns
/// a result only when the job reached a terminal state.
fn process_task(context: &WorkerContext, task: SubmissionTask) -> Option<JobResult> {
    set_status(context, &task, JobState::Try);

    let error = match context.job.perform(&task.claim_id, &task.job_id) {
        Ok(outcome) => {
            set_status(context, &task, JobState::Success);
            release_claim(&context.in_flight, &task.claim_id);
            return Some(JobResult::success(&task, outcome.tracking_id));
        }
        Err(e) => e,
    };

    match context.policy.decide(task.retry_count, &error) {
        RetryDecision::Retry { retry_count, delay } => {
            set_status(context, &task, JobState::RetryableError);
            context.stats.increment(&context.retry_key);
            info!(
                "Claim {} will be retried in {}s (retry {}/{})",
                task.claim_id,
                delay.as_secs(),
                retry_count,
                context.policy.max_retries
            );
            if let Err(e) = context.retries.schedule(task.retry(retry_count), delay) {
                warn!(
                    "Retry for claim {} was dropped ({}); job {} stays at {}",
                    task.claim_id,
                    e,
                    task.job_id,
                    JobState::RetryableError
                );
                release_claim(&context.in_flight, &task.claim_id);
            }
            None
        }
        RetryDecision::Exhausted(reason) => Some(exhaust(context, &task, &error, reason)),
    }
}

fn exhaust(
    context: &WorkerContext,
    task: &SubmissionTask,
    error: &IntakeError,
    reason: ExhaustReason,
) -> JobResult {
    let message = error.to_string();
    let handled = context.exhaustion.handle(&ExhaustedJob {
        job_id: &task.job_id,
        claim_id: &task.claim_id,
        retry_count: task.retry_count,
        error_class: error.error_class(),
        error_message: &message,
        reason,
    });
    release_claim(&context.in_flight, &task.claim_id);
    let result = JobResult::exhausted(task, error, reason);
    match handled {
        Ok(_) => result,
        Err(e) => {
            error!(
                "Job {} for claim {} finished without a recorded exhaustion: {}",
                task.job_id, task.claim_id, e
            );
            result.with_exhaustion_error(&e)
        }
    }
}

fn set_status(context: &WorkerContext, task: &SubmissionTask, state: JobState) {
    if let Err(e) = job_status_repo::upsert(
        &context.db,
        &task.job_id,
        &task.claim_id,
        state,
        task.retry_count,
    ) {
        error!(
            "Failed to set job {} to {}: {}",
            task.job_id, state, e
        );
    }
}
