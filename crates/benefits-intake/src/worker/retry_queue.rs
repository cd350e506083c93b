use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use crate::error::WorkerError;

use super::job::SubmissionTask;

/// Longest the queue thread sleeps before re-checking the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Scheduled {
    due: Instant,
    seq: u64,
    task: SubmissionTask,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Handle for scheduling delayed retries. Cheap to clone.
#[derive(Clone)]
pub struct RetryScheduler {
    sender: Sender<(SubmissionTask, Instant)>,
    pending: Arc<AtomicUsize>,
}

impl RetryScheduler {
    /// Queues `task` to be re-submitted once `delay` has passed.
    pub fn schedule(&self, task: SubmissionTask, delay: Duration) -> Result<(), WorkerError> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send((task, Instant::now() + delay))
            .map_err(|_| {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                WorkerError::ChannelClosed
            })
    }

    /// Retries waiting for their due time.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Holds retries until they are due, then feeds them back into the job
/// channel. Retries still waiting at shutdown are dropped; their job status
/// rows stay at `retryable_error`.
pub struct RetryQueue {
    scheduler: RetryScheduler,
    handle: JoinHandle<()>,
}

impl RetryQueue {
    pub fn start(
        target: Sender<SubmissionTask>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let (sender, receiver) = unbounded();
        let pending = Arc::new(AtomicUsize::new(0));
        let thread_pending = Arc::clone(&pending);

        let handle = thread::Builder::new()
            .name("retry-queue".to_string())
            .spawn(move || run_queue(receiver, target, shutdown, thread_pending))
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(Self {
            scheduler: RetryScheduler { sender, pending },
            handle,
        })
    }

    pub fn scheduler(&self) -> RetryScheduler {
        self.scheduler.clone()
    }

    /// Waits for the queue thread. Returns once the shutdown flag is set.
    pub fn join(self) {
        drop(self.scheduler);
        if let Err(e) = self.handle.join() {
            error!("Retry queue panicked: {:?}", e);
        }
    }
}

fn run_queue(
    receiver: Receiver<(SubmissionTask, Instant)>,
    target: Sender<SubmissionTask>,
    shutdown: Arc<AtomicBool>,
    pending: Arc<AtomicUsize>,
) {
    debug!("Retry queue started");
    let mut heap: BinaryHeap<Reverse<Scheduled>> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let now = Instant::now();
        while heap.peek().is_some_and(|Reverse(next)| next.due <= now) {
            let Some(Reverse(next)) = heap.pop() else {
                break;
            };
            pending.fetch_sub(1, Ordering::SeqCst);
            debug!(
                "Releasing retry {} of job {}",
                next.task.retry_count, next.task.job_id
            );
            if target.send(next.task).is_err() {
                debug!("Job channel closed, retry queue stopping");
                return;
            }
        }

        let wait = heap
            .peek()
            .map(|Reverse(next)| next.due.saturating_duration_since(now))
            .unwrap_or(POLL_INTERVAL)
            .min(POLL_INTERVAL);

        match receiver.recv_timeout(wait) {
            Ok((task, due)) => {
                heap.push(Reverse(Scheduled { due, seq, task }));
                seq += 1;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                if heap.is_empty() {
                    break;
                }
                thread::sleep(wait);
            }
        }
    }

    if !heap.is_empty() {
        warn!("Dropping {} scheduled retries on shutdown", heap.len());
    }
    debug!("Retry queue stopped");
}
