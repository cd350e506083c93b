pub mod job;
pub mod pool;
pub mod retry_queue;

pub use job::{JobResult, SubmissionTask};
pub use pool::WorkerPool;
pub use retry_queue::{RetryQueue, RetryScheduler};
