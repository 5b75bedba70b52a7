//! Priority task queue, retry state machine and worker pool.

mod pool;
mod queue;
mod retry;
mod task;

pub use pool::{TaskHandler, WorkerPool};
pub use queue::{
    Completion, EnqueueOutcome, QueueError, QueueStats, TaskQueue, MAX_RETAINED_DEAD_LETTERS,
};
pub use retry::RetryPolicy;
pub use task::{Priority, Task, TaskError, TaskId, TaskKind, TaskState, TransitionError};
