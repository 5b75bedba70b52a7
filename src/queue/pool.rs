use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::FutureExt;
use log::{error, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{
    queue::{Completion, TaskQueue},
    task::{Task, TaskError},
};
use crate::db::Store;

/// Processes one dequeued task.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}

/// Fixed-size pool of workers pulling from a [`TaskQueue`].
///
/// Each worker runs one task at a time under a task-level timeout. Handler
/// errors, timeouts and panics are reported back to the queue and never stop
/// the worker. Dead-lettered tasks are persisted for operators.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        queue: Arc<TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        store: Arc<dyn Store>,
        concurrency: usize,
        task_timeout: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        let handles = (0..concurrency.max(1))
            .map(|worker_id| {
                let queue = queue.clone();
                let handler = handler.clone();
                let store = store.clone();
                let token = cancellation_token.child_token();
                tokio::spawn(async move {
                    run_worker(worker_id, queue, handler, store, task_timeout, token).await;
                })
            })
            .collect::<Vec<_>>();

        info!("Worker pool started with {} worker(s)", handles.len());

        Self { queue, handles }
    }

    /// Stop taking new tasks and wait for in-flight tasks to finish.
    pub async fn shutdown(self) {
        self.queue.close();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Worker exited abnormally: {}", e);
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    store: Arc<dyn Store>,
    task_timeout: Duration,
    cancellation_token: CancellationToken,
) {
    while let Some(task) = queue.dequeue(&cancellation_token).await {
        let result = run_task(handler.as_ref(), &task, task_timeout).await;
        let label = task.kind.to_string();
        let attempt = task.attempt;

        match queue.complete(task, result) {
            Completion::Succeeded => {},
            Completion::Retrying { attempt: retry, delay } => {
                warn!(
                    "[worker {}] {} failed (attempt {}), retry {} in {:?}",
                    worker_id, label, attempt, retry, delay
                );
            },
            Completion::DeadLettered(dead_letter) => {
                error!(
                    "[worker {}] {} dead-lettered after {} attempt(s): {}",
                    worker_id, label, dead_letter.attempts, dead_letter.error
                );
                if let Err(e) = store.record_dead_letter(&dead_letter).await {
                    error!("Failed to persist dead letter for task {}: {:#}", dead_letter.task_id, e);
                }
            },
        }
    }
}

async fn run_task(handler: &dyn TaskHandler, task: &Task, task_timeout: Duration) -> Result<(), TaskError> {
    let guarded = AssertUnwindSafe(handler.handle(task)).catch_unwind();

    match tokio::time::timeout(task_timeout, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Panicked(message))
        },
        Err(_) => Err(TaskError::Timeout(task_timeout)),
    }
}
