use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use super::retry::RetryPolicy;

pub type TaskId = u64;

/// Work item carried by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    BalanceFetch { vault_id: i64 },
    PointsCalculation { vault_id: i64 },
}

impl TaskKind {
    pub fn vault_id(&self) -> i64 {
        match self {
            TaskKind::BalanceFetch { vault_id } | TaskKind::PointsCalculation { vault_id } => {
                *vault_id
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::BalanceFetch { .. } => "balance:fetch",
            TaskKind::PointsCalculation { .. } => "points:calculate",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(vault {})", self.name(), self.vault_id())
    }
}

/// Priority class. Dispatch between classes is weighted, see `TaskQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    Default,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Critical, Priority::Default, Priority::Low];

    pub fn index(self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::Default => 1,
            Priority::Low => 2,
        }
    }
}

/// Failure reported by a task handler.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Transient failure, retried with backoff
    #[error(transparent)]
    Retryable(#[from] anyhow::Error),
    /// Task exceeded its time budget, retried with backoff
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    /// Payload can never be processed, dead-lettered without retry
    #[error("malformed task: {0}")]
    Malformed(String),
    /// Handler panicked, dead-lettered without retry
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TaskError::Retryable(_) | TaskError::Timeout(_))
    }

    /// Message with the full context chain of transient failures.
    pub fn describe(&self) -> String {
        match self {
            TaskError::Retryable(e) => format!("{:#}", e),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Retrying { attempt: u32, next_eligible_at: Instant },
    DeadLettered,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("task {task_id}: invalid transition from {from:?} to {to}")]
pub struct TransitionError {
    pub task_id: TaskId,
    pub from: TaskState,
    pub to: &'static str,
}

/// A queued task and its retry state machine:
///
/// `Pending -> Running -> {Succeeded, Retrying, DeadLettered}`,
/// `Retrying -> Running` once the backoff elapsed.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub priority: Priority,
    /// Number of times the task started running
    pub attempt: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    state: TaskState,
}

impl Task {
    pub fn new(id: TaskId, kind: TaskKind, priority: Priority, max_retries: u32) -> Self {
        Self {
            id,
            kind,
            priority,
            attempt: 0,
            max_retries,
            last_error: None,
            state: TaskState::Pending,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self.state {
            TaskState::Pending | TaskState::Retrying { .. } => {
                self.attempt += 1;
                self.state = TaskState::Running;
                Ok(())
            },
            from => Err(self.invalid(from, "Running")),
        }
    }

    pub fn succeed(&mut self) -> Result<(), TransitionError> {
        match self.state {
            TaskState::Running => {
                self.state = TaskState::Succeeded;
                Ok(())
            },
            from => Err(self.invalid(from, "Succeeded")),
        }
    }

    /// Record a failed run. Retryable errors move to `Retrying` until the
    /// retry budget is spent; everything else dead-letters immediately.
    pub fn fail(
        &mut self,
        error: &TaskError,
        policy: &RetryPolicy,
        now: Instant,
    ) -> Result<TaskState, TransitionError> {
        if self.state != TaskState::Running {
            return Err(self.invalid(self.state, "Retrying/DeadLettered"));
        }

        self.last_error = Some(error.describe());
        let retries_used = self.attempt.saturating_sub(1);

        self.state = if error.is_retryable() && retries_used < self.max_retries {
            let retry = retries_used + 1;
            TaskState::Retrying {
                attempt: retry,
                next_eligible_at: now + policy.backoff(retry),
            }
        } else {
            TaskState::DeadLettered
        };

        Ok(self.state)
    }

    fn invalid(&self, from: TaskState, to: &'static str) -> TransitionError {
        TransitionError {
            task_id: self.id,
            from,
            to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(60))
    }

    fn transient() -> TaskError {
        TaskError::Retryable(anyhow::anyhow!("rpc down"))
    }

    #[test]
    fn test_retry_then_dead_letter() {
        let now = Instant::now();
        let mut task = Task::new(1, TaskKind::BalanceFetch { vault_id: 7 }, Priority::Default, 2);

        task.start().unwrap();
        assert_eq!(
            task.fail(&transient(), &policy(), now).unwrap(),
            TaskState::Retrying {
                attempt: 1,
                next_eligible_at: now + Duration::from_secs(1)
            }
        );

        task.start().unwrap();
        assert_eq!(
            task.fail(&transient(), &policy(), now).unwrap(),
            TaskState::Retrying {
                attempt: 2,
                next_eligible_at: now + Duration::from_secs(2)
            }
        );

        task.start().unwrap();
        assert_eq!(task.fail(&transient(), &policy(), now).unwrap(), TaskState::DeadLettered);
        assert_eq!(task.attempt, 3);
        assert_eq!(task.last_error.as_deref(), Some("rpc down"));
    }

    #[test]
    fn test_malformed_dead_letters_immediately() {
        let mut task = Task::new(1, TaskKind::PointsCalculation { vault_id: 0 }, Priority::Low, 5);
        task.start().unwrap();
        let state = task
            .fail(&TaskError::Malformed("bad vault id".into()), &policy(), Instant::now())
            .unwrap();
        assert_eq!(state, TaskState::DeadLettered);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut task = Task::new(9, TaskKind::BalanceFetch { vault_id: 1 }, Priority::Critical, 1);
        assert!(task.succeed().is_err());
        assert!(task.fail(&transient(), &policy(), Instant::now()).is_err());
        task.start().unwrap();
        assert!(task.start().is_err());
        task.succeed().unwrap();
        assert!(task.start().is_err());
        assert_eq!(task.state(), TaskState::Succeeded);
    }

    #[test]
    fn test_task_kind_wire_format() {
        let json = serde_json::to_string(&TaskKind::BalanceFetch { vault_id: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"balance_fetch","vault_id":3}"#);
    }
}
