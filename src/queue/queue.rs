use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chrono::Utc;
use log::{debug, error, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tokio::{sync::Notify, time::Instant};
use tokio_util::sync::CancellationToken;

use super::{
    retry::RetryPolicy,
    task::{Priority, Task, TaskError, TaskId, TaskKind, TaskState},
};
use crate::db::models::DeadLetter;

/// Most recent dead letters kept in memory; every one is also persisted
pub const MAX_RETAINED_DEAD_LETTERS: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(TaskId),
    /// An equivalent task is already queued or running
    Coalesced,
}

/// What happened to a task after its handler returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Succeeded,
    Retrying { attempt: u32, delay: Duration },
    DeadLettered(DeadLetter),
}

/// Snapshot of queue occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub ready: [usize; 3],
    pub delayed: usize,
    pub running: usize,
    /// Tasks dead-lettered since the queue was created
    pub dead_letters: usize,
}

struct QueueState {
    ready: [VecDeque<Task>; 3],
    /// Tasks waiting for their backoff, ordered by eligibility
    delayed: BTreeMap<(Instant, TaskId), Task>,
    /// Vaults with a balance fetch queued, retrying or running
    fetch_keys: FxHashSet<i64>,
    /// Vaults with a points calculation queued, retrying or running
    points_keys: FxHashSet<i64>,
    /// Vaults whose points calculation is running right now
    running_points: FxHashSet<i64>,
    /// Points requests that arrived while the vault's calculation was running
    points_reruns: FxHashMap<i64, Priority>,
    running: usize,
    dead_letters: VecDeque<DeadLetter>,
    dead_letter_count: usize,
    slots: Vec<Priority>,
    cursor: usize,
    next_id: TaskId,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let task = entry.remove();
            self.ready[task.priority.index()].push_back(task);
        }
    }

    /// Weighted round robin over the slot cycle, skipping empty classes.
    fn pick(&mut self) -> Option<Task> {
        let len = self.slots.len();
        for step in 0..len {
            let idx = (self.cursor + step) % len;
            let priority = self.slots[idx];
            if let Some(task) = self.ready[priority.index()].pop_front() {
                self.cursor = (idx + 1) % len;
                return Some(task);
            }
        }
        None
    }

    fn push(&mut self, kind: TaskKind, priority: Priority, max_retries: u32) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.ready[priority.index()].push_back(Task::new(id, kind, priority, max_retries));
        id
    }

    /// Drop the dedup key of a finished task. Returns the points rerun owed
    /// to the vault, if any.
    fn release(&mut self, kind: &TaskKind) -> Option<Priority> {
        match kind {
            TaskKind::BalanceFetch { vault_id } => {
                self.fetch_keys.remove(vault_id);
                None
            },
            TaskKind::PointsCalculation { vault_id } => {
                self.points_keys.remove(vault_id);
                self.points_reruns.remove(vault_id)
            },
        }
    }

    fn record_dead_letter(&mut self, dead_letter: DeadLetter) {
        if self.dead_letters.len() == MAX_RETAINED_DEAD_LETTERS {
            self.dead_letters.pop_front();
        }
        self.dead_letters.push_back(dead_letter);
        self.dead_letter_count += 1;
    }
}

/// In-process priority task queue.
///
/// - Three priority classes dispatched by weight (e.g. 6:3:1) with every
///   class present in the cycle, so low priority work is never starved.
/// - At most one task of each kind per vault is queued, retrying or running
///   at a time; duplicate requests are coalesced. A points request arriving
///   while the vault's calculation runs is queued again once it finishes, so
///   the last write always sees the newest balances.
/// - Failed tasks are retried with exponential backoff and dead-lettered once
///   the retry budget is spent.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    policy: RetryPolicy,
}

impl TaskQueue {
    /// Weights are given as `[critical, default, low]`; zero weights are
    /// raised to one.
    pub fn new(weights: [u32; 3], policy: RetryPolicy) -> Self {
        let slots = Priority::ALL
            .iter()
            .flat_map(|p| std::iter::repeat(*p).take(weights[p.index()].max(1) as usize))
            .collect();

        Self {
            state: Mutex::new(QueueState {
                ready: Default::default(),
                delayed: BTreeMap::new(),
                fetch_keys: FxHashSet::default(),
                points_keys: FxHashSet::default(),
                running_points: FxHashSet::default(),
                points_reruns: FxHashMap::default(),
                running: 0,
                dead_letters: VecDeque::new(),
                dead_letter_count: 0,
                slots,
                cursor: 0,
                next_id: 1,
                closed: false,
            }),
            notify: Notify::new(),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, kind: TaskKind, priority: Priority) -> Result<EnqueueOutcome, QueueError> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }

        let fresh = match kind {
            TaskKind::BalanceFetch { vault_id } => state.fetch_keys.insert(vault_id),
            TaskKind::PointsCalculation { vault_id } => {
                let fresh = state.points_keys.insert(vault_id);
                if !fresh && state.running_points.contains(&vault_id) {
                    let rerun = state.points_reruns.entry(vault_id).or_insert(priority);
                    if priority.index() < rerun.index() {
                        *rerun = priority;
                    }
                }
                fresh
            },
        };
        if !fresh {
            debug!("Coalesced {} into an existing task", kind);
            return Ok(EnqueueOutcome::Coalesced);
        }

        let id = state.push(kind, priority, self.policy.max_retries);
        drop(state);

        self.notify.notify_one();
        Ok(EnqueueOutcome::Enqueued(id))
    }

    /// Wait for the next eligible task.
    ///
    /// Returns `None` once the queue is closed or `cancel` fires. Tasks still
    /// waiting at that point are left unprocessed.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<Task> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wakeup = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }

                state.promote_due(Instant::now());
                if let Some(mut task) = state.pick() {
                    if let Err(e) = task.start() {
                        error!("{}", e);
                        state.release(&task.kind);
                        continue;
                    }
                    if let TaskKind::PointsCalculation { vault_id } = task.kind {
                        state.running_points.insert(vault_id);
                    }
                    state.running += 1;
                    return Some(task);
                }

                state.delayed.keys().next().map(|(at, _)| *at)
            };

            match next_wakeup {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(at) => {},
                        _ = cancel.cancelled() => return None,
                    }
                },
                None => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = cancel.cancelled() => return None,
                    }
                },
            }
        }
    }

    /// Report the outcome of a task previously returned by [`dequeue`](Self::dequeue).
    pub fn complete(&self, mut task: Task, result: Result<(), TaskError>) -> Completion {
        let now = Instant::now();
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
        if let TaskKind::PointsCalculation { vault_id } = task.kind {
            state.running_points.remove(&vault_id);
        }

        let error = match result {
            Ok(()) => {
                if let Err(e) = task.succeed() {
                    warn!("{}", e);
                }
                let rerun = state.release(&task.kind);
                drop(state);
                self.requeue(task.kind, rerun);
                return Completion::Succeeded;
            },
            Err(error) => error,
        };

        match task.fail(&error, &self.policy, now) {
            Ok(TaskState::Retrying {
                attempt,
                next_eligible_at,
            }) => {
                // The retry reads fresh balances, no extra run needed
                if let TaskKind::PointsCalculation { vault_id } = task.kind {
                    state.points_reruns.remove(&vault_id);
                }
                let delay = next_eligible_at.saturating_duration_since(now);
                state.delayed.insert((next_eligible_at, task.id), task);
                drop(state);
                self.notify.notify_one();
                Completion::Retrying { attempt, delay }
            },
            Ok(_) | Err(_) => {
                let rerun = state.release(&task.kind);
                let dead_letter = DeadLetter {
                    task_id: task.id,
                    kind: task.kind.name().to_string(),
                    vault_id: task.kind.vault_id(),
                    attempts: task.attempt,
                    error: error.describe(),
                    dead_lettered_at: Utc::now(),
                };
                state.record_dead_letter(dead_letter.clone());
                drop(state);
                self.requeue(task.kind, rerun);
                Completion::DeadLettered(dead_letter)
            },
        }
    }

    fn requeue(&self, kind: TaskKind, rerun: Option<Priority>) {
        let Some(priority) = rerun else {
            return;
        };
        match self.enqueue(kind, priority) {
            Ok(_) => debug!("Queued {} again for requests made while it ran", kind),
            Err(e) => debug!("Dropped rerun of {}: {}", kind, e),
        }
    }

    /// Stop accepting tasks and wake every waiting worker.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let abandoned: usize =
            state.ready.iter().map(VecDeque::len).sum::<usize>() + state.delayed.len();
        drop(state);

        if abandoned > 0 {
            warn!("Task queue closed with {} task(s) not started", abandoned);
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Most recent dead letters, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock().dead_letters.iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        QueueStats {
            ready: [state.ready[0].len(), state.ready[1].len(), state.ready[2].len()],
            delayed: state.delayed.len(),
            running: state.running,
            dead_letters: state.dead_letter_count,
        }
    }
}
