use async_trait::async_trait;
use log::debug;

use super::{balance_fetcher::BalanceFetcher, points::PointsCalculator};
use crate::queue::{Task, TaskError, TaskHandler, TaskKind};

/// Routes queued tasks to the balance fetcher or the points calculator.
pub struct TaskDispatcher {
    fetcher: BalanceFetcher,
    points: PointsCalculator,
}

impl TaskDispatcher {
    pub fn new(fetcher: BalanceFetcher, points: PointsCalculator) -> Self {
        Self { fetcher, points }
    }
}

#[async_trait]
impl TaskHandler for TaskDispatcher {
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        let vault_id = task.kind.vault_id();
        if vault_id <= 0 {
            return Err(TaskError::Malformed(format!("invalid vault id {}", vault_id)));
        }

        debug!("Running task {} {} (attempt {})", task.id, task.kind, task.attempt);

        match task.kind {
            TaskKind::BalanceFetch { .. } => self.fetcher.fetch(vault_id).await.map(|_| ()),
            TaskKind::PointsCalculation { .. } => self.points.calculate(vault_id).await.map(|_| ()),
        }
    }
}
