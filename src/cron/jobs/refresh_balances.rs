//! Job to re-enqueue balance fetches for every airdrop vault.
//!
//! Fetches land in the low priority class so a bulk refresh never delays
//! points recalculations. Vaults that already have a fetch queued or running
//! are coalesced by the queue.

use anyhow::{Context, Result};
use log::info;

use crate::{
    db::Store,
    queue::{EnqueueOutcome, Priority, TaskKind, TaskQueue},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub enqueued: usize,
    pub coalesced: usize,
}

pub async fn run(store: &dyn Store, queue: &TaskQueue) -> Result<RefreshSummary> {
    info!("Starting refresh_balances job...");
    let start = std::time::Instant::now();

    let vault_ids = store
        .airdrop_vault_ids()
        .await
        .context("Failed to list airdrop vaults")?;

    let mut summary = RefreshSummary::default();
    for vault_id in vault_ids {
        match queue
            .enqueue(TaskKind::BalanceFetch { vault_id }, Priority::Low)
            .context("Task queue rejected balance refresh")?
        {
            EnqueueOutcome::Enqueued(_) => summary.enqueued += 1,
            EnqueueOutcome::Coalesced => summary.coalesced += 1,
        }
    }

    info!(
        "refresh_balances completed: {} enqueued, {} already pending in {:?}",
        summary.enqueued,
        summary.coalesced,
        start.elapsed()
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::memory::MemoryStore, queue::RetryPolicy};

    #[tokio::test]
    async fn test_refresh_enqueues_opted_in_vaults_once() {
        let store = MemoryStore::new();
        store.add_vault(true).await;
        store.add_vault(false).await;
        store.add_vault(true).await;
        let queue = TaskQueue::new([6, 3, 1], RetryPolicy::default());

        let first = run(&store, &queue).await.unwrap();
        assert_eq!(first, RefreshSummary { enqueued: 2, coalesced: 0 });
        assert_eq!(queue.stats().ready[Priority::Low.index()], 2);

        let second = run(&store, &queue).await.unwrap();
        assert_eq!(second, RefreshSummary { enqueued: 0, coalesced: 2 });
    }

    #[tokio::test]
    async fn test_refresh_fails_on_closed_queue() {
        let store = MemoryStore::new();
        store.add_vault(true).await;
        let queue = TaskQueue::new([6, 3, 1], RetryPolicy::default());
        queue.close();

        assert!(run(&store, &queue).await.is_err());
    }
}
