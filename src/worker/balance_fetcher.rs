use std::{collections::BTreeSet, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use moka::future::Cache;

use super::provider::{BalanceGateway, ChainBalances};
use crate::{
    chain::Chain,
    config::WorkerSettings,
    db::{
        models::{unix_now, Balance, PositionSnapshot, Vault},
        Store,
    },
    queue::{Priority, TaskError, TaskKind, TaskQueue},
    utils::normalize_address,
};

/// How long a resolved price id is reused before asking the store again
const PRICE_ID_TTL: Duration = Duration::from_secs(300);

/// Outcome of one (chain, address) lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome {
    /// Number of token balances returned
    Fetched(usize),
    Failed(String),
    /// No provider is registered for the chain
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainFetchResult {
    pub chain: Chain,
    pub address: String,
    pub outcome: ChainOutcome,
}

/// Summary of one balance fetch task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub vault_id: i64,
    pub chains: Vec<ChainFetchResult>,
    pub balances_written: usize,
    pub positions_written: usize,
}

impl FetchReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, ChainOutcome::Fetched(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ChainOutcome::Failed(_)))
    }

    fn count(&self, f: impl Fn(&ChainOutcome) -> bool) -> usize {
        self.chains.iter().filter(|c| f(&c.outcome)).count()
    }
}

/// Fetches every balance of a vault and records a new observation.
///
/// Lookups for distinct (chain, address) pairs run concurrently up to
/// `max_fanout`, each under its own timeout. One chain failing never discards
/// the others. A points recomputation is always enqueued afterwards, even when
/// every lookup failed, so the vault's points reflect whatever was persisted.
///
/// A fetch that finishes after shutdown began cannot enqueue its points
/// recomputation: the queue is closed, the request is dropped with a warning
/// and the new balances stay unscored until the startup refresh of the next
/// run fetches the vault again.
pub struct BalanceFetcher {
    store: Arc<dyn Store>,
    gateway: Arc<BalanceGateway>,
    queue: Arc<TaskQueue>,
    chain_timeout: Duration,
    max_fanout: usize,
    price_ids: Cache<(Chain, String), Option<i64>>,
}

impl BalanceFetcher {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<BalanceGateway>,
        queue: Arc<TaskQueue>,
        settings: &WorkerSettings,
    ) -> Self {
        let price_ids = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(PRICE_ID_TTL)
            .build();

        Self {
            store,
            gateway,
            queue,
            chain_timeout: Duration::from_secs(settings.chain_timeout_secs),
            max_fanout: settings.max_fanout.max(1),
            price_ids,
        }
    }

    pub async fn fetch(&self, vault_id: i64) -> Result<FetchReport, TaskError> {
        let mut report = FetchReport {
            vault_id,
            ..Default::default()
        };

        let Some(vault) = self
            .store
            .get_vault(vault_id)
            .await
            .context("Failed to load vault")?
        else {
            debug!("Vault {} not found, skipping balance fetch", vault_id);
            return Ok(report);
        };

        let coins = self
            .store
            .get_coins(vault.id)
            .await
            .context("Failed to load vault coins")?;
        if coins.is_empty() {
            debug!("Vault {} has no coins, skipping balance fetch", vault_id);
            return Ok(report);
        }

        let targets: BTreeSet<(Chain, String)> = coins
            .iter()
            .map(|coin| (coin.chain.clone(), normalize_address(&coin.chain, &coin.address)))
            .collect();

        let lookups = self.lookup_all(targets).await;
        let persisted = self.persist(&vault, &lookups, &mut report).await;

        if let Err(e) = self.queue.enqueue(
            TaskKind::PointsCalculation { vault_id: vault.id },
            Priority::Critical,
        ) {
            warn!(
                "Points calculation for vault {} not enqueued, scored on the next refresh: {}",
                vault.id, e
            );
        }

        persisted?;

        let attempted = report.succeeded() + report.failed();
        if attempted > 0 && report.succeeded() == 0 {
            let reasons = report
                .chains
                .iter()
                .filter_map(|c| match &c.outcome {
                    ChainOutcome::Failed(reason) => Some(reason.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(TaskError::Retryable(anyhow!(
                "All {} chain lookup(s) failed for vault {}: {}",
                attempted,
                vault.id,
                reasons
            )));
        }

        info!(
            "Vault {} balances fetched: {} chain(s) ok, {} failed, {} balance(s) written",
            vault.id,
            report.succeeded(),
            report.failed(),
            report.balances_written
        );

        Ok(report)
    }

    async fn lookup_all(
        &self,
        targets: BTreeSet<(Chain, String)>,
    ) -> Vec<(Chain, String, anyhow::Result<Option<ChainBalances>>)> {
        let mut lookups: Vec<_> = stream::iter(targets)
            .map(|(chain, address)| async move {
                let result = self.lookup(&chain, &address).await;
                (chain, address, result)
            })
            .buffer_unordered(self.max_fanout)
            .collect()
            .await;

        lookups.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        lookups
    }

    /// `Ok(None)` when no provider serves the chain.
    async fn lookup(&self, chain: &Chain, address: &str) -> anyhow::Result<Option<ChainBalances>> {
        if !self.gateway.supports(chain) {
            return Ok(None);
        }

        match tokio::time::timeout(self.chain_timeout, self.gateway.fetch(chain, address)).await {
            Ok(result) => result.map(Some),
            Err(_) => Err(anyhow!("{} lookup timed out after {:?}", chain, self.chain_timeout)),
        }
    }

    /// Write every successful lookup in one pass.
    async fn persist(
        &self,
        vault: &Vault,
        lookups: &[(Chain, String, anyhow::Result<Option<ChainBalances>>)],
        report: &mut FetchReport,
    ) -> Result<(), TaskError> {
        let date = unix_now();
        let mut balances = Vec::new();
        let mut positions = Vec::new();

        for (chain, address, result) in lookups {
            let outcome = match result {
                Ok(None) => {
                    debug!("No balance provider for {}, skipping {}", chain, address);
                    ChainOutcome::Unsupported
                },
                Ok(Some(fetched)) => {
                    for token in &fetched.tokens {
                        balances.push(Balance {
                            vault_id: vault.id,
                            ecdsa: vault.ecdsa.clone(),
                            eddsa: vault.eddsa.clone(),
                            chain: chain.clone(),
                            address: address.clone(),
                            token: token.token.clone(),
                            balance: token.amount,
                            date,
                            price_id: self.price_id(chain, &token.token).await?,
                        });
                    }
                    if fetched.has_positions() {
                        positions.push(PositionSnapshot {
                            vault_id: vault.id,
                            chain: chain.clone(),
                            address: address.clone(),
                            lp_value: fetched.lp_value.unwrap_or(0.0),
                            nft_value: fetched.nft_value.unwrap_or(0.0),
                            swap_volume: fetched.swap_volume.unwrap_or(0.0),
                            date,
                        });
                    }
                    ChainOutcome::Fetched(fetched.tokens.len())
                },
                Err(e) => {
                    warn!("Vault {} {} lookup for {} failed: {:#}", vault.id, chain, address, e);
                    ChainOutcome::Failed(format!("{}: {:#}", chain, e))
                },
            };

            report.chains.push(ChainFetchResult {
                chain: chain.clone(),
                address: address.clone(),
                outcome,
            });
        }

        if !balances.is_empty() {
            self.store
                .insert_balances(&balances)
                .await
                .context("Failed to insert balances")?;
            report.balances_written = balances.len();
        }
        if !positions.is_empty() {
            self.store
                .insert_positions(&positions)
                .await
                .context("Failed to insert positions")?;
            report.positions_written = positions.len();
        }

        Ok(())
    }

    async fn price_id(&self, chain: &Chain, token: &str) -> Result<Option<i64>, TaskError> {
        let key = (chain.clone(), token.to_string());
        if let Some(cached) = self.price_ids.get(&key).await {
            return Ok(cached);
        }

        let price_id = self
            .store
            .latest_price_id(chain, token)
            .await
            .with_context(|| format!("Failed to resolve price of {} on {}", token, chain))?;
        self.price_ids.insert(key, price_id).await;

        Ok(price_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory::MemoryStore,
        queue::RetryPolicy,
        worker::provider::testing::ScriptedProvider,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        queue: Arc<TaskQueue>,
        fetcher: BalanceFetcher,
    }

    fn harness(store: Arc<MemoryStore>, gateway: BalanceGateway) -> Harness {
        let queue = Arc::new(TaskQueue::new([6, 3, 1], RetryPolicy::default()));
        let settings = WorkerSettings {
            chain_timeout_secs: 2,
            ..Default::default()
        };
        let fetcher = BalanceFetcher::new(store.clone(), Arc::new(gateway), queue.clone(), &settings);
        Harness {
            store,
            queue,
            fetcher,
        }
    }

    async fn vault_on(store: &MemoryStore, chains: &[Chain]) -> Vault {
        let vault = store.add_vault(true).await;
        for chain in chains {
            store
                .add_coin(vault.id, chain.clone(), &format!("{}-addr", chain), chain.as_str())
                .await;
        }
        vault
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successful_chains() {
        let chains = [Chain::Bitcoin, Chain::Ethereum, Chain::Solana];
        let store = Arc::new(MemoryStore::new());
        let vault = vault_on(&store, &chains).await;
        let gateway = ScriptedProvider::default()
            .with_balance(Chain::Bitcoin, "BTC", 0.5)
            .with_balance(Chain::Solana, "SOL", 10.0)
            .with_positions(Chain::Solana, 5.0, 1.0, 200.0)
            .failing(Chain::Ethereum)
            .gateway(&chains);
        let h = harness(store, gateway);

        let report = h.fetcher.fetch(vault.id).await.unwrap();
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.balances_written, 2);
        assert_eq!(report.positions_written, 1);

        let balances = h.store.balances().await;
        let mut chains_written: Vec<_> = balances.iter().map(|b| b.chain.clone()).collect();
        chains_written.sort();
        assert_eq!(chains_written, vec![Chain::Bitcoin, Chain::Solana]);
        // One observation time for the whole fetch
        assert!(balances.iter().all(|b| b.date == balances[0].date));

        assert_eq!(h.queue.stats().ready[Priority::Critical.index()], 1);
    }

    #[tokio::test]
    async fn test_total_failure_retries_and_still_enqueues_points() {
        let chains = [Chain::Bitcoin, Chain::Ethereum];
        let store = Arc::new(MemoryStore::new());
        let vault = vault_on(&store, &chains).await;
        let gateway = ScriptedProvider::default()
            .failing(Chain::Bitcoin)
            .failing(Chain::Ethereum)
            .gateway(&chains);
        let h = harness(store, gateway);

        let err = h.fetcher.fetch(vault.id).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.describe().contains("All 2 chain lookup(s) failed"));
        assert!(h.store.balances().await.is_empty());
        assert_eq!(h.queue.stats().ready[Priority::Critical.index()], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_chain_times_out() {
        let chains = [Chain::Bitcoin, Chain::Ethereum];
        let store = Arc::new(MemoryStore::new());
        let vault = vault_on(&store, &chains).await;
        let gateway = ScriptedProvider::default()
            .with_balance(Chain::Bitcoin, "BTC", 1.0)
            .hanging(Chain::Ethereum)
            .gateway(&chains);
        let h = harness(store, gateway);

        let report = h.fetcher.fetch(vault.id).await.unwrap();
        let eth = report
            .chains
            .iter()
            .find(|c| c.chain == Chain::Ethereum)
            .unwrap();
        assert!(matches!(&eth.outcome, ChainOutcome::Failed(reason) if reason.contains("timed out")));
        assert_eq!(report.balances_written, 1);
    }

    #[tokio::test]
    async fn test_missing_vault_and_empty_vault_are_noops() {
        let store = Arc::new(MemoryStore::new());
        let empty = store.add_vault(true).await;
        let h = harness(store, BalanceGateway::new());

        assert_eq!(h.fetcher.fetch(999).await.unwrap().chains.len(), 0);
        assert_eq!(h.fetcher.fetch(empty.id).await.unwrap().chains.len(), 0);
        assert_eq!(h.queue.stats(), Default::default());
    }

    #[tokio::test]
    async fn test_coins_sharing_an_address_are_fetched_once() {
        let store = Arc::new(MemoryStore::new());
        let vault = store.add_vault(true).await;
        store.add_coin(vault.id, Chain::Ethereum, "0xAbC", "ETH").await;
        store.add_coin(vault.id, Chain::Ethereum, "0xabc", "USDC").await;
        store.add_coin(vault.id, Chain::Bitcoin, "bc1q", "BTC").await;

        let provider = Arc::new(
            ScriptedProvider::default()
                .with_balance(Chain::Ethereum, "ETH", 1.0)
                .with_balance(Chain::Ethereum, "USDC", 100.0),
        );
        let mut gateway = BalanceGateway::new();
        gateway.register(Chain::Ethereum, provider.clone());
        let h = harness(store, gateway);

        let report = h.fetcher.fetch(vault.id).await.unwrap();
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
        assert_eq!(report.balances_written, 2);
        let btc = report.chains.iter().find(|c| c.chain == Chain::Bitcoin).unwrap();
        assert_eq!(btc.outcome, ChainOutcome::Unsupported);
    }

    #[tokio::test]
    async fn test_balances_reference_latest_price() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_on(&store, &[Chain::Ethereum]).await;
        store.add_price(Chain::Ethereum, "ETH", 2000.0).await;
        let latest = store.add_price(Chain::Ethereum, "ETH", 2100.0).await;
        let gateway = ScriptedProvider::default()
            .with_balance(Chain::Ethereum, "ETH", 2.0)
            .with_balance(Chain::Ethereum, "PEPE", 1e9)
            .gateway(&[Chain::Ethereum]);
        let h = harness(store, gateway);

        h.fetcher.fetch(vault.id).await.unwrap();
        let balances = h.store.balances().await;
        let eth = balances.iter().find(|b| b.token == "ETH").unwrap();
        let pepe = balances.iter().find(|b| b.token == "PEPE").unwrap();
        assert_eq!(eth.price_id, Some(latest.id));
        assert_eq!(pepe.price_id, None);
    }

    #[tokio::test]
    async fn test_write_failure_is_retryable() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_on(&store, &[Chain::Ethereum]).await;
        store.set_fail_writes(true);
        let gateway = ScriptedProvider::default()
            .with_balance(Chain::Ethereum, "ETH", 2.0)
            .gateway(&[Chain::Ethereum]);
        let h = harness(store, gateway);

        let err = h.fetcher.fetch(vault.id).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.queue.stats().ready[Priority::Critical.index()], 1);
    }

    #[tokio::test]
    async fn test_fetch_during_shutdown_still_persists() {
        let store = Arc::new(MemoryStore::new());
        let vault = vault_on(&store, &[Chain::Ethereum]).await;
        let gateway = ScriptedProvider::default()
            .with_balance(Chain::Ethereum, "ETH", 2.0)
            .gateway(&[Chain::Ethereum]);
        let h = harness(store, gateway);
        h.queue.close();

        let report = h.fetcher.fetch(vault.id).await.unwrap();
        assert_eq!(report.balances_written, 1);
        assert_eq!(h.store.balances().await.len(), 1);
        assert_eq!(h.queue.stats().ready, [0, 0, 0]);
    }
}
