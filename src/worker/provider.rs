use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use rustc_hash::FxHashMap;

use crate::chain::Chain;

/// Balance of one token held by an address.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub token: String,
    pub amount: f64,
}

/// Everything a provider reports for one (chain, address).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainBalances {
    pub tokens: Vec<TokenBalance>,
    pub lp_value: Option<f64>,
    pub nft_value: Option<f64>,
    pub swap_volume: Option<f64>,
}

impl ChainBalances {
    pub fn has_positions(&self) -> bool {
        self.lp_value.is_some() || self.nft_value.is_some() || self.swap_volume.is_some()
    }
}

/// Read-only balance lookup for one or more chains.
///
/// Implementations must be safe to call concurrently and must return an
/// error, never an empty or zero result, when the lookup itself failed.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn fetch_balances(&self, chain: &Chain, address: &str) -> anyhow::Result<ChainBalances>;
}

/// Routes lookups to the provider registered for each chain.
#[derive(Clone, Default)]
pub struct BalanceGateway {
    providers: FxHashMap<Chain, Arc<dyn BalanceProvider>>,
}

impl BalanceGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, chain: Chain, provider: Arc<dyn BalanceProvider>) {
        self.providers.insert(chain, provider);
    }

    pub fn supports(&self, chain: &Chain) -> bool {
        self.providers.contains_key(chain)
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.providers.keys().cloned().collect();
        chains.sort();
        chains
    }

    pub async fn fetch(&self, chain: &Chain, address: &str) -> anyhow::Result<ChainBalances> {
        let provider = self
            .providers
            .get(chain)
            .ok_or_else(|| anyhow!("No balance provider registered for {}", chain))?;
        provider.fetch_balances(chain, address).await
    }
}
