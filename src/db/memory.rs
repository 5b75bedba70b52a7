//! In-memory [`Store`] used by unit tests.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::bail;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::RwLock;

use super::{
    models::{
        unix_now, Balance, Coin, DeadLetter, PositionSnapshot, Price, PricedBalance, SeasonStats,
        Vault,
    },
    store::{LeaderTotals, SeasonLeader, Store},
};
use crate::{chain::Chain, ranking::compare_by_points, worker::PointsBreakdown};

#[derive(Default)]
struct Inner {
    vaults: BTreeMap<i64, Vault>,
    coins: Vec<Coin>,
    balances: Vec<Balance>,
    positions: Vec<PositionSnapshot>,
    prices: Vec<Price>,
    season_stats: Vec<SeasonStats>,
    dead_letters: Vec<DeadLetter>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn ordered_leaders(&self) -> Vec<&Vault> {
        let mut vaults: Vec<&Vault> = self.vaults.values().filter(|v| v.join_airdrop).collect();
        vaults.sort_by(|a, b| compare_by_points(a.total_points, a.id, b.total_points, b.id));
        vaults
    }

    fn ordered_season(&self, season_id: u32) -> Vec<&SeasonStats> {
        let mut stats: Vec<&SeasonStats> = self
            .season_stats
            .iter()
            .filter(|s| s.season_id == season_id)
            .collect();
        stats.sort_by(|a, b| compare_by_points(a.points, a.vault_id, b.points, b.vault_id));
        stats
    }
}

fn page<T: Clone>(items: Vec<&T>, from: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(from.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every observation write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn add_vault(&self, join_airdrop: bool) -> Vault {
        let mut inner = self.inner.write().await;
        let id = inner.next_id();
        let vault = Vault {
            id,
            ecdsa: format!("ecdsa-{}", id),
            eddsa: format!("eddsa-{}", id),
            name: format!("Vault {}", id),
            alias: String::new(),
            uid: format!("uid-{:08}-abcdef", id),
            hex_chain_code: String::new(),
            total_points: 0.0,
            join_airdrop,
            current_season_id: 0,
            balance: 0.0,
            lp_value: 0.0,
            nft_value: 0.0,
            swap_volume: 0.0,
            referral_code: String::new(),
            referral_count: 0,
            avatar_url: String::new(),
            show_name_in_leaderboard: true,
            created_at: Utc
                .timestamp_opt(1_700_000_000 + id, 0)
                .single()
                .unwrap_or_else(Utc::now),
        };
        inner.vaults.insert(id, vault.clone());
        vault
    }

    pub async fn update_vault(&self, vault: Vault) {
        self.inner.write().await.vaults.insert(vault.id, vault);
    }

    pub async fn add_coin(&self, vault_id: i64, chain: Chain, address: &str, ticker: &str) -> Coin {
        let mut inner = self.inner.write().await;
        let coin = Coin {
            id: inner.next_id(),
            vault_id,
            chain,
            address: address.to_string(),
            hex_public_key: String::new(),
            ticker: ticker.to_string(),
            contract_address: String::new(),
            decimals: 18,
            is_native: true,
        };
        inner.coins.push(coin.clone());
        coin
    }

    pub async fn add_price(&self, chain: Chain, token: &str, price_usd: f64) -> Price {
        let mut inner = self.inner.write().await;
        let price = Price {
            id: inner.next_id(),
            chain,
            token: token.to_string(),
            price_usd,
            updated_at: unix_now(),
        };
        inner.prices.push(price.clone());
        price
    }

    /// Record a balance referencing the latest known price of the token.
    pub async fn add_balance(&self, vault_id: i64, chain: Chain, token: &str, amount: f64) {
        let price_id = self
            .latest_price_id(&chain, token)
            .await
            .ok()
            .flatten();
        self.inner.write().await.balances.push(Balance {
            vault_id,
            ecdsa: String::new(),
            eddsa: String::new(),
            chain,
            address: String::new(),
            token: token.to_string(),
            balance: amount,
            date: unix_now(),
            price_id,
        });
    }

    pub async fn add_season_stats(&self, stats: SeasonStats) {
        self.inner.write().await.season_stats.push(stats);
    }

    pub async fn balances(&self) -> Vec<Balance> {
        self.inner.read().await.balances.clone()
    }

    pub async fn positions(&self) -> Vec<PositionSnapshot> {
        self.inner.read().await.positions.clone()
    }

    pub async fn all_season_stats(&self) -> Vec<SeasonStats> {
        self.inner.read().await.season_stats.clone()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.read().await.dead_letters.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_vault(&self, vault_id: i64) -> anyhow::Result<Option<Vault>> {
        Ok(self.inner.read().await.vaults.get(&vault_id).cloned())
    }

    async fn get_coins(&self, vault_id: i64) -> anyhow::Result<Vec<Coin>> {
        let inner = self.inner.read().await;
        Ok(inner.coins.iter().filter(|c| c.vault_id == vault_id).cloned().collect())
    }

    async fn airdrop_vault_ids(&self) -> anyhow::Result<Vec<i64>> {
        let inner = self.inner.read().await;
        Ok(inner.vaults.values().filter(|v| v.join_airdrop).map(|v| v.id).collect())
    }

    async fn insert_balances(&self, balances: &[Balance]) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("balances write rejected");
        }
        self.inner.write().await.balances.extend_from_slice(balances);
        Ok(())
    }

    async fn insert_positions(&self, positions: &[PositionSnapshot]) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("positions write rejected");
        }
        self.inner.write().await.positions.extend_from_slice(positions);
        Ok(())
    }

    async fn latest_price_id(&self, chain: &Chain, token: &str) -> anyhow::Result<Option<i64>> {
        let inner = self.inner.read().await;
        Ok(inner
            .prices
            .iter()
            .filter(|p| &p.chain == chain && p.token == token)
            .max_by_key(|p| (p.updated_at, p.id))
            .map(|p| p.id))
    }

    async fn latest_priced_balances(&self, vault_id: i64) -> anyhow::Result<Vec<PricedBalance>> {
        let inner = self.inner.read().await;
        let mut latest: BTreeMap<(Chain, String), &Balance> = BTreeMap::new();
        for balance in inner.balances.iter().filter(|b| b.vault_id == vault_id) {
            let key = (balance.chain.clone(), balance.token.clone());
            match latest.get(&key) {
                Some(current) if current.date > balance.date => {},
                _ => {
                    latest.insert(key, balance);
                },
            }
        }

        Ok(latest
            .into_values()
            .map(|b| PricedBalance {
                chain: b.chain.clone(),
                token: b.token.clone(),
                balance: b.balance,
                price_usd: b
                    .price_id
                    .and_then(|id| inner.prices.iter().find(|p| p.id == id))
                    .map(|p| p.price_usd),
                date: b.date,
            })
            .collect())
    }

    async fn latest_positions(&self, vault_id: i64) -> anyhow::Result<Vec<PositionSnapshot>> {
        let inner = self.inner.read().await;
        let mut latest: BTreeMap<(Chain, String), &PositionSnapshot> = BTreeMap::new();
        for position in inner.positions.iter().filter(|p| p.vault_id == vault_id) {
            let key = (position.chain.clone(), position.address.clone());
            match latest.get(&key) {
                Some(current) if current.date > position.date => {},
                _ => {
                    latest.insert(key, position);
                },
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn update_vault_points(
        &self,
        vault_id: i64,
        points: &PointsBreakdown,
    ) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(vault) = inner.vaults.get_mut(&vault_id) {
            vault.total_points = points.total_points;
            vault.balance = points.balance_usd;
            vault.lp_value = points.lp_value;
            vault.nft_value = points.nft_value;
            vault.swap_volume = points.swap_volume;
        }
        Ok(())
    }

    async fn leader_vaults(&self, from: i64, limit: i64) -> anyhow::Result<Vec<Vault>> {
        let inner = self.inner.read().await;
        Ok(page(inner.ordered_leaders(), from, limit))
    }

    async fn leader_totals(&self) -> anyhow::Result<LeaderTotals> {
        let inner = self.inner.read().await;
        Ok(inner
            .vaults
            .values()
            .filter(|v| v.join_airdrop)
            .fold(LeaderTotals::default(), |mut t, v| {
                t.vault_count += 1;
                t.total_points += v.total_points;
                t.total_balance += v.balance;
                t.total_lp += v.lp_value;
                t.total_nft += v.nft_value;
                t.total_swap_volume += v.swap_volume;
                t
            }))
    }

    async fn swap_leader_vaults(&self, from: i64, limit: i64) -> anyhow::Result<Vec<Vault>> {
        let inner = self.inner.read().await;
        let mut vaults: Vec<&Vault> = inner.vaults.values().filter(|v| v.join_airdrop).collect();
        vaults.sort_by(|a, b| compare_by_points(a.swap_volume, a.id, b.swap_volume, b.id));
        Ok(page(vaults, from, limit))
    }

    async fn vault_rank(&self, vault: &Vault) -> anyhow::Result<i64> {
        if !vault.join_airdrop {
            return Ok(0);
        }
        let inner = self.inner.read().await;
        let ahead = inner
            .ordered_leaders()
            .iter()
            .take_while(|v| v.id != vault.id)
            .count();
        Ok(ahead as i64 + 1)
    }

    async fn leader_vaults_by_season(
        &self,
        season_id: u32,
        from: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<SeasonLeader>> {
        let inner = self.inner.read().await;
        let leaders = page(inner.ordered_season(season_id), from, limit)
            .into_iter()
            .filter_map(|stats| {
                inner.vaults.get(&stats.vault_id).map(|vault| SeasonLeader {
                    vault: vault.clone(),
                    stats,
                })
            })
            .collect();
        Ok(leaders)
    }

    async fn leader_totals_by_season(&self, season_id: u32) -> anyhow::Result<LeaderTotals> {
        let inner = self.inner.read().await;
        Ok(inner
            .season_stats
            .iter()
            .filter(|s| s.season_id == season_id)
            .fold(LeaderTotals::default(), |mut t, s| {
                t.vault_count += 1;
                t.total_points += s.points;
                if let Some(v) = inner.vaults.get(&s.vault_id) {
                    t.total_balance += v.balance;
                    t.total_lp += v.lp_value;
                    t.total_nft += v.nft_value;
                    t.total_swap_volume += v.swap_volume;
                }
                t
            }))
    }

    async fn season_stats(
        &self,
        vault_id: i64,
        season_id: u32,
    ) -> anyhow::Result<Option<SeasonStats>> {
        let inner = self.inner.read().await;
        Ok(inner
            .season_stats
            .iter()
            .find(|s| s.vault_id == vault_id && s.season_id == season_id)
            .cloned())
    }

    async fn has_season_stats(&self, season_id: u32) -> anyhow::Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.season_stats.iter().any(|s| s.season_id == season_id))
    }

    async fn close_season(
        &self,
        season_id: u32,
        stats: &[SeasonStats],
        next_season_id: u32,
    ) -> anyhow::Result<u64> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("season close rejected");
        }
        let mut inner = self.inner.write().await;
        for s in stats {
            let exists = inner
                .season_stats
                .iter()
                .any(|e| e.vault_id == s.vault_id && e.season_id == s.season_id);
            if !exists {
                inner.season_stats.push(s.clone());
            }
        }

        let mut moved = 0;
        for vault in inner.vaults.values_mut() {
            if vault.current_season_id <= season_id && vault.current_season_id != next_season_id {
                vault.current_season_id = next_season_id;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn record_dead_letter(&self, dead_letter: &DeadLetter) -> anyhow::Result<()> {
        self.inner.write().await.dead_letters.push(dead_letter.clone());
        Ok(())
    }
}
