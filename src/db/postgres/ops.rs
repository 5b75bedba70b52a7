use async_trait::async_trait;
use log::error;
use tokio_postgres::{types::ToSql, Row};

use crate::{
    chain::Chain,
    db::{
        models::{
            Balance, Coin, DeadLetter, PositionSnapshot, PricedBalance, SeasonStats, Vault,
        },
        postgres::PostgresClient,
        store::{LeaderTotals, SeasonLeader, Store},
    },
    worker::PointsBreakdown,
};

/// Vault columns, selected from `airdrop.vaults v`
const VAULT_COLUMNS: &str = r#"
    v.id, v.ecdsa, v.eddsa, v.name, v.alias, v.uid, v.hex_chain_code,
    v.total_points, v.join_airdrop, v.current_season_id,
    v.balance, v.lp_value, v.nft_value, v.swap_volume,
    v.referral_code, v.referral_count, v.avatar_url, v.show_name_in_leaderboard, v.created_at
"#;

/// Vaults visible on the leaderboard
const LEADER_FILTER: &str = "v.join_airdrop AND v.deleted_at IS NULL";

/// Build `($1, $2, ...), ($n+1, ...)` placeholders for a multi-row insert.
fn values_placeholders(rows: usize, cols: usize) -> String {
    (0..rows)
        .map(|row| {
            let start = row * cols + 1;
            let placeholders: Vec<String> = (start..start + cols).map(|n| format!("${}", n)).collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

fn row_to_vault(row: &Row) -> Vault {
    let season: i32 = row.get("current_season_id");
    Vault {
        id: row.get("id"),
        ecdsa: row.get("ecdsa"),
        eddsa: row.get("eddsa"),
        name: row.get("name"),
        alias: row.get("alias"),
        uid: row.get("uid"),
        hex_chain_code: row.get("hex_chain_code"),
        total_points: row.get("total_points"),
        join_airdrop: row.get("join_airdrop"),
        current_season_id: season.max(0) as u32,
        balance: row.get("balance"),
        lp_value: row.get("lp_value"),
        nft_value: row.get("nft_value"),
        swap_volume: row.get("swap_volume"),
        referral_code: row.get("referral_code"),
        referral_count: row.get("referral_count"),
        avatar_url: row.get("avatar_url"),
        show_name_in_leaderboard: row.get("show_name_in_leaderboard"),
        created_at: row.get("created_at"),
    }
}

fn row_to_totals(row: &Row) -> LeaderTotals {
    LeaderTotals {
        vault_count: row.get("vault_count"),
        total_points: row.get("total_points"),
        total_balance: row.get("total_balance"),
        total_lp: row.get("total_lp"),
        total_nft: row.get("total_nft"),
        total_swap_volume: row.get("total_swap_volume"),
    }
}

const TOTALS_COLUMNS: &str = r#"
    COUNT(*)::BIGINT AS vault_count,
    COALESCE(SUM(v.balance), 0)::DOUBLE PRECISION AS total_balance,
    COALESCE(SUM(v.lp_value), 0)::DOUBLE PRECISION AS total_lp,
    COALESCE(SUM(v.nft_value), 0)::DOUBLE PRECISION AS total_nft,
    COALESCE(SUM(v.swap_volume), 0)::DOUBLE PRECISION AS total_swap_volume
"#;

#[async_trait]
impl Store for PostgresClient {
    // ==================== VAULTS & COINS ====================

    async fn get_vault(&self, vault_id: i64) -> anyhow::Result<Option<Vault>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM airdrop.vaults v WHERE v.id = $1 AND v.deleted_at IS NULL",
            VAULT_COLUMNS
        );

        let row = client.query_opt(&query, &[&vault_id]).await?;
        Ok(row.as_ref().map(row_to_vault))
    }

    async fn get_coins(&self, vault_id: i64) -> anyhow::Result<Vec<Coin>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT id, vault_id, chain, address, hex_public_key, ticker,
                contract_address, decimals, is_native
            FROM airdrop.coins
            WHERE vault_id = $1 AND deleted_at IS NULL
            ORDER BY id
        "#;

        let rows = client.query(query, &[&vault_id]).await?;
        let coins = rows
            .iter()
            .map(|row| {
                let decimals: i16 = row.get("decimals");
                Coin {
                    id: row.get("id"),
                    vault_id: row.get("vault_id"),
                    chain: row.get("chain"),
                    address: row.get("address"),
                    hex_public_key: row.get("hex_public_key"),
                    ticker: row.get("ticker"),
                    contract_address: row.get("contract_address"),
                    decimals: decimals.clamp(0, u8::MAX as i16) as u8,
                    is_native: row.get("is_native"),
                }
            })
            .collect();

        Ok(coins)
    }

    async fn airdrop_vault_ids(&self) -> anyhow::Result<Vec<i64>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT v.id FROM airdrop.vaults v WHERE {} ORDER BY v.id", LEADER_FILTER);

        let rows = client.query(&query, &[]).await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }

    // ==================== OBSERVATIONS ====================

    async fn insert_balances(&self, balances: &[Balance]) -> anyhow::Result<()> {
        if balances.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 9;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in balances.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO airdrop.balances (
                    vault_id, ecdsa, eddsa, chain, address, token, balance, date, price_id
                ) VALUES {}
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let tokens: Vec<String> = chunk.iter().map(|b| sanitize_string(&b.token)).collect();

            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for (i, balance) in chunk.iter().enumerate() {
                params.push(&balance.vault_id);
                params.push(&balance.ecdsa);
                params.push(&balance.eddsa);
                params.push(&balance.chain);
                params.push(&balance.address);
                params.push(&tokens[i]);
                params.push(&balance.balance);
                params.push(&balance.date);
                params.push(&balance.price_id);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} balances: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    async fn insert_positions(&self, positions: &[PositionSnapshot]) -> anyhow::Result<()> {
        if positions.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 7;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in positions.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO airdrop.positions (
                    vault_id, chain, address, lp_value, nft_value, swap_volume, date
                ) VALUES {}
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for position in chunk {
                params.push(&position.vault_id);
                params.push(&position.chain);
                params.push(&position.address);
                params.push(&position.lp_value);
                params.push(&position.nft_value);
                params.push(&position.swap_volume);
                params.push(&position.date);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} positions: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    async fn latest_price_id(&self, chain: &Chain, token: &str) -> anyhow::Result<Option<i64>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT id FROM airdrop.prices
            WHERE chain = $1 AND token = $2
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
        "#;

        let row = client.query_opt(query, &[chain, &token]).await?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn latest_priced_balances(&self, vault_id: i64) -> anyhow::Result<Vec<PricedBalance>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT DISTINCT ON (b.chain, b.token)
                b.chain, b.token, b.balance, b.date, p.price_usd
            FROM airdrop.balances b
            LEFT JOIN airdrop.prices p ON p.id = b.price_id
            WHERE b.vault_id = $1
            ORDER BY b.chain, b.token, b.date DESC, b.id DESC
        "#;

        let rows = client.query(query, &[&vault_id]).await?;
        let balances = rows
            .iter()
            .map(|row| PricedBalance {
                chain: row.get("chain"),
                token: row.get("token"),
                balance: row.get("balance"),
                price_usd: row.get("price_usd"),
                date: row.get("date"),
            })
            .collect();

        Ok(balances)
    }

    async fn latest_positions(&self, vault_id: i64) -> anyhow::Result<Vec<PositionSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT DISTINCT ON (chain, address)
                vault_id, chain, address, lp_value, nft_value, swap_volume, date
            FROM airdrop.positions
            WHERE vault_id = $1
            ORDER BY chain, address, date DESC, id DESC
        "#;

        let rows = client.query(query, &[&vault_id]).await?;
        let positions = rows
            .iter()
            .map(|row| PositionSnapshot {
                vault_id: row.get("vault_id"),
                chain: row.get("chain"),
                address: row.get("address"),
                lp_value: row.get("lp_value"),
                nft_value: row.get("nft_value"),
                swap_volume: row.get("swap_volume"),
                date: row.get("date"),
            })
            .collect();

        Ok(positions)
    }

    // ==================== POINTS ====================

    async fn update_vault_points(
        &self,
        vault_id: i64,
        points: &PointsBreakdown,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE airdrop.vaults SET
                total_points = $2,
                balance = $3,
                lp_value = $4,
                nft_value = $5,
                swap_volume = $6
            WHERE id = $1
        "#;

        client
            .execute(
                query,
                &[
                    &vault_id,
                    &points.total_points,
                    &points.balance_usd,
                    &points.lp_value,
                    &points.nft_value,
                    &points.swap_volume,
                ],
            )
            .await?;

        Ok(())
    }

    // ==================== ACTIVE SEASON LEADERBOARD ====================

    async fn leader_vaults(&self, from: i64, limit: i64) -> anyhow::Result<Vec<Vault>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {} FROM airdrop.vaults v
            WHERE {}
            ORDER BY v.total_points DESC, v.id ASC
            OFFSET $1 LIMIT $2
            "#,
            VAULT_COLUMNS, LEADER_FILTER
        );

        let rows = client.query(&query, &[&from, &limit]).await?;
        Ok(rows.iter().map(row_to_vault).collect())
    }

    async fn leader_totals(&self) -> anyhow::Result<LeaderTotals> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {},
                COALESCE(SUM(v.total_points), 0)::DOUBLE PRECISION AS total_points
            FROM airdrop.vaults v
            WHERE {}
            "#,
            TOTALS_COLUMNS, LEADER_FILTER
        );

        let row = client.query_one(&query, &[]).await?;
        Ok(row_to_totals(&row))
    }

    async fn swap_leader_vaults(&self, from: i64, limit: i64) -> anyhow::Result<Vec<Vault>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {} FROM airdrop.vaults v
            WHERE {}
            ORDER BY v.swap_volume DESC, v.id ASC
            OFFSET $1 LIMIT $2
            "#,
            VAULT_COLUMNS, LEADER_FILTER
        );

        let rows = client.query(&query, &[&from, &limit]).await?;
        Ok(rows.iter().map(row_to_vault).collect())
    }

    async fn vault_rank(&self, vault: &Vault) -> anyhow::Result<i64> {
        if !vault.join_airdrop {
            return Ok(0);
        }

        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT COUNT(*)::BIGINT AS ahead FROM airdrop.vaults v
            WHERE {}
                AND (v.total_points > $1 OR (v.total_points = $1 AND v.id < $2))
            "#,
            LEADER_FILTER
        );

        let row = client.query_one(&query, &[&vault.total_points, &vault.id]).await?;
        let ahead: i64 = row.get("ahead");
        Ok(ahead + 1)
    }

    // ==================== CLOSED SEASONS ====================

    async fn leader_vaults_by_season(
        &self,
        season_id: u32,
        from: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<SeasonLeader>> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {}, s.season_id, s.points, s.rank
            FROM airdrop.season_stats s
            JOIN airdrop.vaults v ON v.id = s.vault_id
            WHERE s.season_id = $1
            ORDER BY s.points DESC, s.vault_id ASC
            OFFSET $2 LIMIT $3
            "#,
            VAULT_COLUMNS
        );

        let season = season_id as i32;
        let rows = client.query(&query, &[&season, &from, &limit]).await?;
        let leaders = rows
            .iter()
            .map(|row| {
                let vault = row_to_vault(row);
                SeasonLeader {
                    stats: SeasonStats {
                        vault_id: vault.id,
                        season_id,
                        points: row.get("points"),
                        rank: row.get("rank"),
                    },
                    vault,
                }
            })
            .collect();

        Ok(leaders)
    }

    async fn leader_totals_by_season(&self, season_id: u32) -> anyhow::Result<LeaderTotals> {
        let client = self.pool.get().await?;
        let query = format!(
            r#"
            SELECT {},
                COALESCE(SUM(s.points), 0)::DOUBLE PRECISION AS total_points
            FROM airdrop.season_stats s
            JOIN airdrop.vaults v ON v.id = s.vault_id
            WHERE s.season_id = $1
            "#,
            TOTALS_COLUMNS
        );

        let row = client.query_one(&query, &[&(season_id as i32)]).await?;
        Ok(row_to_totals(&row))
    }

    async fn season_stats(
        &self,
        vault_id: i64,
        season_id: u32,
    ) -> anyhow::Result<Option<SeasonStats>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT points, rank FROM airdrop.season_stats
            WHERE vault_id = $1 AND season_id = $2
        "#;

        let row = client.query_opt(query, &[&vault_id, &(season_id as i32)]).await?;
        Ok(row.map(|row| SeasonStats {
            vault_id,
            season_id,
            points: row.get("points"),
            rank: row.get("rank"),
        }))
    }

    async fn has_season_stats(&self, season_id: u32) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let query = "SELECT EXISTS (SELECT 1 FROM airdrop.season_stats WHERE season_id = $1)";

        let row = client.query_one(query, &[&(season_id as i32)]).await?;
        Ok(row.get(0))
    }

    async fn close_season(
        &self,
        season_id: u32,
        stats: &[SeasonStats],
        next_season_id: u32,
    ) -> anyhow::Result<u64> {
        const COLS_PER_ROW: usize = 4;
        const BATCH_SIZE: usize = 1000;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        for chunk in stats.chunks(BATCH_SIZE) {
            // Snapshots are immutable, a second close must not rewrite them
            let query = format!(
                r#"
                INSERT INTO airdrop.season_stats (vault_id, season_id, points, rank)
                VALUES {}
                ON CONFLICT (vault_id, season_id) DO NOTHING
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let seasons: Vec<i32> = chunk.iter().map(|s| s.season_id as i32).collect();

            let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(chunk.len() * COLS_PER_ROW);
            for (i, s) in chunk.iter().enumerate() {
                params.push(&s.vault_id);
                params.push(&seasons[i]);
                params.push(&s.points);
                params.push(&s.rank);
            }

            tx.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} season stats: {:?}", chunk.len(), e);
                e
            })?;
        }

        let query = r#"
            UPDATE airdrop.vaults SET current_season_id = $2
            WHERE current_season_id <= $1 AND current_season_id <> $2
        "#;
        let moved = tx
            .execute(query, &[&(season_id as i32), &(next_season_id as i32)])
            .await?;

        tx.commit().await?;
        Ok(moved)
    }

    // ==================== TASKS ====================

    async fn record_dead_letter(&self, dead_letter: &DeadLetter) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO airdrop.dead_letters (
                task_id, kind, vault_id, attempts, error, dead_lettered_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
        "#;

        client
            .execute(
                query,
                &[
                    &(dead_letter.task_id as i64),
                    &dead_letter.kind,
                    &dead_letter.vault_id,
                    &(dead_letter.attempts as i32),
                    &sanitize_string(&dead_letter.error),
                    &dead_letter.dead_lettered_at,
                ],
            )
            .await?;

        Ok(())
    }
}
