use std::time::Duration;

use anyhow::{anyhow, Context};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

const SCHEMA_PATH: &str = "schema/postgres.sql";

/// Connection attempts before giving up at startup
const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Split SQL into statements, respecting dollar-quoted strings.
/// This handles PostgreSQL function definitions that use $$ ... $$ blocks.
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'$') {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if bytes[i] == b';' && !in_dollar_quote {
            let stmt = &sql[start..i];
            if !stmt.trim().is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    let rest = &sql[start..];
    if !rest.trim().is_empty() {
        statements.push(rest);
    }

    statements
}

/// PostgreSQL client with connection pooling.
///
/// Backs the [`Store`](crate::db::Store) used by the workers and the
/// leaderboard: vaults, coins, balance observations, prices and closed season
/// snapshots. Uses `deadpool-postgres` for connection management.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL at {}:{}", settings.host, settings.port);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database);

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(settings.pool_size)
            .build()
            .context("Failed to create PostgreSQL connection pool")?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL");
                    return Ok(Self { pool });
                },
                Err(e) if attempt >= MAX_CONNECT_ATTEMPTS => {
                    return Err(anyhow!(
                        "Failed to connect to PostgreSQL after {} attempts: {}",
                        attempt,
                        e
                    ));
                },
                Err(e) => {
                    let delay = Duration::from_millis(200 * 2_u64.pow(attempt));
                    warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}): {}, retrying in {:?}",
                        attempt, MAX_CONNECT_ATTEMPTS, e, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Health check - verify connection is still alive
    pub async fn health_check(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .context("PostgreSQL health check failed")?;
        Ok(())
    }

    /// Apply `schema/postgres.sql`. Every statement is idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Running PostgreSQL migrations");
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string(SCHEMA_PATH)
            .await
            .with_context(|| format!("Failed to read {}", SCHEMA_PATH))?;

        for stmt in split_sql_statements(&schema) {
            let stmt = stmt.trim();
            client
                .execute(stmt, &[])
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL migrations completed successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n\nCREATE INDEX i ON a (id);  \n";
        let statements: Vec<&str> = split_sql_statements(sql).into_iter().map(str::trim).collect();
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a (id)"]);
    }

    #[test]
    fn test_split_sql_keeps_dollar_quoted_bodies() {
        let sql = "CREATE FUNCTION f() RETURNS void AS $$ BEGIN PERFORM 1; END; $$ LANGUAGE plpgsql;\nSELECT 1";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("PERFORM 1; END;"));
        assert_eq!(statements[1].trim(), "SELECT 1");
    }

    #[test]
    fn test_split_sql_handles_multibyte_text() {
        let sql = "SELECT 'größe';SELECT 2";
        assert_eq!(split_sql_statements(sql), vec!["SELECT 'größe'", "SELECT 2"]);
    }

    #[test]
    fn test_bundled_schema_splits() {
        let schema = include_str!("../../../schema/postgres.sql");
        let statements = split_sql_statements(schema);
        assert!(statements.len() >= 10);
        assert!(statements.iter().all(|s| !s.trim().is_empty()));
    }
}
