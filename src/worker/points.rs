use std::sync::Arc;

use anyhow::Context;
use log::debug;

use crate::{
    config::PointsSettings,
    db::{
        models::{PositionSnapshot, PricedBalance},
        Store,
    },
    queue::TaskError,
    utils::{validate_amount, validate_usd_price, validate_usd_value},
};

/// Multipliers applied to each aggregated metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsWeights {
    pub balance: f64,
    pub lp: f64,
    pub nft: f64,
    pub swap_volume: f64,
}

impl Default for PointsWeights {
    fn default() -> Self {
        Self::from(&PointsSettings::default())
    }
}

impl From<&PointsSettings> for PointsWeights {
    fn from(settings: &PointsSettings) -> Self {
        // A negative or NaN weight would let a metric subtract points
        let clamp = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        Self {
            balance: clamp(settings.balance_weight),
            lp: clamp(settings.lp_weight),
            nft: clamp(settings.nft_weight),
            swap_volume: clamp(settings.swap_volume_weight),
        }
    }
}

/// Aggregated USD metrics of a vault and the points derived from them.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PointsBreakdown {
    pub balance_usd: f64,
    pub lp_value: f64,
    pub nft_value: f64,
    pub swap_volume: f64,
    pub total_points: f64,
}

/// Pure points function over the latest observations of one vault.
///
/// Inputs are summed in a canonical order so the same persisted rows always
/// produce the same bits, whatever order the store returned them in.
/// Non-finite, negative or out-of-bounds values contribute 0.
pub fn compute_points(
    balances: &[PricedBalance],
    positions: &[PositionSnapshot],
    weights: &PointsWeights,
) -> PointsBreakdown {
    let mut balances: Vec<&PricedBalance> = balances.iter().collect();
    balances.sort_by(|a, b| {
        (&a.chain, &a.token)
            .cmp(&(&b.chain, &b.token))
            .then(a.date.cmp(&b.date))
            .then(a.balance.total_cmp(&b.balance))
    });

    let mut positions: Vec<&PositionSnapshot> = positions.iter().collect();
    positions.sort_by(|a, b| {
        (&a.chain, &a.address)
            .cmp(&(&b.chain, &b.address))
            .then(a.date.cmp(&b.date))
    });

    let balance_usd: f64 = balances
        .iter()
        .map(|b| {
            let price = b.price_usd.map(validate_usd_price).unwrap_or(0.0);
            validate_usd_value(validate_amount(b.balance) * price)
        })
        .sum();
    let lp_value: f64 = positions.iter().map(|p| validate_usd_value(p.lp_value)).sum();
    let nft_value: f64 = positions.iter().map(|p| validate_usd_value(p.nft_value)).sum();
    let swap_volume: f64 = positions.iter().map(|p| validate_usd_value(p.swap_volume)).sum();

    let total_points = weights.balance * balance_usd
        + weights.lp * lp_value
        + weights.nft * nft_value
        + weights.swap_volume * swap_volume;

    PointsBreakdown {
        balance_usd,
        lp_value,
        nft_value,
        swap_volume,
        total_points,
    }
}

/// Recomputes a vault's points from its latest persisted observations.
///
/// The only writer of `total_points`. Running it twice over unchanged inputs
/// writes the same value twice.
pub struct PointsCalculator {
    store: Arc<dyn Store>,
    weights: PointsWeights,
}

impl PointsCalculator {
    pub fn new(store: Arc<dyn Store>, weights: PointsWeights) -> Self {
        Self { store, weights }
    }

    /// Returns `None` when the vault no longer exists.
    pub async fn calculate(&self, vault_id: i64) -> Result<Option<PointsBreakdown>, TaskError> {
        let Some(vault) = self
            .store
            .get_vault(vault_id)
            .await
            .context("Failed to load vault")?
        else {
            debug!("Vault {} not found, skipping points calculation", vault_id);
            return Ok(None);
        };

        let balances = self
            .store
            .latest_priced_balances(vault.id)
            .await
            .context("Failed to load latest balances")?;
        let positions = self
            .store
            .latest_positions(vault.id)
            .await
            .context("Failed to load latest positions")?;

        let breakdown = compute_points(&balances, &positions, &self.weights);

        self.store
            .update_vault_points(vault.id, &breakdown)
            .await
            .context("Failed to update vault points")?;

        debug!(
            "Vault {} points {:.4} (balance ${:.2}, lp ${:.2}, nft ${:.2}, swap ${:.2})",
            vault.id,
            breakdown.total_points,
            breakdown.balance_usd,
            breakdown.lp_value,
            breakdown.nft_value,
            breakdown.swap_volume
        );

        Ok(Some(breakdown))
    }
}
