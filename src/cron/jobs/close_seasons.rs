//! Job to close every season whose window has ended.
//!
//! Closing is idempotent, so running it again after a crash or on every
//! tick is safe.

use anyhow::Result;
use chrono::Utc;
use log::info;

use crate::ranking::{CloseOutcome, SeasonCloser};

pub async fn run(closer: &SeasonCloser) -> Result<()> {
    let outcomes = closer.close_finished(Utc::now()).await?;

    for outcome in outcomes {
        if let CloseOutcome::Closed {
            season_id,
            vaults,
            total_points,
        } = outcome
        {
            info!(
                "close_seasons: season {} frozen with {} vault(s) and {:.2} points",
                season_id, vaults, total_points
            );
        }
    }

    Ok(())
}
