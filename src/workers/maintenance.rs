//! Low-frequency maintenance: drops expired authorization codes and refresh
//! tokens, and compacts revocation entries past the retention horizon.

use chrono::{Duration, Utc};
use std::time::Duration as StdDuration;

use crate::config::Stores;

/// Revocation entries outlive every token they could shadow by a wide
/// margin at 30 days.
const REVOCATION_RETENTION_DAYS: i64 = 30;

pub async fn run(stores: Stores, interval_secs: u64) {
    let mut ticker = tokio::time::interval(StdDuration::from_secs(interval_secs.max(1)));
    // The first tick fires immediately; skip it so startup stays quiet.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        sweep(&stores).await;
    }
}

async fn sweep(stores: &Stores) {
    match stores.codes.purge_expired().await {
        Ok(purged) if purged > 0 => tracing::debug!(purged, "expired authorization codes dropped"),
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "authorization code sweep failed"),
    }

    match stores.refresh.purge_expired().await {
        Ok(purged) if purged > 0 => tracing::debug!(purged, "expired refresh tokens dropped"),
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "refresh token sweep failed"),
    }

    let horizon = Utc::now() - Duration::days(REVOCATION_RETENTION_DAYS);
    match stores.revocation.compact(horizon).await {
        Ok(compacted) if compacted > 0 => {
            tracing::debug!(compacted, "old revocation entries compacted")
        }
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "revocation compaction failed"),
    }
}
