//! Opportunistic cleanup of expired ledger keys and old map entries.

use database::{ledger, message_map, now_millis};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::SyncEngine;
use crate::error::Result;

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Rows removed by one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub ledger_keys: u64,
    pub map_entries: u64,
}

impl SyncEngine {
    /// Delete expired ledger keys and map entries past retention.
    ///
    /// Pure age-based deletes, safe alongside live traffic.
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        let pool = self.database().pool();
        let ledger_keys = ledger::purge_expired(pool).await?;
        let cutoff = now_millis() - self.config().message_retention_days * DAY_MILLIS;
        let map_entries = message_map::purge_older_than(pool, cutoff).await?;

        debug!(ledger_keys, map_entries, "Cleanup finished");
        Ok(CleanupReport {
            ledger_keys,
            map_entries,
        })
    }

    /// Run cleanup with the configured probability.
    pub(crate) async fn maybe_cleanup(&self) {
        let rate = self.config().cleanup_sample_rate.clamp(0.0, 1.0);
        let sampled = rate > 0.0 && rand::thread_rng().gen_bool(rate);
        if !sampled {
            return;
        }
        if let Err(e) = self.run_cleanup().await {
            warn!(error = %e, "Cleanup failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use database::{ledger, message_map, NewMessageMapEntry};

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let harness = Harness::new().await;
        let pool = harness.engine.database().pool();

        let old = NewMessageMapEntry {
            ghl_message_id: "old".to_string(),
            location_id: "L1".to_string(),
            message_type: "text".to_string(),
            original_timestamp: 0,
            ..Default::default()
        };
        message_map::upsert_entry(pool, &old).await.unwrap();
        ledger::claim(pool, "fresh-key").await.unwrap();

        let report = harness.engine.run_cleanup().await.unwrap();
        assert_eq!(report.ledger_keys, 0);
        assert!(ledger::is_claimed(pool, "fresh-key").await.unwrap());
        // Retention is measured from row creation, which is now.
        assert_eq!(report.map_entries, 0);
        assert!(message_map::get_by_ghl_id(pool, "old").await.unwrap().is_some());
    }
}
