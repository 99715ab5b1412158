use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::BookingEngine;
use crate::lock::LockBackend;

/// Background task that purges day sheets older than today and evicts
/// expired lock holders. Errors are logged and retried next tick.
pub async fn run_reaper(engine: Arc<BookingEngine>, locks: Arc<dyn LockBackend>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;

        let today = chrono::Utc::now().date_naive();
        match engine.purge_past(today).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "reaped past bookings"),
            Err(e) => tracing::warn!("purge failed, will retry: {e}"),
        }

        let evicted = locks.sweep_expired().await;
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired lock holders");
        }
    }
}

/// Background task that compacts the journal once enough appends pile up.
pub async fn run_compactor(engine: Arc<BookingEngine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if engine.journal_appends_since_compact().await >= threshold {
            match engine.compact_journal().await {
                Ok(()) => info!("journal compacted"),
                Err(e) => tracing::warn!("journal compaction failed, will retry: {e}"),
            }
        }
    }
}
