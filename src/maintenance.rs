//! Background housekeeping.
//!
//! The journal grows by one entry per committed event. Once enough appends
//! accumulate since the last snapshot, the compactor rewrites the file with
//! the minimal event set that recreates current state. Each tick also prunes
//! emptied store indexes and idle lock-table entries.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::Engine;

/// Snapshot the journal if the append count has reached `threshold`.
/// Returns whether a snapshot was taken.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.journal_appends_since_snapshot().await;
    if appends < threshold {
        return false;
    }
    match engine.snapshot_journal().await {
        Ok(()) => {
            info!(appends, "journal compacted");
            true
        }
        Err(e) => {
            warn!(error = %e, "journal compaction failed");
            false
        }
    }
}

/// Periodic compaction task. Spawn once next to the engine; runs until the
/// process exits.
pub async fn run_compactor(engine: Arc<Engine>, period: Duration) {
    let threshold = engine.config().compact_threshold;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        engine.store.prune_empty_indexes();
        engine.evict_idle_locks();
        maybe_compact(&engine, threshold).await;
    }
}
