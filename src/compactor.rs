use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the journal if at least `threshold` records were appended since
/// the last rewrite. Returns whether a compaction ran.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!("compaction skipped: {appends} appends since last compaction");
        return false;
    }
    match engine.compact_journal().await {
        Ok(()) => {
            info!("compacted journal after {appends} appends");
            true
        }
        Err(e) => {
            warn!("journal compaction failed: {e}");
            false
        }
    }
}

/// Background task that rewrites the journal once it has grown enough.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        maybe_compact(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::directory::InMemoryDirectory;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::wal::Wal;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rentcal_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn d(s: &str) -> chrono::NaiveDate {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let directory = Arc::new(InMemoryDirectory::new());
        let pid = Ulid::new();
        directory.put_property(Property {
            id: pid,
            price: 100,
            listing: ListingKind::Rent,
            status: PropertyStatus::Available,
        });
        let engine = Engine::new(path.clone(), directory, Arc::new(NotifyHub::new()))
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(d("2025-05-01"))));

        // Three appends, two of which cancel each other out.
        let keep = engine
            .create_blocked_range(pid, Interval::new(d("2025-06-01"), d("2025-06-05")), None)
            .await
            .unwrap();
        let gone = engine
            .create_blocked_range(pid, Interval::new(d("2025-07-01"), d("2025-07-05")), None)
            .await
            .unwrap();
        engine.delete_blocked_range(gone.id).await.unwrap();

        assert!(!maybe_compact(&engine, 10).await);
        assert_eq!(Wal::replay(&path).unwrap().len(), 3);

        assert!(maybe_compact(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        let events = Wal::replay(&path).unwrap();
        assert_eq!(events, vec![Event::RangeBlocked { range: keep }]);
    }
}
